//! Interactive line debugger.
//!
//! Attached with `-g`, the debugger prompts on stdout before every
//! instruction. `c` detaches it, `s` executes one instruction after showing
//! the next pc and word; the inspection commands re-prompt.

use std::io::{self, BufRead, Write};

use crate::cpu::Cpu;

const HELP: &str = "\n\
h:\tprint help commands.\n\
q:\tquit.\n\
c:\tcontinue.\n\
s:\tsingle step for one instruction.\n\
i:\tdisplay registers.\n\
x:\tdisplay memory, the input address is hex number (e.g x 10000)\n";

/// Prompt until a resuming command (`c` or `s`); called between fetch and
/// dispatch.
pub(crate) fn prompt(cpu: &mut Cpu) {
    let stdin = io::stdin();
    loop {
        print!("\ndbg => ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
            // EOF on the command stream: nothing left to single-step for.
            cpu.debug_continue();
            return;
        }
        let cmd = line.trim();
        match cmd.chars().next() {
            Some('c') => {
                cpu.debug_continue();
                return;
            }
            Some('s') => {
                let (pc, word) = cpu.debug_next();
                println!("[{pc:08x}] {word:x}");
                return;
            }
            Some('q') => std::process::exit(0),
            Some('i') => print!("{}", cpu.debug_dump()),
            Some('x') => {
                let arg = cmd[1..].trim();
                match u32::from_str_radix(arg, 16).ok().and_then(|v| cpu.debug_peek(v).map(|b| (v, b))) {
                    Some((v, byte)) => println!("\n[{v:08x}]: {byte:02x}"),
                    None => println!("\ninvalid address: {arg}."),
                }
            }
            _ => println!("{HELP}"),
        }
    }
}
