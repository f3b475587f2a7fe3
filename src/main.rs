//! vem -- cpu emulator.
//!
//! Usage: `vem [-g] [-v] [-m memsize] [-f filesys] file`

use std::path::PathBuf;
use std::process;

use vem::dev::console::Console;
use vem::loader::{self, FS_SIZE};
use vem::mem::{Physical, DEFAULT_MEM_SIZE};
use vem::{logger, Cpu, Exit};

struct Opts {
    file: PathBuf,
    verbose: bool,
    debug: bool,
    mem_size: u32,
    filesys: Option<PathBuf>,
}

fn usage(cmd: &str) -> ! {
    eprintln!("{cmd} : usage: {cmd} [-g] [-v] [-m memsize] [-f filesys] file");
    process::exit(1);
}

fn parse_args() -> Opts {
    let mut args = std::env::args();
    let cmd = args.next().unwrap_or_else(|| "vem".into());
    let mut opts = Opts {
        file: PathBuf::new(),
        verbose: false,
        debug: false,
        mem_size: DEFAULT_MEM_SIZE,
        filesys: None,
    };
    let mut file = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-g" => opts.debug = true,
            "-v" => opts.verbose = true,
            "-m" => {
                let mib = args
                    .next()
                    .and_then(|s| s.parse::<u32>().ok())
                    .unwrap_or_else(|| usage(&cmd));
                opts.mem_size = mib
                    .checked_mul(1024 * 1024)
                    .unwrap_or_else(|| usage(&cmd));
            }
            "-f" => opts.filesys = Some(args.next().unwrap_or_else(|| usage(&cmd)).into()),
            _ if arg.starts_with('-') => usage(&cmd),
            _ => {
                if file.replace(PathBuf::from(arg)).is_some() {
                    usage(&cmd);
                }
            }
        }
    }
    opts.file = file.unwrap_or_else(|| usage(&cmd));
    if opts.mem_size < FS_SIZE {
        usage(&cmd);
    }
    opts
}

fn main() {
    let opts = parse_args();
    logger::init(opts.verbose);
    if opts.debug {
        log::debug!("in debugger mode");
    }
    log::debug!("mem size = {}", opts.mem_size);

    let mut mem = Physical::new(opts.mem_size);
    if let Some(fs) = &opts.filesys {
        if let Err(e) = loader::load_filesystem(&mut mem, fs) {
            log::error!("{e}");
            process::exit(1);
        }
    }
    let entry = match loader::load_executable(&mut mem, &opts.file) {
        Ok(entry) => entry,
        Err(e) => {
            log::error!("{e}");
            process::exit(1);
        }
    };

    log::debug!("emulating {}", opts.file.display());
    let mem_size = mem.size();
    let mut cpu = Cpu::new(mem, Console::stdio());
    cpu.set_debug(opts.debug);
    match cpu.run(entry, mem_size - FS_SIZE) {
        Exit::Halt(a) => process::exit(a as i32),
        Exit::Kill => process::exit(0),
        Exit::Fatal => process::exit(1),
    }
}
