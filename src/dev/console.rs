//! Host console bridge.
//!
//! The machine has exactly two byte devices: a keyboard read by non-blocking
//! polls of stdin, and a console written one byte at a time on stdout. Both
//! ends can be redirected in-process (a scripted input queue, a capture
//! buffer) so whole-machine tests run without touching the host terminal.

use std::collections::VecDeque;

enum Input {
    /// Non-blocking poll of host stdin.
    Stdin,
    /// Pre-scripted bytes, drained front to back.
    Script(VecDeque<u8>),
}

enum Sink {
    Stdout,
    Capture(Vec<u8>),
}

pub struct Console {
    input: Input,
    sink: Sink,
}

impl Console {
    /// Console wired to the host stdin/stdout.
    pub fn stdio() -> Self {
        Self {
            input: Input::Stdin,
            sink: Sink::Stdout,
        }
    }

    /// Console with a scripted keyboard and a captured output buffer.
    pub fn scripted(input: &[u8]) -> Self {
        Self {
            input: Input::Script(input.iter().copied().collect()),
            sink: Sink::Capture(Vec::new()),
        }
    }

    /// Bytes written so far when capturing; empty for a stdio console.
    pub fn output(&self) -> &[u8] {
        match &self.sink {
            Sink::Stdout => &[],
            Sink::Capture(buf) => buf,
        }
    }

    /// One keyboard byte if any is ready. Never blocks.
    pub fn poll_keyboard(&mut self) -> Option<u8> {
        match &mut self.input {
            Input::Stdin => poll_stdin(),
            Input::Script(q) => q.pop_front(),
        }
    }

    /// Blocking single-byte console write. Returns the host's byte count,
    /// negative on a host write error.
    pub fn write_byte(&mut self, byte: u8) -> i32 {
        match &mut self.sink {
            Sink::Stdout => {
                let buf = [byte];
                let n = unsafe { libc::write(1, buf.as_ptr() as *const libc::c_void, 1) };
                n as i32
            }
            Sink::Capture(out) => {
                out.push(byte);
                1
            }
        }
    }
}

fn poll_stdin() -> Option<u8> {
    let mut pfd = libc::pollfd {
        fd: 0,
        events: libc::POLLIN,
        revents: 0,
    };
    if unsafe { libc::poll(&mut pfd, 1, 0) } == 1 {
        let mut ch = 0u8;
        let n = unsafe { libc::read(0, &mut ch as *mut u8 as *mut libc::c_void, 1) };
        if n == 1 {
            return Some(ch);
        }
    }
    None
}
