//! vem -- user-space emulator for a v9-style 32-bit paged machine.
//!
//! The machine is one virtual CPU with three integer and two floating-point
//! registers, a two-level paged MMU backed by a software translation cache,
//! two privilege rings, a dense one-byte opcode table, a polled keyboard and
//! a byte console. The crate exposes the machine as a library (the binary in
//! `main.rs` is a thin CLI around it):
//!
//! * [`mem`] -- physical memory and the translation cache;
//! * [`cpu`] -- registers, interpreter loop, page-table walker, trap and
//!   interrupt delivery, the opcode table;
//! * [`dev`] -- the host console bridge;
//! * [`loader`] -- executable and RAM file-system images;
//! * [`logger`] -- the stderr log sink.

pub mod cpu;
mod dbg;
pub mod dev;
pub mod loader;
pub mod logger;
pub mod mem;

pub use cpu::{Cpu, Exit};
