//! The virtual CPU.
//!
//! All machine state lives in one [`Cpu`] record: the architectural
//! registers, the MMU state, the translation cache, physical memory and the
//! host console bridge. The interpreter is a method on that record.
//!
//! # Fast paths
//!
//! The interpreter keeps shadow registers caching the current code page and
//! the current stack page as physical offsets:
//!
//! | shadow | meaning |
//! | ------ | ------- |
//! | `xpc` | physical offset of the next instruction |
//! | `tpc` | displacement such that guest pc = `xpc - tpc` |
//! | `fpc` | first physical offset past the cached code page |
//! | `xsp` | physical offset of the stack pointer |
//! | `tsp` | displacement such that guest sp = `xsp - tsp` |
//! | `fsp` | bytes left in the cached stack window, shifted left 8 |
//!
//! Sequential fetch reads `xpc` directly and only re-translates when it
//! crosses `fpc`; pushes, pops and local accesses run inside the `fsp`
//! window without touching the translation cache. `fixpc`/`fixsp` rebuild
//! the windows whenever the mapping may have changed (taken branches out of
//! the page, `RTI`, explicit SP writes, paging control).
//!
//! # Control flow
//!
//! Opcode handlers never jump; they return a [`Step`] continuation token and
//! the run loop switches on it. `Trap` runs the nested-fault check before
//! delivery, `Intr` delivers with the interrupt frame push, `FixPc`/`FixSp`
//! rebuild a window, `Next` passes through the cycle-boundary poll.
//!
//! The cycle counter pair (`cycle`, `xcycle`) measures retired instructions
//! in `xpc` space: `xcycle` is a moving threshold and the poll block runs
//! whenever `xpc` passes it, every `DELTA` instructions.

pub mod ops;
pub mod trap;
pub mod walk;
pub(crate) mod exec;

use crate::dev::console::Console;
use crate::mem::tlb::Tlb;
use crate::mem::Physical;
use self::trap::{FIPAGE, FKEYBD, FTIMER};

/// Instructions retired between host polls.
const DELTA: u32 = 4096;

/// Why the run loop ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Exit {
    /// Guest executed `HALT`; carries register A.
    Halt(u32),
    /// Backtick typed on the keyboard: ungraceful exit.
    Kill,
    /// Unrecoverable emulator state (nested fault, kernel-stack fault,
    /// bad console descriptor).
    Fatal,
}

/// Continuation token returned by every opcode handler and service routine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Step {
    /// Re-enter the loop top (fetch, checking the page boundary).
    Cont,
    /// Run the cycle-boundary poll, then fetch.
    Next,
    /// Rebuild the code window, then `Next`.
    FixPc,
    /// Rebuild the stack window, then `Cont`.
    FixSp,
    /// A fault was latched in `trap`; check for nesting, then deliver.
    Trap,
    /// Deliver `trap` as an interrupt frame (nesting already resolved).
    Intr,
    Halt,
    Kill,
    Fatal,
}

pub struct Cpu {
    // Architectural registers.
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub f: f64,
    pub g: f64,
    pub(crate) user: bool,
    pub(crate) iena: bool,
    pub(crate) ipend: u32,
    pub(crate) trap: u32,
    pub(crate) ivec: u32,
    pub(crate) vadr: u32,
    pub(crate) vmem: bool,
    pub(crate) pdir: u32,
    pub(crate) pdir_set: bool,
    pub(crate) usp: u32,
    pub(crate) ssp: u32,

    // Fast-path shadow registers.
    pub(crate) xpc: u32,
    pub(crate) tpc: u32,
    pub(crate) fpc: u32,
    pub(crate) xsp: u32,
    pub(crate) tsp: u32,
    pub(crate) fsp: u32,

    // Cycle accounting and timer.
    pub(crate) cycle: u32,
    pub(crate) xcycle: u32,
    pub(crate) timer: u32,
    pub(crate) timeout: u32,

    /// Latched keyboard byte, -1 when empty.
    pub(crate) kbchar: i32,
    /// Last fetched instruction word, for the fatal diagnostic.
    pub(crate) ir: i32,

    pub mem: Physical,
    pub(crate) tlb: Tlb,
    pub console: Console,
    pub(crate) dbg: bool,
}

/// Physical offset of an aligned access at `v` through entry `e`;
/// `mask` is `!1`, `!3` or `!7` for 16/32/64-bit widths.
#[inline(always)]
pub(crate) fn pa(v: u32, e: u32, mask: u32) -> u32 {
    (v ^ e) & mask
}

/// Physical offset of a byte access at `v` through entry `e`.
#[inline(always)]
pub(crate) fn pa_b(v: u32, e: u32) -> u32 {
    v ^ (e & !1)
}

impl Cpu {
    pub fn new(mem: Physical, console: Console) -> Self {
        Self {
            a: 0,
            b: 0,
            c: 0,
            f: 0.0,
            g: 0.0,
            user: false,
            iena: false,
            ipend: 0,
            trap: 0,
            ivec: 0,
            vadr: 0,
            vmem: false,
            pdir: 0,
            pdir_set: false,
            usp: 0,
            ssp: 0,
            xpc: 0,
            tpc: 0,
            fpc: 0,
            xsp: 0,
            tsp: 0,
            fsp: 0,
            cycle: 0,
            xcycle: 0,
            timer: 0,
            timeout: 0,
            kbchar: -1,
            ir: 0,
            mem,
            tlb: Tlb::new(),
            console,
            dbg: false,
        }
    }

    /// Attach or detach the line debugger.
    pub fn set_debug(&mut self, on: bool) {
        self.dbg = on;
    }

    /// Guest program counter of the next instruction.
    #[inline]
    pub fn pc(&self) -> u32 {
        self.xpc.wrapping_sub(self.tpc)
    }

    /// Guest stack pointer of the live ring.
    #[inline]
    pub fn sp(&self) -> u32 {
        self.xsp.wrapping_sub(self.tsp)
    }

    /// Latched fault code of the most recent trap.
    #[inline]
    pub fn trap(&self) -> u32 {
        self.trap
    }

    /// Bad-virtual-address latch.
    #[inline]
    pub fn vadr(&self) -> u32 {
        self.vadr
    }

    /// True while executing in the user ring.
    #[inline]
    pub fn user(&self) -> bool {
        self.user
    }

    /// Retired instruction count.
    #[inline]
    pub fn cycles(&self) -> u32 {
        self.cycle
            .wrapping_add((self.xpc.wrapping_sub(self.xcycle) as i32 / 4) as u32)
    }

    fn reset(&mut self, pc: u32, sp: u32) {
        self.a = 0;
        self.b = 0;
        self.c = 0;
        self.f = 0.0;
        self.g = 0.0;
        self.timer = 0;
        self.timeout = 0;
        self.fpc = 0;
        self.tsp = 0;
        self.fsp = 0;
        self.cycle = DELTA;
        self.xcycle = DELTA * 4;
        self.kbchar = -1;
        self.xpc = 0;
        self.tpc = 0u32.wrapping_sub(pc);
        self.xsp = sp;
    }

    /// Run the machine from `pc` with the stack at `sp` until it halts.
    pub fn run(&mut self, pc: u32, sp: u32) -> Exit {
        self.reset(pc, sp);
        let mut step = Step::FixPc;
        loop {
            step = match step {
                Step::Cont => {
                    if self.xpc == self.fpc {
                        Step::FixPc
                    } else {
                        self.exec()
                    }
                }
                Step::FixPc => self.fixpc(),
                Step::FixSp => {
                    self.fixsp();
                    Step::Cont
                }
                Step::Next => match self.tick() {
                    Some(s) => s,
                    None => self.exec(),
                },
                Step::Trap => {
                    if !self.iena {
                        log::error!("exception in interrupt handler");
                        Step::Fatal
                    } else {
                        Step::Intr
                    }
                }
                Step::Intr => self.deliver(),
                Step::Halt => return Exit::Halt(self.a),
                Step::Kill => return Exit::Kill,
                Step::Fatal => {
                    log::error!(
                        "processor halted! cycle = {} pc = {:08x} ir = {:08x} sp = {:08x} \
                         a = {} b = {} c = {} trap = {}",
                        self.cycles(),
                        self.pc(),
                        self.ir,
                        self.sp(),
                        self.a as i32,
                        self.b as i32,
                        self.c as i32,
                        self.trap,
                    );
                    return Exit::Fatal;
                }
            };
        }
    }

    /// Read-side translation of `v`: cache first, walker on miss.
    #[inline]
    pub(crate) fn tr_read(&mut self, v: u32) -> Option<u32> {
        let e = self.tlb.read_entry(self.user, v);
        if e != 0 {
            Some(e)
        } else {
            self.rlook(v)
        }
    }

    /// Write-side translation of `v`: cache first, walker on miss.
    #[inline]
    pub(crate) fn tr_write(&mut self, v: u32) -> Option<u32> {
        let e = self.tlb.write_entry(self.user, v);
        if e != 0 {
            Some(e)
        } else {
            self.wlook(v)
        }
    }

    /// Rebuild the code window for the current guest pc. Fetch-side misses
    /// fault as `FIPAGE` whatever the walker reported; `vadr` keeps the
    /// detail.
    fn fixpc(&mut self) -> Step {
        let v = self.xpc.wrapping_sub(self.tpc);
        let p = match self.tr_read(v) {
            Some(p) => p,
            None => {
                self.trap = FIPAGE;
                return Step::Trap;
            }
        };
        self.xcycle = self.xcycle.wrapping_sub(self.tpc);
        self.xpc = v ^ (p - 1);
        self.tpc = self.xpc.wrapping_sub(v);
        self.xcycle = self.xcycle.wrapping_add(self.tpc);
        self.fpc = self.xpc.wrapping_add(4096) & !4095;
        Step::Next
    }

    /// Rebuild the stack window. A pure cache probe: without a cached write
    /// mapping the window stays closed and accesses take the slow path.
    fn fixsp(&mut self) {
        let v = self.xsp.wrapping_sub(self.tsp);
        let p = self.tlb.write_entry(self.user, v);
        if p != 0 {
            self.xsp = v ^ (p - 1);
            self.tsp = self.xsp.wrapping_sub(v);
            self.fsp = (4096 - (self.xsp & 4095)) << 8;
        }
    }

    /// Cycle-boundary housekeeping: advance the counters, poll the keyboard,
    /// run the timer. Returns a step when an interrupt or the kill byte
    /// preempts the next fetch.
    fn tick(&mut self) -> Option<Step> {
        if self.xpc <= self.xcycle {
            return None;
        }
        self.cycle = self.cycle.wrapping_add(DELTA);
        self.xcycle = self.xcycle.wrapping_add(DELTA * 4);
        if self.iena || self.ipend & FKEYBD == 0 {
            if let Some(ch) = self.console.poll_keyboard() {
                self.kbchar = ch as i32;
                if self.kbchar == i32::from(b'`') {
                    log::error!("ungraceful exit. cycle = {}", self.cycles());
                    return Some(Step::Kill);
                }
                if self.iena {
                    self.trap = FKEYBD;
                    self.iena = false;
                    return Some(Step::Intr);
                }
                self.ipend |= FKEYBD;
            }
        }
        if self.timeout != 0 {
            self.timer = self.timer.wrapping_add(DELTA);
            if self.timer >= self.timeout {
                self.timer = 0;
                if self.iena {
                    self.trap = FTIMER;
                    self.iena = false;
                    return Some(Step::Intr);
                }
                self.ipend |= FTIMER;
            }
        }
        None
    }

    /// Branch displacement relative to the instruction after the branch.
    pub(crate) fn jump_rel(&mut self, i: i32) -> Step {
        self.xcycle = self.xcycle.wrapping_add((i >> 8) as u32);
        self.xpc = self.xpc.wrapping_add(((i >> 10) << 2) as u32);
        self.branch_step()
    }

    /// Branch to an absolute target already in `xpc` space.
    pub(crate) fn jump_to(&mut self, t: u32) -> Step {
        self.xcycle = self.xcycle.wrapping_add(t.wrapping_sub(self.xpc));
        self.xpc = t;
        self.branch_step()
    }

    #[inline]
    fn branch_step(&self) -> Step {
        // Targets inside the cached page keep the window; everything else
        // goes back through fixpc.
        if self.xpc.wrapping_sub(self.fpc) < (-4096i32 as u32) {
            Step::FixPc
        } else {
            Step::Next
        }
    }

    // Debugger services (see `crate::dbg`).

    pub(crate) fn debug_continue(&mut self) {
        self.dbg = false;
    }

    /// Next pc and the word at it, for single-step display.
    pub(crate) fn debug_next(&self) -> (u32, u32) {
        (self.pc(), self.mem.read_u32(self.xpc))
    }

    /// One byte through the current read quadrant, walking on miss.
    pub(crate) fn debug_peek(&mut self, v: u32) -> Option<u8> {
        let e = self.tlb.read_entry(self.user, v);
        let e = if e != 0 { e } else { self.rlook(v)? };
        Some(self.mem.read_u8(pa_b(v, e)))
    }

    pub(crate) fn debug_dump(&self) -> String {
        format!(
            "\nra:\t{:x}\nrb:\t{:x}\nrc:\t{:x}\nrd:\t{:08x}\t[cur sp]\nre:\t{:08x}\t[next pc]\n\
             ff:\t{}\nfg:\t{}\n\ntsp:\t{:08x}\t[top sp]\nuser:\t{:x}\t\t[user mode or not]\n\
             iena:\t{:x}\t\t[interrupt flag]\ntrap:\t{:x}\t\t[current trap]\n\
             vmem:\t{:x}\t\t[virtual memory enabled or not]\n\n\
             ipend:\t{:08x}\t[interrupted pending or not]\n\n",
            self.a,
            self.b,
            self.c,
            self.sp(),
            self.pc(),
            self.f,
            self.g,
            (if self.user { self.usp } else { self.ssp }).wrapping_sub(self.tsp),
            self.user as u32,
            self.iena as u32,
            self.trap,
            self.vmem as u32,
            self.ipend,
        )
    }
}
