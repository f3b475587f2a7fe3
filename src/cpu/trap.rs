//! Trap and interrupt delivery.
//!
//! Processor fault codes double as data: the value latched in `trap` is
//! pushed to the guest's kernel stack, and the two asynchronous codes are
//! also the bit positions used in the pending-interrupt set `ipend`.
//! `USER` is OR'ed into the delivered code when the fault originated in the
//! user ring; `RTI` inspects it to restore the ring.
//!
//! Delivery pushes a two-slot frame (pc, then trap code) onto the kernel
//! stack, switching stacks and page-table quadrants first when coming from
//! user ring, and vectors through `ivec`. A fault taken while `iena` is
//! clear is fatal: nested faults never re-enter the guest. Kernel-stack
//! faults during delivery or return are equally fatal.

use super::{pa, Cpu, Step};

/// Bad physical address.
pub const FMEM: u32 = 0;
/// Timer interrupt.
pub const FTIMER: u32 = 1;
/// Keyboard interrupt.
pub const FKEYBD: u32 = 2;
/// Privileged instruction in user ring.
pub const FPRIV: u32 = 3;
/// Illegal instruction.
pub const FINST: u32 = 4;
/// Software trap.
pub const FSYS: u32 = 5;
/// Arithmetic trap.
pub const FARITH: u32 = 6;
/// Page fault on instruction fetch.
pub const FIPAGE: u32 = 7;
/// Page fault on write.
pub const FWPAGE: u32 = 8;
/// Page fault on read.
pub const FRPAGE: u32 = 9;
/// User-ring origin marker OR'ed into delivered trap codes.
pub const USER: u32 = 16;

impl Cpu {
    /// Deliver the latched `trap` through the interrupt vector. The nested
    /// fault check has already run (synchronous faults) or does not apply
    /// (asynchronous dispatch with `iena` cleared by the poller).
    pub(crate) fn deliver(&mut self) -> Step {
        self.xsp = self.xsp.wrapping_sub(self.tsp);
        self.tsp = 0;
        self.fsp = 0;
        if self.user {
            self.usp = self.xsp;
            self.xsp = self.ssp;
            self.user = false;
            self.trap |= USER;
        }
        self.xsp = self.xsp.wrapping_sub(8);
        let p = match self.tr_write(self.xsp) {
            Some(p) => p,
            None => {
                log::error!("kernel stack fault");
                return Step::Fatal;
            }
        };
        self.mem.write_u32(pa(self.xsp, p, !7), self.xpc.wrapping_sub(self.tpc));
        self.xsp = self.xsp.wrapping_sub(8);
        let p = match self.tr_write(self.xsp) {
            Some(p) => p,
            None => {
                log::error!("kernel stack fault");
                return Step::Fatal;
            }
        };
        self.mem.write_u32(pa(self.xsp, p, !7), self.trap);
        self.xcycle = self
            .xcycle
            .wrapping_add(self.ivec.wrapping_add(self.tpc).wrapping_sub(self.xpc));
        self.xpc = self.ivec.wrapping_add(self.tpc);
        Step::FixPc
    }

    /// Return from interrupt: pop the trap code and pc, restore the origin
    /// ring, and either re-enable interrupts or tail-chain the lowest
    /// pending one.
    pub(crate) fn rti(&mut self) -> Step {
        self.xsp = self.xsp.wrapping_sub(self.tsp);
        self.tsp = 0;
        self.fsp = 0;
        let p = match self.tr_read(self.xsp) {
            Some(p) => p,
            None => {
                log::error!("RTI kernel stack fault");
                return Step::Fatal;
            }
        };
        let t = self.mem.read_u32(pa(self.xsp, p, !7));
        self.xsp = self.xsp.wrapping_add(8);
        let p = match self.tr_read(self.xsp) {
            Some(p) => p,
            None => {
                log::error!("RTI kernel stack fault");
                return Step::Fatal;
            }
        };
        let pc = self.mem.read_u32(pa(self.xsp, p, !7)).wrapping_add(self.tpc);
        self.xcycle = self.xcycle.wrapping_add(pc.wrapping_sub(self.xpc));
        self.xsp = self.xsp.wrapping_add(8);
        self.xpc = pc;
        if t & USER != 0 {
            self.ssp = self.xsp;
            self.xsp = self.usp;
            self.user = true;
        }
        if !self.iena {
            if self.ipend != 0 {
                self.trap = self.ipend & self.ipend.wrapping_neg();
                self.ipend ^= self.trap;
                return Step::Intr;
            }
            self.iena = true;
        }
        // The code page may have been invalidated across the switch.
        Step::FixPc
    }
}
