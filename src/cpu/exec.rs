//! Opcode dispatch.
//!
//! One handler per opcode, each returning the continuation [`Step`] the run
//! loop switches on. The repeated addressing shapes (stack-relative local,
//! pc-relative global, register-indexed, push/pop slots) are folded into
//! macros; the shapes themselves follow the fast/slow path split described
//! in the [`cpu`](super) module docs.
//!
//! [`Step`]: super::Step

use num_traits::FromPrimitive;

use super::ops::Op;
use super::trap::{FARITH, FINST, FKEYBD, FMEM, FPRIV, FSYS, FTIMER};
use super::{pa, pa_b, Cpu, Step, DELTA};

#[inline(always)]
fn at_h(v: u32, e: u32) -> u32 {
    pa(v, e, !1)
}

#[inline(always)]
fn at_w(v: u32, e: u32) -> u32 {
    pa(v, e, !3)
}

#[inline(always)]
fn at_d(v: u32, e: u32) -> u32 {
    pa(v, e, !7)
}

#[inline(always)]
fn at_b(v: u32, e: u32) -> u32 {
    pa_b(v, e)
}

/// Fault with `FPRIV` when executing in the user ring.
macro_rules! kernel_only {
    ($self:ident) => {
        if $self.user {
            $self.trap = FPRIV;
            return Step::Trap;
        }
    };
}

/// Stack-relative load: hit the cached window when the whole displacement
/// fits, otherwise translate and maybe re-open the window.
macro_rules! load_local {
    ($self:ident, $i:ident, $dst:ident, $rd:ident, $at:ident) => {{
        if ($i as u32) < $self.fsp {
            $self.$dst = $self.mem.$rd($self.xsp.wrapping_add(($i >> 8) as u32)) as _;
            Step::Cont
        } else {
            let v = $self.xsp.wrapping_sub($self.tsp).wrapping_add(($i >> 8) as u32);
            match $self.tr_read(v) {
                Some(p) => {
                    $self.$dst = $self.mem.$rd($at(v, p)) as _;
                    $self.stack_tail(v)
                }
                None => Step::Trap,
            }
        }
    }};
}

/// Load through the read translation of an arbitrary address.
macro_rules! load_at {
    ($self:ident, $v:expr, $dst:ident, $rd:ident, $at:ident) => {{
        let v = $v;
        match $self.tr_read(v) {
            Some(p) => {
                $self.$dst = $self.mem.$rd($at(v, p)) as _;
                Step::Cont
            }
            None => Step::Trap,
        }
    }};
}

/// Stack-relative store, symmetric to `load_local`.
macro_rules! store_local {
    ($self:ident, $i:ident, $src:expr, $wr:ident, $at:ident) => {{
        if ($i as u32) < $self.fsp {
            let x = $src;
            $self.mem.$wr($self.xsp.wrapping_add(($i >> 8) as u32), x);
            Step::Cont
        } else {
            let v = $self.xsp.wrapping_sub($self.tsp).wrapping_add(($i >> 8) as u32);
            match $self.tr_write(v) {
                Some(p) => {
                    let x = $src;
                    $self.mem.$wr($at(v, p), x);
                    $self.stack_tail(v)
                }
                None => Step::Trap,
            }
        }
    }};
}

/// Store through the write translation of an arbitrary address.
macro_rules! store_at {
    ($self:ident, $v:expr, $src:expr, $wr:ident, $at:ident) => {{
        let v = $v;
        match $self.tr_write(v) {
            Some(p) => {
                let x = $src;
                $self.mem.$wr($at(v, p), x);
                Step::Cont
            }
            None => Step::Trap,
        }
    }};
}

/// Arithmetic with a stack-relative word operand. `$f` consumes the operand
/// and reports `Cont`, or a fault of its own (division by zero).
macro_rules! arith_local {
    ($self:ident, $i:ident, $f:expr) => {{
        let f = $f;
        if ($i as u32) < $self.fsp {
            let x = $self.mem.read_u32($self.xsp.wrapping_add(($i >> 8) as u32));
            f(&mut *$self, x)
        } else {
            let v = $self.xsp.wrapping_sub($self.tsp).wrapping_add(($i >> 8) as u32);
            match $self.tr_read(v) {
                Some(p) => {
                    let x = $self.mem.read_u32(at_w(v, p));
                    match f(&mut *$self, x) {
                        Step::Cont => $self.stack_tail(v),
                        s => s,
                    }
                }
                None => Step::Trap,
            }
        }
    }};
}

/// Conditional branch on `$cond`, displacement relative to the next
/// instruction.
macro_rules! branch {
    ($self:ident, $i:ident, $cond:expr) => {{
        if $cond {
            $self.jump_rel($i)
        } else {
            Step::Cont
        }
    }};
}

/// Push one 8-byte slot. Inside the window the store is direct; crossing the
/// page bottom goes through the write translation and re-opens the window.
macro_rules! push {
    ($self:ident, $wr:ident, $val:expr) => {{
        if $self.fsp & (4095 << 8) != 0 {
            $self.xsp = $self.xsp.wrapping_sub(8);
            $self.fsp += 8 << 8;
            let x = $val;
            $self.mem.$wr($self.xsp, x);
            Step::Cont
        } else {
            let v = $self.xsp.wrapping_sub($self.tsp).wrapping_sub(8);
            match $self.tr_write(v) {
                Some(p) => {
                    let x = $val;
                    $self.mem.$wr(at_d(v, p), x);
                    $self.xsp = $self.xsp.wrapping_sub(8);
                    $self.fsp = 0;
                    Step::FixSp
                }
                None => Step::Trap,
            }
        }
    }};
}

/// Pop one 8-byte slot.
macro_rules! pop {
    ($self:ident, $dst:ident, $rd:ident) => {{
        if $self.fsp != 0 {
            $self.$dst = $self.mem.$rd($self.xsp) as _;
            $self.xsp = $self.xsp.wrapping_add(8);
            $self.fsp = $self.fsp.wrapping_sub(8 << 8);
            Step::Cont
        } else {
            let v = $self.xsp.wrapping_sub($self.tsp);
            match $self.tr_read(v) {
                Some(p) => {
                    $self.$dst = $self.mem.$rd(at_d(v, p)) as _;
                    $self.xsp = $self.xsp.wrapping_add(8);
                    Step::FixSp
                }
                None => Step::Trap,
            }
        }
    }};
}

impl Cpu {
    /// Fetch at `xpc`, consult the debugger, dispatch.
    pub(crate) fn exec(&mut self) -> Step {
        let i = self.mem.read_u32(self.xpc) as i32;
        self.ir = i;
        self.xpc = self.xpc.wrapping_add(4);
        if self.dbg {
            crate::dbg::prompt(self);
        }
        self.dispatch(i)
    }

    /// After a slow-path local access: re-open the stack window when the
    /// access just faulted-in the current stack page.
    #[inline]
    fn stack_tail(&mut self, v: u32) -> Step {
        if self.fsp != 0 || (v ^ self.xsp.wrapping_sub(self.tsp)) & !4095 != 0 {
            Step::Cont
        } else {
            Step::FixSp
        }
    }

    /// Address of a pc-relative (global) operand.
    #[inline]
    fn gaddr(&self, i: i32) -> u32 {
        self.xpc.wrapping_sub(self.tpc).wrapping_add((i >> 8) as u32)
    }

    /// Push the return address for a call. False on fault.
    fn push_link(&mut self) -> bool {
        let ret = self.xpc.wrapping_sub(self.tpc);
        if self.fsp & (4095 << 8) != 0 {
            self.xsp = self.xsp.wrapping_sub(8);
            self.fsp += 8 << 8;
            self.mem.write_u32(self.xsp, ret);
            true
        } else {
            let v = self.xsp.wrapping_sub(self.tsp).wrapping_sub(8);
            match self.tr_write(v) {
                Some(p) => {
                    self.mem.write_u32(at_d(v, p), ret);
                    self.fsp = 0;
                    self.xsp = self.xsp.wrapping_sub(8);
                    true
                }
                None => false,
            }
        }
    }

    fn dispatch(&mut self, i: i32) -> Step {
        let op = match Op::from_u8(i as u8) {
            Some(op) => op,
            None => {
                self.trap = FINST;
                return Step::Trap;
            }
        };
        match op {
            Op::HALT => {
                if self.user {
                    log::warn!("halt({}) cycle = {}", self.a as i32, self.cycles());
                } else {
                    log::debug!("halt({}) cycle = {}", self.a as i32, self.cycles());
                }
                Step::Halt
            }
            Op::IDLE => {
                kernel_only!(self);
                if !self.iena {
                    self.trap = FINST;
                    return Step::Trap;
                }
                loop {
                    if let Some(ch) = self.console.poll_keyboard() {
                        self.kbchar = ch as i32;
                        if self.kbchar == i32::from(b'`') {
                            log::error!("ungraceful exit. cycle = {}", self.cycles());
                            return Step::Kill;
                        }
                        self.trap = FKEYBD;
                        self.iena = false;
                        return Step::Intr;
                    }
                    self.cycle = self.cycle.wrapping_add(DELTA);
                    if self.timeout != 0 {
                        self.timer = self.timer.wrapping_add(DELTA);
                        if self.timer >= self.timeout {
                            self.timer = 0;
                            self.trap = FTIMER;
                            self.iena = false;
                            return Step::Intr;
                        }
                    }
                }
            }

            // Block memory, restartable: a/b/c track progress after every
            // per-page chunk so a faulting chunk resumes where it stopped.
            Op::MCPY => {
                while self.c != 0 {
                    let t = match self.tr_read(self.b) {
                        Some(t) => t,
                        None => return Step::Trap,
                    };
                    let p = match self.tr_write(self.a) {
                        Some(p) => p,
                        None => return Step::Trap,
                    };
                    let mut n = 4096 - (self.a & 4095);
                    if n > self.c {
                        n = self.c;
                    }
                    let m = 4096 - (self.b & 4095);
                    if m < n {
                        n = m;
                    }
                    self.mem.copy(at_b(self.a, p), at_b(self.b, t), n);
                    self.a = self.a.wrapping_add(n);
                    self.b = self.b.wrapping_add(n);
                    self.c -= n;
                }
                Step::Cont
            }
            Op::MCMP => {
                loop {
                    if self.c == 0 {
                        self.a = 0;
                        break;
                    }
                    let t = match self.tr_read(self.b) {
                        Some(t) => t,
                        None => return Step::Trap,
                    };
                    let p = match self.tr_read(self.a) {
                        Some(p) => p,
                        None => return Step::Trap,
                    };
                    let mut n = 4096 - (self.a & 4095);
                    if n > self.c {
                        n = self.c;
                    }
                    let m = 4096 - (self.b & 4095);
                    if m < n {
                        n = m;
                    }
                    let d = self.mem.compare(at_b(self.a, p), at_b(self.b, t), n);
                    if d != 0 {
                        self.a = d as u32;
                        self.b = self.b.wrapping_add(self.c);
                        self.c = 0;
                        break;
                    }
                    self.a = self.a.wrapping_add(n);
                    self.b = self.b.wrapping_add(n);
                    self.c -= n;
                }
                Step::Cont
            }
            Op::MCHR => {
                loop {
                    if self.c == 0 {
                        self.a = 0;
                        break;
                    }
                    let p = match self.tr_read(self.a) {
                        Some(p) => p,
                        None => return Step::Trap,
                    };
                    let mut n = 4096 - (self.a & 4095);
                    if n > self.c {
                        n = self.c;
                    }
                    if let Some(off) = self.mem.find(at_b(self.a, p), self.b as u8, n) {
                        self.a = self.a.wrapping_add(off);
                        self.c = 0;
                        break;
                    }
                    self.a = self.a.wrapping_add(n);
                    self.c -= n;
                }
                Step::Cont
            }
            Op::MSET => {
                while self.c != 0 {
                    let p = match self.tr_write(self.a) {
                        Some(p) => p,
                        None => return Step::Trap,
                    };
                    let mut n = 4096 - (self.a & 4095);
                    if n > self.c {
                        n = self.c;
                    }
                    self.mem.fill(at_b(self.a, p), self.b as u8, n);
                    self.a = self.a.wrapping_add(n);
                    self.c -= n;
                }
                Step::Cont
            }

            // math
            Op::POW => {
                self.f = self.f.powf(self.g);
                Step::Cont
            }
            Op::ATN2 => {
                self.f = self.f.atan2(self.g);
                Step::Cont
            }
            Op::FABS => {
                self.f = self.f.abs();
                Step::Cont
            }
            Op::ATAN => {
                self.f = self.f.atan();
                Step::Cont
            }
            Op::LOG => {
                if self.f != 0.0 {
                    self.f = self.f.ln();
                }
                Step::Cont
            }
            Op::LOGT => {
                if self.f != 0.0 {
                    self.f = self.f.log10();
                }
                Step::Cont
            }
            Op::EXP => {
                self.f = self.f.exp();
                Step::Cont
            }
            Op::FLOR => {
                self.f = self.f.floor();
                Step::Cont
            }
            Op::CEIL => {
                self.f = self.f.ceil();
                Step::Cont
            }
            Op::HYPO => {
                self.f = self.f.hypot(self.g);
                Step::Cont
            }
            Op::SIN => {
                self.f = self.f.sin();
                Step::Cont
            }
            Op::COS => {
                self.f = self.f.cos();
                Step::Cont
            }
            Op::TAN => {
                self.f = self.f.tan();
                Step::Cont
            }
            Op::ASIN => {
                self.f = self.f.asin();
                Step::Cont
            }
            Op::ACOS => {
                self.f = self.f.acos();
                Step::Cont
            }
            Op::SINH => {
                self.f = self.f.sinh();
                Step::Cont
            }
            Op::COSH => {
                self.f = self.f.cosh();
                Step::Cont
            }
            Op::TANH => {
                self.f = self.f.tanh();
                Step::Cont
            }
            Op::SQRT => {
                self.f = self.f.sqrt();
                Step::Cont
            }
            Op::FMOD => {
                self.f %= self.g;
                Step::Cont
            }

            Op::ENT => {
                if self.fsp != 0 {
                    self.fsp = self.fsp.wrapping_sub((i & -256) as u32);
                    if self.fsp > 4096 << 8 {
                        self.fsp = 0;
                    }
                }
                self.xsp = self.xsp.wrapping_add((i >> 8) as u32);
                if self.fsp != 0 {
                    Step::Cont
                } else {
                    Step::FixSp
                }
            }
            Op::LEV => {
                let t;
                if (i as u32) < self.fsp {
                    t = self
                        .mem
                        .read_u32(self.xsp.wrapping_add((i >> 8) as u32))
                        .wrapping_add(self.tpc);
                    self.fsp = self
                        .fsp
                        .wrapping_sub((i.wrapping_add(0x800) as u32) & !255);
                } else {
                    let v = self.xsp.wrapping_sub(self.tsp).wrapping_add((i >> 8) as u32);
                    let p = match self.tr_read(v) {
                        Some(p) => p,
                        None => return Step::Trap,
                    };
                    t = self.mem.read_u32(at_d(v, p)).wrapping_add(self.tpc);
                    self.fsp = 0;
                }
                self.xsp = self.xsp.wrapping_add(((i >> 8) as u32).wrapping_add(8));
                self.jump_to(t)
            }

            // jump
            Op::JMP => self.jump_rel(i),
            Op::JMPI => {
                let v = self
                    .xpc
                    .wrapping_sub(self.tpc)
                    .wrapping_add((i >> 8) as u32)
                    .wrapping_add(self.a.wrapping_shl(2));
                match self.tr_read(v) {
                    Some(p) => {
                        let t = self.mem.read_u32(at_w(v, p));
                        self.jump_to(self.xpc.wrapping_add(t))
                    }
                    None => Step::Trap,
                }
            }
            Op::JSR => {
                if self.push_link() {
                    self.jump_rel(i)
                } else {
                    Step::Trap
                }
            }
            Op::JSRA => {
                if self.push_link() {
                    self.jump_to(self.a.wrapping_add(self.tpc))
                } else {
                    Step::Trap
                }
            }

            // stack
            Op::PSHA => push!(self, write_u32, self.a),
            Op::PSHB => push!(self, write_u32, self.b),
            Op::PSHC => push!(self, write_u32, self.c),
            Op::PSHF => push!(self, write_f64, self.f),
            Op::PSHG => push!(self, write_f64, self.g),
            Op::PSHI => push!(self, write_u32, (i >> 8) as u32),
            Op::POPA => pop!(self, a, read_u32),
            Op::POPB => pop!(self, b, read_u32),
            Op::POPC => pop!(self, c, read_u32),
            Op::POPF => pop!(self, f, read_f64),
            Op::POPG => pop!(self, g, read_f64),

            // load effective address
            Op::LEA => {
                self.a = self.xsp.wrapping_sub(self.tsp).wrapping_add((i >> 8) as u32);
                Step::Cont
            }
            Op::LEAG => {
                self.a = self.gaddr(i);
                Step::Cont
            }

            // load a local
            Op::LL => load_local!(self, i, a, read_u32, at_w),
            Op::LLS => load_local!(self, i, a, read_i16, at_h),
            Op::LLH => load_local!(self, i, a, read_u16, at_h),
            Op::LLC => load_local!(self, i, a, read_i8, at_b),
            Op::LLB => load_local!(self, i, a, read_u8, at_b),
            Op::LLD => load_local!(self, i, f, read_f64, at_d),
            Op::LLF => load_local!(self, i, f, read_f32, at_w),

            // load a global
            Op::LG => load_at!(self, self.gaddr(i), a, read_u32, at_w),
            Op::LGS => load_at!(self, self.gaddr(i), a, read_i16, at_h),
            Op::LGH => load_at!(self, self.gaddr(i), a, read_u16, at_h),
            Op::LGC => load_at!(self, self.gaddr(i), a, read_i8, at_b),
            Op::LGB => load_at!(self, self.gaddr(i), a, read_u8, at_b),
            Op::LGD => load_at!(self, self.gaddr(i), f, read_f64, at_d),
            Op::LGF => load_at!(self, self.gaddr(i), f, read_f32, at_w),

            // load a indexed
            Op::LX => load_at!(self, self.a.wrapping_add((i >> 8) as u32), a, read_u32, at_w),
            Op::LXS => load_at!(self, self.a.wrapping_add((i >> 8) as u32), a, read_i16, at_h),
            Op::LXH => load_at!(self, self.a.wrapping_add((i >> 8) as u32), a, read_u16, at_h),
            Op::LXC => load_at!(self, self.a.wrapping_add((i >> 8) as u32), a, read_i8, at_b),
            Op::LXB => load_at!(self, self.a.wrapping_add((i >> 8) as u32), a, read_u8, at_b),
            Op::LXD => load_at!(self, self.a.wrapping_add((i >> 8) as u32), f, read_f64, at_d),
            Op::LXF => load_at!(self, self.a.wrapping_add((i >> 8) as u32), f, read_f32, at_w),

            // load a immediate
            Op::LI => {
                self.a = (i >> 8) as u32;
                Step::Cont
            }
            Op::LHI => {
                self.a = self.a.wrapping_shl(24) | (i as u32 >> 8);
                Step::Cont
            }
            Op::LIF => {
                self.f = (i >> 8) as f64 / 256.0;
                Step::Cont
            }

            // load b local
            Op::LBL => load_local!(self, i, b, read_u32, at_w),
            Op::LBLS => load_local!(self, i, b, read_i16, at_h),
            Op::LBLH => load_local!(self, i, b, read_u16, at_h),
            Op::LBLC => load_local!(self, i, b, read_i8, at_b),
            Op::LBLB => load_local!(self, i, b, read_u8, at_b),
            Op::LBLD => load_local!(self, i, g, read_f64, at_d),
            Op::LBLF => load_local!(self, i, g, read_f32, at_w),

            // load b global
            Op::LBG => load_at!(self, self.gaddr(i), b, read_u32, at_w),
            Op::LBGS => load_at!(self, self.gaddr(i), b, read_i16, at_h),
            Op::LBGH => load_at!(self, self.gaddr(i), b, read_u16, at_h),
            Op::LBGC => load_at!(self, self.gaddr(i), b, read_i8, at_b),
            Op::LBGB => load_at!(self, self.gaddr(i), b, read_u8, at_b),
            Op::LBGD => load_at!(self, self.gaddr(i), g, read_f64, at_d),
            Op::LBGF => load_at!(self, self.gaddr(i), g, read_f32, at_w),

            // load b indexed
            Op::LBX => load_at!(self, self.b.wrapping_add((i >> 8) as u32), b, read_u32, at_w),
            Op::LBXS => load_at!(self, self.b.wrapping_add((i >> 8) as u32), b, read_i16, at_h),
            Op::LBXH => load_at!(self, self.b.wrapping_add((i >> 8) as u32), b, read_u16, at_h),
            Op::LBXC => load_at!(self, self.b.wrapping_add((i >> 8) as u32), b, read_i8, at_b),
            Op::LBXB => load_at!(self, self.b.wrapping_add((i >> 8) as u32), b, read_u8, at_b),
            Op::LBXD => load_at!(self, self.b.wrapping_add((i >> 8) as u32), g, read_f64, at_d),
            Op::LBXF => load_at!(self, self.b.wrapping_add((i >> 8) as u32), g, read_f32, at_w),

            // load b immediate
            Op::LBI => {
                self.b = (i >> 8) as u32;
                Step::Cont
            }
            Op::LBHI => {
                self.b = self.b.wrapping_shl(24) | (i as u32 >> 8);
                Step::Cont
            }
            Op::LBIF => {
                self.g = (i >> 8) as f64 / 256.0;
                Step::Cont
            }

            // misc transfer
            Op::LCL => load_local!(self, i, c, read_u32, at_w),
            Op::LBA => {
                self.b = self.a;
                Step::Cont
            }
            Op::LCA => {
                self.c = self.a;
                Step::Cont
            }
            Op::LBAD => {
                self.g = self.f;
                Step::Cont
            }

            // store a local
            Op::SL => store_local!(self, i, self.a, write_u32, at_w),
            Op::SLH => store_local!(self, i, self.a as u16, write_u16, at_h),
            Op::SLB => store_local!(self, i, self.a as u8, write_u8, at_b),
            Op::SLD => store_local!(self, i, self.f, write_f64, at_d),
            Op::SLF => store_local!(self, i, self.f as f32, write_f32, at_w),

            // store a global
            Op::SG => store_at!(self, self.gaddr(i), self.a, write_u32, at_w),
            Op::SGH => store_at!(self, self.gaddr(i), self.a as u16, write_u16, at_h),
            Op::SGB => store_at!(self, self.gaddr(i), self.a as u8, write_u8, at_b),
            Op::SGD => store_at!(self, self.gaddr(i), self.f, write_f64, at_d),
            Op::SGF => store_at!(self, self.gaddr(i), self.f as f32, write_f32, at_w),

            // store a indexed
            Op::SX => store_at!(self, self.b.wrapping_add((i >> 8) as u32), self.a, write_u32, at_w),
            Op::SXH => {
                store_at!(self, self.b.wrapping_add((i >> 8) as u32), self.a as u16, write_u16, at_h)
            }
            Op::SXB => {
                store_at!(self, self.b.wrapping_add((i >> 8) as u32), self.a as u8, write_u8, at_b)
            }
            Op::SXD => store_at!(self, self.b.wrapping_add((i >> 8) as u32), self.f, write_f64, at_d),
            Op::SXF => {
                store_at!(self, self.b.wrapping_add((i >> 8) as u32), self.f as f32, write_f32, at_w)
            }

            // floating arithmetic
            Op::ADDF => {
                self.f += self.g;
                Step::Cont
            }
            Op::SUBF => {
                self.f -= self.g;
                Step::Cont
            }
            Op::MULF => {
                self.f *= self.g;
                Step::Cont
            }
            Op::DIVF => {
                if self.g == 0.0 {
                    self.trap = FARITH;
                    return Step::Trap;
                }
                self.f /= self.g;
                Step::Cont
            }

            // integer arithmetic
            Op::ADD => {
                self.a = self.a.wrapping_add(self.b);
                Step::Cont
            }
            Op::ADDI => {
                self.a = self.a.wrapping_add((i >> 8) as u32);
                Step::Cont
            }
            Op::ADDL => arith_local!(self, i, |cpu: &mut Cpu, x: u32| {
                cpu.a = cpu.a.wrapping_add(x);
                Step::Cont
            }),
            Op::SUB => {
                self.a = self.a.wrapping_sub(self.b);
                Step::Cont
            }
            Op::SUBI => {
                self.a = self.a.wrapping_sub((i >> 8) as u32);
                Step::Cont
            }
            Op::SUBL => arith_local!(self, i, |cpu: &mut Cpu, x: u32| {
                cpu.a = cpu.a.wrapping_sub(x);
                Step::Cont
            }),
            Op::MUL => {
                self.a = (self.a as i32).wrapping_mul(self.b as i32) as u32;
                Step::Cont
            }
            Op::MULI => {
                self.a = (self.a as i32).wrapping_mul(i >> 8) as u32;
                Step::Cont
            }
            Op::MULL => arith_local!(self, i, |cpu: &mut Cpu, x: u32| {
                cpu.a = (cpu.a as i32).wrapping_mul(x as i32) as u32;
                Step::Cont
            }),
            Op::DIV => {
                if self.b == 0 {
                    self.trap = FARITH;
                    return Step::Trap;
                }
                self.a = (self.a as i32).wrapping_div(self.b as i32) as u32;
                Step::Cont
            }
            Op::DIVI => {
                let t = i >> 8;
                if t == 0 {
                    self.trap = FARITH;
                    return Step::Trap;
                }
                self.a = (self.a as i32).wrapping_div(t) as u32;
                Step::Cont
            }
            Op::DIVL => arith_local!(self, i, |cpu: &mut Cpu, x: u32| {
                if x == 0 {
                    cpu.trap = FARITH;
                    return Step::Trap;
                }
                cpu.a = (cpu.a as i32).wrapping_div(x as i32) as u32;
                Step::Cont
            }),
            Op::DVU => {
                if self.b == 0 {
                    self.trap = FARITH;
                    return Step::Trap;
                }
                self.a /= self.b;
                Step::Cont
            }
            Op::DVUI => {
                let t = (i >> 8) as u32;
                if t == 0 {
                    self.trap = FARITH;
                    return Step::Trap;
                }
                self.a /= t;
                Step::Cont
            }
            Op::DVUL => arith_local!(self, i, |cpu: &mut Cpu, x: u32| {
                if x == 0 {
                    cpu.trap = FARITH;
                    return Step::Trap;
                }
                cpu.a /= x;
                Step::Cont
            }),
            Op::MOD => {
                if self.b == 0 {
                    self.trap = FARITH;
                    return Step::Trap;
                }
                self.a = (self.a as i32).wrapping_rem(self.b as i32) as u32;
                Step::Cont
            }
            Op::MODI => {
                let t = i >> 8;
                if t == 0 {
                    self.trap = FARITH;
                    return Step::Trap;
                }
                self.a = (self.a as i32).wrapping_rem(t) as u32;
                Step::Cont
            }
            Op::MODL => arith_local!(self, i, |cpu: &mut Cpu, x: u32| {
                if x == 0 {
                    cpu.trap = FARITH;
                    return Step::Trap;
                }
                cpu.a = (cpu.a as i32).wrapping_rem(x as i32) as u32;
                Step::Cont
            }),
            Op::MDU => {
                if self.b == 0 {
                    self.trap = FARITH;
                    return Step::Trap;
                }
                self.a %= self.b;
                Step::Cont
            }
            Op::MDUI => {
                let t = (i >> 8) as u32;
                if t == 0 {
                    self.trap = FARITH;
                    return Step::Trap;
                }
                self.a %= t;
                Step::Cont
            }
            Op::MDUL => arith_local!(self, i, |cpu: &mut Cpu, x: u32| {
                if x == 0 {
                    cpu.trap = FARITH;
                    return Step::Trap;
                }
                cpu.a %= x;
                Step::Cont
            }),
            Op::AND => {
                self.a &= self.b;
                Step::Cont
            }
            Op::ANDI => {
                self.a &= (i >> 8) as u32;
                Step::Cont
            }
            Op::ANDL => arith_local!(self, i, |cpu: &mut Cpu, x: u32| {
                cpu.a &= x;
                Step::Cont
            }),
            Op::OR => {
                self.a |= self.b;
                Step::Cont
            }
            Op::ORI => {
                self.a |= (i >> 8) as u32;
                Step::Cont
            }
            Op::ORL => arith_local!(self, i, |cpu: &mut Cpu, x: u32| {
                cpu.a |= x;
                Step::Cont
            }),
            Op::XOR => {
                self.a ^= self.b;
                Step::Cont
            }
            Op::XORI => {
                self.a ^= (i >> 8) as u32;
                Step::Cont
            }
            Op::XORL => arith_local!(self, i, |cpu: &mut Cpu, x: u32| {
                cpu.a ^= x;
                Step::Cont
            }),
            Op::SHL => {
                self.a = self.a.wrapping_shl(self.b);
                Step::Cont
            }
            Op::SHLI => {
                self.a = self.a.wrapping_shl((i >> 8) as u32);
                Step::Cont
            }
            Op::SHLL => arith_local!(self, i, |cpu: &mut Cpu, x: u32| {
                cpu.a = cpu.a.wrapping_shl(x);
                Step::Cont
            }),
            Op::SHR => {
                self.a = (self.a as i32).wrapping_shr(self.b) as u32;
                Step::Cont
            }
            Op::SHRI => {
                self.a = (self.a as i32).wrapping_shr((i >> 8) as u32) as u32;
                Step::Cont
            }
            Op::SHRL => arith_local!(self, i, |cpu: &mut Cpu, x: u32| {
                cpu.a = (cpu.a as i32).wrapping_shr(x) as u32;
                Step::Cont
            }),
            Op::SRU => {
                self.a = self.a.wrapping_shr(self.b);
                Step::Cont
            }
            Op::SRUI => {
                self.a = self.a.wrapping_shr((i >> 8) as u32);
                Step::Cont
            }
            Op::SRUL => arith_local!(self, i, |cpu: &mut Cpu, x: u32| {
                cpu.a = cpu.a.wrapping_shr(x);
                Step::Cont
            }),

            // logical
            Op::EQ => {
                self.a = (self.a == self.b) as u32;
                Step::Cont
            }
            Op::EQF => {
                self.a = (self.f == self.g) as u32;
                Step::Cont
            }
            Op::NE => {
                self.a = (self.a != self.b) as u32;
                Step::Cont
            }
            Op::NEF => {
                self.a = (self.f != self.g) as u32;
                Step::Cont
            }
            Op::LT => {
                self.a = ((self.a as i32) < self.b as i32) as u32;
                Step::Cont
            }
            Op::LTU => {
                self.a = (self.a < self.b) as u32;
                Step::Cont
            }
            Op::LTF => {
                self.a = (self.f < self.g) as u32;
                Step::Cont
            }
            Op::GE => {
                self.a = (self.a as i32 >= self.b as i32) as u32;
                Step::Cont
            }
            Op::GEU => {
                self.a = (self.a >= self.b) as u32;
                Step::Cont
            }
            Op::GEF => {
                self.a = (self.f >= self.g) as u32;
                Step::Cont
            }

            // branch
            Op::BZ => branch!(self, i, self.a == 0),
            Op::BZF => branch!(self, i, self.f == 0.0),
            Op::BNZ => branch!(self, i, self.a != 0),
            Op::BNZF => branch!(self, i, self.f != 0.0),
            Op::BE => branch!(self, i, self.a == self.b),
            Op::BEF => branch!(self, i, self.f == self.g),
            Op::BNE => branch!(self, i, self.a != self.b),
            Op::BNEF => branch!(self, i, self.f != self.g),
            Op::BLT => branch!(self, i, (self.a as i32) < self.b as i32),
            Op::BLTU => branch!(self, i, self.a < self.b),
            Op::BLTF => branch!(self, i, self.f < self.g),
            Op::BGE => branch!(self, i, self.a as i32 >= self.b as i32),
            Op::BGEU => branch!(self, i, self.a >= self.b),
            Op::BGEF => branch!(self, i, self.f >= self.g),

            // conversion
            Op::CID => {
                self.f = self.a as i32 as f64;
                Step::Cont
            }
            Op::CUD => {
                self.f = self.a as f64;
                Step::Cont
            }
            Op::CDI => {
                self.a = self.f as i32 as u32;
                Step::Cont
            }
            Op::CDU => {
                self.a = self.f as u32;
                Step::Cont
            }

            // misc
            Op::BIN => {
                kernel_only!(self);
                self.a = self.kbchar as u32;
                self.kbchar = -1;
                Step::Cont
            }
            Op::BOUT => {
                kernel_only!(self);
                if self.a != 1 {
                    log::error!("bad write a={}", self.a as i32);
                    return Step::Fatal;
                }
                self.a = self.console.write_byte(self.b as u8) as u32;
                Step::Cont
            }
            Op::SSP => {
                self.xsp = self.a;
                self.tsp = 0;
                self.fsp = 0;
                Step::FixSp
            }
            Op::NOP => Step::Cont,
            Op::CYC => {
                self.a = self.cycles();
                Step::Cont
            }
            Op::MSIZ => {
                kernel_only!(self);
                self.a = self.mem.size();
                Step::Cont
            }

            // interrupt control
            Op::CLI => {
                kernel_only!(self);
                self.a = self.iena as u32;
                self.iena = false;
                Step::Cont
            }
            Op::STI => {
                kernel_only!(self);
                if self.ipend != 0 {
                    self.trap = self.ipend & self.ipend.wrapping_neg();
                    self.ipend ^= self.trap;
                    self.iena = false;
                    return Step::Intr;
                }
                self.iena = true;
                Step::Cont
            }
            Op::RTI => {
                kernel_only!(self);
                self.rti()
            }
            Op::IVEC => {
                kernel_only!(self);
                self.ivec = self.a;
                Step::Cont
            }

            // paging control
            Op::PDIR => {
                kernel_only!(self);
                if self.a > self.mem.size() {
                    self.trap = FMEM;
                    return Step::Trap;
                }
                self.pdir = self.a & !4095;
                self.pdir_set = true;
                self.tlb.flush();
                self.fsp = 0;
                Step::FixPc
            }
            Op::SPAG => {
                kernel_only!(self);
                if self.a != 0 && !self.pdir_set {
                    self.trap = FMEM;
                    return Step::Trap;
                }
                self.vmem = self.a != 0;
                self.tlb.flush();
                self.fsp = 0;
                Step::FixPc
            }

            Op::TIME => {
                kernel_only!(self);
                if i >> 8 != 0 {
                    log::debug!("timer{}={} timeout={}", i >> 8, self.timer, self.timeout);
                } else {
                    self.timeout = self.a;
                }
                Step::Cont
            }
            Op::LVAD => {
                kernel_only!(self);
                self.a = self.vadr;
                Step::Cont
            }
            Op::TRAP => {
                self.trap = FSYS;
                Step::Trap
            }
            Op::LUSP => {
                kernel_only!(self);
                self.a = self.usp;
                Step::Cont
            }
            Op::SUSP => {
                kernel_only!(self);
                self.usp = self.a;
                Step::Cont
            }
        }
    }
}
