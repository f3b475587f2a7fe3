//! Whole-machine scenarios: small guest programs assembled word by word and
//! run to completion on a scripted console.

use vem::cpu::ops::{encode, Op};
use vem::cpu::trap::{FARITH, FKEYBD, FPRIV, FSYS, FTIMER, FWPAGE, USER};
use vem::cpu::walk::PteBits;
use vem::dev::console::Console;
use vem::mem::Physical;
use vem::{Cpu, Exit};

const MEM: u32 = 1 << 20;
const SP: u32 = 0x80000;

const P: u32 = PteBits::Present.val();
const W: u32 = PteBits::Writable.val();

fn machine(prog: &[u32], input: &[u8]) -> Cpu {
    let mut mem = Physical::new(MEM);
    for (k, w) in prog.iter().enumerate() {
        mem.write_u32(k as u32 * 4, *w);
    }
    Cpu::new(mem, Console::scripted(input))
}

#[test]
fn console_byte_reaches_stdout_and_exit_code_is_a() {
    let prog = [
        encode(Op::LBI, 42),
        encode(Op::LI, 1),
        encode(Op::BOUT, 0),
        encode(Op::HALT, 0),
    ];
    let mut cpu = machine(&prog, b"");
    assert_eq!(cpu.run(0, SP), Exit::Halt(1));
    assert_eq!(cpu.console.output(), [42]);
}

#[test]
fn bout_to_any_other_descriptor_kills_the_machine() {
    let prog = [
        encode(Op::LBI, 42),
        encode(Op::LI, 2),
        encode(Op::BOUT, 0),
    ];
    let mut cpu = machine(&prog, b"");
    assert_eq!(cpu.run(0, SP), Exit::Fatal);
    assert_eq!(cpu.console.output(), b"");
}

#[test]
fn mcpy_copies_8k_across_pages_with_paging_off() {
    let prog = [
        encode(Op::LBI, 0x1000),
        encode(Op::LI, 8192),
        encode(Op::LCA, 0),
        encode(Op::LI, 0x4000),
        encode(Op::MCPY, 0),
        encode(Op::HALT, 0),
    ];
    let mut cpu = machine(&prog, b"");
    for i in 0..8192u32 {
        cpu.mem.write_u8(0x1000 + i, (i % 251) as u8);
    }
    assert_eq!(cpu.run(0, SP), Exit::Halt(0x6000));
    assert_eq!(cpu.b, 0x3000);
    assert_eq!(cpu.c, 0);
    for i in (0..8192u32).step_by(509) {
        assert_eq!(cpu.mem.read_u8(0x4000 + i), (i % 251) as u8);
    }
}

#[test]
fn mchr_finds_a_byte_and_stops() {
    let prog = [
        encode(Op::LBI, i32::from(b'w')),
        encode(Op::LI, 11),
        encode(Op::LCA, 0),
        encode(Op::LI, 0x1000),
        encode(Op::MCHR, 0),
        encode(Op::HALT, 0),
    ];
    let mut cpu = machine(&prog, b"");
    cpu.mem.write_bytes(0x1000, b"hello world");
    assert_eq!(cpu.run(0, SP), Exit::Halt(0x1006));
    assert_eq!(cpu.c, 0);
}

#[test]
fn mcmp_reports_equality() {
    let prog = [
        encode(Op::LBI, 0x2000),
        encode(Op::LI, 5),
        encode(Op::LCA, 0),
        encode(Op::LI, 0x1000),
        encode(Op::MCMP, 0),
        encode(Op::HALT, 0),
    ];
    let mut cpu = machine(&prog, b"");
    cpu.mem.write_bytes(0x1000, b"abcde");
    cpu.mem.write_bytes(0x2000, b"abcde");
    assert_eq!(cpu.run(0, SP), Exit::Halt(0));
    assert_eq!(cpu.c, 0);
}

/// Page tables at 0x10000/0x11000 with one leaf per `(vpn, ppn, flags)`
/// triple; all scenario addresses sit under the first directory entry.
fn page_tables(cpu: &mut Cpu, leaves: &[(u32, u32, u32)]) {
    const DIR: u32 = 0x10000;
    const TAB: u32 = 0x11000;
    cpu.mem.write_u32(DIR, TAB | P | W);
    for &(vpn, ppn, flags) in leaves {
        cpu.mem.write_u32(TAB + vpn * 4, (ppn << 12) | flags);
    }
}

#[test]
fn store_to_read_only_page_faults_fwpage_with_vadr() {
    let handler = 44;
    let prog = [
        encode(Op::LI, handler),
        encode(Op::IVEC, 0),
        encode(Op::LI, 0x10000),
        encode(Op::PDIR, 0),
        encode(Op::LI, 1),
        encode(Op::SPAG, 0),
        encode(Op::STI, 0),
        encode(Op::LBI, 0x100000),
        encode(Op::LI, 7),
        encode(Op::SX, 0),
        encode(Op::HALT, 0), // skipped: the store faults
        encode(Op::LI, 99),  // handler
        encode(Op::HALT, 0),
    ];
    let mut cpu = machine(&prog, b"");
    // Code, stack, and a read-only page at 0x100000 backed by 0x5000.
    page_tables(
        &mut cpu,
        &[(0, 0, P), (0x7F, 0x7F, P | W), (0x80, 0x80, P | W), (0x100, 5, P)],
    );
    assert_eq!(cpu.run(0, SP), Exit::Halt(99));
    assert_eq!(cpu.trap(), FWPAGE);
    assert_eq!(cpu.vadr(), 0x100000);
    assert_eq!(cpu.mem.read_u32(0x5000), 0);
}

#[test]
fn faulting_mcpy_leaves_restartable_progress() {
    let handler = 52;
    let prog = [
        encode(Op::LI, handler),
        encode(Op::IVEC, 0),
        encode(Op::LI, 0x10000),
        encode(Op::PDIR, 0),
        encode(Op::LI, 1),
        encode(Op::SPAG, 0),
        encode(Op::STI, 0),
        encode(Op::LBI, 0x1000),
        encode(Op::LI, 8192),
        encode(Op::LCA, 0),
        encode(Op::LI, 0x2000),
        encode(Op::MCPY, 0),
        encode(Op::HALT, 0), // skipped: second chunk faults
        encode(Op::HALT, 0), // handler
    ];
    let mut cpu = machine(&prog, b"");
    // Destination page 0x2000 is writable, 0x3000 is absent.
    page_tables(
        &mut cpu,
        &[(0, 0, P), (1, 1, P), (2, 2, P | W), (0x7F, 0x7F, P | W), (0x80, 0x80, P | W)],
    );
    for i in 0..4096u32 {
        cpu.mem.write_u8(0x1000 + i, (i % 199) as u8);
    }
    assert_eq!(cpu.run(0, SP), Exit::Halt(0x3000));
    // One page copied, registers describe the unprocessed tail.
    assert_eq!(cpu.a, 0x3000);
    assert_eq!(cpu.b, 0x2000);
    assert_eq!(cpu.c, 4096);
    assert_eq!(cpu.trap(), FWPAGE);
    assert_eq!(cpu.vadr(), 0x3000);
    for i in (0..4096u32).step_by(397) {
        assert_eq!(cpu.mem.read_u8(0x2000 + i), (i % 199) as u8);
    }
}

#[test]
fn typed_character_is_delivered_and_consumed_by_bin() {
    let prog = [
        encode(Op::LI, 24),
        encode(Op::IVEC, 0),
        encode(Op::STI, 0),
        encode(Op::JMP, -4), // spin until the keyboard interrupt
        encode(Op::HALT, 0),
        encode(Op::NOP, 0),
        encode(Op::BIN, 0), // handler
        encode(Op::HALT, 0),
    ];
    let mut cpu = machine(&prog, b"Z");
    assert_eq!(cpu.run(0, SP), Exit::Halt(u32::from(b'Z')));
    assert_eq!(cpu.trap(), FKEYBD);
}

#[test]
fn pending_interrupt_latches_while_masked_and_sti_tail_chains() {
    let prog = [
        encode(Op::LI, 48),
        encode(Op::IVEC, 0),
        encode(Op::LI, 3000),
        encode(Op::SUBI, 1),
        encode(Op::BNZ, -8), // count down with interrupts masked
        encode(Op::STI, 0),
        encode(Op::HALT, 0), // skipped: STI dispatches the pending key
        encode(Op::NOP, 0),
        encode(Op::NOP, 0),
        encode(Op::NOP, 0),
        encode(Op::NOP, 0),
        encode(Op::NOP, 0),
        encode(Op::BIN, 0), // handler
        encode(Op::HALT, 0),
    ];
    let mut cpu = machine(&prog, b"Q");
    assert_eq!(cpu.run(0, SP), Exit::Halt(u32::from(b'Q')));
    assert_eq!(cpu.trap(), FKEYBD);
}

#[test]
fn div_by_zero_traps_farith_and_leaves_a() {
    let prog = [
        encode(Op::LI, 40),
        encode(Op::IVEC, 0),
        encode(Op::STI, 0),
        encode(Op::LI, 5),
        encode(Op::LBI, 0),
        encode(Op::DIV, 0),
        encode(Op::HALT, 0), // skipped
        encode(Op::NOP, 0),
        encode(Op::NOP, 0),
        encode(Op::NOP, 0),
        encode(Op::HALT, 0), // handler: a still 5
    ];
    let mut cpu = machine(&prog, b"");
    assert_eq!(cpu.run(0, SP), Exit::Halt(5));
    assert_eq!(cpu.trap(), FARITH);
}

#[test]
fn user_ring_privileged_opcode_delivers_fpriv_with_user_bit() {
    let prog = [
        encode(Op::LI, 64),
        encode(Op::IVEC, 0),
        encode(Op::LI, 0x90000),
        encode(Op::SUSP, 0),
        encode(Op::PSHI, 40), // user pc
        encode(Op::PSHI, 16), // trap word carrying USER
        encode(Op::RTI, 0),
        encode(Op::NOP, 0),
        encode(Op::NOP, 0),
        encode(Op::NOP, 0),
        encode(Op::IVEC, 0), // user code at 40: privileged
        encode(Op::HALT, 0),
        encode(Op::NOP, 0),
        encode(Op::NOP, 0),
        encode(Op::NOP, 0),
        encode(Op::NOP, 0),
        encode(Op::POPA, 0), // handler: a = delivered trap word
        encode(Op::HALT, 0),
    ];
    let mut cpu = machine(&prog, b"");
    assert_eq!(cpu.run(0, SP), Exit::Halt(FPRIV | USER));
    assert_eq!(cpu.trap(), FPRIV | USER);
    assert!(!cpu.user());
}

#[test]
fn rti_resumes_after_a_software_trap() {
    let prog = [
        encode(Op::LI, 36),
        encode(Op::IVEC, 0),
        encode(Op::STI, 0),
        encode(Op::LI, 7),
        encode(Op::TRAP, 0),
        encode(Op::HALT, 0), // resumed here by RTI
        encode(Op::NOP, 0),
        encode(Op::NOP, 0),
        encode(Op::NOP, 0),
        encode(Op::RTI, 0), // handler
    ];
    let mut cpu = machine(&prog, b"");
    assert_eq!(cpu.run(0, SP), Exit::Halt(7));
    assert_eq!(cpu.trap(), FSYS);
    assert!(!cpu.user());
    assert_eq!(cpu.sp(), SP);
}

#[test]
fn push_pop_round_trips_across_a_page_boundary() {
    let prog = [
        encode(Op::LI, 0x2000),
        encode(Op::SSP, 0),
        encode(Op::LIF, 640), // f = 2.5
        encode(Op::PSHF, 0),
        encode(Op::POPG, 0),
        encode(Op::EQF, 0),
        encode(Op::BZ, 20), // to the failing HALT
        encode(Op::LI, 0x123456),
        encode(Op::PSHA, 0),
        encode(Op::LI, 0),
        encode(Op::POPA, 0),
        encode(Op::HALT, 0),
        encode(Op::HALT, 0), // failure: a = 0
    ];
    let mut cpu = machine(&prog, b"");
    assert_eq!(cpu.run(0, SP), Exit::Halt(0x123456));
    assert_eq!(cpu.g, 2.5);
    assert_eq!(cpu.sp(), 0x2000);
}

#[test]
fn call_frame_locals_and_lev_return() {
    let prog = [
        encode(Op::LI, 0x8000),
        encode(Op::SSP, 0),
        encode(Op::JSR, 8), // call 20
        encode(Op::HALT, 0),
        encode(Op::NOP, 0),
        encode(Op::ENT, -16), // callee
        encode(Op::LI, 55),
        encode(Op::SL, 0),
        encode(Op::LI, 0),
        encode(Op::LL, 0),
        encode(Op::LEV, 16),
    ];
    let mut cpu = machine(&prog, b"");
    assert_eq!(cpu.run(0, SP), Exit::Halt(55));
    assert_eq!(cpu.sp(), 0x8000);
}

#[test]
fn int_double_conversions_round_trip() {
    let prog = [
        encode(Op::LI, -5),
        encode(Op::CID, 0),
        encode(Op::LI, 0),
        encode(Op::CDI, 0),
        encode(Op::HALT, 0),
    ];
    let mut cpu = machine(&prog, b"");
    assert_eq!(cpu.run(0, SP), Exit::Halt(-5i32 as u32));
    assert_eq!(cpu.f, -5.0);
}

#[test]
fn lhi_widens_the_immediate() {
    let prog = [
        encode(Op::LI, 0x12),
        encode(Op::LHI, 0x345678),
        encode(Op::HALT, 0),
    ];
    let mut cpu = machine(&prog, b"");
    assert_eq!(cpu.run(0, SP), Exit::Halt(0x12345678));
}

#[test]
fn cli_returns_the_previous_enable_state() {
    let prog = [
        encode(Op::STI, 0),
        encode(Op::CLI, 0),
        encode(Op::HALT, 0),
    ];
    let mut cpu = machine(&prog, b"");
    assert_eq!(cpu.run(0, SP), Exit::Halt(1));
}

#[test]
fn idle_wakes_on_keyboard() {
    let prog = [
        encode(Op::LI, 24),
        encode(Op::IVEC, 0),
        encode(Op::STI, 0),
        encode(Op::IDLE, 0),
        encode(Op::HALT, 0), // skipped
        encode(Op::NOP, 0),
        encode(Op::BIN, 0), // handler
        encode(Op::HALT, 0),
    ];
    let mut cpu = machine(&prog, b"A");
    assert_eq!(cpu.run(0, SP), Exit::Halt(u32::from(b'A')));
    assert_eq!(cpu.trap(), FKEYBD);
}

#[test]
fn idle_wakes_on_timer() {
    let prog = [
        encode(Op::LI, 32),
        encode(Op::IVEC, 0),
        encode(Op::LI, 4096),
        encode(Op::TIME, 0),
        encode(Op::STI, 0),
        encode(Op::IDLE, 0),
        encode(Op::HALT, 0), // skipped
        encode(Op::NOP, 0),
        encode(Op::HALT, 0), // handler: a still 4096
    ];
    let mut cpu = machine(&prog, b"");
    assert_eq!(cpu.run(0, SP), Exit::Halt(4096));
    assert_eq!(cpu.trap(), FTIMER);
}

#[test]
fn timer_interrupt_fires_at_the_cycle_boundary() {
    let prog = [
        encode(Op::LI, 40),
        encode(Op::IVEC, 0),
        encode(Op::LI, 4096),
        encode(Op::TIME, 0),
        encode(Op::STI, 0),
        encode(Op::JMP, -4), // spin
        encode(Op::HALT, 0),
        encode(Op::NOP, 0),
        encode(Op::NOP, 0),
        encode(Op::NOP, 0),
        encode(Op::HALT, 0), // handler
    ];
    let mut cpu = machine(&prog, b"");
    assert_eq!(cpu.run(0, SP), Exit::Halt(4096));
    assert_eq!(cpu.trap(), FTIMER);
}

#[test]
fn backtick_kills_the_machine() {
    let prog = [
        encode(Op::STI, 0),
        encode(Op::JMP, -4),
    ];
    let mut cpu = machine(&prog, b"`");
    assert_eq!(cpu.run(0, SP), Exit::Kill);
}

#[test]
fn illegal_opcode_faults_finst_fatally_when_masked() {
    // No vector, interrupts disabled: the fault must not re-enter the guest.
    let prog = [0xFFu32];
    let mut cpu = machine(&prog, b"");
    assert_eq!(cpu.run(0, SP), Exit::Fatal);
}
