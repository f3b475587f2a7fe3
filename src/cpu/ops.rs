//! The opcode table.
//!
//! An instruction is one little-endian 32-bit word; the low byte selects the
//! opcode and the upper 24 bits carry a signed immediate. Memory and branch
//! displacements are byte offsets obtained with `word >> 8` (arithmetic
//! shift).
//!
//! Mnemonic conventions, mirroring the toolchain this machine runs:
//!
//! * loads of A are `L..`, loads of B are `LB..` (float forms target F/G);
//! * the width suffix is `S` signed short, `H` unsigned short, `C` signed
//!   byte, `B` unsigned byte, `D` double, `F` float, none for a 32-bit word;
//! * the addressing suffix is `L` stack-relative local, `G` pc-relative
//!   global, `X` register-indexed, `I`/`HI`/`IF` immediate;
//! * integer arithmetic comes in register (`ADD`), immediate (`ADDI`) and
//!   local-operand (`ADDL`) forms.

use num_derive::FromPrimitive;


/// One byte opcode. Discriminants are the wire encoding; gaps are illegal
/// instructions and fault with `FINST`.
#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, FromPrimitive)]
pub enum Op {
    HALT, ENT, LEV, JMP, JMPI, JSR, JSRA, LEA, LEAG, CYC, MCPY, MCMP, MCHR, MSET,
    // load a
    LL, LLS, LLH, LLC, LLB, LLD, LLF,
    LG, LGS, LGH, LGC, LGB, LGD, LGF,
    LX, LXS, LXH, LXC, LXB, LXD, LXF,
    LI, LHI, LIF,
    // load b
    LBL, LBLS, LBLH, LBLC, LBLB, LBLD, LBLF,
    LBG, LBGS, LBGH, LBGC, LBGB, LBGD, LBGF,
    LBX, LBXS, LBXH, LBXC, LBXB, LBXD, LBXF,
    LBI, LBHI, LBIF,
    // misc transfer
    LCL, LBA, LCA, LBAD,
    // store a
    SL, SLH, SLB, SLD, SLF,
    SG, SGH, SGB, SGD, SGF,
    SX, SXH, SXB, SXD, SXF,
    // arithmetic
    ADDF, SUBF, MULF, DIVF,
    ADD, ADDI, ADDL, SUB, SUBI, SUBL, MUL, MULI, MULL,
    DIV, DIVI, DIVL, DVU, DVUI, DVUL, MOD, MODI, MODL, MDU, MDUI, MDUL,
    AND, ANDI, ANDL, OR, ORI, ORL, XOR, XORI, XORL,
    SHL, SHLI, SHLL, SHR, SHRI, SHRL, SRU, SRUI, SRUL,
    // logical
    EQ, EQF, NE, NEF, LT, LTU, LTF, GE, GEU, GEF,
    // conditional branches
    BZ, BZF, BNZ, BNZF, BE, BEF, BNE, BNEF,
    BLT, BLTU, BLTF, BGE, BGEU, BGEF,
    // conversion
    CID, CUD, CDI, CDU,
    // stack
    PSHA, PSHB, PSHC, PSHF, PSHG, PSHI,
    POPA, POPB, POPC, POPF, POPG,
    // privileged and housekeeping
    CLI, STI, RTI, BIN, BOUT, NOP, SSP, IVEC, PDIR, SPAG, TIME, LVAD, TRAP, LUSP, SUSP,
    IDLE,
    // floating-point math
    POW, ATN2, FABS, ATAN, LOG, LOGT, EXP, FLOR, CEIL, HYPO,
    SIN, COS, TAN, ASIN, ACOS, SINH, COSH, TANH, SQRT, FMOD,
    MSIZ,
}

/// Assemble one instruction word from an opcode and a 24-bit signed
/// immediate (byte values for displacement operands).
#[inline]
pub const fn encode(op: Op, imm: i32) -> u32 {
    ((imm << 8) as u32) | op as u32
}


#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn decode_is_the_inverse_of_encode() {
        for op in [Op::HALT, Op::MCPY, Op::LL, Op::LBIF, Op::SXF, Op::SRUL, Op::BGEF, Op::SUSP, Op::IDLE, Op::MSIZ] {
            let w = encode(op, -12);
            assert_eq!(Op::from_u8(w as u8), Some(op));
            assert_eq!((w as i32) >> 8, -12);
        }
    }

    #[test]
    fn table_is_dense_up_to_msiz() {
        for b in 0..=Op::MSIZ as u8 {
            assert!(Op::from_u8(b).is_some(), "gap at opcode {b}");
        }
        assert_eq!(Op::from_u8(Op::MSIZ as u8 + 1), None);
    }

    #[test]
    fn immediate_is_arithmetic_shift() {
        let w = encode(Op::JMP, -4096);
        assert_eq!((w as i32) >> 8, -4096);
        assert_eq!(w as u8, Op::JMP as u8);
    }
}
