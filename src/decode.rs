//! Instruction decoding
//!
//! This file is where one or two 16-bit opcode words are converted
//! into the [`Instruction`] record that holds the operation and its
//! operand fields in an easily accessible format ready for execution.
//!
//! AVR opcodes have overlapping bit patterns, so recognition is a
//! cascade of masked comparisons ordered from most specific to least
//! specific: exact constants (NOP, RET, IJMP, ...) are tested before
//! any masked group that would also match them, SER before the LDI
//! pattern it is a special case of, the condition-specific branches
//! before generic BRBC/BRBS, and the two-word LDS/STS before the
//! indirect load/store patterns they overlap.
//!
//! Decoding is pure: it never touches machine state. An opcode the
//! device does not implement decodes as NOP and raises a warning
//! through the logging facade.

use log::warn;

use crate::instr::{BasePointer, Instruction, Operation, PointerOp};
use crate::utils::{extract_field, sign_extend};

/// Number of words (1 or 2) the opcode starting with this word
/// occupies. Only CALL, JMP, LDS and STS consume a second word, and
/// all four are recognisable from the first word alone.
pub fn opcode_length(word: u16) -> u8 {
    let call_or_jmp = word & 0xfe0c == 0x940c;
    let lds = word & 0xfe0f == 0x9000;
    let sts = word & 0xfe0f == 0x9200;
    if call_or_jmp || lds || sts {
        2
    } else {
        1
    }
}

/// Operands of the `---- --rd dddd rrrr` group (ADC, ADD, AND, CP,
/// CPC, CPSE, EOR, MOV, MUL, OR, SBC, SUB)
fn regreg_operands(word: u16) -> (u8, u8) {
    let rd = extract_field(word, 8, 4) as u8;
    let rr = (extract_field(word, 3, 0) | (extract_field(word, 9, 9) << 4)) as u8;
    (rd, rr)
}

/// Operands of the `---- KKKK dddd KKKK` group (ANDI, CPI, LDI, ORI,
/// SBCI, SUBI). The register field addresses R16..R31 only.
fn regimm_operands(word: u16) -> (u8, u8) {
    let rd = 16 + extract_field(word, 7, 4) as u8;
    let k = ((extract_field(word, 11, 8) << 4) | extract_field(word, 3, 0)) as u8;
    (rd, k)
}

/// Operands of ADIW/SBIW `---- ---- KKdd KKKK`: one of the four upper
/// register pairs (R24, R26, R28, R30) and a 6-bit constant
fn pair_imm_operands(word: u16) -> (u8, u8) {
    let rd = 24 + 2 * extract_field(word, 5, 4) as u8;
    let k = ((extract_field(word, 7, 6) << 4) | extract_field(word, 3, 0)) as u8;
    (rd, k)
}

/// Operands of the `---- ---d dddd -bbb` group (SBRC, SBRS, BLD, BST)
fn reg_bit_operands(word: u16) -> (u8, u8) {
    let rd = extract_field(word, 8, 4) as u8;
    let b = extract_field(word, 2, 0) as u8;
    (rd, b)
}

/// Operands of the `---- ---- AAAA Abbb` group (CBI, SBI, SBIC, SBIS)
fn io_bit_operands(word: u16) -> (u8, u8) {
    let a = extract_field(word, 7, 3) as u8;
    let b = extract_field(word, 2, 0) as u8;
    (a, b)
}

/// Single register operand of the `---- ---d dddd ----` group (ASR,
/// COM, DEC, INC, LSR, NEG, POP, PUSH, ROR, SWAP)
fn single_reg_operand(word: u16) -> u8 {
    extract_field(word, 8, 4) as u8
}

/// SREG bit index of BSET/BCLR (bits 6..4)
fn status_bit_operand(word: u16) -> u8 {
    extract_field(word, 6, 4) as u8
}

/// Signed 7-bit branch offset, in words, of the BRBS/BRBC family
fn branch_offset(word: u16) -> i32 {
    sign_extend(extract_field(word, 9, 3), 6)
}

/// 6-bit I/O address of IN and OUT
fn io_addr_operand(word: u16) -> u8 {
    (extract_field(word, 3, 0) | (extract_field(word, 10, 9) << 4)) as u8
}

/// 22-bit word address of the two-word CALL and JMP
fn call_address(words: &[u16; 2]) -> i32 {
    let high = (extract_field(words[0], 8, 4) << 1) | extract_field(words[0], 0, 0);
    ((u32::from(high) << 16) | u32::from(words[1])) as i32
}

/// 6-bit displacement of LDD/STD, scattered over bits 13, 11..10
/// and 2..0
fn displacement_operand(word: u16) -> u8 {
    (extract_field(word, 2, 0) | (extract_field(word, 11, 10) << 3) | (extract_field(word, 13, 13) << 5))
        as u8
}

/// Base pointer and pointer update of the single-register indirect
/// LD/ST encodings. Returns None for the reserved combinations.
fn base_pointer_operands(word: u16) -> Option<(BasePointer, PointerOp)> {
    let bp = match word & 0xc {
        0x0 => BasePointer::Z,
        0x8 => BasePointer::Y,
        0xc => BasePointer::X,
        _ => return None,
    };
    let bp_op = match word & 0x3 {
        0x0 => PointerOp::None,
        0x1 => PointerOp::PostInc,
        0x2 => PointerOp::PreDec,
        _ => return None,
    };
    Some((bp, bp_op))
}

fn unknown(word: u16) -> Instruction {
    warn!("unimplemented opcode {word:#06x}, interpreting as nop");
    Instruction::of(Operation::Nop)
}

/// Opcodes encoded as exact 16-bit constants
const FIXED: [(u16, Operation); 13] = [
    (0x0000, Operation::Nop),
    (0x9508, Operation::Ret),
    (0x9518, Operation::Reti),
    (0x9409, Operation::Ijmp),
    (0x9509, Operation::Icall),
    (0x9419, Operation::Eijmp),
    (0x9519, Operation::Eicall),
    (0x95c8, Operation::LpmR0),
    (0x95d8, Operation::ElpmR0),
    (0x9588, Operation::Sleep),
    (0x9598, Operation::Break),
    (0x95a8, Operation::Wdr),
    (0x95e8, Operation::Spm),
];

/// The `---- --rd dddd rrrr` register-register group
const REGREG: [(u16, Operation); 12] = [
    (0x1c00, Operation::Adc),
    (0x0c00, Operation::Add),
    (0x2000, Operation::And),
    (0x1400, Operation::Cp),
    (0x0400, Operation::Cpc),
    (0x1000, Operation::Cpse),
    (0x2400, Operation::Eor),
    (0x2c00, Operation::Mov),
    (0x9c00, Operation::Mul),
    (0x2800, Operation::Or),
    (0x0800, Operation::Sbc),
    (0x1800, Operation::Sub),
];

/// The `---- KKKK dddd KKKK` register-immediate group. ORI doubles as
/// SBR: the two mnemonics share one encoding.
const REGIMM: [(u16, Operation); 6] = [
    (0x7000, Operation::Andi),
    (0xe000, Operation::Ldi),
    (0x6000, Operation::Ori),
    (0x3000, Operation::Cpi),
    (0x4000, Operation::Sbci),
    (0x5000, Operation::Subi),
];

/// Condition-specific branches under mask 0xfc07. BRLO and BRSH share
/// the BRCS and BRCC encodings, so only the latter pair appears here.
const COND_BRANCH: [(u16, Operation); 16] = [
    (0xf400, Operation::Brcc),
    (0xf000, Operation::Brcs),
    (0xf001, Operation::Breq),
    (0xf404, Operation::Brge),
    (0xf405, Operation::Brhc),
    (0xf005, Operation::Brhs),
    (0xf407, Operation::Brid),
    (0xf007, Operation::Brie),
    (0xf004, Operation::Brlt),
    (0xf002, Operation::Brmi),
    (0xf401, Operation::Brne),
    (0xf402, Operation::Brpl),
    (0xf406, Operation::Brtc),
    (0xf006, Operation::Brts),
    (0xf403, Operation::Brvc),
    (0xf003, Operation::Brvs),
];

/// Single-register operations under mask 0xfe0f
const ONEREG: [(u16, Operation); 10] = [
    (0x9405, Operation::Asr),
    (0x9400, Operation::Com),
    (0x940a, Operation::Dec),
    (0x9403, Operation::Inc),
    (0x9406, Operation::Lsr),
    (0x9401, Operation::Neg),
    (0x900f, Operation::Pop),
    (0x920f, Operation::Push),
    (0x9407, Operation::Ror),
    (0x9402, Operation::Swap),
];

/// Bit tests and transfers under mask 0xfe08
const REGBIT: [(u16, Operation); 4] = [
    (0xfc00, Operation::Sbrc),
    (0xfe00, Operation::Sbrs),
    (0xf800, Operation::Bld),
    (0xfa00, Operation::Bst),
];

/// I/O bit operations under mask 0xff00
const IOBIT: [(u16, Operation); 4] = [
    (0x9800, Operation::Cbi),
    (0x9a00, Operation::Sbi),
    (0x9900, Operation::Sbic),
    (0x9b00, Operation::Sbis),
];

/// Decode one instruction from its opcode word(s)
///
/// `words[1]` is examined only when [`opcode_length`] of `words[0]`
/// is 2. Never fails: an unrecognised word decodes as NOP with a
/// warning.
pub fn decode(words: &[u16; 2]) -> Instruction {
    let word = words[0];

    for (pattern, op) in FIXED {
        if word == pattern {
            return Instruction::of(op);
        }
    }

    if word & 0xff8f == 0x9488 {
        let mut inst = Instruction::of(Operation::Bclr);
        inst.s = status_bit_operand(word);
        return inst;
    }
    if word & 0xff8f == 0x9408 {
        let mut inst = Instruction::of(Operation::Bset);
        inst.s = status_bit_operand(word);
        return inst;
    }

    // LPM/ELPM through Z, with optional post-increment. The plain-Z
    // forms writing R0 are exact constants handled above.
    if word & 0xfe0e == 0x9004 || word & 0xfe0e == 0x9006 {
        let mut inst = Instruction::of(if word & 0x2 == 0 {
            Operation::Lpm
        } else {
            Operation::Elpm
        });
        inst.rd = single_reg_operand(word);
        inst.bp = BasePointer::Z;
        inst.bp_op = if word & 0x1 != 0 {
            PointerOp::PostInc
        } else {
            PointerOp::None
        };
        return inst;
    }

    for (pattern, op) in REGREG {
        if word & 0xfc00 == pattern {
            let (rd, rr) = regreg_operands(word);
            return Instruction {
                op,
                rd,
                rr,
                ..Default::default()
            };
        }
    }

    // SER is LDI with K = 0xff; recognise it ahead of the generic
    // LDI pattern.
    if word & 0xff0f == 0xef0f {
        let (rd, k) = regimm_operands(word);
        return Instruction {
            op: Operation::Ser,
            rd,
            k,
            ..Default::default()
        };
    }

    for (pattern, op) in REGIMM {
        if word & 0xf000 == pattern {
            let (rd, k) = regimm_operands(word);
            return Instruction {
                op,
                rd,
                k,
                ..Default::default()
            };
        }
    }

    for (pattern, op) in REGBIT {
        if word & 0xfe08 == pattern {
            let (rd, b) = reg_bit_operands(word);
            return Instruction {
                op,
                rd,
                b,
                ..Default::default()
            };
        }
    }

    if word & 0xf800 == 0xb000 {
        let mut inst = Instruction::of(Operation::In);
        inst.rd = single_reg_operand(word);
        inst.a = io_addr_operand(word);
        return inst;
    }
    if word & 0xf800 == 0xb800 {
        let mut inst = Instruction::of(Operation::Out);
        inst.rr = single_reg_operand(word);
        inst.a = io_addr_operand(word);
        return inst;
    }

    if word & 0xff00 == 0x9600 || word & 0xff00 == 0x9700 {
        let (rd, k) = pair_imm_operands(word);
        return Instruction {
            op: if word & 0x0100 == 0 {
                Operation::Adiw
            } else {
                Operation::Sbiw
            },
            rd,
            k,
            ..Default::default()
        };
    }

    for (pattern, op) in IOBIT {
        if word & 0xff00 == pattern {
            let (a, b) = io_bit_operands(word);
            return Instruction {
                op,
                a,
                b,
                ..Default::default()
            };
        }
    }

    for (pattern, op) in COND_BRANCH {
        if word & 0xfc07 == pattern {
            let mut inst = Instruction::of(op);
            inst.addr = branch_offset(word);
            return inst;
        }
    }
    if word & 0xfc00 == 0xf400 || word & 0xfc00 == 0xf000 {
        let mut inst = Instruction::of(if word & 0x0400 == 0 {
            Operation::Brbs
        } else {
            Operation::Brbc
        });
        inst.addr = branch_offset(word);
        inst.s = extract_field(word, 2, 0) as u8;
        return inst;
    }

    if word & 0xf000 == 0xd000 || word & 0xf000 == 0xc000 {
        let mut inst = Instruction::of(if word & 0x1000 == 0 {
            Operation::Rjmp
        } else {
            Operation::Rcall
        });
        inst.addr = sign_extend(extract_field(word, 11, 0), 11);
        return inst;
    }

    if word & 0xfe0e == 0x940e || word & 0xfe0e == 0x940c {
        let mut inst = Instruction::of(if word & 0x2 == 0 {
            Operation::Jmp
        } else {
            Operation::Call
        });
        inst.addr = call_address(words);
        return inst;
    }

    for (pattern, op) in ONEREG {
        if word & 0xfe0f == pattern {
            let mut inst = Instruction::of(op);
            inst.rd = single_reg_operand(word);
            return inst;
        }
    }

    if word & 0xff00 == 0x0100 {
        // MOVW moves a register pair; the record carries the
        // pre-doubled even indices.
        let mut inst = Instruction::of(Operation::Movw);
        inst.rd = 2 * extract_field(word, 7, 4) as u8;
        inst.rr = 2 * extract_field(word, 3, 0) as u8;
        return inst;
    }
    if word & 0xff00 == 0x0200 {
        let mut inst = Instruction::of(Operation::Muls);
        inst.rd = 16 + extract_field(word, 7, 4) as u8;
        inst.rr = 16 + extract_field(word, 3, 0) as u8;
        return inst;
    }
    if word & 0xff00 == 0x0300 {
        // The 0x03xx block packs MULSU, FMUL, FMULS and FMULSU, all
        // restricted to R16..R23, discriminated by bits 7 and 3.
        let op = match (word & 0x80 != 0, word & 0x8 != 0) {
            (false, false) => Operation::Mulsu,
            (false, true) => Operation::Fmul,
            (true, false) => Operation::Fmuls,
            (true, true) => Operation::Fmulsu,
        };
        let mut inst = Instruction::of(op);
        inst.rd = 16 + extract_field(word, 6, 4) as u8;
        inst.rr = 16 + extract_field(word, 2, 0) as u8;
        return inst;
    }

    if word & 0xfe0f == 0x9000 {
        let mut inst = Instruction::of(Operation::Lds);
        inst.rd = single_reg_operand(word);
        inst.addr = i32::from(words[1]);
        return inst;
    }
    if word & 0xfe0f == 0x9200 {
        let mut inst = Instruction::of(Operation::Sts);
        inst.rr = single_reg_operand(word);
        inst.addr = i32::from(words[1]);
        return inst;
    }

    // Displacement forms before the plain indirect forms: a zero
    // displacement through Y or Z is the same bit pattern as LD/ST
    // through that pointer.
    if word & 0xd200 == 0x8000 {
        let mut inst = Instruction::of(Operation::Ldd);
        inst.rd = single_reg_operand(word);
        inst.bp = if word & 0x8 != 0 {
            BasePointer::Y
        } else {
            BasePointer::Z
        };
        inst.q = displacement_operand(word);
        return inst;
    }
    if word & 0xd200 == 0x8200 {
        let mut inst = Instruction::of(Operation::Std);
        inst.rr = single_reg_operand(word);
        inst.bp = if word & 0x8 != 0 {
            BasePointer::Y
        } else {
            BasePointer::Z
        };
        inst.q = displacement_operand(word);
        return inst;
    }
    if word & 0xee00 == 0x8000 {
        let Some((bp, bp_op)) = base_pointer_operands(word) else {
            return unknown(word);
        };
        let mut inst = Instruction::of(Operation::Ld);
        inst.rd = single_reg_operand(word);
        inst.bp = bp;
        inst.bp_op = bp_op;
        return inst;
    }
    if word & 0xee00 == 0x8200 {
        let Some((bp, bp_op)) = base_pointer_operands(word) else {
            return unknown(word);
        };
        let mut inst = Instruction::of(Operation::St);
        inst.rr = single_reg_operand(word);
        inst.bp = bp;
        inst.bp_op = bp_op;
        return inst;
    }

    unknown(word)
}
