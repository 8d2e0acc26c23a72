//! AVR instruction model
//!
//! The operation enumeration covers the full AVR instruction set as
//! listed in the instruction set manual, including the AVRxm/AVRxt
//! operations (DES, LAC, LAS, LAT, XCH) that the ATmega328P decoder
//! never produces. The decoded instruction is a flat value type: one
//! operation tag plus every operand field any operation may carry. A
//! field holds a meaningful value only if the operation uses it.

/// All AVR operations the decoder can distinguish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operation {
    Adc,
    Add,
    Adiw,
    And,
    Andi,
    Asr,
    Bclr,
    Bld,
    Brbc,
    Brbs,
    Brcc,
    Brcs,
    Break,
    Breq,
    Brge,
    Brhc,
    Brhs,
    Brid,
    Brie,
    Brlo,
    Brlt,
    Brmi,
    Brne,
    Brpl,
    Brsh,
    Brtc,
    Brts,
    Brvc,
    Brvs,
    Bset,
    Bst,
    Call,
    Cbi,
    Com,
    Cp,
    Cpc,
    Cpi,
    Cpse,
    Dec,
    Des,
    Eicall,
    Eijmp,
    ElpmR0,
    Elpm,
    Eor,
    Fmul,
    Fmuls,
    Fmulsu,
    Icall,
    Ijmp,
    In,
    Inc,
    Jmp,
    Lac,
    Las,
    Lat,
    Ldd,
    Ld,
    Ldi,
    Lds,
    LpmR0,
    Lpm,
    Lsr,
    Mov,
    Movw,
    Mul,
    Muls,
    Mulsu,
    Neg,
    #[default]
    Nop,
    Or,
    Ori,
    Out,
    Pop,
    Push,
    Rcall,
    Ret,
    Reti,
    Rjmp,
    Ror,
    Sbc,
    Sbci,
    Sbi,
    Sbic,
    Sbis,
    Sbiw,
    Sbr,
    Sbrc,
    Sbrs,
    Ser,
    Sleep,
    Spm,
    Std,
    St,
    Sts,
    Sub,
    Subi,
    Swap,
    Wdr,
    Xch,
}

/// Base pointer register pair used by the indirect loads and stores:
/// X = R27:R26, Y = R29:R28, Z = R31:R30 (low register first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BasePointer {
    X,
    Y,
    #[default]
    Z,
}

impl BasePointer {
    /// Index of the low register of the pair
    pub fn low_reg(self) -> u8 {
        match self {
            BasePointer::X => 26,
            BasePointer::Y => 28,
            BasePointer::Z => 30,
        }
    }
}

/// What an indirect load/store does to its base pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointerOp {
    #[default]
    None,
    PreDec,
    PostInc,
}

/// A decoded instruction
///
/// Flat operand record in the style of the instruction set manual:
/// `rd` and `rr` are 5-bit register file indices (already rescaled by
/// the decoder for the restricted-range encodings, e.g. ANDI's 16..31
/// or MOVW's pre-doubled pair indices), `k` is the 8-bit constant the
/// manual calls K, `addr` is the signed or absolute program/data
/// address constant the manual calls k (up to 22 bits), `a` is an I/O
/// address, `s` a status register bit index, `b` a register or I/O
/// bit index, and `q` the 6-bit displacement of LDD/STD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Instruction {
    pub op: Operation,
    pub rd: u8,
    pub rr: u8,
    pub a: u8,
    pub k: u8,
    pub addr: i32,
    pub s: u8,
    pub b: u8,
    pub q: u8,
    pub bp: BasePointer,
    pub bp_op: PointerOp,
}

impl Instruction {
    /// An instruction carrying only an operation tag
    pub fn of(op: Operation) -> Self {
        Instruction {
            op,
            ..Default::default()
        }
    }
}
