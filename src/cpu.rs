//! AVR CPU execution engine
//!
//! The core models the AVRe+ CPU of the ATmega328P: 32 general
//! purpose registers, the status register, a 16-bit stack pointer and
//! a word-addressed 16-bit program counter. It owns no memory beyond
//! that architectural state; everything else is reached through the
//! bus traits the device wrapper implements.
//!
//! The member function step() advances the simulation by one
//! instruction: it fetches the word at the current PC through the
//! flash bus, decodes it, advances the PC past the opcode, then
//! applies the operation's effect on registers, memory and flags.
//! Every call consumes exactly one cycle. Fetch failures, unknown
//! opcodes and bus faults are recoverable: they are reported through
//! the logging facade and the cycle completes as a NOP would.
//!
//! The register file, stack pointer and status register are aliased
//! into the data address space (0x00..0x1f, 0x5d/0x5e and 0x5f).
//! Rather than sharing backing storage, the data-space and I/O
//! dispatchers below special-case those addresses onto the CPU's own
//! fields, so a store through the bus and a direct register write are
//! indistinguishable to the program.

use log::{debug, warn};

use crate::bus::{Bus, BusFault, DataBus, FlashBus, IoBus};
use crate::decode::{decode, opcode_length};
use crate::instr::{BasePointer, Instruction, Operation, PointerOp};
use crate::utils::bit;

use self::{registers::Registers, sreg::Sreg};

pub mod registers;
pub mod sreg;

/// Data-space addresses of the stack pointer low and high bytes and
/// of the status register
pub const SPL_ADDR: u16 = 0x5d;
pub const SPH_ADDR: u16 = 0x5e;
pub const SREG_ADDR: u16 = 0x5f;

/// Offset between the 6-bit I/O address space and data-space
/// addresses
pub const IO_BASE: u16 = 0x20;

/// The value of bit bitpos of value
fn bitval(value: u8, bitpos: u8) -> bool {
    value >> bitpos & 1 != 0
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum State {
    #[default]
    Fetching,
    Executing,
}

/// What fills bit 7 after a right shift: zero for LSR, the old bit 7
/// for ASR, the carry flag for ROR
#[derive(Debug, Clone, Copy)]
enum ShiftHigh {
    Zero,
    KeepMsb,
    CarryIn,
}

/// AVR CPU core, generic over the device that backs its buses
#[derive(Debug, Default)]
pub struct Cpu<B> {
    pub bus: B,
    pub regs: Registers,
    pub sreg: Sreg,
    pub sp: u16,
    pub pc: u16,
    current: Instruction,
    state: State,
    pub cycle_count: u64,
}

impl<B> Cpu<B> {
    pub fn new(bus: B) -> Self {
        Cpu {
            bus,
            regs: Registers::default(),
            sreg: Sreg::default(),
            sp: 0,
            pc: 0,
            current: Instruction::default(),
            state: State::Fetching,
            cycle_count: 0,
        }
    }

    /// Read the register Rn. Decoded register indices are five bits,
    /// so the access cannot fail.
    fn r(&self, n: u8) -> u8 {
        self.regs
            .read(n)
            .expect("decoded register index fits in five bits")
    }

    fn set_r(&mut self, n: u8, value: u8) {
        self.regs
            .write(n, value)
            .expect("decoded register index fits in five bits")
    }

    /// Read the little-endian register pair starting at low
    fn pair(&self, low: u8) -> u16 {
        self.regs
            .read_pair(low)
            .expect("pair index comes from the decoder")
    }

    fn set_pair(&mut self, low: u8, value: u16) {
        self.regs
            .write_pair(low, value)
            .expect("pair index comes from the decoder")
    }
}

impl<B: Bus> Cpu<B> {
    /// Load one byte from the linear data address space
    ///
    /// Addresses 0x00..=0x1f resolve to the register file, 0x5d/0x5e
    /// to the stack pointer bytes and 0x5f to the status register;
    /// everything else is routed to the device.
    pub fn load_data(&mut self, addr: u16) -> Result<u8, BusFault> {
        match addr {
            0x0000..=0x001f => Ok(self.r(addr as u8)),
            SPL_ADDR => Ok(self.sp.to_le_bytes()[0]),
            SPH_ADDR => Ok(self.sp.to_le_bytes()[1]),
            SREG_ADDR => Ok(self.sreg.to_byte()),
            _ => self.bus.load(addr),
        }
    }

    /// Store one byte into the linear data address space
    pub fn store_data(&mut self, addr: u16, value: u8) -> Result<(), BusFault> {
        match addr {
            0x0000..=0x001f => {
                self.set_r(addr as u8, value);
                Ok(())
            }
            SPL_ADDR => {
                self.sp = self.sp & 0xff00 | u16::from(value);
                Ok(())
            }
            SPH_ADDR => {
                self.sp = self.sp & 0x00ff | u16::from(value) << 8;
                Ok(())
            }
            SREG_ADDR => {
                self.sreg = Sreg::from_byte(value);
                Ok(())
            }
            _ => self.bus.store(addr, value),
        }
    }

    /// Load an I/O register by its 6-bit I/O address
    pub fn io_load(&mut self, addr: u8) -> Result<u8, BusFault> {
        match u16::from(addr) + IO_BASE {
            SPL_ADDR => Ok(self.sp.to_le_bytes()[0]),
            SPH_ADDR => Ok(self.sp.to_le_bytes()[1]),
            SREG_ADDR => Ok(self.sreg.to_byte()),
            _ => self.bus.io_load(addr),
        }
    }

    /// Store an I/O register by its 6-bit I/O address
    pub fn io_store(&mut self, addr: u8, value: u8) -> Result<(), BusFault> {
        match u16::from(addr) + IO_BASE {
            SPL_ADDR => {
                self.sp = self.sp & 0xff00 | u16::from(value);
                Ok(())
            }
            SPH_ADDR => {
                self.sp = self.sp & 0x00ff | u16::from(value) << 8;
                Ok(())
            }
            SREG_ADDR => {
                self.sreg = Sreg::from_byte(value);
                Ok(())
            }
            _ => self.bus.io_store(addr, value),
        }
    }

    fn data_in(&mut self, addr: u16) -> u8 {
        match self.load_data(addr) {
            Ok(value) => value,
            Err(fault) => {
                warn!("loading data memory failed: {fault}");
                0
            }
        }
    }

    fn data_out(&mut self, addr: u16, value: u8) {
        if let Err(fault) = self.store_data(addr, value) {
            warn!("storing data memory failed: {fault}");
        }
    }

    fn io_in(&mut self, addr: u8) -> u8 {
        match self.io_load(addr) {
            Ok(value) => value,
            Err(fault) => {
                warn!("loading I/O memory failed: {fault}");
                0
            }
        }
    }

    fn io_out(&mut self, addr: u8, value: u8) {
        if let Err(fault) = self.io_store(addr, value) {
            warn!("storing I/O memory failed: {fault}");
        }
    }

    /// Read the opcode at pc (does not move pc). Returns both words;
    /// the second is meaningful only for a two-word opcode.
    fn fetch(&mut self, pc: u16) -> Result<[u16; 2], BusFault> {
        let byte_addr = u32::from(pc) * 2;
        let mut buf = [0u8; 2];
        self.bus.read(byte_addr, &mut buf)?;
        let first = u16::from_le_bytes(buf);
        let mut words = [first, 0];
        if opcode_length(first) == 2 {
            self.bus.read(byte_addr + 2, &mut buf)?;
            words[1] = u16::from_le_bytes(buf);
        }
        Ok(words)
    }

    /// Run one fetch-decode-execute cycle
    pub fn step(&mut self) {
        match self.fetch(self.pc) {
            Ok(words) => {
                self.pc = self.pc.wrapping_add(u16::from(opcode_length(words[0])));
                self.current = decode(&words);
                self.state = State::Executing;
                debug!("cycle {}: {:?}", self.cycle_count, self.current.op);
                self.execute();
            }
            Err(fault) => {
                warn!("instruction fetch at pc {:#06x} failed: {fault}", self.pc);
                self.pc = self.pc.wrapping_add(1);
            }
        }
        self.state = State::Fetching;
        self.cycle_count += 1;
    }

    fn execute(&mut self) {
        debug_assert_eq!(self.state, State::Executing);
        let inst = self.current;
        match inst.op {
            Operation::Add => self.execute_add(inst.rd, inst.rr, false),
            Operation::Adc => self.execute_add(inst.rd, inst.rr, true),
            Operation::Adiw => self.execute_adiw(inst.rd, inst.k),
            Operation::Sbiw => self.execute_sbiw(inst.rd, inst.k),
            Operation::Sub => {
                let operand = self.r(inst.rr);
                self.execute_sub(inst.rd, operand, false);
            }
            Operation::Subi => self.execute_sub(inst.rd, inst.k, false),
            Operation::Sbc => {
                let operand = self.r(inst.rr);
                self.execute_sub(inst.rd, operand, true);
            }
            Operation::Sbci => self.execute_sub(inst.rd, inst.k, true),
            Operation::Cp => {
                let operand = self.r(inst.rr);
                self.sub_and_flags(self.r(inst.rd), operand, false);
            }
            Operation::Cpc => {
                let operand = self.r(inst.rr);
                self.sub_and_flags(self.r(inst.rd), operand, true);
            }
            Operation::Cpi => {
                self.sub_and_flags(self.r(inst.rd), inst.k, false);
            }
            Operation::And => {
                let operand = self.r(inst.rr);
                self.execute_and(inst.rd, operand);
            }
            Operation::Andi => self.execute_and(inst.rd, inst.k),
            Operation::Or => {
                let operand = self.r(inst.rr);
                self.execute_or(inst.rd, operand);
            }
            Operation::Ori | Operation::Sbr => self.execute_or(inst.rd, inst.k),
            Operation::Eor => {
                let operand = self.r(inst.rr);
                let r = self.r(inst.rd) ^ operand;
                self.logical_flags(r);
                self.set_r(inst.rd, r);
            }
            Operation::Com => self.execute_com(inst.rd),
            Operation::Neg => self.execute_neg(inst.rd),
            Operation::Inc => self.execute_inc(inst.rd),
            Operation::Dec => self.execute_dec(inst.rd),
            Operation::Asr => self.execute_right_shift(inst.rd, ShiftHigh::KeepMsb),
            Operation::Lsr => self.execute_right_shift(inst.rd, ShiftHigh::Zero),
            Operation::Ror => self.execute_right_shift(inst.rd, ShiftHigh::CarryIn),
            Operation::Swap => {
                let value = self.r(inst.rd);
                self.set_r(inst.rd, value << 4 | value >> 4);
            }
            Operation::Mul => self.multiply(inst.rd, inst.rr, false, false, false),
            Operation::Muls => self.multiply(inst.rd, inst.rr, true, true, false),
            Operation::Mulsu => self.multiply(inst.rd, inst.rr, true, false, false),
            Operation::Fmul => self.multiply(inst.rd, inst.rr, false, false, true),
            Operation::Fmuls => self.multiply(inst.rd, inst.rr, true, true, true),
            Operation::Fmulsu => self.multiply(inst.rd, inst.rr, true, false, true),
            // SEC..SEZ and CLC..CLZ decode to BSET/BCLR
            Operation::Bset => self.sreg.set_bit(inst.s, true),
            Operation::Bclr => self.sreg.set_bit(inst.s, false),
            Operation::Bld => {
                let value = self.r(inst.rd);
                let mask = 1 << inst.b;
                let value = if self.sreg.t { value | mask } else { value & !mask };
                self.set_r(inst.rd, value);
            }
            Operation::Bst => self.sreg.t = bitval(self.r(inst.rd), inst.b),
            Operation::Brbs => {
                let taken = self.sreg.bit(inst.s);
                self.branch(taken, inst.addr);
            }
            Operation::Brbc => {
                let taken = !self.sreg.bit(inst.s);
                self.branch(taken, inst.addr);
            }
            Operation::Brcs | Operation::Brlo => self.branch(self.sreg.c, inst.addr),
            Operation::Brcc | Operation::Brsh => self.branch(!self.sreg.c, inst.addr),
            Operation::Breq => self.branch(self.sreg.z, inst.addr),
            Operation::Brne => self.branch(!self.sreg.z, inst.addr),
            Operation::Brmi => self.branch(self.sreg.n, inst.addr),
            Operation::Brpl => self.branch(!self.sreg.n, inst.addr),
            Operation::Brge => self.branch(!self.sreg.s, inst.addr),
            Operation::Brlt => self.branch(self.sreg.s, inst.addr),
            Operation::Brhs => self.branch(self.sreg.h, inst.addr),
            Operation::Brhc => self.branch(!self.sreg.h, inst.addr),
            Operation::Brts => self.branch(self.sreg.t, inst.addr),
            Operation::Brtc => self.branch(!self.sreg.t, inst.addr),
            Operation::Brvs => self.branch(self.sreg.v, inst.addr),
            Operation::Brvc => self.branch(!self.sreg.v, inst.addr),
            Operation::Brie => self.branch(self.sreg.i, inst.addr),
            Operation::Brid => self.branch(!self.sreg.i, inst.addr),
            Operation::Rjmp => self.pc = self.pc.wrapping_add(inst.addr as u16),
            Operation::Rcall => {
                self.push_return_address();
                self.pc = self.pc.wrapping_add(inst.addr as u16);
            }
            Operation::Jmp => self.pc = inst.addr as u16,
            Operation::Call => {
                self.push_return_address();
                self.pc = inst.addr as u16;
            }
            // EIND is fixed at zero on this device, so the extended
            // indirect forms collapse to IJMP/ICALL. The Z pair is
            // little-endian: R30 holds the low byte.
            Operation::Ijmp | Operation::Eijmp => self.pc = self.pair(30),
            Operation::Icall | Operation::Eicall => {
                self.push_return_address();
                self.pc = self.pair(30);
            }
            Operation::Ret => self.pc = self.pop_return_address(),
            Operation::Reti => {
                self.pc = self.pop_return_address();
                self.sreg.i = true;
            }
            Operation::Cpse => {
                if self.r(inst.rd) == self.r(inst.rr) {
                    self.skip_next_instruction();
                }
            }
            Operation::Sbrc => {
                if !bitval(self.r(inst.rd), inst.b) {
                    self.skip_next_instruction();
                }
            }
            Operation::Sbrs => {
                if bitval(self.r(inst.rd), inst.b) {
                    self.skip_next_instruction();
                }
            }
            Operation::Sbic => {
                if !bitval(self.io_in(inst.a), inst.b) {
                    self.skip_next_instruction();
                }
            }
            Operation::Sbis => {
                if bitval(self.io_in(inst.a), inst.b) {
                    self.skip_next_instruction();
                }
            }
            Operation::In => {
                let value = self.io_in(inst.a);
                self.set_r(inst.rd, value);
            }
            Operation::Out => {
                let value = self.r(inst.rr);
                self.io_out(inst.a, value);
            }
            Operation::Cbi => {
                let value = self.io_in(inst.a) & !(1 << inst.b);
                self.io_out(inst.a, value);
            }
            Operation::Sbi => {
                let value = self.io_in(inst.a) | 1 << inst.b;
                self.io_out(inst.a, value);
            }
            Operation::Mov => {
                let value = self.r(inst.rr);
                self.set_r(inst.rd, value);
            }
            Operation::Movw => {
                let value = self.pair(inst.rr);
                self.set_pair(inst.rd, value);
            }
            Operation::Ldi => self.set_r(inst.rd, inst.k),
            Operation::Ser => self.set_r(inst.rd, 0xff),
            Operation::Ld => self.execute_load(inst.rd, inst.bp, inst.bp_op, 0),
            Operation::Ldd => self.execute_load(inst.rd, inst.bp, PointerOp::None, inst.q),
            Operation::St => self.execute_store(inst.rr, inst.bp, inst.bp_op, 0),
            Operation::Std => self.execute_store(inst.rr, inst.bp, PointerOp::None, inst.q),
            Operation::Lds => {
                let value = self.data_in(inst.addr as u16);
                self.set_r(inst.rd, value);
            }
            Operation::Sts => {
                let value = self.r(inst.rr);
                self.data_out(inst.addr as u16, value);
            }
            Operation::Lpm | Operation::Elpm => {
                self.execute_lpm(inst.rd, inst.bp_op == PointerOp::PostInc)
            }
            Operation::LpmR0 | Operation::ElpmR0 => self.execute_lpm(0, false),
            Operation::Push => {
                let value = self.r(inst.rd);
                self.data_out(self.sp, value);
                self.sp = self.sp.wrapping_sub(1);
            }
            Operation::Pop => {
                self.sp = self.sp.wrapping_add(1);
                let value = self.data_in(self.sp);
                self.set_r(inst.rd, value);
            }
            // SLEEP and WDR have no observable effect without the
            // power and watchdog peripherals; SPM self-programming is
            // not modelled; BREAK is for on-chip debug hardware.
            Operation::Nop
            | Operation::Sleep
            | Operation::Break
            | Operation::Wdr
            | Operation::Spm => {}
            Operation::Des
            | Operation::Lac
            | Operation::Las
            | Operation::Lat
            | Operation::Xch => {
                warn!("{:?} is not implemented by the AVRe+ core", inst.op)
            }
        }
    }

    fn execute_add(&mut self, rd: u8, rr: u8, with_carry: bool) {
        let a = self.r(rd);
        let b = self.r(rr);
        let carry = u8::from(with_carry && self.sreg.c);
        let r = a.wrapping_add(b).wrapping_add(carry);
        let (a3, b3, r3) = (bitval(a, 3), bitval(b, 3), bitval(r, 3));
        let (a7, b7, r7) = (bitval(a, 7), bitval(b, 7), bitval(r, 7));
        // H <=> there was a carry from bit 3
        self.sreg.h = a3 && b3 || b3 && !r3 || !r3 && a3;
        // V <=> two's complement overflow resulted from the operation
        self.sreg.v = a7 && b7 && !r7 || !a7 && !b7 && r7;
        self.sreg.n = r7;
        self.sreg.s = self.sreg.n ^ self.sreg.v;
        self.sreg.z = r == 0;
        // C <=> there was a carry from the MSB of the result
        self.sreg.c = a7 && b7 || b7 && !r7 || !r7 && a7;
        self.set_r(rd, r);
    }

    /// Shared subtraction: computes Rd - operand [- C] and derives
    /// the flags. CP, CPC and CPI discard the result; SUB, SUBI, SBC
    /// and SBCI write it back. The operations that consume the carry
    /// (SBC, SBCI, CPC) also leave Z untouched unless the result is
    /// non-zero, so a multi-byte comparison propagates a zero test
    /// across instructions.
    fn sub_and_flags(&mut self, a: u8, b: u8, with_carry: bool) -> u8 {
        let borrow = u8::from(with_carry && self.sreg.c);
        let r = a.wrapping_sub(b).wrapping_sub(borrow);
        let (a3, b3, r3) = (bitval(a, 3), bitval(b, 3), bitval(r, 3));
        let (a7, b7, r7) = (bitval(a, 7), bitval(b, 7), bitval(r, 7));
        // H <=> there was a borrow from bit 3
        self.sreg.h = !a3 && b3 || b3 && r3 || r3 && !a3;
        self.sreg.v = a7 && !b7 && !r7 || !a7 && b7 && r7;
        self.sreg.n = r7;
        self.sreg.s = self.sreg.n ^ self.sreg.v;
        if with_carry {
            self.sreg.z = self.sreg.z && r == 0;
        } else {
            self.sreg.z = r == 0;
        }
        // C <=> the subtrahend (plus borrow) exceeds Rd
        self.sreg.c = !a7 && b7 || b7 && r7 || r7 && !a7;
        r
    }

    fn execute_sub(&mut self, rd: u8, operand: u8, with_carry: bool) {
        let r = self.sub_and_flags(self.r(rd), operand, with_carry);
        self.set_r(rd, r);
    }

    fn execute_adiw(&mut self, rd: u8, k: u8) {
        let pair = self.pair(rd);
        let r = pair.wrapping_add(u16::from(k));
        let high7 = bit(pair, 15);
        self.sreg.v = bit(r, 15) && !high7;
        self.sreg.n = bit(r, 15);
        self.sreg.s = self.sreg.n ^ self.sreg.v;
        self.sreg.z = r == 0;
        self.sreg.c = !bit(r, 15) && high7;
        self.set_pair(rd, r);
    }

    fn execute_sbiw(&mut self, rd: u8, k: u8) {
        let pair = self.pair(rd);
        let r = pair.wrapping_sub(u16::from(k));
        let high7 = bit(pair, 15);
        self.sreg.v = high7 && !bit(r, 15);
        self.sreg.n = bit(r, 15);
        self.sreg.s = self.sreg.n ^ self.sreg.v;
        self.sreg.z = r == 0;
        self.sreg.c = bit(r, 15) && !high7;
        self.set_pair(rd, r);
    }

    fn logical_flags(&mut self, r: u8) {
        self.sreg.v = false;
        self.sreg.n = bitval(r, 7);
        self.sreg.s = self.sreg.n ^ self.sreg.v;
        self.sreg.z = r == 0;
    }

    fn execute_and(&mut self, rd: u8, operand: u8) {
        let r = self.r(rd) & operand;
        self.logical_flags(r);
        self.set_r(rd, r);
    }

    fn execute_or(&mut self, rd: u8, operand: u8) {
        let r = self.r(rd) | operand;
        self.logical_flags(r);
        self.set_r(rd, r);
    }

    fn execute_com(&mut self, rd: u8) {
        let r = 0xff - self.r(rd);
        self.logical_flags(r);
        self.sreg.c = true;
        self.set_r(rd, r);
    }

    fn execute_neg(&mut self, rd: u8) {
        let value = self.r(rd);
        let r = 0u8.wrapping_sub(value);
        self.sreg.h = bitval(r, 3) || bitval(value, 3);
        self.sreg.v = r == 0x80;
        self.sreg.n = bitval(r, 7);
        self.sreg.s = self.sreg.n ^ self.sreg.v;
        self.sreg.z = r == 0;
        self.sreg.c = r != 0;
        self.set_r(rd, r);
    }

    /// INC and DEC leave the carry flag alone so they can control a
    /// loop around a multi-byte arithmetic sequence
    fn execute_inc(&mut self, rd: u8) {
        let value = self.r(rd);
        let r = value.wrapping_add(1);
        self.sreg.v = value == 0x7f;
        self.sreg.n = bitval(r, 7);
        self.sreg.s = self.sreg.n ^ self.sreg.v;
        self.sreg.z = r == 0;
        self.set_r(rd, r);
    }

    fn execute_dec(&mut self, rd: u8) {
        let value = self.r(rd);
        let r = value.wrapping_sub(1);
        self.sreg.v = value == 0x80;
        self.sreg.n = bitval(r, 7);
        self.sreg.s = self.sreg.n ^ self.sreg.v;
        self.sreg.z = r == 0;
        self.set_r(rd, r);
    }

    fn execute_right_shift(&mut self, rd: u8, high: ShiftHigh) {
        let value = self.r(rd);
        let msb = match high {
            ShiftHigh::Zero => 0,
            ShiftHigh::KeepMsb => value & 0x80,
            ShiftHigh::CarryIn => u8::from(self.sreg.c) << 7,
        };
        let r = value >> 1 | msb;
        // Bit 0 is loaded into the C flag
        self.sreg.c = value & 1 != 0;
        self.sreg.n = bitval(r, 7);
        self.sreg.v = self.sreg.n ^ self.sreg.c;
        self.sreg.s = self.sreg.n ^ self.sreg.v;
        self.sreg.z = r == 0;
        self.set_r(rd, r);
    }

    /// The 8x8 -> 16 multiplies. The product lands in R1:R0
    /// little-endian. The fractional variants shift the product left
    /// by one after the carry flag has captured bit 15.
    fn multiply(&mut self, rd: u8, rr: u8, rd_signed: bool, rr_signed: bool, fractional: bool) {
        let a = if rd_signed {
            i32::from(self.r(rd) as i8)
        } else {
            i32::from(self.r(rd))
        };
        let b = if rr_signed {
            i32::from(self.r(rr) as i8)
        } else {
            i32::from(self.r(rr))
        };
        let mut r = (a * b) as u16;
        self.sreg.c = bit(r, 15);
        if fractional {
            r <<= 1;
        }
        self.sreg.z = r == 0;
        self.set_pair(0, r);
    }

    /// Conditional branch: the offset is in words, relative to the
    /// already-advanced program counter
    fn branch(&mut self, taken: bool, offset: i32) {
        if taken {
            self.pc = self.pc.wrapping_add(offset as u16);
        }
    }

    /// Push the return address (the PC has already advanced past the
    /// call) little-endian. SP addresses the next free byte, so the
    /// bytes land just above the new SP.
    fn push_return_address(&mut self) {
        let [low, high] = self.pc.to_le_bytes();
        self.sp = self.sp.wrapping_sub(2);
        self.data_out(self.sp.wrapping_add(1), low);
        self.data_out(self.sp.wrapping_add(2), high);
    }

    fn pop_return_address(&mut self) -> u16 {
        let low = self.data_in(self.sp.wrapping_add(1));
        let high = self.data_in(self.sp.wrapping_add(2));
        self.sp = self.sp.wrapping_add(2);
        u16::from_le_bytes([low, high])
    }

    /// Discard the instruction after a skip whose test was true: its
    /// length is found by fetching and measuring it, never executing
    /// it. If the fetch fails the skip is abandoned.
    fn skip_next_instruction(&mut self) {
        match self.fetch(self.pc) {
            Ok(words) => {
                self.pc = self.pc.wrapping_add(u16::from(opcode_length(words[0])));
            }
            Err(fault) => warn!("fetching the instruction to skip failed: {fault}"),
        }
    }

    /// Effective address of an indirect load/store, applying the
    /// pre-decrement or post-increment to the base pointer pair and
    /// the LDD/STD displacement
    fn indirect_address(&mut self, bp: BasePointer, bp_op: PointerOp, q: u8) -> u16 {
        let low = bp.low_reg();
        let mut addr = self.pair(low);
        match bp_op {
            PointerOp::None => {}
            PointerOp::PreDec => {
                addr = addr.wrapping_sub(1);
                self.set_pair(low, addr);
            }
            PointerOp::PostInc => self.set_pair(low, addr.wrapping_add(1)),
        }
        addr.wrapping_add(u16::from(q))
    }

    fn execute_load(&mut self, rd: u8, bp: BasePointer, bp_op: PointerOp, q: u8) {
        let addr = self.indirect_address(bp, bp_op, q);
        match self.load_data(addr) {
            Ok(value) => self.set_r(rd, value),
            Err(fault) => warn!("indirect load failed: {fault}"),
        }
    }

    fn execute_store(&mut self, rr: u8, bp: BasePointer, bp_op: PointerOp, q: u8) {
        let value = self.r(rr);
        let addr = self.indirect_address(bp, bp_op, q);
        self.data_out(addr, value);
    }

    /// Load a program memory byte addressed by the Z pair. RAMPZ is
    /// zero on this device, so ELPM reads the same 64 KiB window.
    fn execute_lpm(&mut self, rd: u8, post_inc: bool) {
        let z = self.pair(30);
        let mut buf = [0u8; 1];
        match self.bus.read(u32::from(z), &mut buf) {
            Ok(()) => self.set_r(rd, buf[0]),
            Err(fault) => warn!("loading program memory failed: {fault}"),
        }
        if post_inc {
            self.set_pair(30, z.wrapping_add(1));
        }
    }
}
