//! ATmega328P device wrapper
//!
//! Owns every memory array of the device and wires the bus routing:
//! standard I/O registers at data addresses 0x20..0x5f, extended I/O
//! at 0x60..0xff, 2 KiB of SRAM at 0x100..0x8ff, 32 KiB of flash and
//! 1 KiB of EEPROM. The register file, stack pointer and status
//! register live in the CPU and are aliased into the data space by
//! the core's dispatchers, so the device never sees their addresses.
//!
//! The EEPROM is reachable only through its peripheral registers,
//! which are not modelled; the array is kept as plain storage.

use crate::bus::{BusFault, DataBus, FlashBus, IoBus};
use crate::cpu::Cpu;

pub const FLASH_SIZE: usize = 16384 * 2;
pub const SRAM_SIZE: usize = 2048;
pub const EEPROM_SIZE: usize = 1024;

/// Number of standard I/O registers
pub const IO_SIZE: usize = 64;
/// Number of extended I/O registers (data addresses 0x60..0xff)
pub const EXT_IO_SIZE: usize = 160;

/// Highest data-space address, the initial stack pointer
pub const RAMEND: u16 = 0x08ff;

/// AVR core variants. The tag is informational: execution always
/// follows the AVRe+ subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Core {
    Avr,
    Avre,
    #[default]
    Avrep,
    Avrxm,
    Avrxt,
    Avrrc,
}

#[derive(Debug)]
pub struct Atmega328p {
    pub core: Core,
    io: [u8; IO_SIZE],
    ext_io: [u8; EXT_IO_SIZE],
    sram: Vec<u8>,
    flash: Vec<u8>,
    eeprom: Vec<u8>,
}

impl Default for Atmega328p {
    fn default() -> Self {
        Atmega328p {
            core: Core::Avrep,
            io: [0; IO_SIZE],
            ext_io: [0; EXT_IO_SIZE],
            sram: vec![0; SRAM_SIZE],
            flash: vec![0; FLASH_SIZE],
            eeprom: vec![0; EEPROM_SIZE],
        }
    }
}

impl Atmega328p {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eeprom(&self) -> &[u8] {
        &self.eeprom
    }
}

impl DataBus for Atmega328p {
    // Addresses below 0x20 (the register file) and the stack
    // pointer/status register bytes never arrive here: the core
    // resolves them against its own state.
    fn load(&mut self, addr: u16) -> Result<u8, BusFault> {
        match addr {
            0x0020..=0x005f => Ok(self.io[usize::from(addr - 0x20)]),
            0x0060..=0x00ff => Ok(self.ext_io[usize::from(addr - 0x60)]),
            0x0100..=RAMEND => Ok(self.sram[usize::from(addr - 0x100)]),
            _ => Err(BusFault::DataAddress(addr)),
        }
    }

    fn store(&mut self, addr: u16, value: u8) -> Result<(), BusFault> {
        match addr {
            0x0020..=0x005f => self.io[usize::from(addr - 0x20)] = value,
            0x0060..=0x00ff => self.ext_io[usize::from(addr - 0x60)] = value,
            0x0100..=RAMEND => self.sram[usize::from(addr - 0x100)] = value,
            _ => return Err(BusFault::DataAddress(addr)),
        }
        Ok(())
    }
}

impl IoBus for Atmega328p {
    fn io_load(&mut self, addr: u8) -> Result<u8, BusFault> {
        self.io
            .get(usize::from(addr))
            .copied()
            .ok_or(BusFault::IoAddress(addr))
    }

    fn io_store(&mut self, addr: u8, value: u8) -> Result<(), BusFault> {
        match self.io.get_mut(usize::from(addr)) {
            Some(reg) => {
                *reg = value;
                Ok(())
            }
            None => Err(BusFault::IoAddress(addr)),
        }
    }
}

impl FlashBus for Atmega328p {
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), BusFault> {
        let start = addr as usize;
        let end = start + buf.len();
        if end > self.flash.len() {
            return Err(BusFault::FlashRange {
                addr,
                len: buf.len(),
            });
        }
        buf.copy_from_slice(&self.flash[start..end]);
        Ok(())
    }

    fn write(&mut self, addr: u32, buf: &[u8]) -> Result<(), BusFault> {
        let start = addr as usize;
        let end = start + buf.len();
        if end > self.flash.len() {
            return Err(BusFault::FlashRange {
                addr,
                len: buf.len(),
            });
        }
        self.flash[start..end].copy_from_slice(buf);
        Ok(())
    }
}

/// A powered-on ATmega328P: memory zeroed, PC at the reset vector,
/// stack pointer at the top of SRAM
pub fn atmega328p() -> Cpu<Atmega328p> {
    let mut mcu = Cpu::new(Atmega328p::new());
    mcu.sp = RAMEND;
    mcu
}
