//! Bus interfaces between the CPU core and the device
//!
//! The core never owns device memory. All data, I/O and program
//! accesses go through these three traits, and the device wrapper
//! decides which backing storage an address resolves to. A bus
//! operation on an address the device does not map returns a
//! [`BusFault`]; the core logs the fault and carries on, it never
//! halts on one.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusFault {
    #[error("data address {0:#06x} is outside the data address space")]
    DataAddress(u16),
    #[error("I/O register address {0:#04x} exceeds the 64-register I/O space")]
    IoAddress(u8),
    #[error("flash range {addr:#07x}..+{len} exceeds the end of flash")]
    FlashRange { addr: u32, len: usize },
}

/// Byte-wide access to the linear data address space (registers, I/O,
/// SRAM). Addresses are data-space addresses, at most 12 bits on this
/// device.
pub trait DataBus {
    fn load(&mut self, addr: u16) -> Result<u8, BusFault>;
    fn store(&mut self, addr: u16, value: u8) -> Result<(), BusFault>;
}

/// Access to the 64 standard I/O registers by 6-bit I/O address, as
/// used by IN, OUT, CBI, SBI, SBIC and SBIS.
pub trait IoBus {
    fn io_load(&mut self, addr: u8) -> Result<u8, BusFault>;
    fn io_store(&mut self, addr: u8, value: u8) -> Result<(), BusFault>;
}

/// Byte-addressed access to program memory. The program counter is
/// word-addressed; the factor of two is applied by the core so that
/// single- and double-word fetches and external image loading can
/// share one interface.
pub trait FlashBus {
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), BusFault>;
    fn write(&mut self, addr: u32, buf: &[u8]) -> Result<(), BusFault>;
}

/// The full set of buses the execution engine needs
pub trait Bus: DataBus + IoBus + FlashBus {}

impl<T: DataBus + IoBus + FlashBus> Bus for T {}
