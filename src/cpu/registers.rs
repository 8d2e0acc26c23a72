use thiserror::Error;

/// The general purpose register file R0..R31
///
/// Registers are plain bytes. The upper six registers form the three
/// pointer pairs X (R27:R26), Y (R29:R28) and Z (R31:R30), read and
/// written little-endian (low register first) by the pair accessors.
#[derive(Debug, Default)]
pub struct Registers {
    registers: [u8; 32],
}

#[derive(Error, PartialEq, Eq, Debug)]
pub enum RegisterError {
    #[error("register index exceeds 31")]
    InvalidRegister,
}

impl Registers {
    pub fn write(&mut self, which: u8, value: u8) -> Result<(), RegisterError> {
        if which > 31 {
            Err(RegisterError::InvalidRegister)
        } else {
            self.registers[usize::from(which)] = value;
            Ok(())
        }
    }

    pub fn read(&self, which: u8) -> Result<u8, RegisterError> {
        if which > 31 {
            Err(RegisterError::InvalidRegister)
        } else {
            Ok(self.registers[usize::from(which)])
        }
    }

    /// Read the pair (which, which + 1) as a little-endian word
    pub fn read_pair(&self, which: u8) -> Result<u16, RegisterError> {
        let low = self.read(which)?;
        let high = self.read(which + 1)?;
        Ok(u16::from_le_bytes([low, high]))
    }

    /// Write a word little-endian into the pair (which, which + 1)
    pub fn write_pair(&mut self, which: u8, value: u16) -> Result<(), RegisterError> {
        let [low, high] = value.to_le_bytes();
        self.write(which, low)?;
        self.write(which + 1, high)
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn check_registers_initialised_to_zero() {
        let regs = Registers::default();
        for n in 0..32 {
            assert_eq!(regs.read(n).unwrap(), 0)
        }
    }

    #[test]
    fn check_register_read_out_of_bounds() {
        let regs = Registers::default();
        let result = regs.read(32);
        assert_eq!(result, Err(RegisterError::InvalidRegister));
    }

    #[test]
    fn check_register_write_out_of_bounds() {
        let mut regs = Registers::default();
        let result = regs.write(32, 12);
        assert_eq!(result, Err(RegisterError::InvalidRegister));
    }

    #[test]
    fn check_write_then_read() {
        let mut regs = Registers::default();
        for n in 0..32 {
            let value = 5 * n;
            regs.write(n, value).unwrap();
            assert_eq!(regs.read(n).unwrap(), value);
        }
    }

    #[test]
    fn check_pair_is_little_endian() {
        let mut regs = Registers::default();
        regs.write_pair(30, 0x1234).unwrap();
        assert_eq!(regs.read(30).unwrap(), 0x34);
        assert_eq!(regs.read(31).unwrap(), 0x12);
        assert_eq!(regs.read_pair(30).unwrap(), 0x1234);
    }

    #[test]
    fn check_pair_out_of_bounds() {
        let regs = Registers::default();
        assert_eq!(regs.read_pair(31), Err(RegisterError::InvalidRegister));
    }
}
