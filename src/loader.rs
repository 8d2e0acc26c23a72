//! Program image loading
//!
//! The image format is a raw stream of little-endian 16-bit
//! instruction words, written into flash starting at word address
//! zero. There is no container format: ELF or hex parsing belongs to
//! external tooling.

use std::io::Read;

use itertools::Itertools;
use log::warn;
use thiserror::Error;

use crate::bus::{BusFault, FlashBus};

/// Image cap of the reference harness, in words
pub const MAX_PROGRAM_WORDS: usize = 1000;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("reading program image failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("writing program image to flash failed: {0}")]
    Flash(#[from] BusFault),
}

/// Read up to max_words little-endian words from reader and write
/// them to the start of flash. Returns the number of words loaded. A
/// trailing odd byte is discarded.
pub fn load_image<R: Read, F: FlashBus>(
    reader: R,
    flash: &mut F,
    max_words: usize,
) -> Result<usize, LoadError> {
    let mut bytes = Vec::new();
    reader
        .take(2 * max_words as u64)
        .read_to_end(&mut bytes)?;
    if bytes.len() % 2 != 0 {
        warn!("program image has an odd trailing byte, ignoring it");
    }

    let mut words = 0;
    for (low, high) in bytes.iter().tuples() {
        flash.write(2 * words as u32, &[*low, *high])?;
        words += 1;
    }
    Ok(words)
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::device::Atmega328p;
    use std::io::Cursor;

    #[test]
    fn check_load_words_little_endian() {
        let mut device = Atmega328p::new();
        let image = [0xa5, 0xe0, 0x00, 0x00, 0x08, 0x95];
        let words = load_image(Cursor::new(image), &mut device, MAX_PROGRAM_WORDS).unwrap();
        assert_eq!(words, 3);
        let mut buf = [0u8; 2];
        device.read(0, &mut buf).unwrap();
        assert_eq!(u16::from_le_bytes(buf), 0xe0a5);
        device.read(4, &mut buf).unwrap();
        assert_eq!(u16::from_le_bytes(buf), 0x9508);
    }

    #[test]
    fn check_image_is_capped() {
        let mut device = Atmega328p::new();
        let image = vec![0u8; 100];
        let words = load_image(Cursor::new(image), &mut device, 10).unwrap();
        assert_eq!(words, 10);
    }

    #[test]
    fn check_odd_trailing_byte_is_dropped() {
        let mut device = Atmega328p::new();
        let image = [0x01, 0x02, 0x03];
        let words = load_image(Cursor::new(image), &mut device, MAX_PROGRAM_WORDS).unwrap();
        assert_eq!(words, 1);
    }

    #[test]
    fn check_empty_image() {
        let mut device = Atmega328p::new();
        let words = load_image(Cursor::new([]), &mut device, MAX_PROGRAM_WORDS).unwrap();
        assert_eq!(words, 0);
    }
}
