use std::io;

use clap::Parser;
use env_logger::Env;
use log::debug;

use avremu::device::atmega328p;
use avremu::loader::{load_image, LoadError, MAX_PROGRAM_WORDS};

/// ATmega328P instruction-level simulator
///
/// Reads a raw program image (little-endian 16-bit instruction
/// words) from standard input, loads it into flash and steps the
/// core. Warnings and per-instruction traces go to standard error;
/// set RUST_LOG=debug for the trace.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Number of cycles to simulate (default: words loaded + 20)
    #[arg(long)]
    cycles: Option<u64>,

    /// Maximum number of program words to read from stdin
    #[arg(long, default_value_t = MAX_PROGRAM_WORDS)]
    max_words: usize,
}

fn main() -> Result<(), LoadError> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut mcu = atmega328p();
    let words = load_image(io::stdin().lock(), &mut mcu.bus, args.max_words)?;
    debug!("loaded {words} program words");

    let cycles = args.cycles.unwrap_or(words as u64 + 20);
    for _ in 0..cycles {
        mcu.step();
    }
    Ok(())
}
