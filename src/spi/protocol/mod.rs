/// Protocol module - hardware-independent SPI NOR flash command set
///
/// This module defines the opcodes, address encoding and read planning
/// without depending on any specific bridge backend (FTDI, embedded-hal, etc.)

pub mod commands;
pub mod transaction;
