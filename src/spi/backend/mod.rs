/// Backend abstraction module - hardware-specific implementations
///
/// This module defines a common trait for SPI master backends and provides
/// implementations for both FTDI MPSSE and embedded-hal.

use std::fmt;

use crate::error::Error;

#[cfg(feature = "ftdi")]
pub mod ftdi;
pub mod eh1;

#[cfg(test)]
pub(crate) mod mock;

/// Default bus clock (5 MHz)
pub const DEFAULT_CLOCK_HZ: u32 = 5_000_000;

/// SPI mode as a (clock polarity, clock phase) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpiMode {
    /// CPOL=0, CPHA=0
    #[default]
    Mode0,
    /// CPOL=0, CPHA=1
    Mode1,
    /// CPOL=1, CPHA=0
    Mode2,
    /// CPOL=1, CPHA=1
    Mode3,
}

impl SpiMode {
    pub fn from_pair(cpol: bool, cpha: bool) -> Self {
        match (cpol, cpha) {
            (false, false) => Self::Mode0,
            (false, true) => Self::Mode1,
            (true, false) => Self::Mode2,
            (true, true) => Self::Mode3,
        }
    }

    /// Mode from its conventional number, `(cpol << 1) | cpha`
    pub fn from_index(index: u8) -> Result<Self, Error> {
        match index {
            0..=3 => Ok(Self::from_pair(index & 0b10 != 0, index & 0b01 != 0)),
            _ => Err(Error::Configuration(format!("SPI mode {index} does not exist"))),
        }
    }

    pub fn index(self) -> u8 {
        ((self.cpol() as u8) << 1) | self.cpha() as u8
    }

    /// Clock idles high
    pub fn cpol(self) -> bool {
        matches!(self, Self::Mode2 | Self::Mode3)
    }

    /// Data is sampled on the trailing clock edge
    pub fn cpha(self) -> bool {
        matches!(self, Self::Mode1 | Self::Mode3)
    }
}

impl fmt::Display for SpiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mode {} (CPOL={}, CPHA={})", self.index(), self.cpol() as u8, self.cpha() as u8)
    }
}

/// Bus clock and SPI mode applied to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    pub clock_hz: u32,
    pub mode: SpiMode,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            clock_hz: DEFAULT_CLOCK_HZ,
            mode: SpiMode::Mode0,
        }
    }
}

impl fmt::Display for LinkSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3} MHz, {}", self.clock_hz as f64 / 1_000_000.0, self.mode)
    }
}

/// Common SPI master trait
///
/// This trait abstracts the bridge operations needed by the flash protocol.
/// It allows the same reader logic to work with different hardware backends.
pub trait SpiBackend {
    /// Apply bus clock and SPI mode
    ///
    /// Returns the clock actually programmed, which never exceeds `clock_hz`.
    fn configure(&mut self, clock_hz: u32, mode: SpiMode) -> Result<u32, Error>;

    /// Execute one chip-select window
    ///
    /// Asserts chip select, clocks out `command` (opcode, address and dummy
    /// bytes), clocks in exactly `response.len()` bytes, then deasserts.
    fn transfer(&mut self, command: &[u8], response: &mut [u8]) -> Result<(), Error>;

    /// Same as `transfer`, allocating the response buffer
    fn transact(&mut self, command: &[u8], response_len: usize) -> Result<Vec<u8>, Error> {
        let mut response = vec![0u8; response_len];
        self.transfer(command, &mut response)?;
        Ok(response)
    }

    /// Return the bridge pins to an idle state before the handle is closed
    fn release(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

impl<B: SpiBackend + ?Sized> SpiBackend for Box<B> {
    fn configure(&mut self, clock_hz: u32, mode: SpiMode) -> Result<u32, Error> {
        (**self).configure(clock_hz, mode)
    }

    fn transfer(&mut self, command: &[u8], response: &mut [u8]) -> Result<(), Error> {
        (**self).transfer(command, response)
    }

    fn release(&mut self) -> Result<(), Error> {
        (**self).release()
    }
}
