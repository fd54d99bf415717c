//! embedded-hal 1.0 SPI backend
//!
//! This backend uses `embedded_hal::spi::SpiDevice` (eh1). The HAL owns the
//! chip-select line, so every `transfer` maps onto one `transaction`.

use embedded_hal::spi::{Error as _, Operation, SpiDevice};

use crate::error::Error;
use super::{SpiBackend, SpiMode};

/// embedded-hal 1.0 SPI Backend
///
/// The bus clock and mode are fixed when the HAL bus is built; they are
/// passed in so `configure` can reject settings the bus does not run at.
pub struct Eh1SpiBackend<SPI> {
    spi: SPI,
    bus_clock_hz: u32,
    bus_mode: SpiMode,
}

impl<SPI> Eh1SpiBackend<SPI>
where
    SPI: SpiDevice,
{
    /// Create a new eh1 SPI backend
    pub fn new(spi: SPI, bus_clock_hz: u32, bus_mode: SpiMode) -> Self {
        Self {
            spi,
            bus_clock_hz,
            bus_mode,
        }
    }

    /// Give the SPI device back
    pub fn into_inner(self) -> SPI {
        self.spi
    }
}

impl<SPI> SpiBackend for Eh1SpiBackend<SPI>
where
    SPI: SpiDevice,
{
    fn configure(&mut self, clock_hz: u32, mode: SpiMode) -> Result<u32, Error> {
        if mode != self.bus_mode {
            return Err(Error::Configuration(format!(
                "bus is configured for {}, {} requested",
                self.bus_mode, mode
            )));
        }
        if clock_hz < self.bus_clock_hz {
            return Err(Error::Configuration(format!(
                "bus runs at {} Hz, above the requested {} Hz",
                self.bus_clock_hz, clock_hz
            )));
        }
        log::debug!("eh1 bus fixed at {} Hz, {}", self.bus_clock_hz, self.bus_mode);
        Ok(self.bus_clock_hz)
    }

    fn transfer(&mut self, command: &[u8], response: &mut [u8]) -> Result<(), Error> {
        self.spi
            .transaction(&mut [Operation::Write(command), Operation::Read(response)])
            .map_err(|e| Error::Transaction(format!("SPI device error: {}", e.kind())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::spi::{ErrorKind, ErrorType};
    use hex_literal::hex;

    /// Flash model that only answers complete chip-select windows
    struct FakeSpiFlash {
        memory: Vec<u8>,
        windows: usize,
        fail: bool,
    }

    impl ErrorType for FakeSpiFlash {
        type Error = ErrorKind;
    }

    impl SpiDevice for FakeSpiFlash {
        fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
            if self.fail {
                return Err(ErrorKind::Overrun);
            }
            self.windows += 1;
            let mut command = vec![];
            for op in operations {
                match op {
                    Operation::Write(data) => command.extend_from_slice(&data[..]),
                    Operation::Read(buf) => match command.as_slice() {
                        [0x9F] => buf.copy_from_slice(&hex!("EF 40 18")),
                        [0x0B, a, b, c, 0x00] => {
                            let start = u32::from_be_bytes([0, *a, *b, *c]) as usize;
                            let len = buf.len();
                            buf.copy_from_slice(&self.memory[start..start + len]);
                        }
                        _ => return Err(ErrorKind::Other),
                    },
                    _ => return Err(ErrorKind::Other),
                }
            }
            Ok(())
        }
    }

    fn backend() -> Eh1SpiBackend<FakeSpiFlash> {
        let memory = (0..=255u8).cycle().take(1024).collect();
        let spi = FakeSpiFlash { memory, windows: 0, fail: false };
        Eh1SpiBackend::new(spi, 1_000_000, SpiMode::Mode0)
    }

    #[test]
    fn test_jedec_in_one_window() {
        let mut backend = backend();
        assert_eq!(backend.transact(&[0x9F], 3).unwrap(), hex!("EF 40 18").to_vec());
        assert_eq!(backend.into_inner().windows, 1);
    }

    #[test]
    fn test_fast_read() {
        let mut backend = backend();
        let data = backend.transact(&hex!("0B 00 01 00 00"), 4).unwrap();
        assert_eq!(data, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_configure() {
        let mut backend = backend();
        assert_eq!(backend.configure(5_000_000, SpiMode::Mode0).unwrap(), 1_000_000);
        assert!(backend.configure(500_000, SpiMode::Mode0).is_err());
        assert!(backend.configure(5_000_000, SpiMode::Mode3).is_err());
    }

    #[test]
    fn test_device_error_maps_to_transaction() {
        let mut backend = backend();
        backend.spi.fail = true;
        assert!(matches!(backend.transact(&[0x9F], 3), Err(Error::Transaction(_))));
    }
}
