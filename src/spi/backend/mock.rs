//! Simulated SPI NOR flash for unit tests

use std::cell::RefCell;
use std::rc::Rc;

use super::{SpiBackend, SpiMode};
use crate::error::Error;
use crate::spi::protocol::commands::{decode_address, Opcode};

/// Deterministic content of the simulated flash
pub(crate) fn filler(address: u32) -> u8 {
    (address ^ (address >> 8) ^ (address >> 16).wrapping_mul(7)) as u8
}

/// What the tests can observe after the backend has moved into a session
#[derive(Debug, Default)]
pub(crate) struct MockLog {
    pub transactions: usize,
    pub releases: usize,
    pub configured: Option<(u32, SpiMode)>,
    pub read_offsets: Vec<u32>,
}

pub(crate) struct MockFlash {
    pub jedec: [u8; 3],
    pub status: u8,
    pub size: u32,
    pub max_clock_hz: u32,
    /// Reads starting at this offset fail
    pub fail_at: Option<u32>,
    /// Failures at `fail_at` before it starts answering again (`u32::MAX` = never)
    pub failures_left: u32,
    /// Status register reads fail
    pub fail_status: bool,
    pub log: Rc<RefCell<MockLog>>,
}

impl MockFlash {
    pub fn new(jedec: [u8; 3], size: u32) -> Self {
        Self {
            jedec,
            status: 0x00,
            size,
            max_clock_hz: 30_000_000,
            fail_at: None,
            failures_left: u32::MAX,
            fail_status: false,
            log: Rc::new(RefCell::new(MockLog::default())),
        }
    }

    pub fn failing_at(mut self, offset: u32, failures: u32) -> Self {
        self.fail_at = Some(offset);
        self.failures_left = failures;
        self
    }

    pub fn log(&self) -> Rc<RefCell<MockLog>> {
        Rc::clone(&self.log)
    }
}

impl SpiBackend for MockFlash {
    fn configure(&mut self, clock_hz: u32, mode: SpiMode) -> Result<u32, Error> {
        if clock_hz == 0 || clock_hz > self.max_clock_hz {
            return Err(Error::Configuration(format!("{clock_hz} Hz not supported")));
        }
        self.log.borrow_mut().configured = Some((clock_hz, mode));
        Ok(clock_hz)
    }

    fn transfer(&mut self, command: &[u8], response: &mut [u8]) -> Result<(), Error> {
        self.log.borrow_mut().transactions += 1;

        let opcode = command
            .first()
            .and_then(|bits| Opcode::from_bits(*bits))
            .ok_or_else(|| Error::Transaction(format!("unknown command {command:02X?}")))?;

        match opcode {
            Opcode::ReadJedecId => {
                for (dst, src) in response.iter_mut().zip(self.jedec.iter().cycle()) {
                    *dst = *src;
                }
            }
            Opcode::ReadStatus if self.fail_status => {
                return Err(Error::Transaction("status register not answering".into()));
            }
            Opcode::ReadStatus => response.fill(self.status),
            Opcode::Read | Opcode::FastRead => {
                let expected_len = 4 + opcode.dummy_bytes();
                if command.len() != expected_len {
                    return Err(Error::Transaction(format!(
                        "malformed read command {command:02X?}"
                    )));
                }
                let offset = decode_address([command[1], command[2], command[3]]);
                if self.fail_at == Some(offset) && self.failures_left > 0 {
                    if self.failures_left != u32::MAX {
                        self.failures_left -= 1;
                    }
                    return Err(Error::Transaction(format!("no response at {offset:#X}")));
                }
                self.log.borrow_mut().read_offsets.push(offset);
                for (i, byte) in response.iter_mut().enumerate() {
                    *byte = filler((offset + i as u32) % self.size);
                }
            }
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), Error> {
        self.log.borrow_mut().releases += 1;
        Ok(())
    }
}
