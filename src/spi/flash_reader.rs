/// High-level SPI NOR flash reader
///
/// This module provides the identify / full-chip read sequence on top of a
/// session, using the backend abstraction to work with any SPI implementation.

use std::fmt;
use std::io::{ErrorKind, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::chip::JedecId;
use crate::config::DumpConfig;
use crate::error::Error;
use super::backend::SpiBackend;
use super::protocol::commands::{StatusFlags, JEDEC_ID_LEN};
use super::protocol::transaction::{ChunkPlan, Transaction, TransactionType};
use super::session::Session;

/// Reader lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Idle,
    Identifying,
    Verified,
    Mismatched,
    Reading,
    Complete,
    Aborted,
}

/// Outcome of the JEDEC identity check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    Verified(JedecId),
    Mismatched { expected: JedecId, actual: JedecId },
}

impl Identity {
    /// Identity the chip actually reported
    pub fn actual(&self) -> JedecId {
        match self {
            Self::Verified(id) => *id,
            Self::Mismatched { actual, .. } => *actual,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified(_))
    }
}

/// Bytes transferred so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub bytes_done: u64,
    pub total: u64,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.bytes_done as f64 * 100.0 / self.total as f64
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}% ({}/{} bytes)", self.percent(), self.bytes_done, self.total)
    }
}

/// Result of a completed full-chip read
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadSummary {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl ReadSummary {
    pub fn bytes_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return f64::INFINITY;
        }
        self.bytes as f64 / secs
    }

    pub fn mib_per_sec(&self) -> f64 {
        self.bytes_per_sec() / (1024.0 * 1024.0)
    }
}

/// Render a transfer rate with a binary unit prefix
pub fn human_rate(bytes_per_sec: f64) -> String {
    const UNITS: [&str; 4] = ["B/s", "KiB/s", "MiB/s", "GiB/s"];
    if !bytes_per_sec.is_finite() {
        return "-".to_string();
    }
    let mut value = bytes_per_sec;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

impl fmt::Display for ReadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes in {:.2} seconds ({})",
            self.bytes,
            self.elapsed.as_secs_f64(),
            human_rate(self.bytes_per_sec())
        )
    }
}

/// SPI NOR flash reader - works with any backend
pub struct FlashReader<B: SpiBackend> {
    session: Session<B>,
    config: DumpConfig,
    state: ReaderState,
    cursor: u32,
    cancel: Option<Arc<AtomicBool>>,
    capacity_conflict: Option<u64>,
}

impl<B: SpiBackend> FlashReader<B> {
    /// Create a new reader over a configured session
    pub fn new(session: Session<B>, config: DumpConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            session,
            config,
            state: ReaderState::Idle,
            cursor: 0,
            cancel: None,
            capacity_conflict: None,
        })
    }

    /// Stop a running read when `flag` becomes true
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Read the JEDEC ID and compare it with the configured chip
    ///
    /// A mismatch is returned as `Identity::Mismatched` and reading stays
    /// allowed, unless `strict_identity` is set.
    pub fn identify(&mut self) -> Result<Identity, Error> {
        if self.cancel_requested() {
            self.state = ReaderState::Aborted;
            return Err(Error::Cancelled { offset: 0 });
        }
        self.state = ReaderState::Identifying;
        let raw = match self.execute(&Transaction::read_id()) {
            Ok(raw) => raw,
            Err(e) => {
                self.state = ReaderState::Aborted;
                log::error!(
                    "Reading JEDEC ID failed; check SPI wiring (CLK, CS, MOSI, MISO, VCC, GND) and that WP#/HOLD# are pulled high"
                );
                return Err(e);
            }
        };

        let mut bytes = [0u8; JEDEC_ID_LEN];
        bytes.copy_from_slice(&raw);
        let actual = JedecId::from_bytes(bytes);
        let expected = self.config.chip.jedec;
        log::info!("Raw JEDEC ID: {}", hex::encode_upper(raw));
        log::info!(
            "Manufacturer ID: {:#04X}, Memory Type: {:#04X}, Capacity: {:#04X}",
            actual.manufacturer,
            actual.memory_type,
            actual.capacity
        );

        if actual.is_floating() {
            log::warn!("JEDEC ID {actual} looks like an undriven bus");
        }
        self.check_capacity(actual);

        if actual == expected {
            log::info!("JEDEC ID matches expected for {}", self.config.chip.name);
            self.state = ReaderState::Verified;
            return Ok(Identity::Verified(actual));
        }

        log::warn!(
            "JEDEC ID {actual} does NOT match expected {expected} for {}",
            self.config.chip.name
        );
        if self.config.strict_identity {
            self.state = ReaderState::Aborted;
            return Err(Error::IdentityMismatch { expected, actual });
        }
        self.state = ReaderState::Mismatched;
        Ok(Identity::Mismatched { expected, actual })
    }

    fn check_capacity(&mut self, id: JedecId) {
        self.capacity_conflict = id
            .implied_size()
            .filter(|implied| *implied != self.config.chip.size as u64);
        if let Some(implied) = self.capacity_conflict {
            log::warn!(
                "Capacity code {:#04X} implies {implied} bytes, configured size is {}",
                id.capacity,
                self.config.chip.size
            );
        }
    }

    /// Size implied by the last JEDEC ID when it disagrees with the configured size
    pub fn capacity_conflict(&self) -> Option<u64> {
        self.capacity_conflict
    }

    /// Read Status Register-1
    pub fn read_status(&mut self) -> Result<StatusFlags, Error> {
        let raw = self.execute(&Transaction::read_status())?;
        Ok(StatusFlags::from_bits_retain(raw[0]))
    }

    /// Status register read for diagnostics only; failures are logged
    pub fn check_status(&mut self) -> Option<StatusFlags> {
        let status = match self.read_status() {
            Ok(status) => status,
            Err(e) => {
                log::warn!("Reading status register failed: {e}");
                return None;
            }
        };
        log::info!("Status register: {:#04X}", status.bits());
        if status.contains(StatusFlags::BUSY) {
            log::warn!("Flash reports a write in progress, data may be inconsistent");
        }
        if status.is_protected() {
            log::info!("Block protection bits set, reads are unaffected");
        }
        Some(status)
    }

    /// Read the whole chip into `out`
    ///
    /// `on_progress` is called every `progress_interval` chunks and after the
    /// last one. On failure everything read so far stays in `out` and the
    /// error carries the offset of the chunk that failed.
    pub fn read_all<W: Write>(
        &mut self,
        out: &mut W,
        mut on_progress: impl FnMut(Progress),
    ) -> Result<ReadSummary, Error> {
        if !matches!(self.state, ReaderState::Verified | ReaderState::Mismatched) {
            return Err(Error::NotIdentified);
        }

        let total = self.config.chip.size;
        let plan = ChunkPlan::new(total, self.config.chunk_size)?;
        let chunk_count = plan.chunk_count();
        log::info!(
            "Reading {:.2} MiB from {} in {chunk_count} chunks of {} bytes",
            total as f64 / (1024.0 * 1024.0),
            self.config.chip.name,
            self.config.chunk_size
        );

        self.state = ReaderState::Reading;
        self.cursor = 0;
        let start = Instant::now();

        for (index, chunk) in plan.enumerate() {
            if self.cancel_requested() {
                self.abort(out);
                log::warn!("Read cancelled at offset {:#08X}", chunk.offset);
                return Err(Error::Cancelled { offset: chunk.offset });
            }

            let txn = Transaction::read_data(self.config.read_command, chunk.offset, chunk.len);
            let data = match self.execute_with_retry(&txn) {
                Ok(data) => data,
                Err(e) => {
                    self.abort(out);
                    log::error!("Error reading flash at offset {:#08X}: {e}", chunk.offset);
                    return Err(Error::ReadFailed {
                        offset: chunk.offset,
                        source: Box::new(e),
                    });
                }
            };

            if let Err(e) = self.write_chunk(out, &data) {
                self.abort(out);
                log::error!("Error writing output at offset {:#08X}: {e}", self.cursor);
                return Err(Error::OutputWrite {
                    offset: self.cursor,
                    source: e,
                });
            }
            debug_assert!(self.cursor <= total);

            if (index + 1) % self.config.progress_interval == 0 || index + 1 == chunk_count {
                on_progress(Progress {
                    bytes_done: self.cursor as u64,
                    total: total as u64,
                });
            }
        }

        out.flush()?;
        self.state = ReaderState::Complete;
        let summary = ReadSummary {
            bytes: self.cursor as u64,
            elapsed: start.elapsed(),
        };
        log::info!("Flash read complete: {summary}");
        Ok(summary)
    }

    /// Write `data`, advancing the cursor by every byte the writer accepts
    fn write_chunk<W: Write>(&mut self, out: &mut W, mut data: &[u8]) -> std::io::Result<()> {
        while !data.is_empty() {
            match out.write(data) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.cursor += n as u32;
                    data = &data[n..];
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn abort<W: Write>(&mut self, out: &mut W) {
        self.state = ReaderState::Aborted;
        if let Err(e) = out.flush() {
            log::warn!("Flushing partial image failed: {e}");
        }
    }

    fn cancel_requested(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// One transaction, checked for a complete response
    fn execute(&mut self, txn: &TransactionType) -> Result<Vec<u8>, Error> {
        let command = txn.command_bytes()?;
        let data = self.session.transact(&command, txn.response_len())?;
        if data.len() != txn.response_len() {
            return Err(Error::Transaction(format!(
                "short response: {} of {} bytes",
                data.len(),
                txn.response_len()
            )));
        }
        Ok(data)
    }

    fn execute_with_retry(&mut self, txn: &TransactionType) -> Result<Vec<u8>, Error> {
        let mut attempt = 0;
        loop {
            match self.execute(txn) {
                Ok(data) => return Ok(data),
                Err(e) if attempt < self.config.retries => {
                    attempt += 1;
                    let delay = self.config.retry_backoff * attempt;
                    log::warn!(
                        "{e}; retry {attempt}/{} in {} ms",
                        self.config.retries,
                        delay.as_millis()
                    );
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Bytes written to the output by the current or last read
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn config(&self) -> &DumpConfig {
        &self.config
    }

    /// Give the session back (the channel stays open)
    pub fn into_session(self) -> Session<B> {
        self.session
    }
}
