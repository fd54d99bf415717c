//! Dump configuration passed to the flash reader

use std::time::Duration;

use crate::chip::ChipProfile;
use crate::error::Error;

pub use crate::spi::protocol::commands::ReadCommand;

/// Default bytes per read transaction
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Default number of chunks between progress reports
pub const DEFAULT_PROGRESS_INTERVAL: usize = 10;

/// Upper bound on a single read transaction
pub const MAX_CHUNK_SIZE: usize = 1 << 20;

#[derive(Debug, Clone)]
pub struct DumpConfig {
    /// Expected identity and size of the chip
    pub chip: ChipProfile,
    pub chunk_size: usize,
    pub read_command: ReadCommand,
    /// Treat a JEDEC mismatch as fatal instead of a warning
    pub strict_identity: bool,
    /// Extra attempts per chunk before the read is aborted
    pub retries: u32,
    /// Delay before the first retry; grows linearly per attempt
    pub retry_backoff: Duration,
    /// Chunks between progress reports
    pub progress_interval: usize,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            chip: ChipProfile::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            read_command: ReadCommand::FastRead,
            strict_identity: false,
            retries: 0,
            retry_backoff: Duration::from_millis(50),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl DumpConfig {
    pub fn with_chip(chip: ChipProfile) -> Self {
        Self { chip, ..Self::default() }
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.chip.validate()?;
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::Configuration(format!(
                "chunk size {} out of range 1..={MAX_CHUNK_SIZE}",
                self.chunk_size
            )));
        }
        if self.progress_interval == 0 {
            return Err(Error::Configuration("progress interval must be non-zero".into()));
        }
        Ok(())
    }
}
