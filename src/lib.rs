pub mod chip;
pub mod config;
pub mod enumerate;
pub mod error;
pub mod spi;
pub mod target;

pub use chip::{ChipProfile, JedecId};
pub use config::{DumpConfig, ReadCommand};
pub use enumerate::BridgeInfo;
pub use error::Error;
pub use spi::backend::{LinkSettings, SpiBackend, SpiMode};
pub use spi::flash_reader::{FlashReader, Identity, Progress, ReadSummary, ReaderState};
pub use spi::session::{Bridge, Session};
pub use target::{BridgeModel, BridgeTarget, Channel};

pub use embedded_hal::spi as eh_spi;
#[cfg(feature = "ftdi")]
pub use spi::backend::ftdi::{FtdiBackend, FtdiBridge};
