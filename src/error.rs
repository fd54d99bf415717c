use thiserror::Error as DeriveError;
#[cfg(feature = "ftdi")]
use libftd2xx::{TimeoutError as FtdiTimeout, FtStatus, DeviceTypeError};

use crate::chip::JedecId;

const BUSY_HINT: &str = "The adapter is usually claimed by the ftdi_sio kernel module or another process. \
Unload or blacklist ftdi_sio (or unbind the interface), close other FTDI tools, and make sure \
your user may access the USB device (udev rule or elevated privileges).";

const NOT_FOUND_HINT: &str = "Check the USB cable and the serial/channel in the target selector. \
Run list_bridges to see the attached adapters.";

#[derive(DeriveError, Debug)]
pub enum Error {
    #[error("No bridge adapter matches {0}")]
    DeviceNotFound(String),

    #[error("Bridge adapter {0} is busy or not accessible")]
    DeviceBusy(String),

    #[error("Unsupported configuration: {0}")]
    Configuration(String),

    #[error("SPI transaction failed: {0}")]
    Transaction(String),

    #[cfg(feature = "ftdi")]
    #[error("FTDI Timeout")]
    DeviceTimeout(#[from] FtdiTimeout),

    #[cfg(feature = "ftdi")]
    #[error("FTDI Status: {0}")]
    FtStatus(#[from] FtStatus),

    #[cfg(feature = "ftdi")]
    #[error("FTDI Device Type Error: {0}")]
    DeviceTypeError(#[from] DeviceTypeError),

    #[error("Read aborted at offset {offset:#08X}: {source}")]
    ReadFailed {
        offset: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("Writing output failed at offset {offset:#08X}: {source}")]
    OutputWrite {
        offset: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("JEDEC ID mismatch: expected {expected}, got {actual}")]
    IdentityMismatch { expected: JedecId, actual: JedecId },

    #[error("Flash identity must be checked before reading")]
    NotIdentified,

    #[error("Read cancelled at offset {offset:#08X}")]
    Cancelled { offset: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Operator guidance for failures that are usually caused by the host setup
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Error::DeviceBusy(_) => Some(BUSY_HINT),
            Error::DeviceNotFound(_) => Some(NOT_FOUND_HINT),
            _ => None,
        }
    }

    /// Offset at which a bulk read stopped, if this error ended one
    pub fn failed_offset(&self) -> Option<u32> {
        match self {
            Error::ReadFailed { offset, .. }
            | Error::OutputWrite { offset, .. }
            | Error::Cancelled { offset } => Some(*offset),
            _ => None,
        }
    }

    /// Errors raised before any flash data was transferred
    pub fn is_link_error(&self) -> bool {
        matches!(
            self,
            Error::DeviceNotFound(_) | Error::DeviceBusy(_) | Error::Configuration(_)
        )
    }
}
