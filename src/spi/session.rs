//! SPI session over an exclusively owned bridge channel
//!
//! The session is created by `Session::open` and releases the channel when it
//! is dropped, whichever way the caller leaves.

use crate::error::Error;
use crate::target::BridgeTarget;
use super::backend::{LinkSettings, SpiBackend, SpiMode};

/// Something that can turn a target selector into an open backend
pub trait Bridge {
    type Backend: SpiBackend;

    /// Claim the channel named by `target`
    ///
    /// Implementations must report `Error::DeviceNotFound` and
    /// `Error::DeviceBusy` distinctly from other failures.
    fn open(&self, target: &BridgeTarget) -> Result<Self::Backend, Error>;
}

/// Open bridge channel plus the link settings applied to it
pub struct Session<B: SpiBackend> {
    backend: B,
    target: Option<BridgeTarget>,
    settings: Option<LinkSettings>,
}

impl<B: SpiBackend> Session<B> {
    /// Open the channel named by `target`
    pub fn open<T>(bridge: &T, target: &BridgeTarget) -> Result<Self, Error>
    where
        T: Bridge<Backend = B>,
    {
        log::info!("Opening bridge {target}");
        let backend = bridge.open(target)?;
        Ok(Self {
            backend,
            target: Some(target.clone()),
            settings: None,
        })
    }

    /// Wrap a backend that is already open (e.g. an embedded-hal bus)
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            target: None,
            settings: None,
        }
    }

    /// Set bus clock and SPI mode
    pub fn configure(&mut self, clock_hz: u32, mode: SpiMode) -> Result<LinkSettings, Error> {
        if clock_hz == 0 {
            return Err(Error::Configuration("clock rate must be non-zero".into()));
        }
        let actual = self.backend.configure(clock_hz, mode)?;
        let settings = LinkSettings { clock_hz: actual, mode };
        if actual != clock_hz {
            log::info!("Requested {clock_hz} Hz, bus runs at {actual} Hz");
        }
        log::info!("SPI link configured: {settings}");
        self.settings = Some(settings);
        Ok(settings)
    }

    /// One chip-select window: write `command`, read `response_len` bytes
    pub fn transact(&mut self, command: &[u8], response_len: usize) -> Result<Vec<u8>, Error> {
        if self.settings.is_none() {
            return Err(Error::Configuration("link used before configure".into()));
        }
        log::trace!("SPI tx {command:02X?}, rx {response_len} bytes");
        self.backend.transact(command, response_len)
    }

    pub fn settings(&self) -> Option<LinkSettings> {
        self.settings
    }

    pub fn target(&self) -> Option<&BridgeTarget> {
        self.target.as_ref()
    }
}

impl<B: SpiBackend> Drop for Session<B> {
    fn drop(&mut self) {
        match &self.target {
            Some(target) => log::info!("Closing bridge {target}"),
            None => log::info!("Closing SPI session"),
        }
        if let Err(e) = self.backend.release() {
            log::warn!("Releasing bridge failed: {e}");
        }
    }
}
