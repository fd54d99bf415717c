//! Bridge adapter discovery
//!
//! Lists attached FTDI adapters with the identifier a `BridgeTarget` needs to
//! select them, and resolves a target against that list.

use std::fmt;

use crate::error::Error;
use crate::target::{BridgeModel, BridgeTarget, Channel};

/// One adapter channel as reported by the USB driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeInfo {
    /// Selector that opens exactly this channel
    pub open_id: String,
    pub description: String,
    /// EEPROM serial, without the per-channel suffix
    pub serial: String,
    pub channel: Channel,
    pub vendor_id: u16,
    pub product_id: u16,
    pub model: Option<BridgeModel>,
    /// Already opened by another process or bound to a kernel driver
    pub in_use: bool,
    /// Serial number exactly as the D2XX driver reports it
    pub(crate) driver_serial: String,
}

impl BridgeInfo {
    /// Build an entry from raw driver fields
    ///
    /// Multi-channel parts report one entry per channel with the channel
    /// letter appended to the serial; that suffix is folded into `channel`.
    pub fn from_driver(
        vendor_id: u16,
        product_id: u16,
        driver_serial: &str,
        description: &str,
        in_use: bool,
    ) -> Self {
        let model = BridgeModel::from_product_id(product_id);
        let (serial, channel) = match model {
            Some(model) if model.channel_count() > 1 => split_channel_suffix(driver_serial),
            _ => (driver_serial.to_string(), Channel::A),
        };
        let target = BridgeTarget {
            vendor_id: Some(vendor_id),
            product_id: Some(product_id),
            serial: serial.clone(),
            channel,
        };

        Self {
            open_id: target.to_string(),
            description: description.to_string(),
            serial,
            channel,
            vendor_id,
            product_id,
            model,
            in_use,
            driver_serial: driver_serial.to_string(),
        }
    }

    pub fn matches(&self, target: &BridgeTarget) -> bool {
        target.matches(self.vendor_id, self.product_id, &self.serial, self.channel)
    }

    /// Serial to hand to the D2XX open call
    pub fn driver_serial(&self) -> &str {
        &self.driver_serial
    }
}

fn split_channel_suffix(serial: &str) -> (String, Channel) {
    let mut chars = serial.chars();
    match chars.next_back().and_then(Channel::from_letter) {
        Some(channel) if !chars.as_str().is_empty() => (chars.as_str().to_string(), channel),
        _ => (serial.to_string(), Channel::A),
    }
}

impl fmt::Display for BridgeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "URL: {}, Description: {}, Serial: {}",
            self.open_id, self.description, self.serial
        )?;
        if let Some(model) = self.model {
            write!(f, ", Type: {model}")?;
        }
        if self.in_use {
            f.write_str(" [in use]")?;
        }
        Ok(())
    }
}

/// Find the adapter a target refers to
///
/// Fails with `DeviceNotFound` when nothing matches and with `DeviceBusy`
/// when the matching channel is already claimed.
pub fn resolve<'a>(target: &BridgeTarget, bridges: &'a [BridgeInfo]) -> Result<&'a BridgeInfo, Error> {
    let info = bridges
        .iter()
        .find(|info| info.matches(target))
        .ok_or_else(|| Error::DeviceNotFound(target.to_string()))?;
    if info.in_use {
        return Err(Error::DeviceBusy(target.to_string()));
    }
    Ok(info)
}

/// Enumerate attached FTDI adapters through the D2XX driver
#[cfg(feature = "ftdi")]
pub fn list_bridges() -> Result<Vec<BridgeInfo>, Error> {
    let devices = libftd2xx::list_devices()?;
    log::debug!("D2XX reports {} device(s)", devices.len());
    Ok(devices
        .iter()
        .map(|dev| {
            BridgeInfo::from_driver(
                dev.vendor_id,
                dev.product_id,
                &dev.serial_number,
                &dev.description,
                dev.port_open,
            )
        })
        .collect())
}
