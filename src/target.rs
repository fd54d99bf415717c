//! Bridge target selection
//!
//! A target names one adapter channel by serial number, optionally pinned to
//! a USB vendor/product pair. Accepted selector forms:
//!
//! * `FT1K78SG`
//! * `FT1K78SG/2`
//! * `ftdi://::FT1K78SG/1`
//! * `ftdi://0403:6014:FT1K78SG/1`

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

const URL_SCHEME: &str = "ftdi://";

/// FTDI vendor ID
pub const FTDI_VID: u16 = 0x0403;

/// MPSSE capable FTDI parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeModel {
    Ft232h,
    Ft2232h,
    Ft4232h,
}

impl BridgeModel {
    pub fn name(self) -> &'static str {
        match self {
            Self::Ft232h => "FT232H",
            Self::Ft2232h => "FT2232H",
            Self::Ft4232h => "FT4232H",
        }
    }

    /// USB product ID
    pub fn product_id(self) -> u16 {
        match self {
            Self::Ft232h => 0x6014,
            Self::Ft2232h => 0x6010,
            Self::Ft4232h => 0x6011,
        }
    }

    /// Channels exposed as separate D2XX devices
    pub fn channel_count(self) -> u8 {
        match self {
            Self::Ft232h => 1,
            Self::Ft2232h => 2,
            Self::Ft4232h => 4,
        }
    }

    /// Channels with an MPSSE engine (A, and B on dual/quad parts)
    pub fn mpsse_channels(self) -> u8 {
        self.channel_count().min(2)
    }

    pub fn from_product_id(pid: u16) -> Option<Self> {
        [Self::Ft232h, Self::Ft2232h, Self::Ft4232h]
            .into_iter()
            .find(|model| model.product_id() == pid)
    }

    /// Serial number the D2XX driver reports for one channel
    ///
    /// Multi-channel parts append the channel letter to the EEPROM serial.
    pub fn channel_serial(self, serial: &str, channel: Channel) -> String {
        if self.channel_count() > 1 {
            format!("{serial}{}", channel.letter())
        } else {
            serial.to_string()
        }
    }

    /// Check that `channel` can run SPI on this part
    pub fn check_channel(self, channel: Channel) -> Result<(), Error> {
        if channel.index() >= self.mpsse_channels() {
            return Err(Error::Configuration(format!(
                "channel {} of {} has no MPSSE engine",
                channel.letter(),
                self.name()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for BridgeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Adapter channel (interface A..D, numbered 1..4 in selectors)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Channel {
    #[default]
    A,
    B,
    C,
    D,
}

impl Channel {
    /// Zero-based channel index
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn letter(self) -> char {
        (b'A' + self.index()) as char
    }

    /// Channel from its one-based selector number
    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::A),
            2 => Some(Self::B),
            3 => Some(Self::C),
            4 => Some(Self::D),
            _ => None,
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'A' => Some(Self::A),
            'B' => Some(Self::B),
            'C' => Some(Self::C),
            'D' => Some(Self::D),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        self.index() + 1
    }
}

/// One adapter channel, fixed for the lifetime of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeTarget {
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub serial: String,
    pub channel: Channel,
}

impl BridgeTarget {
    pub fn new(serial: impl Into<String>, channel: Channel) -> Self {
        Self {
            vendor_id: None,
            product_id: None,
            serial: serial.into(),
            channel,
        }
    }

    /// Whether an enumerated adapter matches this target
    pub fn matches(&self, vendor_id: u16, product_id: u16, serial: &str, channel: Channel) -> bool {
        self.vendor_id.is_none_or(|vid| vid == vendor_id)
            && self.product_id.is_none_or(|pid| pid == product_id)
            && self.serial == serial
            && self.channel == channel
    }
}

fn parse_hex_id(field: &str, what: &str) -> Result<Option<u16>, Error> {
    if field.is_empty() {
        return Ok(None);
    }
    u16::from_str_radix(field.trim_start_matches("0x"), 16)
        .map(Some)
        .map_err(|e| Error::Configuration(format!("invalid {what} '{field}': {e}")))
}

impl FromStr for BridgeTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (url, body) = match s.strip_prefix(URL_SCHEME) {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (device, channel) = match body.rsplit_once('/') {
            Some((device, number)) => {
                let channel = number
                    .parse::<u8>()
                    .ok()
                    .and_then(Channel::from_number)
                    .ok_or_else(|| Error::Configuration(format!("invalid channel '{number}' in '{s}'")))?;
                (device, channel)
            }
            None => (body, Channel::default()),
        };

        let mut target = if url {
            let fields: Vec<&str> = device.split(':').collect();
            let [vid, pid, serial] = fields.as_slice() else {
                return Err(Error::Configuration(format!(
                    "expected ftdi://VID:PID:SERIAL/N, got '{s}'"
                )));
            };
            Self {
                vendor_id: parse_hex_id(vid, "vendor ID")?,
                product_id: parse_hex_id(pid, "product ID")?,
                serial: serial.to_string(),
                channel,
            }
        } else {
            Self::new(device, channel)
        };

        target.serial = target.serial.trim().to_string();
        if target.serial.is_empty() {
            return Err(Error::Configuration(format!("no serial number in target '{s}'")));
        }
        Ok(target)
    }
}

impl fmt::Display for BridgeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(URL_SCHEME)?;
        if let Some(vid) = self.vendor_id {
            write!(f, "{vid:04x}")?;
        }
        f.write_str(":")?;
        if let Some(pid) = self.product_id {
            write!(f, "{pid:04x}")?;
        }
        write!(f, ":{}/{}", self.serial, self.channel.number())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_serial() {
        let target: BridgeTarget = "FT1K78SG".parse().unwrap();
        assert_eq!(target, BridgeTarget::new("FT1K78SG", Channel::A));
        assert_eq!(target.to_string(), "ftdi://::FT1K78SG/1");
    }

    #[test]
    fn test_serial_with_channel() {
        let target: BridgeTarget = "FT1K78SG/2".parse().unwrap();
        assert_eq!(target.channel, Channel::B);
        assert!("FT1K78SG/5".parse::<BridgeTarget>().is_err());
        assert!("FT1K78SG/x".parse::<BridgeTarget>().is_err());
    }

    #[test]
    fn test_url_forms() {
        let target: BridgeTarget = "ftdi://::FT1K78SG/1".parse().unwrap();
        assert_eq!(target, BridgeTarget::new("FT1K78SG", Channel::A));

        let target: BridgeTarget = "ftdi://0403:6014:FT1K78SG/1".parse().unwrap();
        assert_eq!(target.vendor_id, Some(FTDI_VID));
        assert_eq!(target.product_id, Some(0x6014));
        assert_eq!(target.to_string(), "ftdi://0403:6014:FT1K78SG/1");

        let target: BridgeTarget = "ftdi://::FT1K78SG".parse().unwrap();
        assert_eq!(target.channel, Channel::A);

        assert!("ftdi://FT1K78SG/1".parse::<BridgeTarget>().is_err());
        assert!("ftdi://::/1".parse::<BridgeTarget>().is_err());
        assert!("ftdi://zz::FT1K78SG/1".parse::<BridgeTarget>().is_err());
    }

    #[test]
    fn test_matches() {
        let target: BridgeTarget = "ftdi://0403::FT1K78SG/1".parse().unwrap();
        assert!(target.matches(FTDI_VID, 0x6014, "FT1K78SG", Channel::A));
        assert!(!target.matches(0x1234, 0x6014, "FT1K78SG", Channel::A));
        assert!(!target.matches(FTDI_VID, 0x6014, "FT1K78SG", Channel::B));
        assert!(!target.matches(FTDI_VID, 0x6014, "OTHER", Channel::A));
    }

    #[test]
    fn test_model_channels() {
        assert_eq!(BridgeModel::from_product_id(0x6011), Some(BridgeModel::Ft4232h));
        assert_eq!(BridgeModel::Ft232h.channel_serial("FT1K78SG", Channel::A), "FT1K78SG");
        assert_eq!(BridgeModel::Ft2232h.channel_serial("FT9X", Channel::B), "FT9XB");
        assert!(BridgeModel::Ft4232h.check_channel(Channel::B).is_ok());
        assert!(BridgeModel::Ft4232h.check_channel(Channel::C).is_err());
        assert!(BridgeModel::Ft232h.check_channel(Channel::B).is_err());
        assert_eq!(Channel::from_letter('c'), Some(Channel::C));
    }
}
