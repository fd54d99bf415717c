//! JEDEC identity and flash chip profiles

use std::fmt;
use std::str::FromStr;

use hex_literal::hex;

use crate::error::Error;
use crate::spi::protocol::commands::ADDRESS_LIMIT;

/// 3-byte JEDEC identity returned by the Read-ID opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JedecId {
    pub manufacturer: u8,
    pub memory_type: u8,
    pub capacity: u8,
}

impl JedecId {
    pub const fn from_bytes(bytes: [u8; 3]) -> Self {
        Self {
            manufacturer: bytes[0],
            memory_type: bytes[1],
            capacity: bytes[2],
        }
    }

    pub const fn to_bytes(self) -> [u8; 3] {
        [self.manufacturer, self.memory_type, self.capacity]
    }

    /// Size implied by the capacity byte (`2^capacity` bytes)
    ///
    /// Returns `None` for capacity codes outside the usual NOR range.
    pub fn implied_size(self) -> Option<u64> {
        match self.capacity {
            0x10..=0x20 => Some(1u64 << self.capacity),
            _ => None,
        }
    }

    /// All-zero and all-one responses mean nothing is driving MISO
    pub fn is_floating(self) -> bool {
        matches!(self.to_bytes(), [0x00, 0x00, 0x00] | [0xFF, 0xFF, 0xFF])
    }
}

impl fmt::Display for JedecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X} {:02X} {:02X}",
            self.manufacturer, self.memory_type, self.capacity
        )
    }
}

impl FromStr for JedecId {
    type Err = Error;

    /// Parse `1C7018`, `1c 70 18` or `0x1C7018`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s
            .trim()
            .trim_start_matches("0x")
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ':')
            .collect();
        let bytes = hex::decode(&digits)
            .map_err(|e| Error::Configuration(format!("invalid JEDEC ID '{s}': {e}")))?;
        let bytes: [u8; 3] = bytes.try_into().map_err(|_| {
            Error::Configuration(format!("JEDEC ID '{s}' must be exactly 3 bytes"))
        })?;
        Ok(Self::from_bytes(bytes))
    }
}

/// Expected identity and geometry of the target chip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipProfile {
    pub name: String,
    pub jedec: JedecId,
    pub size: u32,
}

struct KnownChip {
    name: &'static str,
    jedec: [u8; 3],
    size: u32,
}

const MIB: u32 = 1024 * 1024;

const KNOWN_CHIPS: &[KnownChip] = &[
    KnownChip { name: "EN25QH128A", jedec: hex!("1C7018"), size: 16 * MIB },
    KnownChip { name: "W25Q128", jedec: hex!("EF4018"), size: 16 * MIB },
    KnownChip { name: "W25Q64", jedec: hex!("EF4017"), size: 8 * MIB },
    KnownChip { name: "W25Q32", jedec: hex!("EF4016"), size: 4 * MIB },
    KnownChip { name: "MX25L12835F", jedec: hex!("C22018"), size: 16 * MIB },
];

impl KnownChip {
    fn profile(&self) -> ChipProfile {
        ChipProfile {
            name: self.name.to_string(),
            jedec: JedecId::from_bytes(self.jedec),
            size: self.size,
        }
    }
}

impl ChipProfile {
    /// Build a profile for a part that is not in the built-in table
    pub fn custom(name: impl Into<String>, jedec: JedecId, size: u32) -> Result<Self, Error> {
        let profile = Self { name: name.into(), jedec, size };
        profile.validate()?;
        Ok(profile)
    }

    /// Look up a built-in profile by part name (case-insensitive)
    pub fn by_name(name: &str) -> Option<Self> {
        KNOWN_CHIPS
            .iter()
            .find(|chip| chip.name.eq_ignore_ascii_case(name))
            .map(KnownChip::profile)
    }

    /// Look up a built-in profile by JEDEC identity
    pub fn by_jedec(jedec: JedecId) -> Option<Self> {
        KNOWN_CHIPS
            .iter()
            .find(|chip| JedecId::from_bytes(chip.jedec) == jedec)
            .map(KnownChip::profile)
    }

    /// Names of all built-in profiles
    pub fn known_names() -> impl Iterator<Item = &'static str> {
        KNOWN_CHIPS.iter().map(|chip| chip.name)
    }

    /// The chip must fit the 3-byte address space
    pub fn validate(&self) -> Result<(), Error> {
        if self.size == 0 {
            return Err(Error::Configuration(format!("{}: chip size is zero", self.name)));
        }
        if self.size > ADDRESS_LIMIT {
            return Err(Error::Configuration(format!(
                "{}: {} bytes exceeds the 24-bit address space ({} bytes)",
                self.name, self.size, ADDRESS_LIMIT
            )));
        }
        Ok(())
    }
}

impl Default for ChipProfile {
    fn default() -> Self {
        KNOWN_CHIPS[0].profile()
    }
}

impl fmt::Display for ChipProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (JEDEC {}, {} bytes)", self.name, self.jedec, self.size)
    }
}
