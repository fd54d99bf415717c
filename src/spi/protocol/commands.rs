/// Opcode and register definitions for 24-bit addressed SPI NOR flash

use crate::error::Error;

/// Size of the 24-bit address space (16 MiB)
pub const ADDRESS_LIMIT: u32 = 1 << 24;

/// Number of address bytes sent after a read opcode
pub const ADDRESS_LEN: usize = 3;

/// Length of the Read-ID response
pub const JEDEC_ID_LEN: usize = 3;

/// Value clocked out during dummy cycles
pub const DUMMY_BYTE: u8 = 0x00;

/// SPI NOR opcode (first byte of every command)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Read Data (0x03), no dummy cycles
    Read = 0x03,
    /// Read Status Register-1 (0x05)
    ReadStatus = 0x05,
    /// Fast Read (0x0B), one dummy byte after the address
    FastRead = 0x0B,
    /// Read JEDEC ID (0x9F)
    ReadJedecId = 0x9F,
}

impl Opcode {
    /// Get the 8-bit opcode value
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Dummy bytes between the address and the first data byte
    pub const fn dummy_bytes(self) -> usize {
        match self {
            Self::FastRead => 1,
            _ => 0,
        }
    }

    /// Whether a 3-byte address follows the opcode
    pub const fn has_address(self) -> bool {
        matches!(self, Self::Read | Self::FastRead)
    }

    /// Create from raw opcode value
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x03 => Some(Self::Read),
            0x05 => Some(Self::ReadStatus),
            0x0B => Some(Self::FastRead),
            0x9F => Some(Self::ReadJedecId),
            _ => None,
        }
    }
}

/// Opcode used for bulk data reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadCommand {
    /// Baseline Read (0x03)
    Read,
    /// Fast Read (0x0B) with one dummy byte
    #[default]
    FastRead,
}

impl ReadCommand {
    pub fn opcode(self) -> Opcode {
        match self {
            Self::Read => Opcode::Read,
            Self::FastRead => Opcode::FastRead,
        }
    }
}

/// Encode a flash offset as a 3-byte big-endian address
pub fn encode_address(offset: u32) -> Result<[u8; ADDRESS_LEN], Error> {
    if offset >= ADDRESS_LIMIT {
        return Err(Error::Configuration(format!(
            "offset {offset:#X} is outside the 24-bit address space"
        )));
    }
    let [_, hi, mid, lo] = offset.to_be_bytes();
    Ok([hi, mid, lo])
}

/// Decode a 3-byte big-endian address
pub fn decode_address(bytes: [u8; ADDRESS_LEN]) -> u32 {
    u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]])
}

bitflags::bitflags! {
    /// Status Register-1 bits
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct StatusFlags: u8 {
        /// Write/erase in progress
        const BUSY          = 1 << 0;
        const WRITE_ENABLED = 1 << 1;
        const BP0           = 1 << 2;
        const BP1           = 1 << 3;
        const BP2           = 1 << 4;
        const BP3           = 1 << 5;
        const BP4           = 1 << 6;
        /// Status register protect
        const SRP0          = 1 << 7;
    }
}

impl StatusFlags {
    /// Any block protect bit set
    pub fn is_protected(&self) -> bool {
        self.intersects(Self::BP0 | Self::BP1 | Self::BP2 | Self::BP3 | Self::BP4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_bits() {
        assert_eq!(Opcode::ReadJedecId.bits(), 0x9F);
        assert_eq!(Opcode::FastRead.bits(), 0x0B);
        assert_eq!(Opcode::FastRead.dummy_bytes(), 1);
        assert_eq!(Opcode::Read.dummy_bytes(), 0);
        assert!(!Opcode::ReadStatus.has_address());
    }

    #[test]
    fn test_opcode_from_bits() {
        assert_eq!(Opcode::from_bits(0x0B), Some(Opcode::FastRead));
        assert_eq!(Opcode::from_bits(0x9F), Some(Opcode::ReadJedecId));
        assert_eq!(Opcode::from_bits(0x02), None);
    }

    #[test]
    fn test_address_encoding() {
        assert_eq!(encode_address(0x123456).unwrap(), [0x12, 0x34, 0x56]);
        assert_eq!(encode_address(0).unwrap(), [0, 0, 0]);
        assert_eq!(encode_address(ADDRESS_LIMIT - 1).unwrap(), [0xFF, 0xFF, 0xFF]);
        assert!(encode_address(ADDRESS_LIMIT).is_err());
    }

    #[test]
    fn test_address_roundtrip_full_range() {
        for offset in 0..ADDRESS_LIMIT {
            assert_eq!(decode_address(encode_address(offset).unwrap()), offset);
        }
    }

    #[test]
    fn test_status_flags() {
        let status = StatusFlags::from_bits_truncate(0x1C);
        assert!(status.is_protected());
        assert!(!status.contains(StatusFlags::BUSY));
        assert!(!StatusFlags::from_bits_truncate(0x03).is_protected());
    }
}
