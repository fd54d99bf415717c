/// Transaction types and read planning for SPI NOR flash

use super::commands::{
    encode_address, ReadCommand, Opcode, ADDRESS_LEN, DUMMY_BYTE, JEDEC_ID_LEN,
};
use crate::error::Error;

/// Transaction type (hardware-independent representation)
///
/// Every transaction is one chip-select window: the command bytes go out
/// first, then `response_len()` bytes are clocked in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionType {
    /// Read the 3-byte JEDEC identity
    ReadId,
    /// Read Status Register-1
    ReadStatus,
    /// Read `len` bytes starting at `offset`
    ReadData {
        command: ReadCommand,
        offset: u32,
        len: usize,
    },
}

impl TransactionType {
    /// Get the opcode for this transaction
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::ReadId => Opcode::ReadJedecId,
            Self::ReadStatus => Opcode::ReadStatus,
            Self::ReadData { command, .. } => command.opcode(),
        }
    }

    /// Number of bytes clocked in after the command
    pub fn response_len(&self) -> usize {
        match self {
            Self::ReadId => JEDEC_ID_LEN,
            Self::ReadStatus => 1,
            Self::ReadData { len, .. } => *len,
        }
    }

    /// Opcode, address and dummy bytes, ready for a single transfer
    pub fn command_bytes(&self) -> Result<Vec<u8>, Error> {
        let opcode = self.opcode();
        let mut buf = Vec::with_capacity(1 + ADDRESS_LEN + opcode.dummy_bytes());
        buf.push(opcode.bits());
        if let Self::ReadData { offset, .. } = self {
            buf.extend_from_slice(&encode_address(*offset)?);
        }
        buf.resize(buf.len() + opcode.dummy_bytes(), DUMMY_BYTE);
        Ok(buf)
    }
}

/// Transaction builder for fluent API
pub struct Transaction;

impl Transaction {
    pub fn read_id() -> TransactionType {
        TransactionType::ReadId
    }

    pub fn read_status() -> TransactionType {
        TransactionType::ReadStatus
    }

    pub fn read_data(command: ReadCommand, offset: u32, len: usize) -> TransactionType {
        TransactionType::ReadData { command, offset, len }
    }
}

/// One chunk of a full-chip read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub offset: u32,
    pub len: usize,
}

/// Splits `[0, total)` into consecutive chunks of at most `chunk_size` bytes
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    next: u32,
    total: u32,
    chunk_size: usize,
}

impl ChunkPlan {
    pub fn new(total: u32, chunk_size: usize) -> Result<Self, Error> {
        if chunk_size == 0 {
            return Err(Error::Configuration("chunk size must be non-zero".into()));
        }
        Ok(Self { next: 0, total, chunk_size })
    }

    /// Number of chunks the plan yields
    pub fn chunk_count(&self) -> usize {
        (self.total as usize).div_ceil(self.chunk_size)
    }
}

impl Iterator for ChunkPlan {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.next >= self.total {
            return None;
        }
        let remaining = (self.total - self.next) as usize;
        let chunk = Chunk {
            offset: self.next,
            len: remaining.min(self.chunk_size),
        };
        self.next += chunk.len as u32;
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_read_id_transaction() {
        let txn = Transaction::read_id();
        assert_eq!(txn.opcode(), Opcode::ReadJedecId);
        assert_eq!(txn.command_bytes().unwrap(), vec![0x9F]);
        assert_eq!(txn.response_len(), 3);
    }

    #[test]
    fn test_fast_read_transaction() {
        let txn = Transaction::read_data(ReadCommand::FastRead, 0x123456, 4096);
        assert_eq!(txn.command_bytes().unwrap(), hex!("0B 12 34 56 00").to_vec());
        assert_eq!(txn.response_len(), 4096);
    }

    #[test]
    fn test_slow_read_transaction() {
        let txn = Transaction::read_data(ReadCommand::Read, 0xFFF000, 16);
        assert_eq!(txn.command_bytes().unwrap(), hex!("03 FF F0 00").to_vec());
    }

    #[test]
    fn test_read_status_transaction() {
        let txn = Transaction::read_status();
        assert_eq!(txn.command_bytes().unwrap(), vec![0x05]);
        assert_eq!(txn.response_len(), 1);
    }

    #[test]
    fn test_read_beyond_address_space() {
        let txn = Transaction::read_data(ReadCommand::FastRead, 1 << 24, 1);
        assert!(txn.command_bytes().is_err());
    }

    fn check_coverage(total: u32, chunk_size: usize) {
        let plan = ChunkPlan::new(total, chunk_size).unwrap();
        let expected_count = plan.chunk_count();
        let chunks: Vec<Chunk> = plan.collect();
        assert_eq!(chunks.len(), expected_count);

        let mut cursor = 0u32;
        for chunk in &chunks {
            assert_eq!(chunk.offset, cursor, "gap or overlap at {cursor:#X}");
            assert!(chunk.len > 0 && chunk.len <= chunk_size);
            cursor += chunk.len as u32;
        }
        assert_eq!(cursor, total);

        let remainder = total as usize % chunk_size;
        let last = chunks.last().unwrap().len;
        assert_eq!(last, if remainder == 0 { chunk_size } else { remainder });
    }

    #[test]
    fn test_chunk_plan_coverage() {
        for (total, chunk_size) in [
            (16 * 1024 * 1024, 4096),
            (16 * 1024 * 1024, 3000),
            (1000, 1000),
            (1000, 1),
            (1001, 10),
            (7, 3),
            (1 << 24, 1 << 24),
        ] {
            check_coverage(total, chunk_size);
        }
    }

    #[test]
    fn test_chunk_plan_rejects_zero() {
        assert!(ChunkPlan::new(4096, 0).is_err());
        assert_eq!(ChunkPlan::new(0, 4096).unwrap().count(), 0);
    }
}
