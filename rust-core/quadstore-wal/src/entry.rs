// SPDX-License-Identifier: PMPL-1.0-or-later
//
// QuadStore Write-Ahead Log - Entry types
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The WAL entry struct and its binary encoding. Every entry is length
// prefixed and CRC32-protected.
//
// On-disk binary format (all integers little-endian):
//   [4 bytes: entry_length (u32)]   -- length of everything after this field
//   [4 bytes: crc32 checksum]       -- CRC32 of all bytes after this field
//   [8 bytes: sequence (u64)]
//   [8 bytes: timestamp (i64)]      -- Unix milliseconds UTC
//   [1 byte:  operation]            -- 0=Header, 1=Mint, 2=Checkpoint
//   [4 bytes: term_id (u32)]        -- 0 unless operation is Mint
//   [4 bytes: payload_len (u32)]
//   [M bytes: payload]

use chrono::{DateTime, TimeZone, Utc};
use crc32fast::Hasher as Crc32Hasher;
use serde::{Deserialize, Serialize};

use crate::error::{WalError, WalResult};

/// Maximum allowed entry size: 16 MiB. Any entry declaring a larger size
/// is treated as corrupted.
pub const MAX_ENTRY_SIZE: u32 = 16 * 1024 * 1024;

/// Size of the fixed-length entry header prefix (entry_length + crc32).
pub const HEADER_PREFIX_SIZE: usize = 4 + 4;

/// Size of the fixed fields after the CRC (sequence + timestamp +
/// operation + term id + payload length).
pub const FIXED_FIELDS_SIZE: usize = 8 + 8 + 1 + 4 + 4;

// ---------------------------------------------------------------------------
// WalOperation
// ---------------------------------------------------------------------------

/// The kind of record carried by a WAL entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalOperation {
    /// First entry of every segment; payload is a JSON `SegmentHeader`.
    Header = 0,
    /// A term was assigned an id; payload is the encoded term.
    Mint = 1,
    /// Everything before this entry is reflected in the dictionary files.
    Checkpoint = 2,
}

impl WalOperation {
    /// Decode a single byte into a `WalOperation`.
    pub fn from_byte(byte: u8) -> WalResult<Self> {
        match byte {
            0 => Ok(Self::Header),
            1 => Ok(Self::Mint),
            2 => Ok(Self::Checkpoint),
            other => Err(WalError::InvalidOperation(other)),
        }
    }

    /// Encode this operation as a single byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

// ---------------------------------------------------------------------------
// WalEntry
// ---------------------------------------------------------------------------

/// A single entry in the write-ahead log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Monotonically increasing sequence number assigned by the WAL writer.
    pub sequence: u64,

    /// UTC timestamp of when the entry was created.
    pub timestamp: DateTime<Utc>,

    pub operation: WalOperation,

    /// Term id minted by this entry, or 0 for header/checkpoint entries.
    pub term_id: u32,

    /// Opaque payload bytes.
    pub payload: Vec<u8>,
}

impl WalEntry {
    /// A mint record for `term_id`. The sequence is assigned on append.
    pub fn mint(term_id: u32, payload: Vec<u8>) -> Self {
        Self {
            sequence: 0,
            timestamp: Utc::now(),
            operation: WalOperation::Mint,
            term_id,
            payload,
        }
    }

    /// An empty checkpoint marker.
    pub fn checkpoint() -> Self {
        Self {
            sequence: 0,
            timestamp: Utc::now(),
            operation: WalOperation::Checkpoint,
            term_id: 0,
            payload: Vec::new(),
        }
    }

    /// Serialize this entry to the on-disk binary format.
    ///
    /// Returns the complete byte buffer including the length prefix and CRC.
    pub fn serialize(&self) -> Vec<u8> {
        let mut inner = Vec::with_capacity(FIXED_FIELDS_SIZE + self.payload.len());

        inner.extend_from_slice(&self.sequence.to_le_bytes());
        inner.extend_from_slice(&self.timestamp.timestamp_millis().to_le_bytes());
        inner.push(self.operation.to_byte());
        inner.extend_from_slice(&self.term_id.to_le_bytes());
        inner.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        inner.extend_from_slice(&self.payload);

        let crc = compute_crc32(&inner);

        // [entry_length][crc32][inner...]
        let entry_length = (4 + inner.len()) as u32;
        let mut buffer = Vec::with_capacity(4 + entry_length as usize);
        buffer.extend_from_slice(&entry_length.to_le_bytes());
        buffer.extend_from_slice(&crc.to_le_bytes());
        buffer.extend_from_slice(&inner);

        buffer
    }

    /// Deserialize a WAL entry from a byte slice that starts immediately
    /// after the entry_length field (i.e., begins with the CRC32 bytes).
    pub fn deserialize(data: &[u8], entry_length: u32) -> WalResult<Self> {
        if entry_length > MAX_ENTRY_SIZE {
            return Err(WalError::EntryTooLarge {
                sequence: 0,
                length: entry_length,
                max_length: MAX_ENTRY_SIZE,
            });
        }
        let data = data
            .get(..entry_length as usize)
            .ok_or(WalError::UnexpectedEof(data.len() as u64))?;

        let stored_crc = le_u32(data, 0)?;
        let inner = &data[4..];

        let computed_crc = compute_crc32(inner);
        if stored_crc != computed_crc {
            return Err(WalError::CrcMismatch {
                sequence: le_u64(inner, 0).unwrap_or(0),
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        Self::parse_inner(inner)
    }

    /// Parse the inner content bytes (after CRC verification).
    fn parse_inner(inner: &[u8]) -> WalResult<Self> {
        let sequence = le_u64(inner, 0)?;
        let timestamp_millis = le_u64(inner, 8)? as i64;
        let timestamp = Utc
            .timestamp_millis_opt(timestamp_millis)
            .single()
            .unwrap_or_else(Utc::now);
        let operation = WalOperation::from_byte(
            *inner.get(16).ok_or(WalError::UnexpectedEof(16))?,
        )?;
        let term_id = le_u32(inner, 17)?;
        let payload_len = le_u32(inner, 21)? as usize;
        let payload = inner
            .get(FIXED_FIELDS_SIZE..FIXED_FIELDS_SIZE + payload_len)
            .ok_or(WalError::UnexpectedEof(FIXED_FIELDS_SIZE as u64))?
            .to_vec();

        Ok(Self {
            sequence,
            timestamp,
            operation,
            term_id,
            payload,
        })
    }
}

/// Compute a CRC32 checksum over the given byte slice using the IEEE
/// polynomial (same as zlib/gzip).
pub fn compute_crc32(data: &[u8]) -> u32 {
    let mut hasher = Crc32Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

pub(crate) fn le_u32(bytes: &[u8], offset: usize) -> WalResult<u32> {
    bytes
        .get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(WalError::UnexpectedEof(offset as u64))
}

pub(crate) fn le_u64(bytes: &[u8], offset: usize) -> WalResult<u64> {
    bytes
        .get(offset..offset + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or(WalError::UnexpectedEof(offset as u64))
}
