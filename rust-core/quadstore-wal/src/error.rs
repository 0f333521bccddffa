// SPDX-License-Identifier: PMPL-1.0-or-later
//
// QuadStore Write-Ahead Log - Error types
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Error conditions raised while appending, flushing, or replaying the term
// mint log.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An I/O error occurred while reading or writing a WAL segment file.
    #[error("WAL I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CRC32 checksum mismatch detected during entry validation.
    /// Either a disk fault or an incomplete write (crash mid-flush).
    #[error("CRC mismatch at sequence {sequence}: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        /// The sequence number of the corrupted entry.
        sequence: u64,
        /// The CRC32 value stored in the entry header.
        expected: u32,
        /// The CRC32 value computed from the entry body.
        actual: u32,
    },

    /// The entry header declares a length beyond the maximum entry size.
    #[error("Entry at sequence {sequence} declares length {length} bytes, exceeding maximum {max_length}")]
    EntryTooLarge {
        sequence: u64,
        length: u32,
        max_length: u32,
    },

    /// An invalid operation byte was encountered while deserializing an entry.
    #[error("Invalid operation byte: {0}")]
    InvalidOperation(u8),

    /// JSON serialization or deserialization failed for an entry payload.
    #[error("JSON error in WAL payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The WAL directory does not exist or is not accessible.
    #[error("WAL directory not found or inaccessible: {0}")]
    DirectoryNotFound(String),

    /// Attempted to read past the end of an entry body.
    #[error("Unexpected end of entry at offset {0}")]
    UnexpectedEof(u64),

    /// A segment header names a different store than the one opening it.
    #[error("WAL segment {segment} belongs to store {found}, expected {expected}")]
    StoreMismatch {
        segment: String,
        expected: Uuid,
        found: Uuid,
    },

    /// `await_durable` was asked for a sequence that was never appended.
    #[error("Sequence {requested} has not been appended (last appended {last_appended})")]
    SequenceNotAppended { requested: u64, last_appended: u64 },

    /// The background flusher failed an fsync; no further durability
    /// guarantees can be made for this WAL instance.
    #[error("WAL flush failed: {0}")]
    FlushFailed(String),

    /// The WAL has been closed.
    #[error("WAL is closed")]
    Closed,
}

/// Convenience type alias for WAL results.
pub type WalResult<T> = Result<T, WalError>;
