// SPDX-License-Identifier: PMPL-1.0-or-later
//
// QuadStore Write-Ahead Log (WAL) crate
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Records every term id the dictionary mints before the term record is
// written to the value files. The log is the recovery source when a term
// record is later found damaged, and when value files are lost outright.
//
// # Architecture
//
// The WAL is a sequence of **segment files** in a dedicated directory. Each
// segment is an append-only binary file of length-prefixed, CRC32-protected
// entries, opened by a `Header` entry that names the owning store. Segments
// rotate when they exceed a configurable maximum size (default 64 MiB).
//
// ## On-disk entry format (all integers little-endian)
//
// ```text
// [4 bytes: entry_length (u32)]   -- length of everything after this field
// [4 bytes: crc32 checksum]       -- CRC32 of all bytes after this field
// [8 bytes: sequence (u64)]
// [8 bytes: timestamp (i64)]      -- Unix milliseconds UTC
// [1 byte:  operation]            -- 0=Header, 1=Mint, 2=Checkpoint
// [4 bytes: term_id (u32)]
// [4 bytes: payload_len (u32)]
// [M bytes: payload]
// ```
//
// ## Usage
//
// ```no_run
// use quadstore_wal::{Wal, WalConfig};
// use uuid::Uuid;
//
// let wal = Wal::open("/tmp/quadstore-wal", Uuid::new_v4(), WalConfig::default()).unwrap();
// let seq = wal.log_mint(1, br#"{"Iri":"http://example.org/a"}"#.to_vec()).unwrap();
// wal.await_durable(seq).unwrap();
//
// let record = wal.find_mint(1).unwrap();
// assert!(record.is_some());
// wal.close().unwrap();
// ```

pub mod durable;
pub mod entry;
pub mod error;
pub mod reader;
pub mod segment;
pub mod writer;

pub use durable::{Wal, WalConfig, DEFAULT_FLUSH_INTERVAL};
pub use entry::{WalEntry, WalOperation};
pub use error::{WalError, WalResult};
pub use reader::{WalEntryIterator, WalReader};
pub use segment::{SegmentHeader, SegmentInfo, DEFAULT_MAX_SEGMENT_SIZE};
pub use writer::{SyncMode, WalWriter};
