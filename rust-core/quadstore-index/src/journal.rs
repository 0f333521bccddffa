// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Commit journal (`txn.journal`).
//
// Written and fsynced before any ordering file is touched, deleted after
// every ordering carries the new generation. A journal found on open is
// re-applied to orderings still at the previous generation. A journal that
// fails its CRC was never completely written, so no ordering was touched
// and it is discarded.
//
// ```text
// [4 bytes: magic "QTXJ"]
// [2 bytes: version (u16 BE)] [2 bytes: reserved]
// [8 bytes: generation (u64 BE)]
// [8 bytes: op count (u64 BE)]
// [count x 17 bytes: op (1 = add, 2 = remove), s, p, o, c (u32 BE)]
// [4 bytes: CRC32 of everything above (u32 BE)]
// ```

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use tracing::warn;

use crate::error::{IndexError, IndexResult};
use crate::statement::Statement;

pub const JOURNAL_FILE: &str = "txn.journal";

const JOURNAL_MAGIC: [u8; 4] = *b"QTXJ";
const JOURNAL_VERSION: u16 = 1;
const PREFIX_SIZE: usize = 24;
const OP_SIZE: usize = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalOp {
    Add(Statement),
    Remove(Statement),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Journal {
    pub generation: u64,
    pub ops: Vec<JournalOp>,
}

impl Journal {
    pub fn new(generation: u64, added: &[Statement], removed: &[Statement]) -> Self {
        let ops = added
            .iter()
            .map(|s| JournalOp::Add(*s))
            .chain(removed.iter().map(|s| JournalOp::Remove(*s)))
            .collect();
        Self { generation, ops }
    }

    /// Split into `(added, removed)`.
    pub fn split(&self) -> (Vec<Statement>, Vec<Statement>) {
        let mut added = Vec::new();
        let mut removed = Vec::new();
        for op in &self.ops {
            match op {
                JournalOp::Add(s) => added.push(*s),
                JournalOp::Remove(s) => removed.push(*s),
            }
        }
        (added, removed)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PREFIX_SIZE + self.ops.len() * OP_SIZE + 4);
        buf.extend_from_slice(&JOURNAL_MAGIC);
        buf.extend_from_slice(&JOURNAL_VERSION.to_be_bytes());
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&self.generation.to_be_bytes());
        buf.extend_from_slice(&(self.ops.len() as u64).to_be_bytes());
        for op in &self.ops {
            let (tag, s) = match op {
                JournalOp::Add(s) => (1u8, s),
                JournalOp::Remove(s) => (2u8, s),
            };
            buf.push(tag);
            for id in [s.subject, s.predicate, s.object, s.context] {
                buf.extend_from_slice(&id.to_be_bytes());
            }
        }
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_be_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < PREFIX_SIZE + 4 {
            return Err(format!("{} bytes is shorter than a journal", bytes.len()));
        }
        let (body, crc_bytes) = bytes.split_at(bytes.len() - 4);
        let stored = u32::from_be_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        if crc32fast::hash(body) != stored {
            return Err("checksum mismatch".to_string());
        }
        if body[0..4] != JOURNAL_MAGIC {
            return Err("bad magic".to_string());
        }
        let version = u16::from_be_bytes([body[4], body[5]]);
        if version != JOURNAL_VERSION {
            return Err(format!("unsupported version {version}"));
        }
        let generation = be_u64(&body[8..16]);
        let count = be_u64(&body[16..24]) as usize;
        let ops_bytes = &body[PREFIX_SIZE..];
        if ops_bytes.len() != count.saturating_mul(OP_SIZE) {
            return Err(format!("{count} ops do not fit {} bytes", ops_bytes.len()));
        }

        let mut ops = Vec::with_capacity(count);
        for chunk in ops_bytes.chunks_exact(OP_SIZE) {
            let statement = Statement::new(
                be_u32(&chunk[1..5]),
                be_u32(&chunk[5..9]),
                be_u32(&chunk[9..13]),
                be_u32(&chunk[13..17]),
            );
            ops.push(match chunk[0] {
                1 => JournalOp::Add(statement),
                2 => JournalOp::Remove(statement),
                other => return Err(format!("unknown op {other}")),
            });
        }
        Ok(Self { generation, ops })
    }

    /// Write to `dir/txn.journal` and fsync the file and directory.
    pub fn write(&self, dir: &Path) -> IndexResult<()> {
        let path = dir.join(JOURNAL_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        file.write_all(&self.encode())?;
        file.sync_all()?;
        crate::file::sync_dir(dir)?;
        Ok(())
    }

    /// Load the journal in `dir`. A torn journal is deleted and reported as
    /// absent.
    pub fn read(dir: &Path) -> IndexResult<Option<Self>> {
        let path = dir.join(JOURNAL_FILE);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(IndexError::Io(e)),
        };
        match Self::decode(&bytes) {
            Ok(journal) => Ok(Some(journal)),
            Err(reason) => {
                warn!(path = %path.display(), %reason, "Discarding incomplete commit journal");
                Self::remove(dir)?;
                Ok(None)
            }
        }
    }

    pub fn remove(dir: &Path) -> IndexResult<()> {
        match fs::remove_file(dir.join(JOURNAL_FILE)) {
            Ok(()) => crate::file::sync_dir(dir),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IndexError::Journal(format!("remove: {e}"))),
        }
    }
}

fn be_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    u32::from_be_bytes(raw)
}

fn be_u64(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    u64::from_be_bytes(raw)
}
