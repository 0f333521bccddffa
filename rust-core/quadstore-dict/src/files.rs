// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Append-only record file and the fixed-width id -> offset arena.
//
// Both files start with an 8-byte header: a 4-byte magic, a format version
// byte, and three reserved bytes.
//
// Data file records:   [u32 BE length][length bytes]
// Arena entries:       [u64 BE offset]     (entry n holds the offset of id n+1)

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock};

use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{DictError, DictResult};

pub const FILE_HEADER_SIZE: u64 = 8;
pub const FORMAT_VERSION: u8 = 1;
pub const ARENA_ENTRY_SIZE: u64 = 8;

/// Largest record body the data file accepts.
pub const MAX_RECORD_SIZE: u32 = 64 * 1024 * 1024;

pub const VALUES_MAGIC: [u8; 4] = *b"QVDT";
pub const VALUES_ID_MAGIC: [u8; 4] = *b"QVID";
pub const NAMESPACES_MAGIC: [u8; 4] = *b"QNDT";
pub const NAMESPACES_ID_MAGIC: [u8; 4] = *b"QNID";

/// Structural problem with a stored record. Reported, never repaired here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordFault {
    #[error("record at offset {offset} declares zero length")]
    ZeroLength { offset: u64 },

    #[error("record at offset {offset} declares {length} bytes but only {available} remain")]
    Overflow {
        offset: u64,
        length: u32,
        available: u64,
    },

    #[error("offset {offset} is outside the data file")]
    BadOffset { offset: u64 },

    #[error("read failed at offset {offset}: {message}")]
    Io { offset: u64, message: String },

    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("component {0} could not be resolved")]
    DanglingComponent(u32),
}

fn open_with_header(path: &Path, magic: [u8; 4]) -> DictResult<File> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    let len = file.metadata()?.len();
    if len < FILE_HEADER_SIZE {
        // New file, or a crash before the header reached disk.
        file.set_len(0)?;
        let mut header = [0u8; FILE_HEADER_SIZE as usize];
        header[..4].copy_from_slice(&magic);
        header[4] = FORMAT_VERSION;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header)?;
        file.sync_all()?;
        debug!(path = %path.display(), "Initialized dictionary file");
        return Ok(file);
    }

    let mut header = [0u8; FILE_HEADER_SIZE as usize];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut header)?;
    if header[..4] != magic || header[4] != FORMAT_VERSION {
        return Err(DictError::BadFileHeader {
            path: path.display().to_string(),
        });
    }
    Ok(file)
}

// ---------------------------------------------------------------------------
// DataFile
// ---------------------------------------------------------------------------

/// Append-only file of length-prefixed records.
pub struct DataFile {
    path: PathBuf,
    file: Mutex<File>,
    /// End of file; the next record is appended here.
    len: Mutex<u64>,
}

impl DataFile {
    pub fn open(path: impl AsRef<Path>, magic: [u8; 4]) -> DictResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_with_header(&path, magic)?;
        let len = file.metadata()?.len();
        Ok(Self {
            path,
            file: Mutex::new(file),
            len: Mutex::new(len),
        })
    }

    fn file(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append `body` and return the offset of its length prefix.
    pub fn append(&self, body: &[u8]) -> DictResult<u64> {
        if body.is_empty() || body.len() > MAX_RECORD_SIZE as usize {
            return Err(DictError::InvalidTerm(format!(
                "record body of {} bytes",
                body.len()
            )));
        }
        let mut len = self.len.lock().unwrap_or_else(|e| e.into_inner());
        let offset = *len;

        let mut buf = Vec::with_capacity(4 + body.len());
        buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
        buf.extend_from_slice(body);

        let mut file = self.file();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&buf)?;
        *len = offset + buf.len() as u64;
        Ok(offset)
    }

    /// Read the record at `offset`, validating its length prefix.
    pub fn read(&self, offset: u64) -> Result<Vec<u8>, RecordFault> {
        let io_fault = |e: std::io::Error| RecordFault::Io {
            offset,
            message: e.to_string(),
        };

        let mut file = self.file();
        let file_len = file.metadata().map_err(io_fault)?.len();
        if offset < FILE_HEADER_SIZE || offset + 4 > file_len {
            return Err(RecordFault::BadOffset { offset });
        }

        let mut prefix = [0u8; 4];
        file.seek(SeekFrom::Start(offset)).map_err(io_fault)?;
        file.read_exact(&mut prefix).map_err(io_fault)?;
        let length = u32::from_be_bytes(prefix);

        if length == 0 {
            return Err(RecordFault::ZeroLength { offset });
        }
        let available = file_len - offset - 4;
        if length > MAX_RECORD_SIZE || u64::from(length) > available {
            return Err(RecordFault::Overflow {
                offset,
                length,
                available,
            });
        }

        let mut body = vec![0u8; length as usize];
        file.read_exact(&mut body).map_err(io_fault)?;
        Ok(body)
    }

    pub fn sync(&self) -> DictResult<()> {
        self.file().sync_data()?;
        Ok(())
    }

    pub fn len(&self) -> u64 {
        *self.len.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= FILE_HEADER_SIZE
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ---------------------------------------------------------------------------
// OffsetArena
// ---------------------------------------------------------------------------

/// Fixed-width id -> offset table. Its length is the allocated id count.
///
/// Offsets are mirrored in memory so lookups never touch the file.
pub struct OffsetArena {
    path: PathBuf,
    file: Mutex<File>,
    offsets: RwLock<Vec<u64>>,
}

impl OffsetArena {
    /// Open the arena, dropping a torn trailing entry left by a crash.
    pub fn open(path: impl AsRef<Path>, magic: [u8; 4]) -> DictResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = open_with_header(&path, magic)?;

        let len = file.metadata()?.len();
        let body_len = len - FILE_HEADER_SIZE;
        let whole = body_len - body_len % ARENA_ENTRY_SIZE;
        if whole != body_len {
            warn!(
                path = %path.display(),
                torn_bytes = body_len - whole,
                "Truncating torn offset arena entry"
            );
            file.set_len(FILE_HEADER_SIZE + whole)?;
            file.sync_all()?;
        }

        let mut raw = vec![0u8; whole as usize];
        file.seek(SeekFrom::Start(FILE_HEADER_SIZE))?;
        file.read_exact(&mut raw)?;
        let offsets = raw
            .chunks_exact(ARENA_ENTRY_SIZE as usize)
            .map(|c| {
                let mut b = [0u8; 8];
                b.copy_from_slice(c);
                u64::from_be_bytes(b)
            })
            .collect::<Vec<_>>();

        Ok(Self {
            path,
            file: Mutex::new(file),
            offsets: RwLock::new(offsets),
        })
    }

    /// Append an entry; returns the new entry count.
    pub fn push(&self, offset: u64) -> DictResult<usize> {
        let mut offsets = self.offsets.write().unwrap_or_else(|e| e.into_inner());
        let position = FILE_HEADER_SIZE + offsets.len() as u64 * ARENA_ENTRY_SIZE;
        {
            let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
            file.seek(SeekFrom::Start(position))?;
            file.write_all(&offset.to_be_bytes())?;
        }
        offsets.push(offset);
        Ok(offsets.len())
    }

    /// Offset for zero-based slot `slot`.
    pub fn get(&self, slot: usize) -> Option<u64> {
        self.offsets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(slot)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.offsets.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sync(&self) -> DictResult<()> {
        self.file
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .sync_data()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
