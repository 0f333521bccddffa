// SPDX-License-Identifier: PMPL-1.0-or-later
//
// QuadStore Write-Ahead Log - Segment management
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Each WAL segment is a single append-only file named `wal-{sequence:016}.log`
// where the number is the sequence of its first entry. That first entry is
// always a `Header` naming the store the segment belongs to.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::entry::{le_u32, WalEntry, WalOperation, MAX_ENTRY_SIZE};
use crate::error::{WalError, WalResult};

/// Default maximum segment size in bytes (64 MiB).
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 64 * 1024 * 1024;

/// The file extension used for WAL segment files.
pub const SEGMENT_EXTENSION: &str = "log";

/// The prefix used for WAL segment file names.
pub const SEGMENT_PREFIX: &str = "wal-";

/// Version of the segment layout written into every header.
pub const SEGMENT_FORMAT_VERSION: u32 = 1;

/// Metadata about a single WAL segment file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    /// The full path to the segment file on disk.
    pub path: PathBuf,

    /// The starting sequence number encoded in the file name.
    pub start_sequence: u64,

    /// Current file size in bytes.
    pub file_size: u64,
}

impl SegmentInfo {
    /// Returns `true` if the segment file has reached or exceeded the given
    /// maximum size in bytes.
    pub fn is_full(&self, max_size: u64) -> bool {
        self.file_size >= max_size
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "<unknown>".to_string())
    }
}

impl PartialOrd for SegmentInfo {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SegmentInfo {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.start_sequence.cmp(&other.start_sequence)
    }
}

/// Payload of the `Header` entry opening every segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentHeader {
    pub store_id: Uuid,
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub start_sequence: u64,
}

impl SegmentHeader {
    pub fn new(store_id: Uuid, start_sequence: u64) -> Self {
        Self {
            store_id,
            format_version: SEGMENT_FORMAT_VERSION,
            created_at: Utc::now(),
            start_sequence,
        }
    }

    /// Build the header entry that opens a segment.
    pub fn to_entry(&self) -> WalResult<WalEntry> {
        Ok(WalEntry {
            sequence: self.start_sequence,
            timestamp: self.created_at,
            operation: WalOperation::Header,
            term_id: 0,
            payload: serde_json::to_vec(self)?,
        })
    }

    /// Parse a header out of a `Header` entry. Other entries yield `None`.
    pub fn from_entry(entry: &WalEntry) -> WalResult<Option<Self>> {
        if entry.operation != WalOperation::Header {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&entry.payload)?))
    }
}

/// Build the canonical file name for a segment starting at the given
/// sequence number.
///
/// Format: `wal-0000000000000001.log`
pub fn segment_filename(start_sequence: u64) -> String {
    format!("{SEGMENT_PREFIX}{start_sequence:016}.{SEGMENT_EXTENSION}")
}

/// Build the full path for a segment file in the given WAL directory.
pub fn segment_path(wal_dir: &Path, start_sequence: u64) -> PathBuf {
    wal_dir.join(segment_filename(start_sequence))
}

/// Parse the starting sequence number from a segment file name.
pub fn parse_segment_filename(name: &str) -> Option<u64> {
    let stripped = name.strip_prefix(SEGMENT_PREFIX)?;
    let num_str = stripped.strip_suffix(&format!(".{SEGMENT_EXTENSION}"))?;
    num_str.parse::<u64>().ok()
}

/// Scan a WAL directory and return metadata for all segment files, sorted
/// by starting sequence number (ascending).
///
/// Non-segment files in the directory are silently ignored.
pub fn list_segments(wal_dir: &Path) -> WalResult<Vec<SegmentInfo>> {
    if !wal_dir.is_dir() {
        return Err(WalError::DirectoryNotFound(wal_dir.display().to_string()));
    }

    let mut segments = Vec::new();

    for dir_entry in fs::read_dir(wal_dir)? {
        let dir_entry = dir_entry?;
        let file_name = dir_entry.file_name();
        let name = file_name.to_string_lossy();

        if let Some(start_sequence) = parse_segment_filename(&name) {
            let metadata = dir_entry.metadata()?;
            segments.push(SegmentInfo {
                path: dir_entry.path(),
                start_sequence,
                file_size: metadata.len(),
            });
        }
    }

    segments.sort();

    debug!(
        count = segments.len(),
        dir = %wal_dir.display(),
        "Discovered WAL segments"
    );

    Ok(segments)
}

/// Remove segment files that lie entirely before `checkpoint_sequence`.
///
/// A segment is removable only when a later segment starts at or before the
/// checkpoint, so the segment holding the checkpoint is always kept.
/// Returns the number of segments removed.
pub fn prune_segments_before(wal_dir: &Path, checkpoint_sequence: u64) -> WalResult<usize> {
    let segments = list_segments(wal_dir)?;
    let mut removed = 0;

    for pair in segments.windows(2) {
        let (segment, next) = (&pair[0], &pair[1]);
        if next.start_sequence <= checkpoint_sequence {
            debug!(
                path = %segment.path.display(),
                start_sequence = segment.start_sequence,
                "Pruning WAL segment (before checkpoint {checkpoint_sequence})"
            );
            fs::remove_file(&segment.path)?;
            removed += 1;
        }
    }

    Ok(removed)
}

// ---------------------------------------------------------------------------
// Segment scanning
// ---------------------------------------------------------------------------

/// Result of reading one segment file front to back.
#[derive(Debug, Default)]
pub struct SegmentScan {
    /// Entries that passed CRC validation, in file order.
    pub entries: Vec<WalEntry>,
    /// Byte length of the prefix made of whole entries.
    pub valid_len: u64,
    /// Actual file length; larger than `valid_len` after a torn write.
    pub file_len: u64,
}

impl SegmentScan {
    pub fn header(&self) -> WalResult<Option<SegmentHeader>> {
        match self.entries.first() {
            Some(entry) => SegmentHeader::from_entry(entry),
            None => Ok(None),
        }
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.entries.iter().map(|e| e.sequence).max()
    }

    pub fn has_torn_tail(&self) -> bool {
        self.valid_len < self.file_len
    }
}

/// Read all valid entries from a single segment file.
///
/// Corrupted entries (CRC mismatch) are logged and skipped. Reading stops at
/// a zero or oversized length field, or at an entry running past the end of
/// the file; everything from there on counts as a torn tail.
pub fn scan_segment(path: &Path) -> WalResult<SegmentScan> {
    let data = fs::read(path)?;
    let mut entries = Vec::new();
    let mut offset = 0usize;
    let segment_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "<unknown>".to_string());

    while offset + 4 <= data.len() {
        let entry_length = le_u32(&data, offset)?;

        if entry_length == 0 {
            break;
        }

        if entry_length > MAX_ENTRY_SIZE {
            warn!(
                offset,
                entry_length,
                segment = %segment_name,
                "Entry declares unreasonable length, stopping segment read"
            );
            break;
        }

        let entry_end = offset + 4 + entry_length as usize;
        if entry_end > data.len() {
            debug!(
                offset,
                entry_length,
                available = data.len() - offset - 4,
                segment = %segment_name,
                "Truncated entry at end of segment (expected after crash)"
            );
            break;
        }

        match WalEntry::deserialize(&data[offset + 4..entry_end], entry_length) {
            Ok(entry) => entries.push(entry),
            Err(WalError::CrcMismatch {
                sequence,
                expected,
                actual,
            }) => {
                warn!(
                    sequence,
                    expected = format!("{expected:#010x}"),
                    actual = format!("{actual:#010x}"),
                    offset,
                    segment = %segment_name,
                    "Skipping corrupted WAL entry (CRC mismatch)"
                );
            }
            Err(other) => {
                warn!(
                    error = %other,
                    offset,
                    segment = %segment_name,
                    "Skipping unreadable WAL entry"
                );
            }
        }

        offset = entry_end;
    }

    Ok(SegmentScan {
        entries,
        valid_len: offset as u64,
        file_len: data.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    struct TestDir {
        _inner: TempDir,
        path: PathBuf,
    }

    impl TestDir {
        fn new() -> Self {
            let inner = TempDir::new().unwrap();
            let path = inner.path().to_path_buf();
            Self {
                _inner: inner,
                path,
            }
        }

        fn create_segment(&self, start_seq: u64, size_bytes: usize) {
            let file_path = segment_path(&self.path, start_seq);
            let mut file = File::create(file_path).unwrap();
            file.write_all(&vec![0u8; size_bytes]).unwrap();
        }
    }

    #[test]
    fn test_segment_filename_format() {
        assert_eq!(segment_filename(0), "wal-0000000000000000.log");
        assert_eq!(segment_filename(1), "wal-0000000000000001.log");
        assert_eq!(
            segment_filename(9_999_999_999_999_999),
            "wal-9999999999999999.log"
        );
    }

    #[test]
    fn test_parse_segment_filename() {
        assert_eq!(parse_segment_filename("wal-0000000000000042.log"), Some(42));
        assert_eq!(parse_segment_filename("not-a-segment.txt"), None);
        assert_eq!(parse_segment_filename("wal-.log"), None);
        assert_eq!(parse_segment_filename("wal-abc.log"), None);
    }

    #[test]
    fn test_list_segments_sorted() {
        let dir = TestDir::new();
        dir.create_segment(100, 1024);
        dir.create_segment(1, 512);
        dir.create_segment(50, 2048);
        File::create(dir.path.join("readme.txt")).unwrap();

        let segments = list_segments(&dir.path).unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].start_sequence, 1);
        assert_eq!(segments[0].file_size, 512);
        assert_eq!(segments[1].start_sequence, 50);
        assert_eq!(segments[2].start_sequence, 100);
    }

    #[test]
    fn test_list_segments_nonexistent_dir() {
        assert!(list_segments(Path::new("/nonexistent/wal/dir")).is_err());
    }

    #[test]
    fn test_prune_keeps_segment_containing_checkpoint() {
        let dir = TestDir::new();
        dir.create_segment(1, 100);
        dir.create_segment(50, 100);
        dir.create_segment(100, 100);

        // Checkpoint 75 lives in the segment starting at 50.
        let removed = prune_segments_before(&dir.path, 75).unwrap();
        assert_eq!(removed, 1);

        let remaining = list_segments(&dir.path).unwrap();
        assert_eq!(remaining[0].start_sequence, 50);
        assert_eq!(remaining.len(), 2);
    }

    #[test]
    fn test_prune_does_not_remove_only_segment() {
        let dir = TestDir::new();
        dir.create_segment(1, 100);
        assert_eq!(prune_segments_before(&dir.path, 999).unwrap(), 0);
        assert_eq!(list_segments(&dir.path).unwrap().len(), 1);
    }

    #[test]
    fn test_header_entry_roundtrip() {
        let header = SegmentHeader::new(Uuid::new_v4(), 12);
        let entry = header.to_entry().unwrap();
        assert_eq!(entry.sequence, 12);
        let parsed = SegmentHeader::from_entry(&entry).unwrap().unwrap();
        assert_eq!(parsed.store_id, header.store_id);
        assert_eq!(parsed.start_sequence, 12);
        assert!(SegmentHeader::from_entry(&WalEntry::checkpoint())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_scan_reports_torn_tail() {
        let dir = TestDir::new();
        let path = segment_path(&dir.path, 1);
        let mut first = WalEntry::mint(1, b"one".to_vec());
        first.sequence = 1;
        let mut second = WalEntry::mint(2, b"two".to_vec());
        second.sequence = 2;
        let first_bytes = first.serialize();
        let second_bytes = second.serialize();

        let mut data = first_bytes.clone();
        data.extend_from_slice(&second_bytes[..second_bytes.len() - 3]);
        fs::write(&path, &data).unwrap();

        let scan = scan_segment(&path).unwrap();
        assert_eq!(scan.entries.len(), 1);
        assert_eq!(scan.valid_len, first_bytes.len() as u64);
        assert!(scan.has_torn_tail());
        assert_eq!(scan.last_sequence(), Some(1));
    }
}
