// SPDX-License-Identifier: PMPL-1.0-or-later
//
// QuadStore Write-Ahead Log - Append-only writer
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The `WalWriter` appends entries to the current segment file, rotates
// segments, and controls fsync behavior according to the configured
// `SyncMode`. It tracks the highest sequence known to be on stable storage
// so callers can wait for durability.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entry::{WalEntry, FIXED_FIELDS_SIZE, HEADER_PREFIX_SIZE};
use crate::error::{WalError, WalResult};
use crate::segment::{
    list_segments, scan_segment, segment_path, SegmentHeader, SegmentInfo,
    DEFAULT_MAX_SEGMENT_SIZE,
};

// ---------------------------------------------------------------------------
// SyncMode
// ---------------------------------------------------------------------------

/// Controls how aggressively the WAL writer calls `fsync` to flush data to
/// stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Call `fsync` after every single `append()`. Acknowledged writes
    /// survive a crash, at the cost of throughput.
    Fsync,

    /// Never call `fsync` on append; only explicit `sync()` calls force data
    /// to disk. The durable handle's flusher thread makes those calls on its
    /// interval.
    Async,
}

// ---------------------------------------------------------------------------
// WalWriter
// ---------------------------------------------------------------------------

/// An append-only writer for WAL segment files.
///
/// The writer maintains a monotonically increasing sequence counter and
/// rotates to a new segment file when the current one would exceed
/// `max_segment_size`.
pub struct WalWriter {
    wal_dir: PathBuf,

    /// Store instance every segment header is stamped with.
    store_id: Uuid,

    current_file: File,
    current_segment: SegmentInfo,

    /// Sequence number assigned to the next appended entry.
    next_sequence: u64,

    /// Highest sequence number known to be fsynced.
    synced_through: u64,

    max_segment_size: u64,
    sync_mode: SyncMode,
}

impl WalWriter {
    /// Open an existing WAL directory or initialize a new one.
    ///
    /// If the directory already contains segment files, the writer resumes
    /// after the last whole entry of the newest segment, truncating a torn
    /// tail left by a crash. A fresh directory gets a segment whose header
    /// carries sequence 1.
    pub fn open(wal_dir: impl AsRef<Path>, store_id: Uuid, sync_mode: SyncMode) -> WalResult<Self> {
        Self::open_with_max_size(wal_dir, store_id, sync_mode, DEFAULT_MAX_SEGMENT_SIZE)
    }

    /// Open the WAL directory with a custom maximum segment size.
    pub fn open_with_max_size(
        wal_dir: impl AsRef<Path>,
        store_id: Uuid,
        sync_mode: SyncMode,
        max_segment_size: u64,
    ) -> WalResult<Self> {
        let wal_dir = wal_dir.as_ref().to_path_buf();

        if !wal_dir.exists() {
            fs::create_dir_all(&wal_dir)?;
            info!(dir = %wal_dir.display(), "Created WAL directory");
        }

        let segments = list_segments(&wal_dir)?;

        let writer = match segments.last() {
            None => {
                let writer = Self::start_segment(&wal_dir, store_id, 1, sync_mode, max_segment_size)?;
                info!(%store_id, "Initialized fresh WAL");
                writer
            }
            Some(last) => Self::resume(&wal_dir, store_id, last.clone(), sync_mode, max_segment_size)?,
        };

        Ok(writer)
    }

    /// Append a new entry to the WAL.
    ///
    /// The entry's `sequence` field is overwritten with the next sequence
    /// number assigned by the writer. Returns the assigned sequence number.
    pub fn append(&mut self, mut entry: WalEntry) -> WalResult<u64> {
        let encoded_len = (HEADER_PREFIX_SIZE + FIXED_FIELDS_SIZE + entry.payload.len()) as u64;

        // A segment always takes at least one entry past its header, so an
        // oversized entry cannot cause endless rotation.
        let segment_has_entries = self.next_sequence > self.current_segment.start_sequence + 1;
        if segment_has_entries
            && self.current_segment.file_size + encoded_len > self.max_segment_size
        {
            self.rotate()?;
        }

        let sequence = self.next_sequence;
        entry.sequence = sequence;
        let bytes = entry.serialize();

        self.current_file.write_all(&bytes)?;
        self.current_segment.file_size += bytes.len() as u64;
        self.next_sequence += 1;

        self.maybe_sync()?;

        debug!(
            sequence,
            term_id = entry.term_id,
            operation = ?entry.operation,
            "Appended WAL entry"
        );

        Ok(sequence)
    }

    /// Force an immediate `fsync` of the current segment file, regardless
    /// of the configured `SyncMode`.
    pub fn sync(&mut self) -> WalResult<()> {
        self.current_file.sync_data()?;
        self.synced_through = self.next_sequence - 1;
        Ok(())
    }

    /// Write a checkpoint entry and fsync it.
    ///
    /// A checkpoint marks a point in the log where all preceding mint
    /// records are reflected in the dictionary's data and offset files.
    /// Returns the sequence number of the checkpoint entry.
    pub fn checkpoint(&mut self) -> WalResult<u64> {
        let sequence = self.append(WalEntry::checkpoint())?;
        self.sync()?;
        info!(sequence, "WAL checkpoint written");
        Ok(sequence)
    }

    /// Rotate to a new segment file.
    ///
    /// The current segment is fsynced, and a new segment file is created
    /// whose header takes the current `next_sequence` value.
    pub fn rotate(&mut self) -> WalResult<()> {
        self.sync()?;

        let new_start = self.next_sequence;
        let (file, segment) = create_segment_file(&self.wal_dir, self.store_id, new_start)?;

        info!(
            old_segment = %self.current_segment.path.display(),
            new_segment = %segment.path.display(),
            start_sequence = new_start,
            "Rotated WAL segment"
        );

        self.current_file = file;
        self.current_segment = segment;
        self.next_sequence = new_start + 1;
        self.sync()?;
        sync_directory(&self.wal_dir)?;

        Ok(())
    }

    /// Returns the sequence number that will be assigned to the next entry.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Highest sequence number known to be on stable storage.
    pub fn synced_through(&self) -> u64 {
        self.synced_through
    }

    pub fn store_id(&self) -> Uuid {
        self.store_id
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    /// Returns the path to the WAL directory.
    pub fn wal_dir(&self) -> &Path {
        &self.wal_dir
    }

    /// Returns a reference to the current segment's metadata.
    pub fn current_segment(&self) -> &SegmentInfo {
        &self.current_segment
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn start_segment(
        wal_dir: &Path,
        store_id: Uuid,
        start_sequence: u64,
        sync_mode: SyncMode,
        max_segment_size: u64,
    ) -> WalResult<Self> {
        let (file, segment) = create_segment_file(wal_dir, store_id, start_sequence)?;
        file.sync_data()?;
        sync_directory(wal_dir)?;
        Ok(Self {
            wal_dir: wal_dir.to_path_buf(),
            store_id,
            current_file: file,
            current_segment: segment,
            next_sequence: start_sequence + 1,
            synced_through: start_sequence,
            max_segment_size,
            sync_mode,
        })
    }

    fn resume(
        wal_dir: &Path,
        store_id: Uuid,
        mut last: SegmentInfo,
        sync_mode: SyncMode,
        max_segment_size: u64,
    ) -> WalResult<Self> {
        let scan = scan_segment(&last.path)?;

        match scan.header()? {
            Some(header) if header.store_id != store_id => {
                return Err(WalError::StoreMismatch {
                    segment: last.file_name(),
                    expected: store_id,
                    found: header.store_id,
                });
            }
            Some(_) => {}
            None if scan.entries.is_empty() => {
                // Crash between creating the file and writing its header.
                warn!(
                    segment = %last.path.display(),
                    "WAL segment has no readable entries, rewriting its header"
                );
                return Self::start_segment(
                    wal_dir,
                    store_id,
                    last.start_sequence,
                    sync_mode,
                    max_segment_size,
                );
            }
            None => {
                warn!(
                    segment = %last.path.display(),
                    "WAL segment header unreadable, resuming without store check"
                );
            }
        }

        if scan.has_torn_tail() {
            warn!(
                segment = %last.path.display(),
                valid_len = scan.valid_len,
                file_len = scan.file_len,
                "Truncating torn WAL tail"
            );
            let file = OpenOptions::new().write(true).open(&last.path)?;
            file.set_len(scan.valid_len)?;
            file.sync_all()?;
        }

        let last_sequence = scan.last_sequence().unwrap_or(last.start_sequence);
        last.file_size = scan.valid_len;
        let file = OpenOptions::new().append(true).open(&last.path)?;

        info!(
            segment = %last.path.display(),
            next_sequence = last_sequence + 1,
            "Resuming WAL"
        );

        Ok(Self {
            wal_dir: wal_dir.to_path_buf(),
            store_id,
            current_file: file,
            current_segment: last,
            next_sequence: last_sequence + 1,
            // Whatever survived the previous process is on disk by now.
            synced_through: last_sequence,
            max_segment_size,
            sync_mode,
        })
    }

    /// Conditionally call fsync based on the configured sync mode.
    fn maybe_sync(&mut self) -> WalResult<()> {
        match self.sync_mode {
            SyncMode::Fsync => self.sync()?,
            SyncMode::Async => {}
        }
        Ok(())
    }
}

/// Create a segment file and write its header entry.
fn create_segment_file(
    wal_dir: &Path,
    store_id: Uuid,
    start_sequence: u64,
) -> WalResult<(File, SegmentInfo)> {
    let path = segment_path(wal_dir, start_sequence);
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&path)?;
    let header = SegmentHeader::new(store_id, start_sequence).to_entry()?.serialize();
    file.write_all(&header)?;
    Ok((
        file,
        SegmentInfo {
            path,
            start_sequence,
            file_size: header.len() as u64,
        },
    ))
}

/// Persist directory entries (new or renamed files) on platforms that
/// support opening directories.
pub(crate) fn sync_directory(dir: &Path) -> WalResult<()> {
    #[cfg(unix)]
    {
        File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::WalReader;
    use tempfile::TempDir;

    fn test_entry(term_id: u32) -> WalEntry {
        WalEntry::mint(term_id, b"{}".to_vec())
    }

    #[test]
    fn test_open_fresh_directory() {
        let dir = TempDir::new().unwrap();
        let writer = WalWriter::open(dir.path(), Uuid::new_v4(), SyncMode::Async).unwrap();
        // Sequence 1 is the segment header.
        assert_eq!(writer.next_sequence(), 2);
        assert_eq!(writer.synced_through(), 1);
    }

    #[test]
    fn test_append_increments_sequence() {
        let dir = TempDir::new().unwrap();
        let mut writer = WalWriter::open(dir.path(), Uuid::new_v4(), SyncMode::Async).unwrap();

        assert_eq!(writer.append(test_entry(1)).unwrap(), 2);
        assert_eq!(writer.append(test_entry(2)).unwrap(), 3);
        assert_eq!(writer.append(test_entry(3)).unwrap(), 4);
        assert_eq!(writer.next_sequence(), 5);
    }

    #[test]
    fn test_sync_advances_synced_through() {
        let dir = TempDir::new().unwrap();
        let mut writer = WalWriter::open(dir.path(), Uuid::new_v4(), SyncMode::Async).unwrap();
        let seq = writer.append(test_entry(1)).unwrap();
        assert!(writer.synced_through() < seq);
        writer.sync().unwrap();
        assert_eq!(writer.synced_through(), seq);
    }

    #[test]
    fn test_fsync_mode_syncs_every_append() {
        let dir = TempDir::new().unwrap();
        let mut writer = WalWriter::open(dir.path(), Uuid::new_v4(), SyncMode::Fsync).unwrap();
        for id in 1..=5 {
            let seq = writer.append(test_entry(id)).unwrap();
            assert_eq!(writer.synced_through(), seq);
        }
    }

    #[test]
    fn test_checkpoint_writes_entry() {
        let dir = TempDir::new().unwrap();
        let mut writer = WalWriter::open(dir.path(), Uuid::new_v4(), SyncMode::Async).unwrap();

        writer.append(test_entry(1)).unwrap();
        writer.append(test_entry(2)).unwrap();
        let cp_seq = writer.checkpoint().unwrap();

        assert_eq!(cp_seq, 4);
        assert_eq!(writer.synced_through(), 4);
    }

    #[test]
    fn test_segment_rotation_writes_headers() {
        let dir = TempDir::new().unwrap();
        let store_id = Uuid::new_v4();
        let mut writer =
            WalWriter::open_with_max_size(dir.path(), store_id, SyncMode::Async, 256).unwrap();

        for id in 1..=20 {
            writer.append(test_entry(id)).unwrap();
        }

        let segments = list_segments(dir.path()).unwrap();
        assert!(segments.len() > 1, "expected rotation, got {}", segments.len());
        for segment in &segments {
            let scan = scan_segment(&segment.path).unwrap();
            let header = scan.header().unwrap().unwrap();
            assert_eq!(header.store_id, store_id);
            assert_eq!(header.start_sequence, segment.start_sequence);
        }
    }

    #[test]
    fn test_resume_after_close() {
        let dir = TempDir::new().unwrap();
        let store_id = Uuid::new_v4();

        {
            let mut writer = WalWriter::open(dir.path(), store_id, SyncMode::Fsync).unwrap();
            writer.append(test_entry(1)).unwrap();
            writer.append(test_entry(2)).unwrap();
            writer.append(test_entry(3)).unwrap();
        }

        let mut writer = WalWriter::open(dir.path(), store_id, SyncMode::Fsync).unwrap();
        let seq = writer.append(test_entry(4)).unwrap();
        assert_eq!(seq, 5, "Expected sequence 5 after resuming, got {seq}");
    }

    #[test]
    fn test_resume_truncates_torn_tail() {
        let dir = TempDir::new().unwrap();
        let store_id = Uuid::new_v4();

        {
            let mut writer = WalWriter::open(dir.path(), store_id, SyncMode::Fsync).unwrap();
            writer.append(test_entry(1)).unwrap();
        }

        // Simulate a crash halfway through the next entry.
        let segment = list_segments(dir.path()).unwrap().pop().unwrap();
        let partial = {
            let mut entry = test_entry(2);
            entry.sequence = 3;
            let bytes = entry.serialize();
            bytes[..bytes.len() / 2].to_vec()
        };
        let mut file = OpenOptions::new().append(true).open(&segment.path).unwrap();
        file.write_all(&partial).unwrap();
        drop(file);

        {
            let mut writer = WalWriter::open(dir.path(), store_id, SyncMode::Fsync).unwrap();
            assert_eq!(writer.append(test_entry(2)).unwrap(), 3);
        }

        let reader = WalReader::open(dir.path()).unwrap();
        let mints: Vec<u32> = reader
            .replay_all()
            .unwrap()
            .filter(|e| e.term_id != 0)
            .map(|e| e.term_id)
            .collect();
        assert_eq!(mints, vec![1, 2]);
    }

    #[test]
    fn test_resume_with_foreign_store_is_rejected() {
        let dir = TempDir::new().unwrap();
        {
            WalWriter::open(dir.path(), Uuid::new_v4(), SyncMode::Fsync).unwrap();
        }
        let result = WalWriter::open(dir.path(), Uuid::new_v4(), SyncMode::Fsync);
        assert!(matches!(result, Err(WalError::StoreMismatch { .. })));
    }

    #[test]
    fn test_open_creates_directory() {
        let dir = TempDir::new().unwrap();
        let wal_path = dir.path().join("subdir").join("wal");
        assert!(!wal_path.exists());

        let _writer = WalWriter::open(&wal_path, Uuid::new_v4(), SyncMode::Async).unwrap();
        assert!(wal_path.exists());
    }
}
