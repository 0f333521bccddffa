// SPDX-License-Identifier: PMPL-1.0-or-later
//
// QuadStore Write-Ahead Log - Reader for recovery
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The `WalReader` reads segment files and replays entries in sequence order.
// Besides full replay it answers the two questions the dictionary asks
// during recovery: "what was minted for id N?" and "which ids were minted
// past the end of the offset file?".

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::entry::{WalEntry, WalOperation};
use crate::error::{WalError, WalResult};
use crate::segment::{list_segments, scan_segment, SegmentHeader};

// ---------------------------------------------------------------------------
// WalReader
// ---------------------------------------------------------------------------

/// A reader that replays WAL entries from segment files on disk.
pub struct WalReader {
    wal_dir: PathBuf,
}

impl WalReader {
    /// Open a WAL directory for reading.
    ///
    /// Does not read any data until a query method is called.
    pub fn open(wal_dir: impl AsRef<Path>) -> WalResult<Self> {
        let wal_dir = wal_dir.as_ref().to_path_buf();
        if !wal_dir.is_dir() {
            return Err(WalError::DirectoryNotFound(wal_dir.display().to_string()));
        }
        Ok(Self { wal_dir })
    }

    /// Return an iterator over all entries with sequence number
    /// >= `from_sequence`, across all segment files, in order.
    ///
    /// Segments are read one at a time as the iterator advances. Corrupted
    /// entries are skipped with a warning, as is a segment that cannot be
    /// read. Truncated entries at the end of a segment are ignored.
    pub fn replay_from(&self, from_sequence: u64) -> WalResult<WalEntryIterator> {
        let segments = list_segments(&self.wal_dir)?;
        debug!(
            segments = segments.len(),
            from_sequence,
            "Replaying WAL entries"
        );
        Ok(WalEntryIterator {
            segments: segments.into_iter().map(|s| s.path).collect(),
            current: Vec::new().into_iter(),
            from_sequence,
        })
    }

    /// Replay all entries from the beginning of the WAL.
    pub fn replay_all(&self) -> WalResult<WalEntryIterator> {
        self.replay_from(0)
    }

    /// Find the sequence number of the last checkpoint entry in the WAL.
    pub fn find_last_checkpoint(&self) -> WalResult<Option<u64>> {
        for segment in list_segments(&self.wal_dir)?.iter().rev() {
            let scan = scan_segment(&segment.path)?;
            let last = scan
                .entries
                .iter()
                .filter(|e| e.operation == WalOperation::Checkpoint)
                .map(|e| e.sequence)
                .max();
            if last.is_some() {
                return Ok(last);
            }
        }
        Ok(None)
    }

    /// The most recent mint record for `term_id`, if any segment still holds
    /// one. Newer segments are searched first.
    pub fn find_mint(&self, term_id: u32) -> WalResult<Option<WalEntry>> {
        for segment in list_segments(&self.wal_dir)?.iter().rev() {
            let scan = scan_segment(&segment.path)?;
            let found = scan
                .entries
                .into_iter()
                .filter(|e| e.operation == WalOperation::Mint && e.term_id == term_id)
                .max_by_key(|e| e.sequence);
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    /// Latest mint record for every id greater than `term_id`, keyed by id.
    pub fn mints_after(&self, term_id: u32) -> WalResult<BTreeMap<u32, WalEntry>> {
        let mut mints = BTreeMap::new();
        for entry in self.replay_all()? {
            if entry.operation == WalOperation::Mint && entry.term_id > term_id {
                // Replay is in sequence order, so later records win.
                mints.insert(entry.term_id, entry);
            }
        }
        Ok(mints)
    }

    /// Id of the newest mint record, reading segments newest first and
    /// stopping at the first one that holds a mint.
    ///
    /// Ids are minted in log order, so this is the highest minted id
    /// without a full replay.
    pub fn last_minted_id(&self) -> WalResult<Option<u32>> {
        for segment in list_segments(&self.wal_dir)?.iter().rev() {
            let last = scan_segment(&segment.path)?
                .entries
                .iter()
                .filter(|e| e.operation == WalOperation::Mint)
                .max_by_key(|e| e.sequence)
                .map(|e| e.term_id);
            if last.is_some() {
                return Ok(last);
            }
        }
        Ok(None)
    }

    /// Highest term id any surviving mint record mentions.
    pub fn max_minted_id(&self) -> WalResult<Option<u32>> {
        Ok(self
            .replay_all()?
            .filter(|e| e.operation == WalOperation::Mint)
            .map(|e| e.term_id)
            .max())
    }

    /// Store id named by the segment headers.
    ///
    /// Fails with `StoreMismatch` if two segments disagree, and returns
    /// `None` for a WAL without readable headers.
    pub fn store_id(&self) -> WalResult<Option<Uuid>> {
        let mut seen: Option<Uuid> = None;
        for segment in &list_segments(&self.wal_dir)? {
            let scan = scan_segment(&segment.path)?;
            if let Some(header) = scan.header()? {
                match seen {
                    Some(expected) if expected != header.store_id => {
                        return Err(WalError::StoreMismatch {
                            segment: segment.file_name(),
                            expected,
                            found: header.store_id,
                        });
                    }
                    _ => seen = Some(header.store_id),
                }
            }
        }
        Ok(seen)
    }

    /// Headers of every segment that still has a readable one.
    pub fn segment_headers(&self) -> WalResult<Vec<SegmentHeader>> {
        let mut headers = Vec::new();
        for segment in &list_segments(&self.wal_dir)? {
            if let Some(header) = scan_segment(&segment.path)?.header()? {
                headers.push(header);
            }
        }
        Ok(headers)
    }

    /// Count the total number of valid entries across all segments.
    pub fn entry_count(&self) -> WalResult<usize> {
        let mut count = 0;
        for segment in &list_segments(&self.wal_dir)? {
            count += scan_segment(&segment.path)?.entries.len();
        }
        Ok(count)
    }

    /// Highest valid sequence number in the WAL.
    pub fn last_sequence(&self) -> WalResult<Option<u64>> {
        for segment in list_segments(&self.wal_dir)?.iter().rev() {
            if let Some(seq) = scan_segment(&segment.path)?.last_sequence() {
                return Ok(Some(seq));
            }
        }
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// WalEntryIterator
// ---------------------------------------------------------------------------

/// An iterator over WAL entries, yielded in sequence order. Holds at most
/// one segment's entries in memory.
pub struct WalEntryIterator {
    segments: VecDeque<PathBuf>,
    current: std::vec::IntoIter<WalEntry>,
    from_sequence: u64,
}

impl WalEntryIterator {
    fn load_next_segment(&mut self) -> bool {
        while let Some(path) = self.segments.pop_front() {
            match scan_segment(&path) {
                Ok(scan) => {
                    let mut entries: Vec<WalEntry> = scan
                        .entries
                        .into_iter()
                        .filter(|e| e.sequence >= self.from_sequence)
                        .collect();
                    entries.sort_by_key(|e| e.sequence);
                    self.current = entries.into_iter();
                    return true;
                }
                Err(e) => warn!(
                    segment = %path.display(),
                    error = %e,
                    "Skipping unreadable WAL segment during replay"
                ),
            }
        }
        false
    }
}

impl Iterator for WalEntryIterator {
    type Item = WalEntry;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.current.next() {
                return Some(entry);
            }
            if !self.load_next_segment() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::list_segments;
    use crate::writer::{SyncMode, WalWriter};
    use std::fs;
    use tempfile::TempDir;

    fn mint(term_id: u32, label: &str) -> WalEntry {
        WalEntry::mint(term_id, label.as_bytes().to_vec())
    }

    fn write_mints(dir: &Path, store_id: Uuid, labels: &[(u32, &str)]) {
        let mut writer = WalWriter::open(dir, store_id, SyncMode::Fsync).unwrap();
        for (id, label) in labels {
            writer.append(mint(*id, label)).unwrap();
        }
    }

    fn mint_ids(reader: &WalReader) -> Vec<u32> {
        reader
            .replay_all()
            .unwrap()
            .filter(|e| e.operation == WalOperation::Mint)
            .map(|e| e.term_id)
            .collect()
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        write_mints(dir.path(), Uuid::new_v4(), &[(1, "a"), (2, "b"), (3, "c")]);

        let reader = WalReader::open(dir.path()).unwrap();
        let entries: Vec<WalEntry> = reader.replay_all().unwrap().collect();

        // Header + three mints.
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].operation, WalOperation::Header);
        assert_eq!(entries[1].term_id, 1);
        assert_eq!(entries[1].payload, b"a");
        assert_eq!(entries[3].sequence, 4);
    }

    #[test]
    fn test_replay_from_sequence() {
        let dir = TempDir::new().unwrap();
        let labels: Vec<(u32, String)> = (1..=10).map(|i| (i, format!("t{i}"))).collect();
        let borrowed: Vec<(u32, &str)> = labels.iter().map(|(i, l)| (*i, l.as_str())).collect();
        write_mints(dir.path(), Uuid::new_v4(), &borrowed);

        let reader = WalReader::open(dir.path()).unwrap();
        let entries: Vec<WalEntry> = reader.replay_from(5).unwrap().collect();
        assert_eq!(entries.len(), 7); // sequences 5..=11
        assert_eq!(entries[0].sequence, 5);
    }

    #[test]
    fn test_find_last_checkpoint() {
        let dir = TempDir::new().unwrap();
        {
            let mut writer = WalWriter::open(dir.path(), Uuid::new_v4(), SyncMode::Fsync).unwrap();
            writer.append(mint(1, "a")).unwrap();
            writer.checkpoint().unwrap();
            writer.append(mint(2, "b")).unwrap();
            let cp = writer.checkpoint().unwrap();
            assert_eq!(cp, 5);
            writer.append(mint(3, "c")).unwrap();
        }

        let reader = WalReader::open(dir.path()).unwrap();
        assert_eq!(reader.find_last_checkpoint().unwrap(), Some(5));
    }

    #[test]
    fn test_no_checkpoint_returns_none() {
        let dir = TempDir::new().unwrap();
        write_mints(dir.path(), Uuid::new_v4(), &[(1, "a")]);
        let reader = WalReader::open(dir.path()).unwrap();
        assert_eq!(reader.find_last_checkpoint().unwrap(), None);
    }

    #[test]
    fn test_find_mint_returns_latest_record() {
        let dir = TempDir::new().unwrap();
        write_mints(dir.path(), Uuid::new_v4(), &[(1, "first"), (2, "x"), (1, "second")]);

        let reader = WalReader::open(dir.path()).unwrap();
        let found = reader.find_mint(1).unwrap().unwrap();
        assert_eq!(found.payload, b"second");
        assert!(reader.find_mint(9).unwrap().is_none());
    }

    #[test]
    fn test_mints_after_and_max_id() {
        let dir = TempDir::new().unwrap();
        write_mints(dir.path(), Uuid::new_v4(), &[(1, "a"), (2, "b"), (3, "c"), (4, "d")]);

        let reader = WalReader::open(dir.path()).unwrap();
        let after: Vec<u32> = reader.mints_after(2).unwrap().into_keys().collect();
        assert_eq!(after, vec![3, 4]);
        assert_eq!(reader.max_minted_id().unwrap(), Some(4));
    }

    #[test]
    fn test_store_id_from_headers() {
        let dir = TempDir::new().unwrap();
        let store_id = Uuid::new_v4();
        write_mints(dir.path(), store_id, &[(1, "a")]);
        let reader = WalReader::open(dir.path()).unwrap();
        assert_eq!(reader.store_id().unwrap(), Some(store_id));
        assert_eq!(reader.segment_headers().unwrap().len(), 1);
    }

    #[test]
    fn test_corrupted_entry_skipped() {
        let dir = TempDir::new().unwrap();
        write_mints(dir.path(), Uuid::new_v4(), &[(1, "good"), (2, "bad"), (3, "good")]);

        let segments = list_segments(dir.path()).unwrap();
        let mut data = fs::read(&segments[0].path).unwrap();

        // Skip the header and the first mint, then flip a CRC bit.
        let header_len = u32::from_le_bytes(data[0..4].try_into().unwrap()) as usize;
        let first = 4 + header_len;
        let first_len = u32::from_le_bytes(data[first..first + 4].try_into().unwrap()) as usize;
        let second = first + 4 + first_len;
        data[second + 4] ^= 0xFF;
        fs::write(&segments[0].path, &data).unwrap();

        let reader = WalReader::open(dir.path()).unwrap();
        assert_eq!(mint_ids(&reader), vec![1, 3]);
    }

    #[test]
    fn test_read_across_rotated_segments() {
        let dir = TempDir::new().unwrap();
        {
            let mut writer =
                WalWriter::open_with_max_size(dir.path(), Uuid::new_v4(), SyncMode::Fsync, 200)
                    .unwrap();
            for id in 1..=20 {
                writer.append(mint(id, "payload")).unwrap();
            }
        }

        assert!(list_segments(dir.path()).unwrap().len() > 1);

        let reader = WalReader::open(dir.path()).unwrap();
        assert_eq!(mint_ids(&reader), (1..=20).collect::<Vec<_>>());

        let sequences: Vec<u64> = reader.replay_all().unwrap().map(|e| e.sequence).collect();
        assert!(sequences.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(reader.last_sequence().unwrap(), sequences.last().copied());
        assert_eq!(reader.last_minted_id().unwrap(), Some(20));
    }

    #[test]
    fn test_last_minted_id_skips_segments_without_mints() {
        let dir = TempDir::new().unwrap();
        {
            let mut writer = WalWriter::open(dir.path(), Uuid::new_v4(), SyncMode::Fsync).unwrap();
            writer.append(mint(1, "a")).unwrap();
            writer.append(mint(2, "b")).unwrap();
            writer.rotate().unwrap();
            writer.checkpoint().unwrap();
        }
        let reader = WalReader::open(dir.path()).unwrap();
        assert!(list_segments(dir.path()).unwrap().len() > 1);
        assert_eq!(reader.last_minted_id().unwrap(), Some(2));
    }

    #[test]
    fn test_replay_count_matches_entry_count() {
        let dir = TempDir::new().unwrap();
        write_mints(dir.path(), Uuid::new_v4(), &[(1, "a"), (2, "b")]);
        let reader = WalReader::open(dir.path()).unwrap();
        assert_eq!(reader.replay_all().unwrap().count(), 3);
        assert_eq!(reader.entry_count().unwrap(), 3);
    }
}
