// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sorted index files, one per ordering.
//
// ```text
// [4 bytes: magic "QIDX"]
// [2 bytes: format version (u16 BE)]
// [2 bytes: reserved]
// [4 bytes: ordering code, ASCII]
// [4 bytes: CRC32 of all record bytes (u32 BE)]
// [8 bytes: commit generation (u64 BE)]
// [8 bytes: record count (u64 BE)]
// [count x 16 bytes: keys, ascending, no duplicates]
// ```
//
// Files are never modified in place. A new generation is written to
// `<name>.tmp`, fsynced, and renamed over the old file, so an open reader
// keeps its snapshot.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{IndexError, IndexResult};
use crate::ordering::{IndexKey, IndexOrdering, KEY_SIZE};

pub const INDEX_MAGIC: [u8; 4] = *b"QIDX";
pub const INDEX_FORMAT_VERSION: u16 = 1;
pub const INDEX_HEADER_SIZE: u64 = 32;

/// Decoded index file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub code: [u8; 4],
    pub checksum: u32,
    pub generation: u64,
    pub count: u64,
}

impl IndexHeader {
    fn encode(&self) -> [u8; INDEX_HEADER_SIZE as usize] {
        let mut bytes = [0u8; INDEX_HEADER_SIZE as usize];
        bytes[0..4].copy_from_slice(&INDEX_MAGIC);
        bytes[4..6].copy_from_slice(&INDEX_FORMAT_VERSION.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.code);
        bytes[12..16].copy_from_slice(&self.checksum.to_be_bytes());
        bytes[16..24].copy_from_slice(&self.generation.to_be_bytes());
        bytes[24..32].copy_from_slice(&self.count.to_be_bytes());
        bytes
    }

    fn decode(bytes: &[u8; INDEX_HEADER_SIZE as usize]) -> Result<Self, String> {
        if bytes[0..4] != INDEX_MAGIC {
            return Err("bad magic".to_string());
        }
        let version = u16::from_be_bytes([bytes[4], bytes[5]]);
        if version != INDEX_FORMAT_VERSION {
            return Err(format!("unsupported format version {version}"));
        }
        let mut code = [0u8; 4];
        code.copy_from_slice(&bytes[8..12]);
        let mut word = [0u8; 4];
        word.copy_from_slice(&bytes[12..16]);
        let mut long = [0u8; 8];
        long.copy_from_slice(&bytes[16..24]);
        let generation = u64::from_be_bytes(long);
        long.copy_from_slice(&bytes[24..32]);
        Ok(Self {
            code,
            checksum: u32::from_be_bytes(word),
            generation,
            count: u64::from_be_bytes(long),
        })
    }
}

fn bad_file(path: &Path, reason: impl Into<String>) -> IndexError {
    IndexError::BadFile {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

/// Read and structurally check the header of `path`: magic, version,
/// ordering code and a file length that matches the record count.
pub fn read_header(path: &Path, ordering: &IndexOrdering) -> IndexResult<IndexHeader> {
    let mut file = File::open(path)?;
    let header = read_header_from(&mut file, path)?;
    if header.code != ordering.code_bytes() {
        return Err(bad_file(
            path,
            format!(
                "ordering code {:?}, expected {}",
                String::from_utf8_lossy(&header.code),
                ordering
            ),
        ));
    }
    let expected_len = INDEX_HEADER_SIZE + header.count * KEY_SIZE as u64;
    let actual_len = file.metadata()?.len();
    if actual_len != expected_len {
        return Err(bad_file(
            path,
            format!("length {actual_len}, header promises {expected_len}"),
        ));
    }
    Ok(header)
}

fn read_header_from(file: &mut File, path: &Path) -> IndexResult<IndexHeader> {
    let mut bytes = [0u8; INDEX_HEADER_SIZE as usize];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut bytes).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => bad_file(path, "truncated header"),
        _ => IndexError::Io(e),
    })?;
    IndexHeader::decode(&bytes).map_err(|reason| bad_file(path, reason))
}

/// Recompute the CRC over the records of `path` and compare it with the
/// header. Also checks that keys are strictly ascending.
pub fn verify_records(path: &Path, header: &IndexHeader) -> IndexResult<()> {
    let mut reader = BufReader::new(File::open(path)?);
    reader.seek(SeekFrom::Start(INDEX_HEADER_SIZE))?;
    let mut hasher = crc32fast::Hasher::new();
    let mut previous: Option<IndexKey> = None;
    let mut key = [0u8; KEY_SIZE];
    for _ in 0..header.count {
        reader.read_exact(&mut key)?;
        hasher.update(&key);
        if previous.is_some_and(|p| p >= key) {
            return Err(bad_file(path, "keys out of order"));
        }
        previous = Some(key);
    }
    let checksum = hasher.finalize();
    if checksum != header.checksum {
        return Err(bad_file(
            path,
            format!(
                "checksum mismatch: header {:#010x}, records {:#010x}",
                header.checksum, checksum
            ),
        ));
    }
    Ok(())
}

/// Iterate every key of a file from the start.
pub fn read_all_keys(path: &Path) -> IndexResult<impl Iterator<Item = IndexResult<IndexKey>>> {
    let mut file = File::open(path)?;
    let header = read_header_from(&mut file, path)?;
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(INDEX_HEADER_SIZE))?;
    let mut remaining = header.count;
    Ok(std::iter::from_fn(move || {
        if remaining == 0 {
            return None;
        }
        remaining -= 1;
        let mut key = [0u8; KEY_SIZE];
        Some(reader.read_exact(&mut key).map(|_| key).map_err(IndexError::from))
    }))
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Streams ascending keys into `<path>.tmp`; `finish` renames it into place.
pub struct IndexFileWriter {
    target: PathBuf,
    tmp: PathBuf,
    out: BufWriter<File>,
    hasher: crc32fast::Hasher,
    code: [u8; 4],
    generation: u64,
    count: u64,
    last: Option<IndexKey>,
}

impl IndexFileWriter {
    pub fn create(target: &Path, ordering: &IndexOrdering, generation: u64) -> IndexResult<Self> {
        let tmp = target.with_extension("dat.tmp");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        let mut out = BufWriter::new(file);
        // Placeholder; the real header is written by `finish`.
        out.write_all(&[0u8; INDEX_HEADER_SIZE as usize])?;
        Ok(Self {
            target: target.to_path_buf(),
            tmp,
            out,
            hasher: crc32fast::Hasher::new(),
            code: ordering.code_bytes(),
            generation,
            count: 0,
            last: None,
        })
    }

    /// Append a key. Duplicates of the previous key are dropped.
    pub fn push(&mut self, key: &IndexKey) -> IndexResult<()> {
        match self.last {
            Some(last) if last == *key => return Ok(()),
            Some(last) if last > *key => {
                return Err(bad_file(&self.tmp, "keys pushed out of order"));
            }
            _ => {}
        }
        self.out.write_all(key)?;
        self.hasher.update(key);
        self.count += 1;
        self.last = Some(*key);
        Ok(())
    }

    /// Write the header, fsync and rename over the target.
    pub fn finish(self) -> IndexResult<IndexHeader> {
        let header = IndexHeader {
            code: self.code,
            checksum: self.hasher.finalize(),
            generation: self.generation,
            count: self.count,
        };
        let mut file = self
            .out
            .into_inner()
            .map_err(|e| IndexError::Io(e.into_error()))?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header.encode())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&self.tmp, &self.target)?;
        Ok(header)
    }
}

/// Write a complete file from already sorted keys.
pub fn write_index<I>(
    path: &Path,
    ordering: &IndexOrdering,
    generation: u64,
    keys: I,
) -> IndexResult<IndexHeader>
where
    I: IntoIterator<Item = IndexKey>,
{
    let mut writer = IndexFileWriter::create(path, ordering, generation)?;
    for key in keys {
        writer.push(&key)?;
    }
    writer.finish()
}

/// Fsync a directory so renames inside it are durable.
pub fn sync_dir(dir: &Path) -> IndexResult<()> {
    #[cfg(unix)]
    File::open(dir)?.sync_all()?;
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

// ---------------------------------------------------------------------------
// Range reader
// ---------------------------------------------------------------------------

/// Forward-only reader over the keys of one file in `[low, high]`.
///
/// Holds its own file handle, so later commits that rename a new file into
/// place do not disturb it.
pub struct KeyRange {
    reader: BufReader<File>,
    start: u64,
    position: u64,
    count: u64,
    high: IndexKey,
    done: bool,
}

impl KeyRange {
    pub fn open(path: &Path, low: IndexKey, high: IndexKey) -> IndexResult<Self> {
        let mut file = File::open(path)?;
        let header = read_header_from(&mut file, path)?;
        let start = lower_bound(&mut file, header.count, &low)?;
        let mut range = Self {
            reader: BufReader::new(file),
            start,
            position: start,
            count: header.count,
            high,
            done: false,
        };
        range.seek_to(start)?;
        Ok(range)
    }

    fn seek_to(&mut self, record: u64) -> IndexResult<()> {
        self.reader
            .seek(SeekFrom::Start(INDEX_HEADER_SIZE + record * KEY_SIZE as u64))?;
        self.position = record;
        self.done = false;
        Ok(())
    }

    /// Rewind to the first key of the range.
    pub fn restart(&mut self) -> IndexResult<()> {
        self.seek_to(self.start)
    }

    pub fn next_key(&mut self) -> IndexResult<Option<IndexKey>> {
        if self.done || self.position >= self.count {
            self.done = true;
            return Ok(None);
        }
        let mut key = [0u8; KEY_SIZE];
        self.reader.read_exact(&mut key)?;
        self.position += 1;
        if key > self.high {
            self.done = true;
            return Ok(None);
        }
        Ok(Some(key))
    }
}

/// First record index whose key is >= `target`.
fn lower_bound(file: &mut File, count: u64, target: &IndexKey) -> IndexResult<u64> {
    let (mut low, mut high) = (0u64, count);
    let mut key = [0u8; KEY_SIZE];
    while low < high {
        let mid = low + (high - low) / 2;
        file.seek(SeekFrom::Start(INDEX_HEADER_SIZE + mid * KEY_SIZE as u64))?;
        file.read_exact(&mut key)?;
        if key < *target {
            low = mid + 1;
        } else {
            high = mid;
        }
    }
    Ok(low)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::Statement;
    use tempfile::TempDir;

    fn sample(ordering: &IndexOrdering, n: u32) -> Vec<IndexKey> {
        let mut keys: Vec<IndexKey> = (1..=n)
            .map(|i| ordering.key(&Statement::new(i % 5 + 1, i % 3 + 1, i, 0)))
            .collect();
        keys.sort_unstable();
        keys
    }

    #[test]
    fn test_write_then_verify() {
        let dir = TempDir::new().unwrap();
        let ordering = IndexOrdering::parse("spoc").unwrap();
        let path = dir.path().join(ordering.file_name());
        let written = write_index(&path, &ordering, 7, sample(&ordering, 50)).unwrap();
        assert_eq!(written.count, 50);

        let header = read_header(&path, &ordering).unwrap();
        assert_eq!(header, written);
        verify_records(&path, &header).unwrap();
        assert!(!path.with_extension("dat.tmp").exists());
    }

    #[test]
    fn test_writer_drops_duplicates_and_rejects_disorder() {
        let dir = TempDir::new().unwrap();
        let ordering = IndexOrdering::parse("spoc").unwrap();
        let path = dir.path().join(ordering.file_name());
        let mut writer = IndexFileWriter::create(&path, &ordering, 1).unwrap();
        let a = ordering.key(&Statement::new(1, 1, 1, 0));
        let b = ordering.key(&Statement::new(2, 1, 1, 0));
        writer.push(&a).unwrap();
        writer.push(&a).unwrap();
        writer.push(&b).unwrap();
        assert!(writer.push(&a).is_err());
        assert_eq!(writer.finish().unwrap().count, 2);
    }

    #[test]
    fn test_corrupted_record_fails_checksum() {
        let dir = TempDir::new().unwrap();
        let ordering = IndexOrdering::parse("posc").unwrap();
        let path = dir.path().join(ordering.file_name());
        write_index(&path, &ordering, 1, sample(&ordering, 10)).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes[INDEX_HEADER_SIZE as usize + 3] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        let header = read_header(&path, &ordering).unwrap();
        assert!(verify_records(&path, &header).is_err());
    }

    #[test]
    fn test_wrong_ordering_code_rejected() {
        let dir = TempDir::new().unwrap();
        let spoc = IndexOrdering::parse("spoc").unwrap();
        let posc = IndexOrdering::parse("posc").unwrap();
        let path = dir.path().join("mislabelled.dat");
        write_index(&path, &spoc, 1, Vec::new()).unwrap();
        assert!(read_header(&path, &posc).is_err());
    }

    #[test]
    fn test_key_range_and_restart() {
        let dir = TempDir::new().unwrap();
        let ordering = IndexOrdering::parse("spoc").unwrap();
        let path = dir.path().join(ordering.file_name());
        let keys = sample(&ordering, 40);
        write_index(&path, &ordering, 1, keys.clone()).unwrap();

        let pattern = crate::statement::StatementPattern::all().with_subject(3);
        let (low, high) = ordering.bounds(&pattern);
        let mut range = KeyRange::open(&path, low, high).unwrap();
        let mut first = Vec::new();
        while let Some(key) = range.next_key().unwrap() {
            first.push(key);
        }
        let expected: Vec<IndexKey> = keys
            .iter()
            .copied()
            .filter(|k| ordering.statement(k).subject == 3)
            .collect();
        assert_eq!(first, expected);

        range.restart().unwrap();
        let mut second = Vec::new();
        while let Some(key) = range.next_key().unwrap() {
            second.push(key);
        }
        assert_eq!(first, second);
    }
}
