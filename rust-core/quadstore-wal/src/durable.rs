// SPDX-License-Identifier: PMPL-1.0-or-later
//
// QuadStore Write-Ahead Log - Shared durable handle
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `Wal` wraps a `WalWriter` for use by many threads. Appends return a
// sequence number immediately; callers that need the record on stable
// storage call `await_durable`, and a single background flusher thread
// coalesces those requests into one fsync (group commit).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::entry::WalEntry;
use crate::error::{WalError, WalResult};
use crate::reader::WalReader;
use crate::segment::{prune_segments_before, DEFAULT_MAX_SEGMENT_SIZE};
use crate::writer::{SyncMode, WalWriter};

/// Default interval at which the flusher forces pending entries even when
/// nobody is waiting.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// WalConfig
// ---------------------------------------------------------------------------

/// Durability settings for a [`Wal`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalConfig {
    /// Fsync every append before returning its sequence number.
    pub force_sync: bool,

    /// Rotate segments beyond this size in bytes.
    pub max_segment_size: u64,

    /// Background flush cadence when `force_sync` is off.
    pub flush_interval: Duration,

    /// Delete segments that lie wholly before the last checkpoint on close.
    /// Off by default: the segments are the repair source for corrupt
    /// term records.
    pub prune_applied_segments: bool,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            force_sync: false,
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            prune_applied_segments: false,
        }
    }
}

impl WalConfig {
    fn sync_mode(&self) -> SyncMode {
        if self.force_sync {
            SyncMode::Fsync
        } else {
            SyncMode::Async
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Progress {
    /// Highest sequence written to the segment file.
    appended: u64,
    /// Highest sequence known to be fsynced.
    forced: u64,
    /// Highest sequence a caller is waiting on.
    requested: u64,
    closed: bool,
    failure: Option<String>,
}

struct Shared {
    writer: Mutex<WalWriter>,
    progress: Mutex<Progress>,
    signal: Condvar,
    flush_interval: Duration,
}

impl Shared {
    fn writer(&self) -> MutexGuard<'_, WalWriter> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Force everything appended so far and publish the new watermark.
    fn flush(&self) -> WalResult<u64> {
        let forced = {
            let mut writer = self.writer();
            writer.sync()?;
            writer.synced_through()
        };
        let mut progress = self.progress();
        progress.forced = progress.forced.max(forced);
        self.signal.notify_all();
        Ok(progress.forced)
    }

    fn run_flusher(&self) {
        let mut last_flush = Instant::now();
        loop {
            {
                let mut progress = self.progress();
                loop {
                    let waiting = progress.requested > progress.forced;
                    let stale = progress.appended > progress.forced
                        && last_flush.elapsed() >= self.flush_interval;
                    if progress.closed || waiting || stale {
                        break;
                    }
                    let (guard, _) = self
                        .signal
                        .wait_timeout(progress, self.flush_interval)
                        .unwrap_or_else(|e| e.into_inner());
                    progress = guard;
                }
                if progress.closed {
                    return;
                }
            }

            last_flush = Instant::now();
            match self.flush() {
                Ok(forced) => debug!(forced, "WAL group flush"),
                Err(e) => {
                    error!(error = %e, "WAL flush failed, durability waiters will be failed");
                    let mut progress = self.progress();
                    progress.failure = Some(e.to_string());
                    self.signal.notify_all();
                    return;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Wal
// ---------------------------------------------------------------------------

/// Thread-safe WAL handle with group commit.
pub struct Wal {
    dir: PathBuf,
    store_id: Uuid,
    config: WalConfig,
    shared: Arc<Shared>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl Wal {
    /// Open (or create) the WAL for `store_id` in `dir`.
    ///
    /// Every existing segment must carry `store_id` in its header.
    pub fn open(dir: impl AsRef<Path>, store_id: Uuid, config: WalConfig) -> WalResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let writer =
            WalWriter::open_with_max_size(&dir, store_id, config.sync_mode(), config.max_segment_size)?;

        // The writer only checks the newest segment.
        let reader = WalReader::open(&dir)?;
        for header in reader.segment_headers()? {
            if header.store_id != store_id {
                return Err(WalError::StoreMismatch {
                    segment: crate::segment::segment_filename(header.start_sequence),
                    expected: store_id,
                    found: header.store_id,
                });
            }
        }

        let forced = writer.synced_through();
        let shared = Arc::new(Shared {
            writer: Mutex::new(writer),
            progress: Mutex::new(Progress {
                appended: forced,
                forced,
                ..Progress::default()
            }),
            signal: Condvar::new(),
            flush_interval: config.flush_interval,
        });

        let flusher_state = Arc::clone(&shared);
        let flusher = thread::Builder::new()
            .name("quadstore-wal-flush".to_string())
            .spawn(move || flusher_state.run_flusher())?;

        info!(
            dir = %dir.display(),
            %store_id,
            force_sync = config.force_sync,
            last_sequence = forced,
            "Opened WAL"
        );

        Ok(Self {
            dir,
            store_id,
            config,
            shared,
            flusher: Mutex::new(Some(flusher)),
        })
    }

    /// Append a mint record and return its sequence number.
    ///
    /// With `force_sync` the record is on disk before this returns;
    /// otherwise pair it with [`Wal::await_durable`].
    pub fn log_mint(&self, term_id: u32, payload: Vec<u8>) -> WalResult<u64> {
        self.append(WalEntry::mint(term_id, payload))
    }

    fn append(&self, entry: WalEntry) -> WalResult<u64> {
        self.ensure_usable()?;
        let (sequence, synced) = {
            let mut writer = self.shared.writer();
            let sequence = writer.append(entry)?;
            (sequence, writer.synced_through())
        };
        let mut progress = self.shared.progress();
        progress.appended = progress.appended.max(sequence);
        progress.forced = progress.forced.max(synced);
        Ok(sequence)
    }

    /// Block until every record with sequence <= `sequence` is fsynced.
    pub fn await_durable(&self, sequence: u64) -> WalResult<()> {
        let mut progress = self.shared.progress();
        if sequence <= progress.forced {
            return Ok(());
        }
        if sequence > progress.appended {
            return Err(WalError::SequenceNotAppended {
                requested: sequence,
                last_appended: progress.appended,
            });
        }

        progress.requested = progress.requested.max(sequence);
        self.shared.signal.notify_all();

        while progress.forced < sequence {
            if let Some(failure) = &progress.failure {
                return Err(WalError::FlushFailed(failure.clone()));
            }
            if progress.closed {
                return Err(WalError::Closed);
            }
            progress = self
                .shared
                .signal
                .wait(progress)
                .unwrap_or_else(|e| e.into_inner());
        }
        Ok(())
    }

    /// Fsync everything appended so far on the calling thread.
    pub fn sync(&self) -> WalResult<u64> {
        self.ensure_usable()?;
        self.shared.flush()
    }

    /// Highest sequence appended so far.
    pub fn last_appended(&self) -> u64 {
        self.shared.progress().appended
    }

    /// Highest sequence known to be on stable storage.
    pub fn last_forced(&self) -> u64 {
        self.shared.progress().forced
    }

    /// Write and fsync a checkpoint marker.
    pub fn checkpoint(&self) -> WalResult<u64> {
        self.ensure_usable()?;
        let (sequence, synced) = {
            let mut writer = self.shared.writer();
            let sequence = writer.checkpoint()?;
            (sequence, writer.synced_through())
        };
        let mut progress = self.shared.progress();
        progress.appended = progress.appended.max(sequence);
        progress.forced = progress.forced.max(synced);
        self.shared.signal.notify_all();
        Ok(sequence)
    }

    /// Delete segments wholly before the last checkpoint.
    pub fn prune_applied(&self) -> WalResult<usize> {
        let reader = WalReader::open(&self.dir)?;
        match reader.find_last_checkpoint()? {
            Some(checkpoint) => {
                let removed = prune_segments_before(&self.dir, checkpoint)?;
                if removed > 0 {
                    info!(removed, checkpoint, "Pruned applied WAL segments");
                }
                Ok(removed)
            }
            None => Ok(0),
        }
    }

    /// A reader over this WAL's directory.
    pub fn reader(&self) -> WalResult<WalReader> {
        WalReader::open(&self.dir)
    }

    /// Most recent mint record for `term_id`.
    pub fn find_mint(&self, term_id: u32) -> WalResult<Option<WalEntry>> {
        self.reader()?.find_mint(term_id)
    }

    pub fn store_id(&self) -> Uuid {
        self.store_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &WalConfig {
        &self.config
    }

    /// Stop the flusher, force the tail, and optionally prune.
    ///
    /// Idempotent; later appends fail with [`WalError::Closed`].
    pub fn close(&self) -> WalResult<()> {
        let handle = self
            .flusher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(handle) = handle else {
            return Ok(());
        };

        // Flush before raising `closed` so current waiters see their
        // sequence forced rather than a closed error.
        let failed = self.shared.progress().failure.is_some();
        let flushed = if failed { Ok(0) } else { self.shared.flush() };

        self.shared.progress().closed = true;
        self.shared.signal.notify_all();
        let _ = handle.join();

        flushed?;
        if !failed && self.config.prune_applied_segments {
            self.checkpoint_on_close()?;
            self.prune_applied()?;
        }

        info!(dir = %self.dir.display(), "Closed WAL");
        Ok(())
    }

    fn checkpoint_on_close(&self) -> WalResult<u64> {
        let mut writer = self.shared.writer();
        writer.checkpoint()
    }

    fn ensure_usable(&self) -> WalResult<()> {
        let progress = self.shared.progress();
        if let Some(failure) = &progress.failure {
            return Err(WalError::FlushFailed(failure.clone()));
        }
        if progress.closed {
            return Err(WalError::Closed);
        }
        Ok(())
    }
}

impl Drop for Wal {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(error = %e, "Failed to close WAL cleanly");
        }
    }
}
