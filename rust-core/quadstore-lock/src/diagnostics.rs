// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Lock registry records and the abandoned-lock report.

use std::backtrace::Backtrace;
use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockKind {
    Shared,
    Exclusive,
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKind::Shared => f.write_str("shared"),
            LockKind::Exclusive => f.write_str("exclusive"),
        }
    }
}

/// Abandoned-lock detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockDiagnostics {
    /// A lock held longer than this is reported as abandoned.
    pub window: Duration,
    /// Forcibly release abandoned locks instead of only reporting them.
    pub reclaim: bool,
    /// Capture a backtrace at every acquisition.
    pub capture_backtraces: bool,
}

impl Default for LockDiagnostics {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(30),
            reclaim: false,
            capture_backtraces: false,
        }
    }
}

/// Acquisition metadata for one granted lock.
#[derive(Debug, Clone)]
pub struct LockRecord {
    pub id: u64,
    pub kind: LockKind,
    pub acquired_at: DateTime<Utc>,
    pub acquired: Instant,
    pub thread: String,
    pub backtrace: Option<String>,
    /// Already reported by a sweep.
    pub(crate) reported: bool,
}

impl LockRecord {
    pub(crate) fn new(id: u64, kind: LockKind, capture_backtrace: bool) -> Self {
        let current = std::thread::current();
        let thread = current
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{:?}", current.id()));
        Self {
            id,
            kind,
            acquired_at: Utc::now(),
            acquired: Instant::now(),
            thread,
            backtrace: capture_backtrace.then(|| Backtrace::force_capture().to_string()),
            reported: false,
        }
    }

    pub fn held_for(&self) -> Duration {
        self.acquired.elapsed()
    }
}

/// A lock found held past the diagnostic window.
#[derive(Debug, Clone, Serialize)]
pub struct AbandonedLock {
    pub id: u64,
    pub kind: LockKind,
    pub thread: String,
    pub acquired_at: DateTime<Utc>,
    pub held_for: Duration,
    pub backtrace: Option<String>,
    /// Whether the sweep released it.
    pub reclaimed: bool,
}

impl AbandonedLock {
    pub(crate) fn from_record(record: &LockRecord, reclaimed: bool) -> Self {
        Self {
            id: record.id,
            kind: record.kind,
            thread: record.thread.clone(),
            acquired_at: record.acquired_at,
            held_for: record.held_for(),
            backtrace: record.backtrace.clone(),
            reclaimed,
        }
    }
}

/// Point-in-time controller counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LockStats {
    pub active_readers: usize,
    pub writer_held: bool,
    pub waiting_writers: usize,
    pub shared_grants: u64,
    pub exclusive_grants: u64,
    pub reclaimed: u64,
}
