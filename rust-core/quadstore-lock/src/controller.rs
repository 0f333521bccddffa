// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ConcurrencyController: shared/exclusive locks with read preference.
//
// Readers are admitted while a writer waits, but only `max_shared_bypass`
// of them; after that new readers queue behind the writer until it has been
// granted. Every grant is recorded in a registry keyed by lock id, which the
// diagnostic sweep walks to find locks held past the configured window.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::diagnostics::{AbandonedLock, LockDiagnostics, LockKind, LockRecord, LockStats};
use crate::error::{LockError, LockResult};

/// How long a waiter sleeps between checks of its interrupt flag and the
/// diagnostic sweep.
const WAIT_SLICE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Shared grants allowed past a waiting writer.
    pub max_shared_bypass: usize,
    /// Abandoned-lock detection; off when `None`.
    pub diagnostics: Option<LockDiagnostics>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            max_shared_bypass: 16,
            diagnostics: None,
        }
    }
}

/// Cancellation flag for a pending acquisition.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct State {
    readers: usize,
    writer: Option<u64>,
    waiting_writers: usize,
    /// Shared grants since a writer started waiting.
    bypassed: usize,
    next_id: u64,
    holders: HashMap<u64, LockRecord>,
    shared_grants: u64,
    exclusive_grants: u64,
    reclaimed: u64,
}

struct Inner {
    state: Mutex<State>,
    changed: Condvar,
    config: LockConfig,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release(&self, id: u64) -> bool {
        let mut state = self.state();
        let Some(record) = state.holders.remove(&id) else {
            // Reclaimed by a sweep, or already released.
            return false;
        };
        match record.kind {
            LockKind::Shared => state.readers = state.readers.saturating_sub(1),
            LockKind::Exclusive => state.writer = None,
        }
        drop(state);
        self.changed.notify_all();
        debug!(lock = id, kind = %record.kind, "Released lock");
        true
    }

    fn sweep(&self, state: &mut State) -> Vec<AbandonedLock> {
        let Some(diagnostics) = &self.config.diagnostics else {
            return Vec::new();
        };

        let overdue: Vec<u64> = state
            .holders
            .values()
            .filter(|r| r.held_for() > diagnostics.window)
            .map(|r| r.id)
            .collect();

        let mut report = Vec::with_capacity(overdue.len());
        for id in overdue {
            if diagnostics.reclaim {
                let Some(record) = state.holders.remove(&id) else { continue };
                match record.kind {
                    LockKind::Shared => state.readers = state.readers.saturating_sub(1),
                    LockKind::Exclusive => state.writer = None,
                }
                state.reclaimed += 1;
                warn!(
                    lock = id,
                    kind = %record.kind,
                    thread = %record.thread,
                    acquired_at = %record.acquired_at,
                    held_ms = record.held_for().as_millis() as u64,
                    backtrace = record.backtrace.as_deref().unwrap_or("<not captured>"),
                    "Reclaimed abandoned lock"
                );
                report.push(AbandonedLock::from_record(&record, true));
            } else if let Some(record) = state.holders.get_mut(&id) {
                if !record.reported {
                    record.reported = true;
                    warn!(
                        lock = id,
                        kind = %record.kind,
                        thread = %record.thread,
                        acquired_at = %record.acquired_at,
                        held_ms = record.held_for().as_millis() as u64,
                        backtrace = record.backtrace.as_deref().unwrap_or("<not captured>"),
                        "Lock held past diagnostic window"
                    );
                }
                report.push(AbandonedLock::from_record(record, false));
            }
        }
        if report.iter().any(|a| a.reclaimed) {
            self.changed.notify_all();
        }
        report
    }
}

/// Shared/exclusive lock manager. Cloning yields another handle to the
/// same controller.
#[derive(Clone)]
pub struct ConcurrencyController {
    inner: Arc<Inner>,
}

impl Default for ConcurrencyController {
    fn default() -> Self {
        Self::new(LockConfig::default())
    }
}

impl ConcurrencyController {
    pub fn new(config: LockConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                changed: Condvar::new(),
                config,
            }),
        }
    }

    pub fn acquire_shared(&self) -> Lock {
        match self.acquire(LockKind::Shared, None, None) {
            Ok(lock) => lock,
            // Without a deadline or interrupt the wait only ends in a grant.
            Err(_) => unreachable!("unbounded shared wait ended without a grant"),
        }
    }

    pub fn acquire_exclusive(&self) -> Lock {
        match self.acquire(LockKind::Exclusive, None, None) {
            Ok(lock) => lock,
            Err(_) => unreachable!("unbounded exclusive wait ended without a grant"),
        }
    }

    pub fn try_acquire_shared_for(&self, timeout: Duration) -> LockResult<Lock> {
        self.acquire(LockKind::Shared, Some(timeout), None)
    }

    pub fn try_acquire_exclusive_for(&self, timeout: Duration) -> LockResult<Lock> {
        self.acquire(LockKind::Exclusive, Some(timeout), None)
    }

    pub fn acquire_shared_interruptible(&self, interrupt: &Interrupt) -> LockResult<Lock> {
        self.acquire(LockKind::Shared, None, Some(interrupt))
    }

    pub fn acquire_exclusive_interruptible(&self, interrupt: &Interrupt) -> LockResult<Lock> {
        self.acquire(LockKind::Exclusive, None, Some(interrupt))
    }

    /// Release `lock`. Dropping it does the same.
    pub fn release(&self, lock: Lock) {
        lock.release();
    }

    fn acquire(
        &self,
        kind: LockKind,
        timeout: Option<Duration>,
        interrupt: Option<&Interrupt>,
    ) -> LockResult<Lock> {
        let inner = &self.inner;
        let started = Instant::now();
        let deadline = timeout.map(|t| started + t);
        let diagnostics = inner.config.diagnostics.as_ref();
        let mut last_sweep = started;

        let mut state = inner.state();
        if kind == LockKind::Exclusive {
            state.waiting_writers += 1;
        }

        loop {
            if self.grantable(&state, kind) {
                break;
            }

            let cancelled = if interrupt.is_some_and(Interrupt::is_interrupted) {
                Some(LockError::Interrupted)
            } else {
                match (deadline, timeout) {
                    (Some(deadline), Some(timeout)) if Instant::now() >= deadline => {
                        Some(LockError::Timeout(timeout))
                    }
                    _ => None,
                }
            };
            if let Some(error) = cancelled {
                if kind == LockKind::Exclusive {
                    state.waiting_writers -= 1;
                    // The bypass allowance belongs to the writers still waiting.
                    if state.waiting_writers == 0 {
                        state.bypassed = 0;
                    }
                    drop(state);
                    // Readers held back by this writer may proceed.
                    inner.changed.notify_all();
                }
                debug!(%kind, %error, "Lock wait cancelled");
                return Err(error);
            }

            if let Some(diagnostics) = diagnostics {
                if last_sweep.elapsed() >= diagnostics.window {
                    inner.sweep(&mut state);
                    last_sweep = Instant::now();
                    continue;
                }
            }

            let mut slice = if interrupt.is_some() || diagnostics.is_some() {
                Some(WAIT_SLICE)
            } else {
                None
            };
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                slice = Some(slice.map_or(remaining, |s| s.min(remaining)));
            }
            state = match slice {
                Some(slice) => {
                    inner
                        .changed
                        .wait_timeout(state, slice)
                        .unwrap_or_else(|e| e.into_inner())
                        .0
                }
                None => inner.changed.wait(state).unwrap_or_else(|e| e.into_inner()),
            };
        }

        let id = state.next_id;
        state.next_id += 1;
        match kind {
            LockKind::Shared => {
                state.readers += 1;
                state.shared_grants += 1;
                if state.waiting_writers > 0 {
                    state.bypassed += 1;
                }
            }
            LockKind::Exclusive => {
                state.waiting_writers -= 1;
                state.writer = Some(id);
                state.exclusive_grants += 1;
                state.bypassed = 0;
            }
        }
        let capture = diagnostics.is_some_and(|d| d.capture_backtraces);
        state.holders.insert(id, LockRecord::new(id, kind, capture));
        drop(state);

        debug!(lock = id, %kind, waited_us = started.elapsed().as_micros() as u64, "Granted lock");
        Ok(Lock {
            id,
            kind,
            inner: Arc::clone(inner),
            released: false,
        })
    }

    fn grantable(&self, state: &State, kind: LockKind) -> bool {
        match kind {
            LockKind::Shared => {
                state.writer.is_none()
                    && (state.waiting_writers == 0
                        || state.bypassed < self.inner.config.max_shared_bypass)
            }
            LockKind::Exclusive => state.writer.is_none() && state.readers == 0,
        }
    }

    /// Report locks held past the diagnostic window, reclaiming them when
    /// configured. Empty when diagnostics are off.
    pub fn sweep_abandoned(&self) -> Vec<AbandonedLock> {
        let mut state = self.inner.state();
        self.inner.sweep(&mut state)
    }

    /// Every lock currently held.
    pub fn held_locks(&self) -> Vec<LockRecord> {
        let mut held: Vec<LockRecord> = self.inner.state().holders.values().cloned().collect();
        held.sort_by_key(|r| r.id);
        held
    }

    pub fn is_writer_active(&self) -> bool {
        self.inner.state().writer.is_some()
    }

    pub fn is_reader_active(&self) -> bool {
        self.inner.state().readers > 0
    }

    pub fn stats(&self) -> LockStats {
        let state = self.inner.state();
        LockStats {
            active_readers: state.readers,
            writer_held: state.writer.is_some(),
            waiting_writers: state.waiting_writers,
            shared_grants: state.shared_grants,
            exclusive_grants: state.exclusive_grants,
            reclaimed: state.reclaimed,
        }
    }

    pub fn config(&self) -> &LockConfig {
        &self.inner.config
    }
}

/// A granted lock. Released on drop; releasing a reclaimed lock does
/// nothing.
pub struct Lock {
    id: u64,
    kind: LockKind,
    inner: Arc<Inner>,
    released: bool,
}

impl Lock {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> LockKind {
        self.kind
    }

    /// Release now. Returns `false` if a sweep had already reclaimed it.
    pub fn release(mut self) -> bool {
        self.released = true;
        self.inner.release(self.id)
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            self.inner.release(self.id);
        }
    }
}

impl std::fmt::Debug for Lock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lock")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}
