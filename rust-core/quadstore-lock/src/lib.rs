// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
//! Store-wide shared/exclusive locking.
//!
//! [`ConcurrencyController`] prefers readers but bounds writer starvation:
//! once a writer is waiting, at most `max_shared_bypass` further shared
//! grants are made before the writer goes first. Acquisitions can be
//! bounded by a timeout or cancelled through an [`Interrupt`].
//!
//! With [`LockDiagnostics`] enabled every grant is tracked with its thread,
//! wall-clock time and optionally a backtrace; locks held past the window
//! are logged and, if configured, reclaimed.
//!
//! ```
//! use quadstore_lock::{ConcurrencyController, LockConfig};
//!
//! let controller = ConcurrencyController::new(LockConfig::default());
//! {
//!     let _read = controller.acquire_shared();
//!     assert!(controller.is_reader_active());
//! }
//! let write = controller.acquire_exclusive();
//! assert!(controller.is_writer_active());
//! controller.release(write);
//! ```

pub mod controller;
pub mod diagnostics;
pub mod error;

pub use controller::{ConcurrencyController, Interrupt, Lock, LockConfig};
pub use diagnostics::{AbandonedLock, LockDiagnostics, LockKind, LockRecord, LockStats};
pub use error::{LockError, LockResult};
