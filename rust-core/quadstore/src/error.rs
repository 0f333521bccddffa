// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

use quadstore_dict::DictError;
use quadstore_index::IndexError;
use quadstore_lock::LockError;
use quadstore_wal::WalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Transient; retry at the transaction boundary.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    #[error("dictionary error: {0}")]
    Dictionary(#[from] DictError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// WAL append or fsync failed. The transaction was rolled back and
    /// previously committed state is intact.
    #[error("durability failure, transaction rolled back: {0}")]
    Durability(String),

    /// An earlier failure rolled this transaction back.
    #[error("transaction was aborted")]
    TransactionAborted,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("bad store properties in {path}: {reason}")]
    BadProperties { path: String, reason: String },

    #[error("unsupported store format version {found} (supported: {supported})")]
    UnsupportedFormat { found: u32, supported: u32 },

    #[error("store is closed")]
    Closed,
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        StoreError::Config(reason.into())
    }

    pub fn is_durability(&self) -> bool {
        matches!(self, StoreError::Durability(_))
    }
}
