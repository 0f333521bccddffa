// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Dictionary error types. Corrupt term records are not errors: they come
// back from `resolve` as `ResolvedTerm::Corrupt`.

use quadstore_wal::WalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DictError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WAL append or fsync failed; the in-flight mint did not happen.
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    #[error("term hash index error: {0}")]
    HashIndex(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The id was never allocated by this dictionary.
    #[error("unknown term id {0}")]
    UnknownId(u32),

    #[error("invalid term: {0}")]
    InvalidTerm(String),

    #[error("term id space exhausted")]
    IdSpaceExhausted,

    #[error("unrecognised header in {path}")]
    BadFileHeader { path: String },
}

pub type DictResult<T> = Result<T, DictError>;
