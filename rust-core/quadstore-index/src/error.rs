// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid index ordering {code:?}: {reason}")]
    InvalidOrdering { code: String, reason: String },

    #[error("no index orderings configured")]
    NoOrderings,

    /// An ordering disagrees with the others; fatal unless a repair policy
    /// allows rebuilding it.
    #[error("index ordering {ordering} is inconsistent: {reason}")]
    Inconsistent { ordering: String, reason: String },

    #[error("bad index file {path}: {reason}")]
    BadFile { path: String, reason: String },

    #[error("commit journal error: {0}")]
    Journal(String),

    /// A previous commit failed part-way; the store must be reopened so the
    /// journal can be re-applied.
    #[error("index set needs recovery after a failed commit")]
    NeedsRecovery,
}

pub type IndexResult<T> = Result<T, IndexError>;

impl IndexError {
    pub(crate) fn inconsistent(ordering: impl Into<String>, reason: impl Into<String>) -> Self {
        IndexError::Inconsistent {
            ordering: ordering.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inconsistent_display() {
        let error = IndexError::inconsistent("posc", "file missing");
        assert_eq!(
            error.to_string(),
            "index ordering posc is inconsistent: file missing"
        );
    }
}
