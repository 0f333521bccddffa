// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

use std::time::Duration;

use thiserror::Error;

/// A failed acquisition. In every case nothing was granted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("lock not granted within {0:?}")]
    Timeout(Duration),

    #[error("lock wait interrupted")]
    Interrupted,
}

pub type LockResult<T> = Result<T, LockError>;
