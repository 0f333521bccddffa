// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `triples.json`: which orderings the index directory holds.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IndexResult;

pub const PROPERTIES_FILE: &str = "triples.json";
pub const PROPERTIES_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexProperties {
    pub format_version: u32,
    /// Ordering codes, primary first.
    pub orderings: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl IndexProperties {
    pub fn new(orderings: Vec<String>) -> Self {
        Self {
            format_version: PROPERTIES_FORMAT_VERSION,
            orderings,
            updated_at: Utc::now(),
        }
    }

    pub fn load(dir: &Path) -> IndexResult<Option<Self>> {
        match fs::read(dir.join(PROPERTIES_FILE)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write via a temporary file and rename.
    pub fn save(&self, dir: &Path) -> IndexResult<()> {
        let path = dir.join(PROPERTIES_FILE);
        let tmp = dir.join(format!("{PROPERTIES_FILE}.tmp"));
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::File::open(&tmp)?.sync_all()?;
        fs::rename(&tmp, &path)?;
        crate::file::sync_dir(dir)
    }
}
