// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `store.json`: format version and the store UUID that keys the WAL.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

pub const STORE_FILE: &str = "store.json";
pub const STORE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreProperties {
    pub format_version: u32,
    pub store_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl StoreProperties {
    pub fn new() -> Self {
        Self {
            format_version: STORE_FORMAT_VERSION,
            store_id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    pub fn load(dir: &Path) -> StoreResult<Option<Self>> {
        let path = dir.join(STORE_FILE);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let props: Self = serde_json::from_slice(&bytes).map_err(|e| StoreError::BadProperties {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        if props.format_version != STORE_FORMAT_VERSION {
            return Err(StoreError::UnsupportedFormat {
                found: props.format_version,
                supported: STORE_FORMAT_VERSION,
            });
        }
        Ok(Some(props))
    }

    /// Existing properties, or fresh ones written to `dir`.
    pub fn load_or_create(dir: &Path) -> StoreResult<Self> {
        if let Some(props) = Self::load(dir)? {
            return Ok(props);
        }
        let props = Self::new();
        props.save(dir)?;
        info!(dir = %dir.display(), store_id = %props.store_id, "Created store properties");
        Ok(props)
    }

    /// Write via a temporary file and rename.
    pub fn save(&self, dir: &Path) -> StoreResult<()> {
        let path = dir.join(STORE_FILE);
        let tmp = dir.join(format!("{STORE_FILE}.tmp"));
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::File::open(&tmp)?.sync_all()?;
        fs::rename(&tmp, &path)?;
        quadstore_index::file::sync_dir(dir)?;
        Ok(())
    }
}

impl Default for StoreProperties {
    fn default() -> Self {
        Self::new()
    }
}
