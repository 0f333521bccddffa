// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Store configuration: serde-friendly defaults plus a `QUADSTORE_*`
// environment overlay.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use quadstore_dict::DictionaryConfig;
use quadstore_index::{IndexConfig, IndexRepairPolicy, DEFAULT_ORDERINGS};
use quadstore_lock::{LockConfig, LockDiagnostics};
use quadstore_wal::{WalConfig, DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_SEGMENT_SIZE};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Prefix of every environment variable read by [`StoreConfig::from_env`].
pub const ENV_PREFIX: &str = "QUADSTORE_";

/// WAL directory name inside the store directory.
pub const WAL_DIR: &str = "wal";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Index orderings, primary first.
    pub indexes: String,

    pub term_cache_size: usize,
    pub term_id_cache_size: usize,
    pub namespace_cache_size: usize,
    pub namespace_id_cache_size: usize,

    /// Fsync the WAL on every mint so commits never wait on the flusher.
    pub force_sync: bool,
    pub wal_max_segment_size: u64,
    pub wal_sync_interval_ms: u64,
    pub wal_prune_applied_segments: bool,

    /// Restore term records missing from the value files out of the WAL.
    pub recover_values_on_open: bool,

    pub index_repair: IndexRepairPolicy,
    pub verify_index_checksums: bool,

    pub lock_max_shared_bypass: usize,
    /// Abandoned-lock window; diagnostics are off when unset.
    pub lock_diagnostics_window_ms: Option<u64>,
    pub lock_reclaim_abandoned: bool,
    pub lock_capture_backtraces: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let dictionary = DictionaryConfig::default();
        Self {
            indexes: DEFAULT_ORDERINGS.to_string(),
            term_cache_size: dictionary.term_cache_size,
            term_id_cache_size: dictionary.term_id_cache_size,
            namespace_cache_size: dictionary.namespace_cache_size,
            namespace_id_cache_size: dictionary.namespace_id_cache_size,
            force_sync: false,
            wal_max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            wal_sync_interval_ms: DEFAULT_FLUSH_INTERVAL.as_millis() as u64,
            wal_prune_applied_segments: false,
            recover_values_on_open: dictionary.recover_on_open,
            index_repair: IndexRepairPolicy::FailClosed,
            verify_index_checksums: true,
            lock_max_shared_bypass: LockConfig::default().max_shared_bypass,
            lock_diagnostics_window_ms: None,
            lock_reclaim_abandoned: false,
            lock_capture_backtraces: false,
        }
    }
}

impl StoreConfig {
    /// Defaults overlaid with `QUADSTORE_*` environment variables.
    pub fn from_env() -> StoreResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each variable
    /// name.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> StoreResult<Self> {
        let mut config = Self::default();
        let var = |key: &str| {
            lookup(&format!("{ENV_PREFIX}{key}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = var("INDEXES") {
            config.indexes = v;
        }
        overlay(&var, "TERM_CACHE_SIZE", &mut config.term_cache_size)?;
        overlay(&var, "TERM_ID_CACHE_SIZE", &mut config.term_id_cache_size)?;
        overlay(&var, "NAMESPACE_CACHE_SIZE", &mut config.namespace_cache_size)?;
        overlay(&var, "NAMESPACE_ID_CACHE_SIZE", &mut config.namespace_id_cache_size)?;
        overlay_bool(&var, "FORCE_SYNC", &mut config.force_sync)?;
        overlay(&var, "WAL_MAX_SEGMENT_SIZE", &mut config.wal_max_segment_size)?;
        overlay(&var, "WAL_SYNC_INTERVAL_MS", &mut config.wal_sync_interval_ms)?;
        overlay_bool(&var, "WAL_PRUNE_APPLIED_SEGMENTS", &mut config.wal_prune_applied_segments)?;
        overlay_bool(&var, "RECOVER_VALUES_ON_OPEN", &mut config.recover_values_on_open)?;
        overlay(&var, "INDEX_REPAIR", &mut config.index_repair)?;
        overlay_bool(&var, "VERIFY_INDEX_CHECKSUMS", &mut config.verify_index_checksums)?;
        overlay(&var, "LOCK_MAX_SHARED_BYPASS", &mut config.lock_max_shared_bypass)?;
        if let Some(v) = var("LOCK_DIAGNOSTICS_WINDOW_MS") {
            config.lock_diagnostics_window_ms = Some(parse("LOCK_DIAGNOSTICS_WINDOW_MS", &v)?);
        }
        overlay_bool(&var, "LOCK_RECLAIM_ABANDONED", &mut config.lock_reclaim_abandoned)?;
        overlay_bool(&var, "LOCK_CAPTURE_BACKTRACES", &mut config.lock_capture_backtraces)?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StoreResult<()> {
        quadstore_index::IndexOrdering::parse_list(&self.indexes)
            .map_err(|e| StoreError::config(format!("indexes: {e}")))?;
        if self.wal_max_segment_size == 0 {
            return Err(StoreError::config("wal_max_segment_size must be positive"));
        }
        if self.lock_diagnostics_window_ms == Some(0) {
            return Err(StoreError::config("lock_diagnostics_window_ms must be positive"));
        }
        Ok(())
    }

    pub fn dictionary_config(&self) -> DictionaryConfig {
        DictionaryConfig {
            term_cache_size: self.term_cache_size,
            term_id_cache_size: self.term_id_cache_size,
            namespace_cache_size: self.namespace_cache_size,
            namespace_id_cache_size: self.namespace_id_cache_size,
            recover_on_open: self.recover_values_on_open,
        }
    }

    pub fn wal_config(&self) -> WalConfig {
        WalConfig {
            force_sync: self.force_sync,
            max_segment_size: self.wal_max_segment_size,
            flush_interval: Duration::from_millis(self.wal_sync_interval_ms.max(1)),
            prune_applied_segments: self.wal_prune_applied_segments,
        }
    }

    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            orderings: self.indexes.clone(),
            repair: self.index_repair,
            verify_checksums: self.verify_index_checksums,
        }
    }

    pub fn lock_config(&self) -> LockConfig {
        LockConfig {
            max_shared_bypass: self.lock_max_shared_bypass,
            diagnostics: self.lock_diagnostics_window_ms.map(|ms| LockDiagnostics {
                window: Duration::from_millis(ms),
                reclaim: self.lock_reclaim_abandoned,
                capture_backtraces: self.lock_capture_backtraces,
            }),
        }
    }
}

fn parse<T>(key: &str, value: &str) -> StoreResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e| StoreError::config(format!("{ENV_PREFIX}{key}={value:?}: {e}")))
}

fn overlay<T>(var: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) -> StoreResult<()>
where
    T: FromStr,
    T::Err: Display,
{
    if let Some(value) = var(key) {
        *slot = parse(key, &value)?;
    }
    Ok(())
}

fn overlay_bool(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut bool,
) -> StoreResult<()> {
    if let Some(value) = var(key) {
        *slot = match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                return Err(StoreError::config(format!(
                    "{ENV_PREFIX}{key}={value:?}: expected a boolean"
                )))
            }
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> StoreResult<StoreConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StoreConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.indexes, "spoc,posc");
        assert_eq!(config.term_cache_size, 512);
        assert_eq!(config.term_id_cache_size, 128);
        assert_eq!(config.namespace_cache_size, 64);
        assert_eq!(config.namespace_id_cache_size, 32);
        assert!(!config.force_sync);
        assert!(config.recover_values_on_open);
        assert!(config.lock_config().diagnostics.is_none());
    }

    #[test]
    fn test_env_overlay() {
        let config = from_pairs(&[
            ("QUADSTORE_INDEXES", "spoc,cosp"),
            ("QUADSTORE_TERM_CACHE_SIZE", "2048"),
            ("QUADSTORE_FORCE_SYNC", "yes"),
            ("QUADSTORE_INDEX_REPAIR", "rebuild"),
            ("QUADSTORE_LOCK_DIAGNOSTICS_WINDOW_MS", "250"),
            ("QUADSTORE_LOCK_RECLAIM_ABANDONED", "true"),
        ])
        .unwrap();
        assert_eq!(config.indexes, "spoc,cosp");
        assert_eq!(config.term_cache_size, 2048);
        assert!(config.wal_config().force_sync);
        assert_eq!(config.index_repair, IndexRepairPolicy::RebuildFromPrimary);

        let diagnostics = config.lock_config().diagnostics.unwrap();
        assert_eq!(diagnostics.window, Duration::from_millis(250));
        assert!(diagnostics.reclaim);
    }

    #[test]
    fn test_env_rejects_garbage() {
        assert!(matches!(
            from_pairs(&[("QUADSTORE_TERM_CACHE_SIZE", "lots")]),
            Err(StoreError::Config(_))
        ));
        assert!(from_pairs(&[("QUADSTORE_FORCE_SYNC", "maybe")]).is_err());
        assert!(from_pairs(&[("QUADSTORE_INDEXES", "spoc,spoc")]).is_err());
        assert!(from_pairs(&[("QUADSTORE_INDEX_REPAIR", "guess")]).is_err());
    }

    #[test]
    fn test_blank_values_ignored() {
        let config = from_pairs(&[("QUADSTORE_TERM_CACHE_SIZE", "  ")]).unwrap();
        assert_eq!(config.term_cache_size, 512);
    }

    #[test]
    fn test_serde_fills_missing_fields() {
        let config: StoreConfig = serde_json::from_str(r#"{"indexes":"spoc,psoc"}"#).unwrap();
        assert_eq!(config.indexes, "spoc,psoc");
        assert_eq!(config.term_id_cache_size, 128);
    }
}
