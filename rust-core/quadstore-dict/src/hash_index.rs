// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistent reverse index (record body -> id) backed by redb.
//
// New mints are staged in memory and written in one redb transaction on
// `flush`, together with a watermark recording how many ids the index
// covers. On open, ids past the watermark are re-indexed from the data file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use redb::{
    Database, DatabaseError, ReadableDatabase, ReadableTable, TableDefinition, TableError,
};
use tracing::{debug, warn};

use crate::error::{DictError, DictResult};

/// Term record body -> term id.
const TERM_IDS: TableDefinition<&[u8], u32> = TableDefinition::new("term_ids");

/// Namespace string -> namespace id.
const NAMESPACE_IDS: TableDefinition<&str, u32> = TableDefinition::new("namespace_ids");

/// Watermarks: how many term / namespace ids the tables cover.
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const TERMS_INDEXED: &str = "terms_indexed";
const NAMESPACES_INDEXED: &str = "namespaces_indexed";

fn index_err(context: &'static str) -> impl FnOnce(redb::Error) -> DictError {
    move |e| DictError::HashIndex(format!("{context}: {e}"))
}

#[derive(Default)]
struct Staged {
    terms: HashMap<Vec<u8>, u32>,
    namespaces: HashMap<String, u32>,
}

pub struct HashIndex {
    db: Database,
    path: PathBuf,
    staged: Mutex<Staged>,
}

impl HashIndex {
    /// Open the index, recreating it empty if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> DictResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = match Database::create(&path) {
            Ok(db) => db,
            Err(e @ DatabaseError::DatabaseAlreadyOpen) => {
                return Err(index_err("open")(e.into()));
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Term hash index unreadable, rebuilding from the data file"
                );
                std::fs::remove_file(&path)?;
                Database::create(&path).map_err(|e| index_err("create")(e.into()))?
            }
        };
        debug!(path = %path.display(), "Opened term hash index");
        Ok(Self {
            db,
            path,
            staged: Mutex::new(Staged::default()),
        })
    }

    fn staged(&self) -> MutexGuard<'_, Staged> {
        self.staged.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn term_id(&self, key: &[u8]) -> DictResult<Option<u32>> {
        if let Some(id) = self.staged().terms.get(key) {
            return Ok(Some(*id));
        }
        let txn = self.db.begin_read().map_err(|e| index_err("read txn")(e.into()))?;
        let table = match txn.open_table(TERM_IDS) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(index_err("open term table")(e.into())),
        };
        let found = table
            .get(key)
            .map_err(|e| index_err("term lookup")(e.into()))?
            .map(|guard| guard.value());
        Ok(found)
    }

    pub fn namespace_id(&self, namespace: &str) -> DictResult<Option<u32>> {
        if let Some(id) = self.staged().namespaces.get(namespace) {
            return Ok(Some(*id));
        }
        let txn = self.db.begin_read().map_err(|e| index_err("read txn")(e.into()))?;
        let table = match txn.open_table(NAMESPACE_IDS) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(index_err("open namespace table")(e.into())),
        };
        let found = table
            .get(namespace)
            .map_err(|e| index_err("namespace lookup")(e.into()))?
            .map(|guard| guard.value());
        Ok(found)
    }

    pub fn stage_term(&self, key: Vec<u8>, id: u32) {
        self.staged().terms.insert(key, id);
    }

    pub fn stage_namespace(&self, namespace: String, id: u32) {
        self.staged().namespaces.insert(namespace, id);
    }

    /// Watermarks `(terms, namespaces)` persisted by the last flush.
    pub fn watermarks(&self) -> DictResult<(u64, u64)> {
        let txn = self.db.begin_read().map_err(|e| index_err("read txn")(e.into()))?;
        let table = match txn.open_table(META) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok((0, 0)),
            Err(e) => return Err(index_err("open meta table")(e.into())),
        };
        let read = |key: &str| -> DictResult<u64> {
            Ok(table
                .get(key)
                .map_err(|e| index_err("meta lookup")(e.into()))?
                .map(|guard| guard.value())
                .unwrap_or(0))
        };
        Ok((read(TERMS_INDEXED)?, read(NAMESPACES_INDEXED)?))
    }

    /// Write staged entries and the new watermarks in one transaction.
    pub fn flush(&self, terms_indexed: u64, namespaces_indexed: u64) -> DictResult<()> {
        let mut staged = self.staged();
        let txn = self.db.begin_write().map_err(|e| index_err("write txn")(e.into()))?;
        {
            let mut terms = txn
                .open_table(TERM_IDS)
                .map_err(|e| index_err("open term table")(e.into()))?;
            for (key, id) in &staged.terms {
                terms
                    .insert(key.as_slice(), *id)
                    .map_err(|e| index_err("term insert")(e.into()))?;
            }
            let mut namespaces = txn
                .open_table(NAMESPACE_IDS)
                .map_err(|e| index_err("open namespace table")(e.into()))?;
            for (namespace, id) in &staged.namespaces {
                namespaces
                    .insert(namespace.as_str(), *id)
                    .map_err(|e| index_err("namespace insert")(e.into()))?;
            }
            let mut meta = txn
                .open_table(META)
                .map_err(|e| index_err("open meta table")(e.into()))?;
            meta.insert(TERMS_INDEXED, terms_indexed)
                .map_err(|e| index_err("meta insert")(e.into()))?;
            meta.insert(NAMESPACES_INDEXED, namespaces_indexed)
                .map_err(|e| index_err("meta insert")(e.into()))?;
        }
        txn.commit().map_err(|e| index_err("commit")(e.into()))?;

        debug!(
            terms = staged.terms.len(),
            namespaces = staged.namespaces.len(),
            terms_indexed,
            "Flushed term hash index"
        );
        staged.terms.clear();
        staged.namespaces.clear();
        Ok(())
    }

    /// Drop every entry, persisted and staged.
    pub fn clear(&self) -> DictResult<()> {
        let mut staged = self.staged();
        let txn = self.db.begin_write().map_err(|e| index_err("write txn")(e.into()))?;
        txn.delete_table(TERM_IDS)
            .map_err(|e| index_err("delete term table")(e.into()))?;
        txn.delete_table(NAMESPACE_IDS)
            .map_err(|e| index_err("delete namespace table")(e.into()))?;
        txn.delete_table(META)
            .map_err(|e| index_err("delete meta table")(e.into()))?;
        txn.commit().map_err(|e| index_err("commit")(e.into()))?;
        *staged = Staged::default();
        Ok(())
    }

    pub fn staged_len(&self) -> usize {
        let staged = self.staged();
        staged.terms.len() + staged.namespaces.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
