// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// QuadStore: owns the WAL, term dictionary, index set and lock controller
// of one store directory, and exposes the statement-level API.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use quadstore_dict::{
    ConsistencyReport, DictError, DictionaryStats, ResolvedTerm, Term, TermDictionary, TermId,
};
use quadstore_index::{
    IndexReport, IndexResult, IndexSet, IndexStats, Statement, StatementPattern, DEFAULT_CONTEXT,
};
use quadstore_lock::{ConcurrencyController, LockStats};
use quadstore_wal::Wal;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::{StoreConfig, WAL_DIR};
use crate::error::{StoreError, StoreResult};
use crate::properties::StoreProperties;
use crate::quad::{ContextFilter, QuadPattern, ResolvedQuad};
use crate::transaction::Transaction;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StoreReport {
    pub dictionary: ConsistencyReport,
    pub index: IndexReport,
}

impl StoreReport {
    pub fn is_consistent(&self) -> bool {
        self.dictionary.is_consistent() && self.index.is_consistent()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub store_id: Uuid,
    pub dictionary: DictionaryStats,
    pub index: IndexStats,
    pub locks: LockStats,
    pub wal_last_appended: u64,
    pub wal_last_forced: u64,
}

// ---------------------------------------------------------------------------
// QuadStore
// ---------------------------------------------------------------------------

pub struct QuadStore {
    dir: PathBuf,
    config: StoreConfig,
    properties: StoreProperties,
    wal: Arc<Wal>,
    dictionary: Arc<TermDictionary>,
    index: IndexSet,
    locks: ConcurrencyController,
    /// Serialises transactions.
    writer: Mutex<()>,
    closed: AtomicBool,
}

impl QuadStore {
    /// Open or create the store in `dir`.
    ///
    /// The WAL is opened before the dictionary so damaged or missing term
    /// records can be recovered from it, and the index set checks its
    /// orderings against each other before the store becomes visible.
    pub fn open(dir: impl AsRef<Path>, config: StoreConfig) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        Self::open_inner(&dir, config).map_err(|e| {
            error!(dir = %dir.display(), error = %e, "Failed to open quad store");
            e
        })
    }

    fn open_inner(dir: &Path, config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        fs::create_dir_all(dir)?;

        let properties = StoreProperties::load_or_create(dir)?;
        let wal = Arc::new(Wal::open(
            dir.join(WAL_DIR),
            properties.store_id,
            config.wal_config(),
        )?);
        let dictionary = Arc::new(TermDictionary::open(
            dir,
            config.dictionary_config(),
            Arc::clone(&wal),
        )?);
        let index = IndexSet::open(dir, config.index_config())?;
        let locks = ConcurrencyController::new(config.lock_config());

        info!(
            dir = %dir.display(),
            store_id = %properties.store_id,
            terms = dictionary.len(),
            statements = index.len(),
            orderings = %config.indexes,
            "Opened quad store"
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            properties,
            wal,
            dictionary,
            index,
            locks,
            writer: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    /// Start a transaction, waiting for any other transaction to finish.
    pub fn begin(&self) -> StoreResult<Transaction<'_>> {
        self.ensure_open()?;
        let writer = self.writer_guard();
        // Closed while we waited.
        self.ensure_open()?;
        Ok(Transaction::new(self, writer))
    }

    /// Committed statements matching `pattern`, resolved lazily.
    pub fn statements(&self, pattern: &QuadPattern) -> StoreResult<Statements> {
        self.ensure_open()?;
        let _read = self.locks.acquire_shared();
        let Some(pattern) = self.statement_pattern(pattern)? else {
            return Ok(Statements::empty(self));
        };
        // The scan holds its own handle on the ordering file, so it keeps
        // reading the generation it opened after the lock is released.
        Ok(Statements::new(self, self.index.scan(&pattern)?))
    }

    /// Committed statement count.
    pub fn size(&self) -> StoreResult<u64> {
        self.ensure_open()?;
        let _read = self.locks.acquire_shared();
        Ok(self.index.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.size()? == 0)
    }

    /// Resolve every term and compare every ordering.
    pub fn check_consistency(&self) -> StoreResult<StoreReport> {
        self.ensure_open()?;
        let _read = self.locks.acquire_shared();
        Ok(StoreReport {
            dictionary: self.dictionary.check_consistency()?,
            index: self.index.check_consistency()?,
        })
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            store_id: self.properties.store_id,
            dictionary: self.dictionary.stats(),
            index: self.index.stats(),
            locks: self.locks.stats(),
            wal_last_appended: self.wal.last_appended(),
            wal_last_forced: self.wal.last_forced(),
        }
    }

    /// Flush the dictionary and close the WAL. Waits for a running
    /// transaction. Idempotent.
    pub fn close(&self) -> StoreResult<()> {
        let _writer = self.writer_guard();
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let _exclusive = self.locks.acquire_exclusive();
        self.dictionary.sync()?;
        self.wal.close()?;
        info!(dir = %self.dir.display(), store_id = %self.properties.store_id, "Closed quad store");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn store_id(&self) -> Uuid {
        self.properties.store_id
    }

    pub fn properties(&self) -> &StoreProperties {
        &self.properties
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn dictionary(&self) -> &TermDictionary {
        &self.dictionary
    }

    pub fn index(&self) -> &IndexSet {
        &self.index
    }

    pub fn locks(&self) -> &ConcurrencyController {
        &self.locks
    }

    pub fn wal(&self) -> &Wal {
        &self.wal
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    pub(crate) fn ensure_open(&self) -> StoreResult<()> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Id-level pattern, or `None` when a bound term was never interned
    /// and nothing can match.
    pub(crate) fn statement_pattern(
        &self,
        pattern: &QuadPattern,
    ) -> StoreResult<Option<StatementPattern>> {
        let mut ids = StatementPattern::all();
        for (term, slot) in [
            (&pattern.subject, &mut ids.subject),
            (&pattern.predicate, &mut ids.predicate),
            (&pattern.object, &mut ids.object),
        ] {
            if let Some(term) = term {
                match self.dictionary.lookup(term)? {
                    Some(id) => *slot = Some(id.get()),
                    None => return Ok(None),
                }
            }
        }
        ids.context = match &pattern.context {
            ContextFilter::Any => None,
            ContextFilter::DefaultGraph => Some(DEFAULT_CONTEXT),
            ContextFilter::Named(term) => match self.dictionary.lookup(term)? {
                Some(id) => Some(id.get()),
                None => return Ok(None),
            },
        };
        Ok(Some(ids))
    }

    /// Look up `term` without minting.
    pub(crate) fn lookup(&self, term: &Term) -> StoreResult<Option<TermId>> {
        Ok(self.dictionary.lookup(term)?)
    }

    fn writer_guard(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn dictionary_handle(&self) -> &Arc<TermDictionary> {
        &self.dictionary
    }
}

impl Drop for QuadStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(dir = %self.dir.display(), error = %e, "Failed to close quad store cleanly");
        }
    }
}

impl std::fmt::Debug for QuadStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuadStore")
            .field("dir", &self.dir)
            .field("store_id", &self.properties.store_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// Lazy sequence of resolved statements. Ids are resolved as the sequence
/// is consumed; a failing scan ends it after yielding the error.
pub struct Statements {
    scan: Box<dyn Iterator<Item = IndexResult<Statement>> + Send>,
    dictionary: Arc<TermDictionary>,
}

impl Statements {
    pub(crate) fn new(
        store: &QuadStore,
        scan: impl Iterator<Item = IndexResult<Statement>> + Send + 'static,
    ) -> Self {
        Self {
            scan: Box::new(scan),
            dictionary: Arc::clone(store.dictionary_handle()),
        }
    }

    pub(crate) fn empty(store: &QuadStore) -> Self {
        Self::new(store, std::iter::empty())
    }

    fn resolve(&self, statement: Statement) -> StoreResult<ResolvedQuad> {
        let context = match statement.context {
            DEFAULT_CONTEXT => None,
            id => Some(self.resolve_id(id)?),
        };
        Ok(ResolvedQuad {
            subject: self.resolve_id(statement.subject)?,
            predicate: self.resolve_id(statement.predicate)?,
            object: self.resolve_id(statement.object)?,
            context,
        })
    }

    fn resolve_id(&self, raw: u32) -> StoreResult<ResolvedTerm> {
        let id = TermId::new(raw).ok_or(DictError::UnknownId(raw))?;
        Ok(self.dictionary.resolve(id)?)
    }
}

impl Iterator for Statements {
    type Item = StoreResult<ResolvedQuad>;

    fn next(&mut self) -> Option<Self::Item> {
        let statement = match self.scan.next()? {
            Ok(statement) => statement,
            Err(e) => return Some(Err(e.into())),
        };
        Some(self.resolve(statement))
    }
}
