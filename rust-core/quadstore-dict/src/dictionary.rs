// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// TermDictionary: interns terms to dense ids and resolves them back.
//
// Minting order is WAL record, data file record, arena entry, hash index
// entry. The data file is trusted for well-formed records; the WAL is only
// read when a record fails validation on resolve, or on open when the WAL
// knows ids the arena has lost.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use quadstore_wal::Wal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::DictionaryCaches;
use crate::codec::{NativeValue, TermRecord};
use crate::error::{DictError, DictResult};
use crate::files::{
    DataFile, OffsetArena, RecordFault, NAMESPACES_ID_MAGIC, NAMESPACES_MAGIC, VALUES_ID_MAGIC,
    VALUES_MAGIC,
};
use crate::hash_index::HashIndex;
use crate::term::{split_iri, Literal, Term, TermId};

pub const VALUES_FILE: &str = "values.dat";
pub const VALUES_ID_FILE: &str = "values.id";
pub const NAMESPACES_FILE: &str = "namespaces.dat";
pub const NAMESPACES_ID_FILE: &str = "namespaces.id";
pub const HASH_FILE: &str = "values.hash";

const MAX_LANGUAGE_TAG_LEN: usize = 255;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DictionaryConfig {
    /// id -> term cache entries.
    pub term_cache_size: usize,
    /// term -> id cache entries.
    pub term_id_cache_size: usize,
    /// namespace id -> namespace cache entries.
    pub namespace_cache_size: usize,
    /// namespace -> namespace id cache entries.
    pub namespace_id_cache_size: usize,
    /// Restore ids found in the WAL but missing from the offset arena.
    pub recover_on_open: bool,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self {
            term_cache_size: 512,
            term_id_cache_size: 128,
            namespace_cache_size: 64,
            namespace_id_cache_size: 32,
            recover_on_open: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution results
// ---------------------------------------------------------------------------

/// A term record that failed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct CorruptTerm {
    pub id: TermId,
    /// What was wrong with the stored record.
    pub reason: String,
    /// The term as last minted in the WAL, if the WAL still holds it.
    pub recovered: Option<Term>,
}

impl CorruptTerm {
    /// String value of the recovered term.
    pub fn string_value(&self) -> Option<String> {
        self.recovered.as_ref().map(Term::string_value)
    }
}

/// Outcome of resolving an id.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedTerm {
    Valid(Term),
    Corrupt(CorruptTerm),
}

impl ResolvedTerm {
    /// The stored term, or the WAL-recovered one for a corrupt record.
    pub fn term(&self) -> Option<&Term> {
        match self {
            ResolvedTerm::Valid(term) => Some(term),
            ResolvedTerm::Corrupt(corrupt) => corrupt.recovered.as_ref(),
        }
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, ResolvedTerm::Corrupt(_))
    }

    pub fn into_valid(self) -> Option<Term> {
        match self {
            ResolvedTerm::Valid(term) => Some(term),
            ResolvedTerm::Corrupt(_) => None,
        }
    }

    pub fn string_value(&self) -> Option<String> {
        self.term().map(Term::string_value)
    }
}

/// Result of a full dictionary scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConsistencyReport {
    pub checked: usize,
    /// Ids whose record failed validation.
    pub corrupt: Vec<TermId>,
    /// Ids whose term looks up to a different id.
    pub mismatched: Vec<TermId>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.corrupt.is_empty() && self.mismatched.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DictionaryStats {
    pub terms: usize,
    pub namespaces: usize,
    pub data_bytes: u64,
    pub cached_terms: usize,
    pub pending_wal_sequence: u64,
}

// ---------------------------------------------------------------------------
// TermDictionary
// ---------------------------------------------------------------------------

pub struct TermDictionary {
    dir: PathBuf,
    values: DataFile,
    ids: OffsetArena,
    namespace_values: DataFile,
    namespace_ids: OffsetArena,
    hash: HashIndex,
    caches: DictionaryCaches,
    wal: Arc<Wal>,
    /// Serialises id allocation; lookups never take it.
    mint_lock: Mutex<()>,
    /// Highest WAL sequence minted since the last drain.
    pending_wal_sequence: AtomicU64,
    config: DictionaryConfig,
}

impl TermDictionary {
    /// Open or create the dictionary files in `dir`.
    pub fn open(dir: impl AsRef<Path>, config: DictionaryConfig, wal: Arc<Wal>) -> DictResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let dictionary = Self {
            values: DataFile::open(dir.join(VALUES_FILE), VALUES_MAGIC)?,
            ids: OffsetArena::open(dir.join(VALUES_ID_FILE), VALUES_ID_MAGIC)?,
            namespace_values: DataFile::open(dir.join(NAMESPACES_FILE), NAMESPACES_MAGIC)?,
            namespace_ids: OffsetArena::open(dir.join(NAMESPACES_ID_FILE), NAMESPACES_ID_MAGIC)?,
            hash: HashIndex::open(dir.join(HASH_FILE))?,
            caches: DictionaryCaches::new(
                config.term_cache_size,
                config.term_id_cache_size,
                config.namespace_cache_size,
                config.namespace_id_cache_size,
            ),
            wal,
            mint_lock: Mutex::new(()),
            pending_wal_sequence: AtomicU64::new(0),
            config,
            dir,
        };

        dictionary.reconcile_hash_index()?;
        if dictionary.config.recover_on_open {
            dictionary.recover_from_wal()?;
        }

        info!(
            dir = %dictionary.dir.display(),
            terms = dictionary.len(),
            namespaces = dictionary.namespace_ids.len(),
            "Opened term dictionary"
        );
        Ok(dictionary)
    }

    fn mint_guard(&self) -> MutexGuard<'_, ()> {
        self.mint_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -----------------------------------------------------------------------
    // Interning
    // -----------------------------------------------------------------------

    /// Return the id of `term`, minting one if the term is new.
    pub fn intern(&self, term: &Term) -> DictResult<TermId> {
        if let Some(id) = self.caches.term_ids.get(term) {
            return Ok(id);
        }
        validate(term)?;

        // Components first: they take the mint lock themselves.
        let record = self
            .record_for(term, true)?
            .ok_or_else(|| DictError::InvalidTerm(format!("unencodable term {term}")))?;
        let key = record.encode();

        if let Some(id) = self.existing_id(&key)? {
            self.caches.remember(id, term);
            return Ok(id);
        }

        let _mint = self.mint_guard();
        if let Some(id) = self.existing_id(&key)? {
            self.caches.remember(id, term);
            return Ok(id);
        }

        let id = self.next_id()?;
        let sequence = self.wal.log_mint(id.get(), serde_json::to_vec(term)?)?;
        let offset = self.values.append(&key)?;
        self.ids.push(offset)?;
        self.hash.stage_term(key, id.get());
        self.pending_wal_sequence.fetch_max(sequence, Ordering::AcqRel);

        debug!(id = id.get(), sequence, "Minted term id");
        self.caches.remember(id, term);
        Ok(id)
    }

    /// Id of `term` if it has been interned. Never mints.
    pub fn lookup(&self, term: &Term) -> DictResult<Option<TermId>> {
        if let Some(id) = self.caches.term_ids.get(term) {
            return Ok(Some(id));
        }
        let Some(record) = self.record_for(term, false)? else {
            return Ok(None);
        };
        let id = self.existing_id(&record.encode())?;
        if let Some(id) = id {
            self.caches.term_ids.put(term.clone(), id);
        }
        Ok(id)
    }

    fn existing_id(&self, key: &[u8]) -> DictResult<Option<TermId>> {
        Ok(self.hash.term_id(key)?.and_then(TermId::new))
    }

    fn next_id(&self) -> DictResult<TermId> {
        u32::try_from(self.ids.len() + 1)
            .ok()
            .and_then(TermId::new)
            .ok_or(DictError::IdSpaceExhausted)
    }

    /// Build the record for `term`. With `create` unset, a component that
    /// has no id yet makes the whole term unknown (`None`).
    fn record_for(&self, term: &Term, create: bool) -> DictResult<Option<TermRecord>> {
        let record = match term {
            Term::Iri(iri) => {
                let (namespace, local) = split_iri(iri);
                let namespace = if create {
                    Some(self.intern_namespace(namespace)?)
                } else {
                    self.lookup_namespace(namespace)?
                };
                match namespace {
                    Some(namespace) => TermRecord::Iri {
                        namespace,
                        local: local.to_string(),
                    },
                    None => return Ok(None),
                }
            }
            Term::BlankNode(id) => TermRecord::BlankNode(id.clone()),
            Term::Literal(literal) => {
                let datatype = match &literal.datatype {
                    None => 0,
                    Some(datatype) => match self.component(&Term::Iri(datatype.clone()), create)? {
                        Some(id) => id.get(),
                        None => return Ok(None),
                    },
                };
                let native = match (&literal.language, &literal.datatype) {
                    (None, Some(datatype)) => NativeValue::from_label(&literal.label, datatype),
                    _ => None,
                };
                match native {
                    Some(value) => TermRecord::Native { datatype, value },
                    None => TermRecord::Literal {
                        datatype,
                        language: literal.language.clone(),
                        label: literal.label.clone(),
                    },
                }
            }
            Term::Triple(triple) => {
                let parts = [&triple.subject, &triple.predicate, &triple.object];
                let mut ids = [0u32; 3];
                for (slot, part) in ids.iter_mut().zip(parts) {
                    match self.component(part, create)? {
                        Some(id) => *slot = id.get(),
                        None => return Ok(None),
                    }
                }
                TermRecord::Triple {
                    subject: ids[0],
                    predicate: ids[1],
                    object: ids[2],
                }
            }
        };
        Ok(Some(record))
    }

    fn component(&self, term: &Term, create: bool) -> DictResult<Option<TermId>> {
        if create {
            self.intern(term).map(Some)
        } else {
            self.lookup(term)
        }
    }

    fn intern_namespace(&self, namespace: &str) -> DictResult<u32> {
        if let Some(id) = self.lookup_namespace(namespace)? {
            return Ok(id);
        }

        let _mint = self.mint_guard();
        if let Some(id) = self.hash.namespace_id(namespace)? {
            return Ok(id);
        }

        let id = u32::try_from(self.namespace_ids.len() + 1)
            .map_err(|_| DictError::IdSpaceExhausted)?;
        let offset = self.namespace_values.append(namespace.as_bytes())?;
        self.namespace_ids.push(offset)?;
        self.hash.stage_namespace(namespace.to_string(), id);
        self.caches.namespace_ids.put(namespace.to_string(), id);
        self.caches.namespaces.put(id, namespace.to_string());
        debug!(namespace_id = id, namespace, "Minted namespace id");
        Ok(id)
    }

    fn lookup_namespace(&self, namespace: &str) -> DictResult<Option<u32>> {
        let key = namespace.to_string();
        if let Some(id) = self.caches.namespace_ids.get(&key) {
            return Ok(Some(id));
        }
        let id = self.hash.namespace_id(namespace)?;
        if let Some(id) = id {
            self.caches.namespace_ids.put(key, id);
        }
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// Resolve `id` to its term.
    ///
    /// A record that fails validation, or cannot be read, yields
    /// `ResolvedTerm::Corrupt` carrying the WAL's copy of the term when the
    /// WAL still has one.
    pub fn resolve(&self, id: TermId) -> DictResult<ResolvedTerm> {
        if let Some(term) = self.caches.terms.get(&id) {
            return Ok(ResolvedTerm::Valid(term));
        }
        let offset = self
            .ids
            .get(id.slot())
            .ok_or(DictError::UnknownId(id.get()))?;

        match self.read_term(id, offset) {
            Ok(term) => {
                self.caches.remember(id, &term);
                Ok(ResolvedTerm::Valid(term))
            }
            Err(fault) => Ok(ResolvedTerm::Corrupt(self.recover(id, fault))),
        }
    }

    fn read_term(&self, id: TermId, offset: u64) -> Result<Term, RecordFault> {
        let body = self.values.read(offset)?;
        let record = TermRecord::decode(&body).map_err(|e| RecordFault::Malformed(e.to_string()))?;

        let term = match record {
            TermRecord::Iri { namespace, local } => {
                Term::Iri(format!("{}{local}", self.namespace(namespace)?))
            }
            TermRecord::BlankNode(node) => Term::BlankNode(node),
            TermRecord::Literal {
                datatype,
                language,
                label,
            } => {
                let datatype = match datatype {
                    0 => None,
                    raw => Some(self.component_iri(id, raw)?),
                };
                Term::Literal(Literal {
                    label,
                    language,
                    datatype,
                })
            }
            TermRecord::Native { datatype, value } => Term::Literal(Literal {
                label: value.label(),
                language: None,
                datatype: Some(self.component_iri(id, datatype)?),
            }),
            TermRecord::Triple {
                subject,
                predicate,
                object,
            } => Term::triple(
                self.component_term(id, subject)?,
                self.component_term(id, predicate)?,
                self.component_term(id, object)?,
            ),
        };
        Ok(term)
    }

    /// Components are always minted before the terms that use them, so a
    /// reference to an equal or higher id is itself corruption.
    fn component_term(&self, owner: TermId, raw: u32) -> Result<Term, RecordFault> {
        let id = TermId::new(raw)
            .filter(|id| *id < owner)
            .ok_or(RecordFault::DanglingComponent(raw))?;
        match self.resolve(id) {
            Ok(ResolvedTerm::Valid(term)) => Ok(term),
            _ => Err(RecordFault::DanglingComponent(raw)),
        }
    }

    fn component_iri(&self, owner: TermId, raw: u32) -> Result<String, RecordFault> {
        match self.component_term(owner, raw)? {
            Term::Iri(iri) => Ok(iri),
            other => Err(RecordFault::Malformed(format!("datatype {other} is not an IRI"))),
        }
    }

    fn namespace(&self, namespace_id: u32) -> Result<String, RecordFault> {
        if let Some(namespace) = self.caches.namespaces.get(&namespace_id) {
            return Ok(namespace);
        }
        let offset = namespace_id
            .checked_sub(1)
            .and_then(|slot| self.namespace_ids.get(slot as usize))
            .ok_or_else(|| RecordFault::Malformed(format!("unknown namespace {namespace_id}")))?;
        let bytes = self.namespace_values.read(offset)?;
        let namespace = String::from_utf8(bytes)
            .map_err(|_| RecordFault::Malformed(format!("namespace {namespace_id} is not UTF-8")))?;
        self.caches.namespaces.put(namespace_id, namespace.clone());
        Ok(namespace)
    }

    fn recover(&self, id: TermId, fault: RecordFault) -> CorruptTerm {
        warn!(id = id.get(), reason = %fault, "Corrupt term record, consulting WAL");

        let recovered = match self.wal.find_mint(id.get()) {
            Ok(Some(entry)) => match serde_json::from_slice::<Term>(&entry.payload) {
                Ok(term) => Some(term),
                Err(e) => {
                    warn!(id = id.get(), error = %e, "WAL mint record for term is unreadable");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(id = id.get(), error = %e, "WAL lookup failed during term recovery");
                None
            }
        };

        match &recovered {
            Some(term) => info!(id = id.get(), term = %term, "Recovered corrupt term from WAL"),
            None => warn!(id = id.get(), "No WAL record for corrupt term"),
        }

        CorruptTerm {
            id,
            reason: fault.to_string(),
            recovered,
        }
    }

    // -----------------------------------------------------------------------
    // Durability
    // -----------------------------------------------------------------------

    /// Take the highest WAL sequence minted since the previous call.
    pub fn drain_pending_wal_high_water_mark(&self) -> Option<u64> {
        match self.pending_wal_sequence.swap(0, Ordering::AcqRel) {
            0 => None,
            sequence => Some(sequence),
        }
    }

    /// Block until the WAL has fsynced through `sequence`.
    pub fn await_durable(&self, sequence: u64) -> DictResult<()> {
        self.wal.await_durable(sequence)?;
        Ok(())
    }

    /// Fsync the value files and persist staged hash index entries.
    pub fn sync(&self) -> DictResult<()> {
        let _mint = self.mint_guard();
        self.values.sync()?;
        self.ids.sync()?;
        self.namespace_values.sync()?;
        self.namespace_ids.sync()?;
        if self.hash.staged_len() > 0 {
            self.hash
                .flush(self.ids.len() as u64, self.namespace_ids.len() as u64)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Resolve every id and look each term back up.
    pub fn check_consistency(&self) -> DictResult<ConsistencyReport> {
        let mut report = ConsistencyReport::default();
        for id in self.ids() {
            report.checked += 1;
            match self.resolve(id)? {
                ResolvedTerm::Valid(term) => {
                    if self.lookup(&term)? != Some(id) {
                        report.mismatched.push(id);
                    }
                }
                ResolvedTerm::Corrupt(_) => report.corrupt.push(id),
            }
        }
        if !report.is_consistent() {
            warn!(
                corrupt = report.corrupt.len(),
                mismatched = report.mismatched.len(),
                "Term dictionary consistency check found problems"
            );
        }
        Ok(report)
    }

    /// Bring the hash index up to the arena, rebuilding it if it claims ids
    /// the arena does not have.
    fn reconcile_hash_index(&self) -> DictResult<()> {
        let (terms_indexed, namespaces_indexed) = self.hash.watermarks()?;
        let terms = self.ids.len() as u64;
        let namespaces = self.namespace_ids.len() as u64;

        let (term_from, namespace_from) = if terms_indexed > terms || namespaces_indexed > namespaces {
            warn!(
                terms_indexed,
                terms,
                namespaces_indexed,
                namespaces,
                "Term hash index is ahead of the value files, rebuilding"
            );
            self.hash.clear()?;
            (0, 0)
        } else {
            (terms_indexed, namespaces_indexed)
        };

        if term_from == terms && namespace_from == namespaces {
            return Ok(());
        }

        for slot in namespace_from..namespaces {
            let Some(offset) = self.namespace_ids.get(slot as usize) else { break };
            match self.namespace_values.read(offset).map(String::from_utf8) {
                Ok(Ok(namespace)) => self.hash.stage_namespace(namespace, slot as u32 + 1),
                _ => warn!(namespace_id = slot + 1, "Skipping unreadable namespace record"),
            }
        }
        for slot in term_from..terms {
            let Some(offset) = self.ids.get(slot as usize) else { break };
            let id = slot as u32 + 1;
            match self.values.read(offset) {
                Ok(body) => self.hash.stage_term(body, id),
                Err(fault) => match self.record_key_from_wal(id)? {
                    Some(key) => {
                        warn!(id, reason = %fault, "Indexing corrupt record under its WAL term");
                        self.hash.stage_term(key, id);
                    }
                    None => warn!(id, reason = %fault, "Skipping corrupt record while indexing"),
                },
            }
        }
        self.hash.flush(terms, namespaces)?;
        info!(
            from = term_from,
            to = terms,
            "Caught up term hash index"
        );
        Ok(())
    }

    /// Hash key for `id` rebuilt from its WAL mint record. Components are
    /// looked up, never minted; `None` when the WAL has no usable record.
    fn record_key_from_wal(&self, id: u32) -> DictResult<Option<Vec<u8>>> {
        let Some(entry) = self.wal.find_mint(id)? else {
            return Ok(None);
        };
        let term: Term = match serde_json::from_slice(&entry.payload) {
            Ok(term) => term,
            Err(e) => {
                warn!(id, error = %e, "Unreadable WAL mint record");
                return Ok(None);
            }
        };
        Ok(self.record_for(&term, false)?.map(|record| record.encode()))
    }

    /// Restore ids the WAL minted past the end of the offset arena, in id
    /// order, stopping at the first gap. Returns how many were restored.
    ///
    /// Only the newest segments are read when the arena is already caught up.
    pub fn recover_from_wal(&self) -> DictResult<usize> {
        let known = self.ids.len() as u32;
        let reader = self.wal.reader()?;
        if reader.last_minted_id()?.map_or(true, |last| last <= known) {
            return Ok(0);
        }
        let mints = reader.mints_after(known)?;
        if mints.is_empty() {
            return Ok(0);
        }

        let mut restored = 0;
        for (raw, entry) in mints {
            let term: Term = match serde_json::from_slice(&entry.payload) {
                Ok(term) => term,
                Err(e) => {
                    warn!(id = raw, error = %e, "Unreadable WAL mint record, stopping recovery");
                    break;
                }
            };
            if !self.restore(raw, &term)? {
                break;
            }
            restored += 1;
        }

        if restored > 0 {
            self.sync()?;
            info!(restored, terms = self.len(), "Restored term records from WAL");
        }
        Ok(restored)
    }

    fn restore(&self, raw: u32, term: &Term) -> DictResult<bool> {
        let Some(record) = self.record_for(term, true)? else {
            return Ok(false);
        };
        let key = record.encode();

        let _mint = self.mint_guard();
        let expected = self.next_id()?;
        if expected.get() != raw {
            warn!(id = raw, expected = expected.get(), "Gap in WAL mint records, stopping recovery");
            return Ok(false);
        }
        if let Some(existing) = self.existing_id(&key)? {
            warn!(id = raw, existing = existing.get(), "WAL term already interned, stopping recovery");
            return Ok(false);
        }

        let offset = self.values.append(&key)?;
        self.ids.push(offset)?;
        self.hash.stage_term(key, raw);
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Number of allocated ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// All allocated ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = TermId> {
        (1..=self.len() as u32).filter_map(TermId::new)
    }

    pub fn wal(&self) -> &Arc<Wal> {
        &self.wal
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &DictionaryConfig {
        &self.config
    }

    pub fn stats(&self) -> DictionaryStats {
        DictionaryStats {
            terms: self.ids.len(),
            namespaces: self.namespace_ids.len(),
            data_bytes: self.values.len(),
            cached_terms: self.caches.terms.len(),
            pending_wal_sequence: self.pending_wal_sequence.load(Ordering::Acquire),
        }
    }
}

fn validate(term: &Term) -> DictResult<()> {
    match term {
        Term::Iri(iri) if iri.is_empty() => Err(DictError::InvalidTerm("empty IRI".into())),
        Term::BlankNode(id) if id.is_empty() => {
            Err(DictError::InvalidTerm("empty blank node id".into()))
        }
        Term::Literal(Literal {
            language: Some(language),
            ..
        }) if language.is_empty() || language.len() > MAX_LANGUAGE_TAG_LEN => Err(
            DictError::InvalidTerm(format!("language tag {language:?}")),
        ),
        Term::Literal(Literal {
            datatype: Some(datatype),
            ..
        }) if datatype.is_empty() => Err(DictError::InvalidTerm("empty datatype IRI".into())),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::xsd;
    use quadstore_wal::WalConfig;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn open_dictionary(dir: &Path) -> TermDictionary {
        let wal = Wal::open(dir.join("wal"), Uuid::nil(), WalConfig::default()).unwrap();
        TermDictionary::open(dir, DictionaryConfig::default(), Arc::new(wal)).unwrap()
    }

    #[test]
    fn test_intern_is_stable() {
        let dir = TempDir::new().unwrap();
        let dict = open_dictionary(dir.path());
        let term = Term::iri("http://example.org/a");
        let first = dict.intern(&term).unwrap();
        let second = dict.intern(&term).unwrap();
        assert_eq!(first, second);
        assert_eq!(dict.lookup(&term).unwrap(), Some(first));
    }

    #[test]
    fn test_components_are_interned_first() {
        let dir = TempDir::new().unwrap();
        let dict = open_dictionary(dir.path());
        let literal = Term::typed_literal("7", xsd::INTEGER);
        let id = dict.intern(&literal).unwrap();
        let datatype = dict.lookup(&Term::iri(xsd::INTEGER)).unwrap().unwrap();
        assert!(datatype < id);
    }

    #[test]
    fn test_lookup_does_not_mint() {
        let dir = TempDir::new().unwrap();
        let dict = open_dictionary(dir.path());
        assert_eq!(
            dict.lookup(&Term::typed_literal("x", "http://example.org/dt")).unwrap(),
            None
        );
        assert!(dict.is_empty());
    }

    #[test]
    fn test_unknown_id_is_an_error() {
        let dir = TempDir::new().unwrap();
        let dict = open_dictionary(dir.path());
        assert!(matches!(
            dict.resolve(TermId::new(99).unwrap()),
            Err(DictError::UnknownId(99))
        ));
    }

    #[test]
    fn test_drain_high_water_mark_clears() {
        let dir = TempDir::new().unwrap();
        let dict = open_dictionary(dir.path());
        assert_eq!(dict.drain_pending_wal_high_water_mark(), None);
        dict.intern(&Term::blank("b1")).unwrap();
        let mark = dict.drain_pending_wal_high_water_mark().unwrap();
        dict.await_durable(mark).unwrap();
        assert_eq!(dict.drain_pending_wal_high_water_mark(), None);
    }

    #[test]
    fn test_invalid_terms_rejected() {
        let dir = TempDir::new().unwrap();
        let dict = open_dictionary(dir.path());
        assert!(dict.intern(&Term::iri("")).is_err());
        assert!(dict.intern(&Term::lang_literal("x", "")).is_err());
        assert!(dict.intern(&Term::lang_literal("x", "a".repeat(300))).is_err());
    }
}
