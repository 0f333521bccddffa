// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// IndexSet: every configured ordering holds the same statement set.
//
// Mutations are staged in memory and reach all orderings together at commit
// through the journal protocol in `journal.rs`. On open, every ordering is
// checked against the others; divergence is fatal unless the repair policy
// allows rebuilding the damaged ones from a healthy ordering.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{IndexError, IndexResult};
use crate::file::{
    read_all_keys, read_header, sync_dir, verify_records, write_index, IndexFileWriter,
    IndexHeader, KeyRange,
};
use crate::journal::Journal;
use crate::ordering::{IndexKey, IndexOrdering, DEFAULT_ORDERINGS};
use crate::properties::IndexProperties;
use crate::statement::{Statement, StatementPattern};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when an ordering disagrees with the others on open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexRepairPolicy {
    /// Refuse to open.
    #[default]
    FailClosed,
    /// Rebuild damaged orderings from the primary (or the healthiest
    /// remaining ordering) and log a warning.
    #[serde(alias = "rebuild")]
    RebuildFromPrimary,
}

impl FromStr for IndexRepairPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-closed" | "fail_closed" | "failclosed" => Ok(Self::FailClosed),
            "rebuild" | "rebuild-from-primary" | "rebuild_from_primary" => {
                Ok(Self::RebuildFromPrimary)
            }
            other => Err(format!("unknown index repair policy {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Ordering codes, primary first (`"spoc,posc"`).
    pub orderings: String,
    pub repair: IndexRepairPolicy,
    /// Recompute record checksums on open.
    pub verify_checksums: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            orderings: DEFAULT_ORDERINGS.to_string(),
            repair: IndexRepairPolicy::FailClosed,
            verify_checksums: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub generation: u64,
    pub added: usize,
    pub removed: usize,
    /// Committed statement count after the commit.
    pub statements: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderingReport {
    pub code: String,
    pub generation: Option<u64>,
    pub statements: Option<u64>,
    pub problem: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub generation: u64,
    pub statements: u64,
    pub orderings: Vec<OrderingReport>,
}

impl IndexReport {
    pub fn is_consistent(&self) -> bool {
        self.orderings.iter().all(|o| o.problem.is_none())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub orderings: Vec<String>,
    pub generation: u64,
    pub statements: u64,
    pub staged_additions: usize,
    pub staged_removals: usize,
}

// ---------------------------------------------------------------------------
// IndexSet
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Staged {
    added: BTreeSet<Statement>,
    removed: BTreeSet<Statement>,
}

impl Staged {
    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Committed {
    generation: u64,
    statements: u64,
}

pub struct IndexSet {
    dir: PathBuf,
    orderings: Vec<IndexOrdering>,
    config: IndexConfig,
    committed: RwLock<Committed>,
    staged: Mutex<Staged>,
    needs_recovery: AtomicBool,
}

type Inspection = Result<IndexHeader, String>;

impl IndexSet {
    /// Open the orderings in `dir`, completing an interrupted commit and
    /// checking the orderings against each other.
    pub fn open(dir: impl AsRef<Path>, config: IndexConfig) -> IndexResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let requested = IndexOrdering::parse_list(&config.orderings)?;
        remove_stale_temporaries(&dir)?;

        let known: Vec<IndexOrdering> = match IndexProperties::load(&dir)? {
            Some(props) => props
                .orderings
                .iter()
                .map(|code| IndexOrdering::parse(code))
                .collect::<IndexResult<_>>()?,
            None => {
                // Without properties a missing file cannot be told apart from
                // a new ordering, so every requested ordering must be present.
                if requested.iter().any(|o| dir.join(o.file_name()).exists()) {
                    warn!(dir = %dir.display(), "Index properties missing, expecting every configured ordering");
                    requested.clone()
                } else {
                    Vec::new()
                }
            }
        };

        let mut inspected: Vec<(IndexOrdering, Inspection)> = known
            .iter()
            .map(|o| (*o, inspect(&dir, o, config.verify_checksums)))
            .collect();

        if let Some(journal) = Journal::read(&dir)? {
            complete_journal(&dir, &journal, &mut inspected)?;
        }

        let committed = if known.is_empty() {
            for ordering in &requested {
                write_index(&dir.join(ordering.file_name()), ordering, 0, Vec::new())?;
            }
            sync_dir(&dir)?;
            info!(dir = %dir.display(), "Created empty statement indexes");
            Committed::default()
        } else {
            let (source, committed) =
                reconcile(&dir, &requested[0], &mut inspected, config.repair)?;
            for ordering in requested.iter().filter(|o| !known.contains(o)) {
                info!(ordering = %ordering, from = %source, "Building newly configured index ordering");
                rebuild(&dir, &source, ordering, committed.generation)?;
            }
            committed
        };

        for ordering in known.iter().filter(|o| !requested.contains(o)) {
            info!(ordering = %ordering, "Removing index ordering no longer configured");
            match fs::remove_file(dir.join(ordering.file_name())) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        IndexProperties::new(requested.iter().map(IndexOrdering::code).collect()).save(&dir)?;

        info!(
            dir = %dir.display(),
            orderings = %config.orderings,
            generation = committed.generation,
            statements = committed.statements,
            "Opened statement indexes"
        );
        Ok(Self {
            dir,
            orderings: requested,
            config,
            committed: RwLock::new(committed),
            staged: Mutex::new(Staged::default()),
            needs_recovery: AtomicBool::new(false),
        })
    }

    fn staged(&self) -> MutexGuard<'_, Staged> {
        self.staged.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn committed_read(&self) -> RwLockReadGuard<'_, Committed> {
        self.committed.read().unwrap_or_else(|e| e.into_inner())
    }

    fn committed_write(&self) -> RwLockWriteGuard<'_, Committed> {
        self.committed.write().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_usable(&self) -> IndexResult<()> {
        if self.needs_recovery.load(Ordering::Acquire) {
            return Err(IndexError::NeedsRecovery);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Staging
    // -----------------------------------------------------------------------

    /// Start a transaction. Anything still staged is discarded.
    pub fn begin(&self) {
        let mut staged = self.staged();
        if !staged.is_empty() {
            warn!(
                added = staged.added.len(),
                removed = staged.removed.len(),
                "Discarding staged index changes from an unfinished transaction"
            );
        }
        *staged = Staged::default();
    }

    pub fn add_statement(&self, statement: Statement) {
        let mut staged = self.staged();
        staged.removed.remove(&statement);
        staged.added.insert(statement);
    }

    pub fn remove_statement(&self, statement: Statement) {
        let mut staged = self.staged();
        staged.added.remove(&statement);
        staged.removed.insert(statement);
    }

    /// Stage removal of everything `pattern` matches in the writer's view.
    /// Returns how many statements that is.
    pub fn remove_matching(&self, pattern: &StatementPattern) -> IndexResult<usize> {
        let matches = self
            .scan_staged(pattern)?
            .collect::<IndexResult<Vec<Statement>>>()?;
        let mut staged = self.staged();
        for statement in &matches {
            staged.added.remove(statement);
            staged.removed.insert(*statement);
        }
        Ok(matches.len())
    }

    /// Stage removal of every statement in `context`, or in all contexts
    /// for `None`. A second call finds nothing left and returns 0.
    pub fn contextually_clear(&self, context: Option<u32>) -> IndexResult<usize> {
        let pattern = match context {
            Some(context) => StatementPattern::in_context(context),
            None => StatementPattern::all(),
        };
        let removed = self.remove_matching(&pattern)?;
        debug!(?context, removed, "Staged context clear");
        Ok(removed)
    }

    /// Drop staged changes; returns how many were dropped.
    pub fn rollback(&self) -> usize {
        let staged = std::mem::take(&mut *self.staged());
        staged.added.len() + staged.removed.len()
    }

    pub fn has_staged_changes(&self) -> bool {
        !self.staged().is_empty()
    }

    // -----------------------------------------------------------------------
    // Commit
    // -----------------------------------------------------------------------

    /// Apply staged changes to every ordering, all or nothing.
    pub fn commit(&self) -> IndexResult<CommitSummary> {
        self.ensure_usable()?;
        let staged = std::mem::take(&mut *self.staged());
        let mut committed = self.committed_write();

        if staged.is_empty() {
            return Ok(CommitSummary {
                generation: committed.generation,
                added: 0,
                removed: 0,
                statements: committed.statements,
            });
        }

        let added: Vec<Statement> = staged.added.into_iter().collect();
        let removed: Vec<Statement> = staged.removed.into_iter().collect();
        let generation = committed.generation + 1;
        let journal = Journal::new(generation, &added, &removed);
        journal.write(&self.dir)?;

        let statements = match self.apply(&journal) {
            Ok(statements) => statements,
            Err(e) => {
                self.needs_recovery.store(true, Ordering::Release);
                error!(generation, error = %e, "Index commit failed part-way; reopen to complete it");
                return Err(e);
            }
        };
        *committed = Committed {
            generation,
            statements,
        };
        // Every ordering is at `generation` now; a leftover journal is a
        // no-op on reopen.
        Journal::remove(&self.dir)?;
        debug!(
            generation,
            added = added.len(),
            removed = removed.len(),
            statements,
            "Committed index changes"
        );
        Ok(CommitSummary {
            generation,
            added: added.len(),
            removed: removed.len(),
            statements,
        })
    }

    fn apply(&self, journal: &Journal) -> IndexResult<u64> {
        let (added, removed) = journal.split();
        let mut statements: Option<u64> = None;
        for ordering in &self.orderings {
            let header = merge_into(&self.dir, ordering, journal.generation, &added, &removed)?;
            match statements {
                None => statements = Some(header.count),
                Some(expected) if expected != header.count => {
                    return Err(IndexError::inconsistent(
                        ordering.code(),
                        format!("holds {} statements after commit, expected {expected}", header.count),
                    ));
                }
                Some(_) => {}
            }
        }
        sync_dir(&self.dir)?;
        Ok(statements.unwrap_or(0))
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Lazy scan of committed statements matching `pattern`, over the
    /// ordering with the longest bound prefix.
    pub fn scan(&self, pattern: &StatementPattern) -> IndexResult<IndexScan> {
        self.ensure_usable()?;
        let ordering = *IndexOrdering::best(&self.orderings, pattern).ok_or(IndexError::NoOrderings)?;
        let (low, high) = ordering.bounds(pattern);
        let _committed = self.committed_read();
        let range = KeyRange::open(&self.dir.join(ordering.file_name()), low, high)?;
        Ok(IndexScan {
            ordering,
            pattern: *pattern,
            range,
            finished: false,
        })
    }

    /// Scan the writer's view: committed statements minus staged removals
    /// plus staged additions.
    pub fn scan_staged(&self, pattern: &StatementPattern) -> IndexResult<StagedScan> {
        let (added, hidden) = {
            let staged = self.staged();
            let added: Vec<Statement> = staged
                .added
                .iter()
                .filter(|s| pattern.matches(s))
                .copied()
                .collect();
            let hidden: HashSet<Statement> = staged
                .removed
                .iter()
                .chain(added.iter())
                .filter(|s| pattern.matches(s))
                .copied()
                .collect();
            (added, hidden)
        };
        Ok(StagedScan {
            committed: self.scan(pattern)?,
            hidden,
            added: added.into_iter(),
        })
    }

    /// Whether `statement` is committed.
    pub fn contains(&self, statement: &Statement) -> IndexResult<bool> {
        Ok(self
            .scan(&StatementPattern::exact(statement))?
            .next()
            .transpose()?
            .is_some())
    }

    /// Committed statement count.
    pub fn len(&self) -> u64 {
        self.committed_read().statements
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Statement count of the writer's view.
    pub fn staged_len(&self) -> IndexResult<u64> {
        let (added, removed): (Vec<Statement>, Vec<Statement>) = {
            let staged = self.staged();
            (
                staged.added.iter().copied().collect(),
                staged.removed.iter().copied().collect(),
            )
        };
        let mut len = self.len();
        for statement in &added {
            if !self.contains(statement)? {
                len += 1;
            }
        }
        for statement in &removed {
            if self.contains(statement)? {
                len = len.saturating_sub(1);
            }
        }
        Ok(len)
    }

    pub fn generation(&self) -> u64 {
        self.committed_read().generation
    }

    pub fn orderings(&self) -> &[IndexOrdering] {
        &self.orderings
    }

    pub fn primary(&self) -> &IndexOrdering {
        &self.orderings[0]
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stats(&self) -> IndexStats {
        let (staged_additions, staged_removals) = {
            let staged = self.staged();
            (staged.added.len(), staged.removed.len())
        };
        let committed = *self.committed_read();
        IndexStats {
            orderings: self.orderings.iter().map(IndexOrdering::code).collect(),
            generation: committed.generation,
            statements: committed.statements,
            staged_additions,
            staged_removals,
        }
    }

    // -----------------------------------------------------------------------
    // Consistency
    // -----------------------------------------------------------------------

    /// Re-check every ordering file and compare each statement set with the
    /// primary's. Does not repair anything.
    pub fn check_consistency(&self) -> IndexResult<IndexReport> {
        let committed = *self.committed_read();
        let mut primary_set: Option<Vec<Statement>> = None;
        let mut orderings = Vec::with_capacity(self.orderings.len());

        for ordering in &self.orderings {
            let mut report = OrderingReport {
                code: ordering.code(),
                generation: None,
                statements: None,
                problem: None,
            };
            match inspect(&self.dir, ordering, true) {
                Err(reason) => report.problem = Some(reason),
                Ok(header) => {
                    report.generation = Some(header.generation);
                    report.statements = Some(header.count);
                    if header.generation != committed.generation {
                        report.problem = Some(format!(
                            "generation {}, expected {}",
                            header.generation, committed.generation
                        ));
                    } else if header.count != committed.statements {
                        report.problem = Some(format!(
                            "holds {} statements, expected {}",
                            header.count, committed.statements
                        ));
                    } else {
                        let set = statement_set(&self.dir, ordering)?;
                        match &primary_set {
                            None => primary_set = Some(set),
                            Some(primary) if *primary != set => {
                                report.problem =
                                    Some("statement set differs from the primary".to_string());
                            }
                            Some(_) => {}
                        }
                    }
                }
            }
            orderings.push(report);
        }

        Ok(IndexReport {
            generation: committed.generation,
            statements: committed.statements,
            orderings,
        })
    }
}

// ---------------------------------------------------------------------------
// Scans
// ---------------------------------------------------------------------------

/// Lazy, forward-only, restartable scan of one ordering file.
pub struct IndexScan {
    ordering: IndexOrdering,
    pattern: StatementPattern,
    range: KeyRange,
    finished: bool,
}

impl IndexScan {
    pub fn ordering(&self) -> &IndexOrdering {
        &self.ordering
    }

    /// Rewind to the first match.
    pub fn restart(&mut self) -> IndexResult<()> {
        self.range.restart()?;
        self.finished = false;
        Ok(())
    }
}

impl Iterator for IndexScan {
    type Item = IndexResult<Statement>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            match self.range.next_key() {
                Ok(Some(key)) => {
                    let statement = self.ordering.statement(&key);
                    // Fields past the bound prefix are filtered here.
                    if self.pattern.matches(&statement) {
                        return Some(Ok(statement));
                    }
                }
                Ok(None) => self.finished = true,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Committed statements not staged for removal, then staged additions.
pub struct StagedScan {
    committed: IndexScan,
    hidden: HashSet<Statement>,
    added: std::vec::IntoIter<Statement>,
}

impl Iterator for StagedScan {
    type Item = IndexResult<Statement>;

    fn next(&mut self) -> Option<Self::Item> {
        for item in self.committed.by_ref() {
            match item {
                Ok(statement) if self.hidden.contains(&statement) => continue,
                other => return Some(other),
            }
        }
        self.added.next().map(Ok)
    }
}

// ---------------------------------------------------------------------------
// Open-time helpers
// ---------------------------------------------------------------------------

fn inspect(dir: &Path, ordering: &IndexOrdering, verify: bool) -> Inspection {
    let path = dir.join(ordering.file_name());
    if !path.exists() {
        return Err("file missing".to_string());
    }
    let header = read_header(&path, ordering).map_err(|e| e.to_string())?;
    if verify {
        verify_records(&path, &header).map_err(|e| e.to_string())?;
    }
    Ok(header)
}

fn remove_stale_temporaries(dir: &Path) -> IndexResult<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_tmp = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("triples") && n.ends_with(".tmp"));
        if is_tmp {
            debug!(path = %path.display(), "Removing leftover index temporary");
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Re-apply `journal` to orderings still one generation behind it.
fn complete_journal(
    dir: &Path,
    journal: &Journal,
    inspected: &mut [(IndexOrdering, Inspection)],
) -> IndexResult<()> {
    let (added, removed) = journal.split();
    let mut completed = 0;
    for (ordering, inspection) in inspected.iter_mut() {
        let Ok(header) = inspection else { continue };
        if header.generation + 1 == journal.generation {
            *inspection = Ok(merge_into(dir, ordering, journal.generation, &added, &removed)?);
            completed += 1;
        } else if header.generation != journal.generation {
            warn!(
                ordering = %ordering,
                generation = header.generation,
                journal = journal.generation,
                "Commit journal does not match ordering generation"
            );
        }
    }
    sync_dir(dir)?;
    info!(
        generation = journal.generation,
        completed,
        "Completed interrupted index commit"
    );
    Journal::remove(dir)
}

/// Decide the committed state from the inspected orderings and deal with
/// any that disagree. Returns the ordering to treat as the source of truth.
fn reconcile(
    dir: &Path,
    primary: &IndexOrdering,
    inspected: &mut [(IndexOrdering, Inspection)],
    policy: IndexRepairPolicy,
) -> IndexResult<(IndexOrdering, Committed)> {
    let generation = inspected
        .iter()
        .filter_map(|(_, i)| i.as_ref().ok())
        .map(|h| h.generation)
        .max();
    let Some(generation) = generation else {
        let ordering = inspected.first().map(|(o, _)| o.code()).unwrap_or_default();
        error!(dir = %dir.display(), "No readable index ordering");
        return Err(IndexError::inconsistent(ordering, "no readable index ordering to recover from"));
    };

    let current = |(_, i): &&(IndexOrdering, Inspection)| {
        i.as_ref().is_ok_and(|h| h.generation == generation)
    };
    let (source, source_header) = inspected
        .iter()
        .filter(current)
        .find(|(o, _)| o == primary)
        .or_else(|| inspected.iter().find(current))
        .and_then(|(o, i)| i.as_ref().ok().map(|h| (*o, *h)))
        .ok_or_else(|| IndexError::inconsistent(primary.code(), "no current ordering"))?;

    let damaged: Vec<(IndexOrdering, String)> = inspected
        .iter()
        .filter_map(|(ordering, inspection)| {
            let problem = match inspection {
                Err(reason) => reason.clone(),
                Ok(h) if h.generation != generation => {
                    format!("stale at generation {}, expected {generation}", h.generation)
                }
                Ok(h) if h.count != source_header.count => format!(
                    "holds {} statements, {} holds {}",
                    h.count, source, source_header.count
                ),
                Ok(_) => return None,
            };
            Some((*ordering, problem))
        })
        .collect();

    for (ordering, problem) in &damaged {
        match policy {
            IndexRepairPolicy::FailClosed => {
                error!(ordering = %ordering, %problem, "Index ordering inconsistent, refusing to open");
                return Err(IndexError::inconsistent(ordering.code(), problem.clone()));
            }
            IndexRepairPolicy::RebuildFromPrimary => {
                warn!(ordering = %ordering, %problem, from = %source, "Rebuilding inconsistent index ordering");
                let header = rebuild(dir, &source, ordering, generation)?;
                if let Some(entry) = inspected.iter_mut().find(|(o, _)| o == ordering) {
                    entry.1 = Ok(header);
                }
            }
        }
    }

    Ok((
        source,
        Committed {
            generation,
            statements: source_header.count,
        },
    ))
}

/// Write `target` from the statements of `source`.
fn rebuild(
    dir: &Path,
    source: &IndexOrdering,
    target: &IndexOrdering,
    generation: u64,
) -> IndexResult<IndexHeader> {
    let mut keys: Vec<IndexKey> = Vec::new();
    for key in read_all_keys(&dir.join(source.file_name()))? {
        keys.push(target.key(&source.statement(&key?)));
    }
    keys.sort_unstable();
    let header = write_index(&dir.join(target.file_name()), target, generation, keys)?;
    sync_dir(dir)?;
    Ok(header)
}

/// Stream the current file of `ordering` into a new generation with
/// `added` merged in and `removed` left out.
fn merge_into(
    dir: &Path,
    ordering: &IndexOrdering,
    generation: u64,
    added: &[Statement],
    removed: &[Statement],
) -> IndexResult<IndexHeader> {
    let path = dir.join(ordering.file_name());
    let mut additions: Vec<IndexKey> = added.iter().map(|s| ordering.key(s)).collect();
    additions.sort_unstable();
    let removals: HashSet<IndexKey> = removed.iter().map(|s| ordering.key(s)).collect();

    let mut writer = IndexFileWriter::create(&path, ordering, generation)?;
    let mut pending = additions.into_iter().peekable();
    for key in read_all_keys(&path)? {
        let key = key?;
        while let Some(add) = pending.next_if(|a| *a < key) {
            writer.push(&add)?;
        }
        if pending.peek() == Some(&key) {
            pending.next();
        }
        if !removals.contains(&key) {
            writer.push(&key)?;
        }
    }
    for add in pending {
        writer.push(&add)?;
    }
    writer.finish()
}

fn statement_set(dir: &Path, ordering: &IndexOrdering) -> IndexResult<Vec<Statement>> {
    let mut statements = read_all_keys(&dir.join(ordering.file_name()))?
        .map(|key| key.map(|k| ordering.statement(&k)))
        .collect::<IndexResult<Vec<_>>>()?;
    statements.sort_unstable();
    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &Path) -> IndexSet {
        IndexSet::open(dir, IndexConfig::default()).unwrap()
    }

    fn collect(scan: impl Iterator<Item = IndexResult<Statement>>) -> BTreeSet<Statement> {
        scan.map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_staged_changes_invisible_until_commit() {
        let dir = TempDir::new().unwrap();
        let set = open(dir.path());
        set.begin();
        set.add_statement(Statement::new(1, 2, 3, 0));
        assert_eq!(set.scan(&StatementPattern::all()).unwrap().count(), 0);
        assert_eq!(set.scan_staged(&StatementPattern::all()).unwrap().count(), 1);
        assert_eq!(set.staged_len().unwrap(), 1);

        let summary = set.commit().unwrap();
        assert_eq!(summary.generation, 1);
        assert_eq!(set.len(), 1);
        assert!(set.contains(&Statement::new(1, 2, 3, 0)).unwrap());
    }

    #[test]
    fn test_rollback_discards() {
        let dir = TempDir::new().unwrap();
        let set = open(dir.path());
        set.add_statement(Statement::new(1, 2, 3, 0));
        set.remove_statement(Statement::new(4, 5, 6, 0));
        assert_eq!(set.rollback(), 2);
        assert!(!set.has_staged_changes());
        assert_eq!(set.commit().unwrap().generation, 0);
    }

    #[test]
    fn test_remove_then_add_in_one_transaction() {
        let dir = TempDir::new().unwrap();
        let set = open(dir.path());
        let statement = Statement::new(1, 2, 3, 0);
        set.add_statement(statement);
        set.commit().unwrap();

        set.remove_statement(statement);
        set.add_statement(statement);
        set.commit().unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_scan_uses_best_ordering_and_filters() {
        let dir = TempDir::new().unwrap();
        let set = open(dir.path());
        for s in 1..=5 {
            for o in 1..=3 {
                set.add_statement(Statement::new(s, 10 + (s % 2), o, 0));
            }
        }
        set.commit().unwrap();

        let pattern = StatementPattern::all().with_predicate(11).with_object(2);
        let scan = set.scan(&pattern).unwrap();
        assert_eq!(scan.ordering().code(), "posc");
        let found = collect(scan);
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|s| s.predicate == 11 && s.object == 2));

        let subject_only = StatementPattern::all().with_subject(2).with_object(3);
        assert_eq!(collect(set.scan(&subject_only).unwrap()).len(), 1);
    }

    #[test]
    fn test_scan_snapshot_survives_commit() {
        let dir = TempDir::new().unwrap();
        let set = open(dir.path());
        set.add_statement(Statement::new(1, 1, 1, 0));
        set.commit().unwrap();

        let mut scan = set.scan(&StatementPattern::all()).unwrap();
        set.add_statement(Statement::new(2, 2, 2, 0));
        set.commit().unwrap();

        assert_eq!(collect(scan.by_ref()).len(), 1);
        scan.restart().unwrap();
        assert_eq!(collect(scan).len(), 1);
        assert_eq!(collect(set.scan(&StatementPattern::all()).unwrap()).len(), 2);
    }

    #[test]
    fn test_contextually_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let set = open(dir.path());
        set.add_statement(Statement::new(1, 2, 3, 7));
        set.add_statement(Statement::new(4, 5, 6, 7));
        set.add_statement(Statement::new(1, 2, 3, 0));
        set.commit().unwrap();

        assert_eq!(set.contextually_clear(Some(7)).unwrap(), 2);
        assert_eq!(set.contextually_clear(Some(7)).unwrap(), 0);
        set.commit().unwrap();
        assert_eq!(set.contextually_clear(Some(7)).unwrap(), 0);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_clear_all_contexts() {
        let dir = TempDir::new().unwrap();
        let set = open(dir.path());
        set.add_statement(Statement::new(1, 2, 3, 7));
        set.add_statement(Statement::new(1, 2, 3, 0));
        set.commit().unwrap();
        assert_eq!(set.contextually_clear(None).unwrap(), 2);
        set.commit().unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_check_consistency_clean() {
        let dir = TempDir::new().unwrap();
        let set = open(dir.path());
        set.add_statement(Statement::new(1, 2, 3, 0));
        set.commit().unwrap();
        assert!(set.check_consistency().unwrap().is_consistent());
    }

    #[test]
    fn test_repair_policy_parses() {
        assert_eq!(
            "rebuild".parse::<IndexRepairPolicy>().unwrap(),
            IndexRepairPolicy::RebuildFromPrimary
        );
        assert_eq!(
            "fail-closed".parse::<IndexRepairPolicy>().unwrap(),
            IndexRepairPolicy::FailClosed
        );
        assert!("sometimes".parse::<IndexRepairPolicy>().is_err());
    }
}
