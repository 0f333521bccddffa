// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Write transactions.
//
// A transaction holds the store's writer mutex for its whole life and a
// shared lock while it stages, so readers keep seeing the previous
// generation. Commit makes the minted terms durable first, then upgrades to
// the exclusive lock for the index apply:
//
// ```text
// drain WAL high-water mark -> await_durable -> dictionary sync
//     -> exclusive lock -> index commit -> release
// ```
//
// A WAL failure at any point before the index commit rolls the staged
// statements back and surfaces `StoreError::Durability`.

use std::fmt::Display;
use std::sync::MutexGuard;

use quadstore_dict::{DictError, Term, TermId};
use quadstore_index::{CommitSummary, Statement, DEFAULT_CONTEXT};
use quadstore_lock::Lock;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::quad::{Quad, QuadPattern};
use crate::store::{QuadStore, Statements};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Active,
    Aborted,
    Finished,
}

pub struct Transaction<'a> {
    store: &'a QuadStore,
    _writer: MutexGuard<'a, ()>,
    shared: Option<Lock>,
    state: State,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(store: &'a QuadStore, writer: MutexGuard<'a, ()>) -> Self {
        let shared = store.locks().acquire_shared();
        store.index().begin();
        debug!(store_id = %store.store_id(), "Began transaction");
        Self {
            store,
            _writer: writer,
            shared: Some(shared),
            state: State::Active,
        }
    }

    /// Stage `quad`, interning any new terms.
    pub fn add(&mut self, quad: &Quad) -> StoreResult<()> {
        self.ensure_active()?;
        let context = match &quad.context {
            Some(context) => self.intern(context)?.get(),
            None => DEFAULT_CONTEXT,
        };
        let statement = Statement::new(
            self.intern(&quad.subject)?.get(),
            self.intern(&quad.predicate)?.get(),
            self.intern(&quad.object)?.get(),
            context,
        );
        self.store.index().add_statement(statement);
        Ok(())
    }

    /// Stage removal of every statement `pattern` matches in this
    /// transaction's view; returns how many that is.
    pub fn remove_statements(&mut self, pattern: &QuadPattern) -> StoreResult<usize> {
        self.ensure_active()?;
        match self.store.statement_pattern(pattern)? {
            Some(pattern) => Ok(self.store.index().remove_matching(&pattern)?),
            None => Ok(0),
        }
    }

    /// Stage removal of every statement in `context`, or in every context
    /// for `None`. Clearing a context twice removes nothing the second
    /// time.
    pub fn clear(&mut self, context: Option<&Term>) -> StoreResult<usize> {
        self.ensure_active()?;
        let context = match context {
            Some(term) => match self.store.lookup(term)? {
                Some(id) => Some(id.get()),
                None => return Ok(0),
            },
            None => None,
        };
        Ok(self.store.index().contextually_clear(context)?)
    }

    /// Stage removal of every default-graph statement.
    pub fn clear_default_graph(&mut self) -> StoreResult<usize> {
        self.ensure_active()?;
        Ok(self.store.index().contextually_clear(Some(DEFAULT_CONTEXT))?)
    }

    /// Statements visible to this transaction: committed ones plus staged
    /// changes.
    pub fn statements(&self, pattern: &QuadPattern) -> StoreResult<Statements> {
        self.ensure_active()?;
        let Some(pattern) = self.store.statement_pattern(pattern)? else {
            return Ok(Statements::empty(self.store));
        };
        Ok(Statements::new(self.store, self.store.index().scan_staged(&pattern)?))
    }

    /// Statement count including staged changes.
    pub fn size(&self) -> StoreResult<u64> {
        self.ensure_active()?;
        Ok(self.store.index().staged_len()?)
    }

    pub fn has_changes(&self) -> bool {
        self.state == State::Active && self.store.index().has_staged_changes()
    }

    pub fn commit(mut self) -> StoreResult<CommitSummary> {
        self.ensure_active()?;
        let dictionary = self.store.dictionary();

        if let Some(sequence) = dictionary.drain_pending_wal_high_water_mark() {
            if let Err(e) = dictionary.await_durable(sequence) {
                return Err(self.abort(e));
            }
        }
        if let Err(e) = dictionary.sync() {
            return Err(self.abort(e));
        }

        drop(self.shared.take());
        let exclusive = self.store.locks().acquire_exclusive();
        let committed = self.store.index().commit();
        drop(exclusive);
        self.state = State::Finished;

        let summary = committed?;
        debug!(
            generation = summary.generation,
            added = summary.added,
            removed = summary.removed,
            statements = summary.statements,
            "Committed transaction"
        );
        Ok(summary)
    }

    /// Discard staged changes; returns how many there were.
    pub fn rollback(mut self) -> usize {
        self.discard()
    }

    fn discard(&mut self) -> usize {
        if self.state != State::Active {
            return 0;
        }
        self.state = State::Finished;
        let dropped = self.store.index().rollback();
        debug!(dropped, "Rolled back transaction");
        dropped
    }

    fn intern(&mut self, term: &Term) -> StoreResult<TermId> {
        match self.store.dictionary().intern(term) {
            Ok(id) => Ok(id),
            Err(DictError::Wal(e)) => Err(self.abort(e)),
            Err(e) => Err(e.into()),
        }
    }

    /// Roll back after a WAL failure.
    fn abort(&mut self, cause: impl Display) -> StoreError {
        let dropped = self.store.index().rollback();
        self.state = State::Aborted;
        warn!(dropped, error = %cause, "Durability failure, transaction rolled back");
        StoreError::Durability(cause.to_string())
    }

    fn ensure_active(&self) -> StoreResult<()> {
        match self.state {
            State::Active => Ok(()),
            State::Aborted | State::Finished => Err(StoreError::TransactionAborted),
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state == State::Active && self.store.index().has_staged_changes() {
            debug!("Dropping uncommitted transaction");
        }
        self.discard();
    }
}
