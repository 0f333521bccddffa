// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
//! QuadStore statement indexes.
//!
//! Statements are `(s, p, o, c)` term-id tuples. Each configured ordering
//! (`spoc`, `posc`, ...) keeps the full statement set in its own sorted file
//! of 16-byte keys. Commits go through a journal so every ordering moves to
//! the new generation or, after a crash, is brought there on reopen.
//!
//! ```no_run
//! use quadstore_index::{IndexConfig, IndexSet, Statement, StatementPattern};
//!
//! let set = IndexSet::open("/tmp/quadstore-index", IndexConfig::default()).unwrap();
//! set.begin();
//! set.add_statement(Statement::new(1, 2, 3, 0));
//! set.commit().unwrap();
//!
//! let by_predicate = StatementPattern::all().with_predicate(2);
//! for statement in set.scan(&by_predicate).unwrap() {
//!     println!("{}", statement.unwrap());
//! }
//! ```

pub mod error;
pub mod file;
pub mod index_set;
pub mod journal;
pub mod ordering;
pub mod properties;
pub mod statement;

pub use error::{IndexError, IndexResult};
pub use index_set::{
    CommitSummary, IndexConfig, IndexRepairPolicy, IndexReport, IndexScan, IndexSet, IndexStats,
    OrderingReport, StagedScan,
};
pub use journal::{Journal, JournalOp, JOURNAL_FILE};
pub use ordering::{IndexOrdering, DEFAULT_ORDERINGS};
pub use properties::{IndexProperties, PROPERTIES_FILE};
pub use statement::{Field, Statement, StatementPattern, DEFAULT_CONTEXT};
