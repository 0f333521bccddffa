// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
//! QuadStore: a disk-resident RDF quad store.
//!
//! Terms are interned into a WAL-backed dictionary, statements are kept in
//! several sorted orderings that commit together, and a read-preferring
//! lock controller arbitrates between readers and the single writer.
//!
//! ```no_run
//! use quadstore::{Quad, QuadPattern, QuadStore, StoreConfig, Term};
//!
//! let store = QuadStore::open("/tmp/quadstore", StoreConfig::from_env()?)?;
//!
//! let mut txn = store.begin()?;
//! txn.add(&Quad::new(
//!     Term::iri("http://example.org/alice"),
//!     Term::iri("http://xmlns.com/foaf/0.1/name"),
//!     Term::literal("Alice"),
//! ))?;
//! txn.commit()?;
//!
//! for quad in store.statements(&QuadPattern::all())? {
//!     println!("{:?}", quad?.into_quad());
//! }
//! store.close()?;
//! # Ok::<(), quadstore::StoreError>(())
//! ```

pub mod config;
pub mod error;
pub mod properties;
pub mod quad;
pub mod registry;
pub mod store;
pub mod transaction;

pub use config::{StoreConfig, ENV_PREFIX, WAL_DIR};
pub use error::{StoreError, StoreResult};
pub use properties::{StoreProperties, STORE_FILE, STORE_FORMAT_VERSION};
pub use quad::{ContextFilter, Quad, QuadPattern, ResolvedQuad};
pub use registry::StoreRegistry;
pub use store::{QuadStore, Statements, StoreReport, StoreStats};
pub use transaction::Transaction;

pub use quadstore_dict::{CorruptTerm, ResolvedTerm, Term, TermId};
pub use quadstore_index::{CommitSummary, IndexRepairPolicy};

/// Install the `tracing` subscriber: `RUST_LOG` if set, `info` otherwise.
/// Does nothing if a subscriber is already installed.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}
