// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
//! QuadStore term dictionary.
//!
//! Maps RDF terms to dense non-zero `TermId`s and back. Term records live in
//! an append-only data file (`values.dat`) addressed through an offset arena
//! (`values.id`); IRIs share namespace prefixes stored in `namespaces.dat`.
//! A redb-backed hash index answers term -> id lookups.
//!
//! Every mint is logged to the WAL before the record is written, so a record
//! that later fails validation can still be resolved from the log.

pub mod cache;
pub mod codec;
pub mod dictionary;
pub mod error;
pub mod files;
pub mod hash_index;
pub mod term;

pub use dictionary::{
    ConsistencyReport, CorruptTerm, DictionaryConfig, DictionaryStats, ResolvedTerm,
    TermDictionary, HASH_FILE, NAMESPACES_FILE, NAMESPACES_ID_FILE, VALUES_FILE, VALUES_ID_FILE,
};
pub use error::{DictError, DictResult};
pub use term::{split_iri, xsd, Literal, QuotedTriple, Term, TermId};
