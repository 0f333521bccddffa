// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Dictionary recovery: damaged records resolved from the WAL, lost value
// files restored on open, and term round-trips across reopen.

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use proptest::prelude::*;
use quadstore_dict::{
    xsd, DictionaryConfig, ResolvedTerm, Term, TermDictionary, TermId, HASH_FILE, VALUES_FILE,
    VALUES_ID_FILE,
};
use quadstore_wal::{Wal, WalConfig};
use tempfile::TempDir;
use uuid::Uuid;

const STORE_ID: Uuid = Uuid::from_u128(0x5157_0000_0000_0000_0000_0000_0000_0001);

fn open(dir: &Path) -> (TermDictionary, Arc<Wal>) {
    let wal = Arc::new(Wal::open(dir.join("wal"), STORE_ID, WalConfig::default()).unwrap());
    let dict = TermDictionary::open(dir, DictionaryConfig::default(), Arc::clone(&wal)).unwrap();
    (dict, wal)
}

fn close(dict: TermDictionary, wal: Arc<Wal>) {
    dict.sync().unwrap();
    drop(dict);
    wal.close().unwrap();
}

/// Offset of the first record in `values.dat` whose body contains `needle`.
fn record_offset(path: &Path, needle: &[u8]) -> u64 {
    let bytes = fs::read(path).unwrap();
    let mut offset = 8usize;
    while offset + 4 <= bytes.len() {
        let len = u32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
        let body = &bytes[offset + 4..offset + 4 + len];
        if body.windows(needle.len()).any(|w| w == needle) {
            return offset as u64;
        }
        offset += 4 + len;
    }
    panic!("record not found");
}

fn zero_length_prefix(path: &Path, offset: u64) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(&[0, 0, 0, 0]).unwrap();
    file.sync_all().unwrap();
}

#[test]
fn test_corrupt_record_recovered_from_wal() {
    let dir = TempDir::new().unwrap();
    let term = Term::literal("recover-me");
    let id = {
        let (dict, wal) = open(dir.path());
        let id = dict.intern(&term).unwrap();
        let mark = dict.drain_pending_wal_high_water_mark().unwrap();
        dict.await_durable(mark).unwrap();
        close(dict, wal);
        id
    };

    let values = dir.path().join(VALUES_FILE);
    let offset = record_offset(&values, b"recover-me");
    zero_length_prefix(&values, offset);

    let (dict, wal) = open(dir.path());
    match dict.resolve(id).unwrap() {
        ResolvedTerm::Corrupt(corrupt) => {
            assert_eq!(corrupt.id, id);
            assert_eq!(corrupt.string_value().as_deref(), Some("recover-me"));
            assert_eq!(corrupt.recovered, Some(term));
        }
        ResolvedTerm::Valid(term) => panic!("expected corrupt record, got {term}"),
    }

    let report = dict.check_consistency().unwrap();
    assert_eq!(report.corrupt, vec![id]);
    close(dict, wal);
}

#[test]
fn test_corrupt_record_keeps_id_after_hash_rebuild() {
    let dir = TempDir::new().unwrap();
    let term = Term::literal("recover-me");
    let id = {
        let (dict, wal) = open(dir.path());
        let id = dict.intern(&term).unwrap();
        close(dict, wal);
        id
    };

    let values = dir.path().join(VALUES_FILE);
    zero_length_prefix(&values, record_offset(&values, b"recover-me"));
    fs::remove_file(dir.path().join(HASH_FILE)).unwrap();

    let (dict, wal) = open(dir.path());
    assert!(dict.resolve(id).unwrap().is_corrupt());
    assert_eq!(dict.lookup(&term).unwrap(), Some(id));
    assert_eq!(dict.intern(&term).unwrap(), id);
    assert_eq!(dict.len(), 1);
    close(dict, wal);
}

#[test]
fn test_corrupt_component_marks_dependent_term() {
    let dir = TempDir::new().unwrap();
    let datatype = "http://example.org/custom";
    let literal = Term::typed_literal("v", datatype);
    let id = {
        let (dict, wal) = open(dir.path());
        let id = dict.intern(&literal).unwrap();
        close(dict, wal);
        id
    };

    // The datatype IRI is stored as namespace + local name "custom".
    let values = dir.path().join(VALUES_FILE);
    zero_length_prefix(&values, record_offset(&values, b"custom"));

    let (dict, wal) = open(dir.path());
    let resolved = dict.resolve(id).unwrap();
    assert!(resolved.is_corrupt());
    assert_eq!(resolved.term(), Some(&literal));
    close(dict, wal);
}

#[test]
fn test_lost_value_files_restored_from_wal() {
    let dir = TempDir::new().unwrap();
    let terms = vec![
        Term::iri("http://example.org/alice"),
        Term::lang_literal("bonjour", "fr"),
        Term::typed_literal("42", xsd::INTEGER),
        Term::triple(
            Term::iri("http://example.org/alice"),
            Term::iri("http://example.org/knows"),
            Term::blank("b0"),
        ),
    ];
    let ids: Vec<TermId> = {
        let (dict, wal) = open(dir.path());
        let ids = terms.iter().map(|t| dict.intern(t).unwrap()).collect();
        close(dict, wal);
        ids
    };

    fs::remove_file(dir.path().join(VALUES_FILE)).unwrap();
    fs::remove_file(dir.path().join(VALUES_ID_FILE)).unwrap();

    let (dict, wal) = open(dir.path());
    for (term, id) in terms.iter().zip(&ids) {
        assert_eq!(dict.resolve(*id).unwrap(), ResolvedTerm::Valid(term.clone()));
        assert_eq!(dict.lookup(term).unwrap(), Some(*id));
    }
    assert!(dict.check_consistency().unwrap().is_consistent());
    close(dict, wal);
}

#[test]
fn test_recovery_disabled_leaves_arena_alone() {
    let dir = TempDir::new().unwrap();
    {
        let (dict, wal) = open(dir.path());
        dict.intern(&Term::iri("http://example.org/x")).unwrap();
        close(dict, wal);
    }
    fs::remove_file(dir.path().join(VALUES_ID_FILE)).unwrap();

    let wal = Arc::new(Wal::open(dir.path().join("wal"), STORE_ID, WalConfig::default()).unwrap());
    let config = DictionaryConfig {
        recover_on_open: false,
        ..DictionaryConfig::default()
    };
    let dict = TermDictionary::open(dir.path(), config, Arc::clone(&wal)).unwrap();
    assert!(dict.is_empty());
    close(dict, wal);
}

#[test]
fn test_ids_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let term = Term::iri("http://example.org/stable");
    let first = {
        let (dict, wal) = open(dir.path());
        let id = dict.intern(&term).unwrap();
        close(dict, wal);
        id
    };
    let (dict, wal) = open(dir.path());
    assert_eq!(dict.lookup(&term).unwrap(), Some(first));
    assert_eq!(dict.intern(&term).unwrap(), first);
    close(dict, wal);
}

fn term_strategy() -> impl Strategy<Value = Term> {
    let iri = "[a-z]{1,8}".prop_map(|s| Term::iri(format!("http://example.org/{s}")));
    let blank = "[a-z][a-z0-9]{0,6}".prop_map(Term::blank);
    let plain = ".{0,16}".prop_map(Term::literal);
    let lang = (".{0,8}", "[a-z]{2}").prop_map(|(l, t)| Term::lang_literal(l, t));
    let integer = any::<i32>().prop_map(|n| Term::typed_literal(n.to_string(), xsd::INTEGER));
    let boolean = any::<bool>().prop_map(|b| Term::typed_literal(b.to_string(), xsd::BOOLEAN));
    let leaf = prop_oneof![iri, blank, plain, lang, integer, boolean];
    leaf.prop_recursive(2, 8, 3, |inner| {
        (inner.clone(), inner.clone(), inner)
            .prop_map(|(s, p, o)| Term::triple(s, p, o))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_round_trip_across_reopen(terms in prop::collection::vec(term_strategy(), 1..12)) {
        let dir = TempDir::new().unwrap();
        let ids: Vec<TermId> = {
            let (dict, wal) = open(dir.path());
            let ids = terms.iter().map(|t| dict.intern(t).unwrap()).collect();
            close(dict, wal);
            ids
        };

        let (dict, wal) = open(dir.path());
        for (term, id) in terms.iter().zip(&ids) {
            prop_assert_eq!(dict.resolve(*id).unwrap(), ResolvedTerm::Valid(term.clone()));
            prop_assert_eq!(dict.intern(term).unwrap(), *id);
        }
        close(dict, wal);
    }
}
