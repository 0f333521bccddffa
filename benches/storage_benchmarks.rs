// SPDX-License-Identifier: PMPL-1.0-or-later
//! Performance benchmarks for the QuadStore dictionary, indexes and locks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quadstore::{Quad, QuadPattern, QuadStore, StoreConfig, Term};
use quadstore_dict::{DictionaryConfig, TermDictionary};
use quadstore_index::{IndexConfig, IndexSet, Statement, StatementPattern};
use quadstore_lock::{ConcurrencyController, LockConfig};
use quadstore_wal::{Wal, WalConfig};

fn temp_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("bench-{label}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn open_dictionary(dir: &Path) -> TermDictionary {
    let wal = Wal::open(dir.join("wal"), uuid::Uuid::new_v4(), WalConfig::default()).unwrap();
    TermDictionary::open(dir, DictionaryConfig::default(), Arc::new(wal)).unwrap()
}

// ============================================================================
// Dictionary Benchmarks
// ============================================================================

fn bench_dictionary_intern(c: &mut Criterion) {
    let dir = temp_dir("intern");
    let dict = open_dictionary(&dir);
    let mut group = c.benchmark_group("dictionary");

    let mut next = 0u64;
    group.bench_function("intern_new_iri", |b| {
        b.iter(|| {
            next += 1;
            black_box(dict.intern(&Term::iri(format!("http://example.org/r/{next}"))).unwrap())
        });
    });

    let known = Term::lang_literal("bonjour", "fr");
    dict.intern(&known).unwrap();
    group.bench_function("intern_cached", |b| {
        b.iter(|| black_box(dict.intern(&known).unwrap()));
    });

    group.finish();
    drop(dict);
    std::fs::remove_dir_all(&dir).ok();
}

fn bench_dictionary_resolve(c: &mut Criterion) {
    let dir = temp_dir("resolve");
    let dict = open_dictionary(&dir);
    let ids: Vec<_> = (0..2000)
        .map(|i| dict.intern(&Term::literal(format!("value {i}"))).unwrap())
        .collect();

    let mut group = c.benchmark_group("dictionary");
    group.throughput(Throughput::Elements(ids.len() as u64));
    group.bench_function("resolve_2000", |b| {
        b.iter(|| {
            for id in &ids {
                black_box(dict.resolve(*id).unwrap());
            }
        });
    });
    group.finish();
    drop(dict);
    std::fs::remove_dir_all(&dir).ok();
}

// ============================================================================
// Index Benchmarks
// ============================================================================

fn bench_index_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("index");
    for orderings in ["spoc", "spoc,posc", "spoc,posc,ospc,cspo"] {
        let dir = temp_dir("commit");
        let config = IndexConfig {
            orderings: orderings.to_string(),
            ..IndexConfig::default()
        };
        let set = IndexSet::open(&dir, config).unwrap();
        let mut subject = 0u32;

        group.bench_with_input(BenchmarkId::new("commit_100", orderings), &orderings, |b, _| {
            b.iter(|| {
                subject += 1;
                set.begin();
                for o in 1..=100 {
                    set.add_statement(Statement::new(subject, 7, o, 0));
                }
                black_box(set.commit().unwrap())
            });
        });
        drop(set);
        std::fs::remove_dir_all(&dir).ok();
    }
    group.finish();
}

fn bench_index_scan(c: &mut Criterion) {
    let dir = temp_dir("scan");
    let set = IndexSet::open(&dir, IndexConfig::default()).unwrap();
    set.begin();
    for s in 1..=100u32 {
        for p in 1..=10u32 {
            for o in 1..=10u32 {
                set.add_statement(Statement::new(s, p, o, 0));
            }
        }
    }
    set.commit().unwrap();

    let mut group = c.benchmark_group("index");
    group.bench_function("scan_by_subject", |b| {
        let pattern = StatementPattern::all().with_subject(50);
        b.iter(|| black_box(set.scan(&pattern).unwrap().count()));
    });
    group.bench_function("scan_by_predicate", |b| {
        let pattern = StatementPattern::all().with_predicate(3);
        b.iter(|| black_box(set.scan(&pattern).unwrap().count()));
    });
    group.finish();
    drop(set);
    std::fs::remove_dir_all(&dir).ok();
}

// ============================================================================
// Store and Lock Benchmarks
// ============================================================================

fn bench_store_transaction(c: &mut Criterion) {
    let dir = temp_dir("store");
    let store = QuadStore::open(&dir, StoreConfig::default()).unwrap();
    let mut batch = 0u64;

    let mut group = c.benchmark_group("store");
    group.throughput(Throughput::Elements(50));
    group.bench_function("commit_50_quads", |b| {
        b.iter(|| {
            batch += 1;
            let mut txn = store.begin().unwrap();
            for i in 0..50 {
                txn.add(&Quad::new(
                    Term::iri(format!("http://example.org/s{batch}")),
                    Term::iri("http://example.org/p"),
                    Term::literal(format!("{i}")),
                ))
                .unwrap();
            }
            black_box(txn.commit().unwrap())
        });
    });
    group.bench_function("resolve_all", |b| {
        b.iter(|| black_box(store.statements(&QuadPattern::all()).unwrap().count()));
    });
    group.finish();
    store.close().unwrap();
    drop(store);
    std::fs::remove_dir_all(&dir).ok();
}

fn bench_locks(c: &mut Criterion) {
    let controller = ConcurrencyController::new(LockConfig::default());
    let mut group = c.benchmark_group("locks");
    group.bench_function("shared_uncontended", |b| {
        b.iter(|| black_box(controller.acquire_shared()));
    });
    group.bench_function("exclusive_uncontended", |b| {
        b.iter(|| black_box(controller.acquire_exclusive()));
    });
    group.finish();
}

criterion_group!(dictionary_benches, bench_dictionary_intern, bench_dictionary_resolve);
criterion_group!(index_benches, bench_index_commit, bench_index_scan);
criterion_group!(store_benches, bench_store_transaction, bench_locks);

criterion_main!(dictionary_benches, index_benches, store_benches);
