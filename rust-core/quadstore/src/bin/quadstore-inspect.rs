// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//!
//! quadstore-inspect: offline diagnostics for a store directory.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use quadstore::{QuadStore, ResolvedTerm, StoreConfig, STORE_FILE, WAL_DIR};
use quadstore_wal::{WalOperation, WalReader};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "quadstore-inspect", version = VERSION, about = "Inspect a QuadStore directory")]
struct Cli {
    /// Store directory.
    #[arg(long, short = 'd')]
    dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print store statistics as JSON.
    Stats,
    /// Resolve every term and compare every index ordering.
    Check,
    /// List interned terms by id.
    DumpTerms {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List WAL entries without opening the store.
    DumpWal {
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn main() -> Result<ExitCode> {
    quadstore::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Stats => {
            let store = open(&cli.dir)?;
            println!("{}", serde_json::to_string_pretty(&store.stats())?);
            store.close()?;
        }
        Command::Check => {
            let store = open(&cli.dir)?;
            let report = store.check_consistency()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            store.close()?;
            if !report.is_consistent() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::DumpTerms { limit } => {
            let store = open(&cli.dir)?;
            let dictionary = store.dictionary();
            for id in dictionary.ids().take(limit.unwrap_or(usize::MAX)) {
                match dictionary.resolve(id)? {
                    ResolvedTerm::Valid(term) => println!("{}\t{term}", id.get()),
                    ResolvedTerm::Corrupt(corrupt) => match &corrupt.recovered {
                        Some(term) => println!(
                            "{}\tCORRUPT ({}), recovered {term}",
                            id.get(),
                            corrupt.reason
                        ),
                        None => println!("{}\tCORRUPT ({}), unrecoverable", id.get(), corrupt.reason),
                    },
                }
            }
            store.close()?;
        }
        Command::DumpWal { limit } => dump_wal(&cli.dir, limit)?,
    }
    Ok(ExitCode::SUCCESS)
}

fn open(dir: &Path) -> Result<QuadStore> {
    if !dir.join(STORE_FILE).exists() {
        bail!("{} is not a quad store (no {STORE_FILE})", dir.display());
    }
    let config = StoreConfig::from_env().context("reading QUADSTORE_* configuration")?;
    QuadStore::open(dir, config).with_context(|| format!("opening store at {}", dir.display()))
}

fn dump_wal(dir: &Path, limit: Option<usize>) -> Result<()> {
    let reader = WalReader::open(dir.join(WAL_DIR))
        .with_context(|| format!("opening WAL under {}", dir.display()))?;
    if let Some(store_id) = reader.store_id()? {
        println!("# store {store_id}");
    }
    for entry in reader.replay_all()?.take(limit.unwrap_or(usize::MAX)) {
        let payload = match entry.operation {
            WalOperation::Checkpoint => String::new(),
            WalOperation::Header | WalOperation::Mint => {
                String::from_utf8_lossy(&entry.payload).into_owned()
            }
        };
        println!(
            "{}\t{}\t{:?}\t{}\t{payload}",
            entry.sequence,
            entry.timestamp.to_rfc3339(),
            entry.operation,
            entry.term_id
        );
    }
    Ok(())
}
