// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Crash-recovery behaviour of the shared WAL handle: torn tails, CRC damage,
// and mint lookup after reopen.

use std::fs::{self, OpenOptions};
use std::io::Write;

use proptest::prelude::*;
use quadstore_wal::segment::list_segments;
use quadstore_wal::{Wal, WalConfig, WalOperation, WalReader};
use tempfile::TempDir;
use uuid::Uuid;

fn config() -> WalConfig {
    WalConfig {
        force_sync: true,
        ..WalConfig::default()
    }
}

#[test]
fn test_mints_readable_after_unclean_shutdown() {
    let dir = TempDir::new().unwrap();
    let store_id = Uuid::new_v4();

    {
        let wal = Wal::open(dir.path(), store_id, config()).unwrap();
        wal.log_mint(1, b"recover-me".to_vec()).unwrap();
        // Skip close(): leak the handle the way a crash would.
        std::mem::forget(wal);
    }

    let wal = Wal::open(dir.path(), store_id, config()).unwrap();
    let entry = wal.find_mint(1).unwrap().unwrap();
    assert_eq!(entry.payload, b"recover-me");
    assert_eq!(entry.operation, WalOperation::Mint);
}

#[test]
fn test_garbage_tail_is_discarded_and_appends_continue() {
    let dir = TempDir::new().unwrap();
    let store_id = Uuid::new_v4();

    let before = {
        let wal = Wal::open(dir.path(), store_id, config()).unwrap();
        wal.log_mint(1, b"a".to_vec()).unwrap();
        wal.log_mint(2, b"b".to_vec()).unwrap()
    };

    let segment = list_segments(dir.path()).unwrap().pop().unwrap();
    let mut file = OpenOptions::new().append(true).open(&segment.path).unwrap();
    file.write_all(&[0x40, 0x00, 0x00, 0x00, 0xde, 0xad]).unwrap();
    drop(file);

    let wal = Wal::open(dir.path(), store_id, config()).unwrap();
    let next = wal.log_mint(3, b"c".to_vec()).unwrap();
    assert_eq!(next, before + 1);
    wal.close().unwrap();

    let reader = WalReader::open(dir.path()).unwrap();
    assert_eq!(reader.max_minted_id().unwrap(), Some(3));
    assert_eq!(reader.find_mint(3).unwrap().unwrap().payload, b"c");
}

#[test]
fn test_damaged_record_is_skipped_by_lookup() {
    let dir = TempDir::new().unwrap();
    let store_id = Uuid::new_v4();
    {
        let wal = Wal::open(dir.path(), store_id, config()).unwrap();
        wal.log_mint(1, b"only-copy".to_vec()).unwrap();
        wal.close().unwrap();
    }

    // Flip the final payload byte so the CRC no longer matches.
    let segment = list_segments(dir.path()).unwrap().pop().unwrap();
    let mut data = fs::read(&segment.path).unwrap();
    let last = data.len() - 1;
    data[last] ^= 0x55;
    fs::write(&segment.path, &data).unwrap();

    let reader = WalReader::open(dir.path()).unwrap();
    assert!(reader.find_mint(1).unwrap().is_none());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_every_mint_is_found_after_reopen(
        payloads in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 1..20)
    ) {
        let dir = TempDir::new().unwrap();
        let store_id = Uuid::new_v4();
        {
            let wal = Wal::open(dir.path(), store_id, WalConfig {
                max_segment_size: 512,
                ..config()
            }).unwrap();
            for (i, payload) in payloads.iter().enumerate() {
                wal.log_mint(i as u32 + 1, payload.clone()).unwrap();
            }
            wal.close().unwrap();
        }

        let reader = WalReader::open(dir.path()).unwrap();
        for (i, payload) in payloads.iter().enumerate() {
            let entry = reader.find_mint(i as u32 + 1).unwrap().unwrap();
            prop_assert_eq!(&entry.payload, payload);
        }
    }
}
