// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Fuzz target for WAL entry decoding.
// Run with: cargo +nightly fuzz run fuzz_wal_entry
//
// Recovery reads whatever a crash left in a segment, so decoding must
// reject any byte string without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use quadstore_wal::WalEntry;

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    let (length, body) = data.split_at(4);
    let length = u32::from_le_bytes([length[0], length[1], length[2], length[3]]);
    if let Ok(entry) = WalEntry::deserialize(body, length) {
        // Whatever decodes must re-encode to a decodable entry.
        let bytes = entry.serialize();
        let reencoded_length = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert!(WalEntry::deserialize(&bytes[4..], reencoded_length).is_ok());
    }
});
