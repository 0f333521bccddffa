// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Fuzz target for term record decoding.
// Run with: cargo +nightly fuzz run fuzz_term_record
//
// A damaged record must come back as a decode error, never a panic, so the
// dictionary can report it as a corrupt term.

#![no_main]

use libfuzzer_sys::fuzz_target;
use quadstore_dict::codec::TermRecord;

fuzz_target!(|data: &[u8]| {
    if data.len() <= 64 * 1024 {
        let _ = TermRecord::decode(data);
    }
});
