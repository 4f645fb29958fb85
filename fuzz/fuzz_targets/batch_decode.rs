#![no_main]

use clipstream_core::{decode, Message};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary payloads: invalid UTF-8, stray delimiters, control tokens with
    // padding, empty pieces. Every piece is either a record or a recorded error.
    if let Ok(Message::Batch(mut records)) = decode(data) {
        let valid = records.by_ref().count();
        let pieces = std::str::from_utf8(data)
            .map(|text| text.split('|').count())
            .unwrap_or(0);
        assert!(valid + records.error_count() <= pieces);
    }
});
