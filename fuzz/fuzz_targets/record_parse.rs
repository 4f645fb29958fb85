#![no_main]

use clipstream_core::parse;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Any line either parses or is rejected; it never panics.
    // An accepted line renders back to exactly the same text.
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(record) = parse(line) {
        let rendered = record.to_string();
        assert_eq!(rendered, line);
        assert!(!rendered.contains('|'));
        assert_eq!(parse(&rendered).ok(), Some(record));
    }
});
