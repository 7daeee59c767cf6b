#![no_main]

use libfuzzer_sys::fuzz_target;
use vtdecode::utf8::{decode_lossy, Utf8Decoder};

fuzz_target!(|data: &[u8]| {
    let text = decode_lossy(data);
    assert!(text.chars().count() <= data.len());

    // Valid input must come back unchanged
    if let Ok(valid) = std::str::from_utf8(data) {
        assert_eq!(text, valid);
    }

    let mut decoder = Utf8Decoder::new();
    for &byte in data {
        let _ = decoder.next_state(byte);
        assert!(decoder.accumulator().len() <= 6);
    }
});
