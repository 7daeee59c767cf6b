#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use vtdecode::params::MAX_PARAMETERS;
use vtdecode::ParameterDecoder;

#[derive(Arbitrary, Debug)]
struct Input {
    delimiter: u8,
    bytes: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let mut decoder = ParameterDecoder::with_delimiter(input.delimiter);
    for &byte in &input.bytes {
        if !decoder.feed_byte(byte).consumed {
            break;
        }
    }
    assert!(decoder.len() <= MAX_PARAMETERS);
    for index in 0..=decoder.len() {
        let _ = decoder.get_parameter_or_default(index, 1);
    }
});
