use pretty_assertions::assert_eq;
use vtdecode::params::{State, Step, MAX_PARAMETERS};
use vtdecode::*;

/// Feeds `input` and returns the index of the first byte that was not consumed.
fn feed(decoder: &mut ParameterDecoder, input: &[u8]) -> Option<usize> {
    input.iter().position(|&byte| !decoder.feed_byte(byte).consumed)
}

#[test]
fn test_tokenize_undefined_middle_slot() {
    let mut decoder = ParameterDecoder::new();
    assert_eq!(feed(&mut decoder, b"1;;3m"), Some(4));
    assert_eq!(
        decoder.parameters(),
        &[Parameter::Value(1), Parameter::Undefined, Parameter::Value(3)]
    );
    assert_eq!(decoder.state(), State::Terminated);
}

#[test]
fn test_leading_and_trailing_delimiters() {
    let mut decoder = ParameterDecoder::new();
    feed(&mut decoder, b";5;q");
    assert_eq!(
        decoder.parameters(),
        &[Parameter::Undefined, Parameter::Value(5), Parameter::Undefined]
    );
}

#[test]
fn test_empty_list_has_no_slots() {
    let mut decoder = ParameterDecoder::new();
    assert_eq!(feed(&mut decoder, b"q"), Some(0));
    assert!(decoder.is_empty());
    assert_eq!(
        decoder.get_parameter(0),
        Err(ParameterError::OutOfRange { index: 0, len: 0 })
    );
}

#[test]
fn test_state_sequence() {
    let mut decoder = ParameterDecoder::new();
    assert_eq!(decoder.state(), State::Initial);

    let steps: Vec<Step> = b"12;7x".iter().map(|&byte| decoder.feed_byte(byte)).collect();
    let states: Vec<(State, bool)> = steps.iter().map(|step| (step.state, step.consumed)).collect();
    assert_eq!(
        states,
        vec![
            (State::SeenDigit, true),
            (State::SeenDigit, true),
            (State::ResetParameter, true),
            (State::SeenDigit, true),
            (State::Terminated, false),
        ]
    );
    assert_eq!(decoder.get_parameter(0), Ok(12));
    assert_eq!(decoder.get_parameter(1), Ok(7));
}

#[test]
fn test_terminated_is_sticky() {
    let mut decoder = ParameterDecoder::new();
    feed(&mut decoder, b"4x");
    let step = decoder.feed_byte(b'5');
    assert!(!step.consumed);
    assert_eq!(step.state, State::Terminated);
    assert_eq!(decoder.parameters(), &[Parameter::Value(4)]);
}

#[test]
fn test_overflow_keeps_consuming_digits() {
    let mut decoder = ParameterDecoder::new();
    assert_eq!(feed(&mut decoder, b"65535;65536;99999999999;2m"), Some(25));
    assert_eq!(
        decoder.parameters(),
        &[
            Parameter::Value(65535),
            Parameter::Overflow,
            Parameter::Overflow,
            Parameter::Value(2)
        ]
    );
}

#[test]
fn test_get_parameter_or_default() {
    let mut decoder = ParameterDecoder::new();
    feed(&mut decoder, b"7;;70000m");

    assert_eq!(decoder.get_parameter_or_default(0, 80), Ok(7));
    assert_eq!(decoder.get_parameter_or_default(1, 80), Ok(80));
    assert_eq!(decoder.get_parameter_or_default(2, 80), Err(ParameterError::Overflow));
    assert_eq!(decoder.get_parameter_or_default(3, 80), Ok(80));

    assert_eq!(decoder.get_parameter(1), Err(ParameterError::Undefined));
    assert_eq!(decoder.get_parameter(2), Err(ParameterError::Overflow));
}

#[test]
fn test_custom_delimiter() {
    let mut decoder = ParameterDecoder::with_delimiter(b':');
    assert_eq!(decoder.delimiter(), b':');
    assert_eq!(feed(&mut decoder, b"4:3;"), Some(3));
    assert_eq!(decoder.parameters(), &[Parameter::Value(4), Parameter::Value(3)]);

    // a digit can never separate digits
    assert_eq!(ParameterDecoder::with_delimiter(b'5').delimiter(), b';');
}

#[test]
fn test_slot_limit() {
    let mut decoder = ParameterDecoder::new();
    let input = "1;".repeat(MAX_PARAMETERS + 10) + "m";
    assert_eq!(feed(&mut decoder, input.as_bytes()), Some(input.len() - 1));
    assert_eq!(decoder.len(), MAX_PARAMETERS);
}

#[test]
fn test_reset_clears_everything() {
    let mut decoder = ParameterDecoder::new();
    feed(&mut decoder, b"1;2;3");
    decoder.reset();
    assert_eq!(decoder.state(), State::Initial);
    assert!(decoder.is_empty());

    // a half-parsed slot must not leak into the next list
    feed(&mut decoder, b"9");
    decoder.reset();
    feed(&mut decoder, b"m");
    assert!(decoder.is_empty());

    feed(&mut decoder, b"8m");
    decoder.reset();
    decoder.reset();
    assert_eq!(decoder.state(), State::Initial);
    assert!(decoder.is_empty());
}

#[test]
fn test_state_names() {
    assert_eq!(State::Terminated.to_string(), "term");
    assert_eq!(State::Initial.name(), "init");
}
