//! Streaming UTF-8 decoder with error recovery.
//!
//! [`Utf8Decoder`] accepts one byte at a time and reports every code point the
//! byte completes. Illegal bytes, overlong encodings, values that are not
//! Unicode scalar values and sequences cut short by a new starting byte each
//! produce a single U+FFFD, after which decoding continues with the next
//! sequence. The decoder never returns an error; the most recent recovered
//! problem is available from [`Utf8Decoder::last_error`].
//!
//! Lead bytes for 5- and 6-byte sequences are still recognized so that their
//! continuation bytes are swallowed as one unit, but no such sequence encodes
//! a scalar value and each one decodes to a single replacement character.

use std::fmt;

use log::debug;
use thiserror::Error;

/// Sentinel returned by [`byte_sequence_total_value`] when the bytes do not
/// hold a complete sequence.
pub const INVALID_CODE_POINT: u32 = 0xFFFF;

/// Longest sequence the lead-byte patterns can announce.
pub const MAX_SEQUENCE_LEN: usize = 6;

/// UTF-8 encoding of U+FFFD.
const REPLACEMENT_BYTES: [u8; 3] = [0xEF, 0xBF, 0xBD];

/// Smallest value that requires a sequence of the indexed length.
const MINIMUM_VALUE: [u32; MAX_SEQUENCE_LEN + 1] =
    [0, 0, 0x80, 0x800, 0x1_0000, 0x20_0000, 0x400_0000];

/// A problem the decoder recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Utf8Error {
    /// 0xFE or 0xFF, which never occur in UTF-8.
    #[error("byte {0:#04x} never occurs in UTF-8")]
    IllegalByte(u8),

    /// A continuation byte without a lead byte before it.
    #[error("unexpected continuation byte {0:#04x}")]
    UnexpectedContinuation(u8),

    /// The sequence is well formed but a shorter one could hold the value.
    #[error("overlong {len}-byte encoding of {value:#x}")]
    Overlong { value: u32, len: usize },

    /// A new starting byte or the end of input arrived mid-sequence.
    #[error("{expected}-byte sequence truncated after {received} bytes")]
    Truncated { expected: usize, received: usize },

    /// Surrogates and values beyond U+10FFFF.
    #[error("{0:#x} is not a Unicode scalar value")]
    NotScalarValue(u32),
}

/// Position of a [`Utf8Decoder`] within the current sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Initial,
    /// The accumulator holds the UTF-8 bytes of an error character.
    IllegalSequence,
    /// The accumulator holds one complete, valid sequence.
    ValidSequence,
    ExpectingTwo,
    ExpectingThree,
    ExpectingFour,
    ExpectingFive,
    ExpectingSix,
}

impl State {
    /// Total sequence length while continuation bytes are outstanding.
    pub fn expected_len(self) -> Option<usize> {
        match self {
            State::ExpectingTwo => Some(2),
            State::ExpectingThree => Some(3),
            State::ExpectingFour => Some(4),
            State::ExpectingFive => Some(5),
            State::ExpectingSix => Some(6),
            _ => None,
        }
    }

    fn expecting(len: usize) -> Option<State> {
        match len {
            2 => Some(State::ExpectingTwo),
            3 => Some(State::ExpectingThree),
            4 => Some(State::ExpectingFour),
            5 => Some(State::ExpectingFive),
            6 => Some(State::ExpectingSix),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            State::Initial => "init",
            State::IllegalSequence => "U8XX",
            State::ValidSequence => "U8OK",
            State::ExpectingTwo => "U82B",
            State::ExpectingThree => "U83B",
            State::ExpectingFour => "U84B",
            State::ExpectingFive => "U85B",
            State::ExpectingSix => "U86B",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Code points completed by one byte.
///
/// A byte can finish at most two: the replacement for a sequence it cut
/// short, then its own value when it is a complete sequence by itself.
/// Iterating yields them in stream order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Emitted {
    abandoned: Option<char>,
    completed: Option<char>,
}

impl Emitted {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.abandoned.is_none() && self.completed.is_none()
    }

    /// Replacement emitted for an abandoned sequence, if any.
    #[inline]
    pub fn abandoned(&self) -> Option<char> {
        self.abandoned
    }

    /// Value of the sequence this byte completed, if any.
    #[inline]
    pub fn completed(&self) -> Option<char> {
        self.completed
    }
}

impl Iterator for Emitted {
    type Item = char;

    fn next(&mut self) -> Option<char> {
        self.abandoned.take().or_else(|| self.completed.take())
    }
}

/// Byte-at-a-time UTF-8 decoder.
///
/// ```
/// use vtdecode::utf8::Utf8Decoder;
///
/// let mut decoder = Utf8Decoder::new();
/// let text: String = "h\u{e9}!".bytes().flat_map(|b| decoder.next_state(b)).collect();
/// assert_eq!(text, "h\u{e9}!");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Utf8Decoder {
    accumulator: [u8; MAX_SEQUENCE_LEN],
    len: usize,
    state: State,
    last_error: Option<Utf8Error>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    /// Bytes of the most recently started sequence.
    ///
    /// After an error this holds the UTF-8 form of U+FFFD instead.
    #[inline]
    pub fn accumulator(&self) -> &[u8] {
        &self.accumulator[..self.len]
    }

    /// The last problem recovered from since construction or [`reset`](Self::reset).
    #[inline]
    pub fn last_error(&self) -> Option<Utf8Error> {
        self.last_error
    }

    /// True while continuation bytes are still outstanding.
    #[inline]
    pub fn incomplete_sequence(&self) -> bool {
        self.state.expected_len().is_some()
    }

    /// Advances the machine by one byte.
    pub fn next_state(&mut self, byte: u8) -> Emitted {
        let mut emitted = Emitted::default();

        if let Some(expected) = self.state.expected_len() {
            if is_continuation_byte(byte) {
                self.accumulator[self.len] = byte;
                self.len += 1;
                if self.len == expected {
                    emitted.completed = Some(self.complete());
                }
                return emitted;
            }

            self.record(Utf8Error::Truncated {
                expected,
                received: self.len,
            });
            emitted.abandoned = Some(char::REPLACEMENT_CHARACTER);
            if is_illegal_byte(byte) {
                // one error character covers both the cut sequence and the byte
                self.fail();
                return emitted;
            }
        }

        emitted.completed = self.start(byte);
        emitted
    }

    /// Ends the stream, flushing a truncated sequence as one replacement.
    pub fn finish(&mut self) -> Option<char> {
        let pending = self.state.expected_len().map(|expected| {
            self.record(Utf8Error::Truncated {
                expected,
                received: self.len,
            });
            char::REPLACEMENT_CHARACTER
        });
        self.state = State::Initial;
        self.len = 0;
        pending
    }

    /// Returns to [`State::Initial`] and clears the accumulator.
    pub fn reset(&mut self) {
        self.state = State::Initial;
        self.len = 0;
        self.last_error = None;
    }

    /// Appends the UTF-8 encoding of the error character (U+FFFD).
    pub fn append_error_character<C: Extend<u8>>(container: &mut C) {
        container.extend(REPLACEMENT_BYTES);
    }

    fn start(&mut self, byte: u8) -> Option<char> {
        self.accumulator[0] = byte;
        self.len = 1;

        if is_single_byte_glyph(byte) {
            self.state = State::ValidSequence;
            return Some(char::from(byte));
        }

        match sequence_len(byte).and_then(State::expecting) {
            Some(state) => {
                self.state = state;
                None
            }
            None => {
                let error = if is_continuation_byte(byte) {
                    Utf8Error::UnexpectedContinuation(byte)
                } else {
                    Utf8Error::IllegalByte(byte)
                };
                self.record(error);
                self.fail();
                Some(char::REPLACEMENT_CHARACTER)
            }
        }
    }

    fn complete(&mut self) -> char {
        let len = self.len;
        let (value, _) = byte_sequence_total_value(&self.accumulator, 0, len);
        if value < MINIMUM_VALUE[len] {
            self.record(Utf8Error::Overlong { value, len });
            self.fail();
            return char::REPLACEMENT_CHARACTER;
        }
        match char::from_u32(value) {
            Some(c) => {
                self.state = State::ValidSequence;
                c
            }
            None => {
                self.record(Utf8Error::NotScalarValue(value));
                self.fail();
                char::REPLACEMENT_CHARACTER
            }
        }
    }

    fn fail(&mut self) {
        self.accumulator[..REPLACEMENT_BYTES.len()].copy_from_slice(&REPLACEMENT_BYTES);
        self.len = REPLACEMENT_BYTES.len();
        self.state = State::IllegalSequence;
    }

    fn record(&mut self, error: Utf8Error) {
        debug!("recovered from UTF-8 error: {error}");
        self.last_error = Some(error);
    }
}

/// Decodes a whole buffer, substituting U+FFFD for every bad sequence.
pub fn decode_lossy(bytes: &[u8]) -> String {
    let mut decoder = Utf8Decoder::new();
    let mut text = String::with_capacity(bytes.len());
    for &byte in bytes {
        text.extend(decoder.next_state(byte));
    }
    text.extend(decoder.finish());
    text
}

/// Extracts the value of the sequence starting at `offset`.
///
/// At most `max_count` bytes are examined and none beyond the end of `bytes`.
/// Returns the value and the number of bytes it occupies, or
/// `(INVALID_CODE_POINT, 0)` if the window does not start with a complete
/// sequence. Only the bit layout is checked: overlong forms are not rejected.
pub fn byte_sequence_total_value(bytes: &[u8], offset: usize, max_count: usize) -> (u32, usize) {
    let window = bytes.get(offset..).unwrap_or_default();
    let window = &window[..max_count.min(window.len())];

    let Some(&lead) = window.first() else {
        return (INVALID_CODE_POINT, 0);
    };
    if is_single_byte_glyph(lead) {
        return (u32::from(lead), 1);
    }
    let Some(len) = sequence_len(lead) else {
        return (INVALID_CODE_POINT, 0);
    };
    let Some(tail) = window.get(1..len) else {
        return (INVALID_CODE_POINT, 0);
    };
    if !tail.iter().all(|&byte| is_continuation_byte(byte)) {
        return (INVALID_CODE_POINT, 0);
    }

    let lead_mask = 0x7F_u8 >> len;
    let value = tail
        .iter()
        .fold(u32::from(lead & lead_mask), |acc, &byte| (acc << 6) | u32::from(byte & 0x3F));
    (value, len)
}

/// Length announced by a multi-byte lead byte.
fn sequence_len(byte: u8) -> Option<usize> {
    if is_first_of_two(byte) {
        Some(2)
    } else if is_first_of_three(byte) {
        Some(3)
    } else if is_first_of_four(byte) {
        Some(4)
    } else if is_first_of_five(byte) {
        Some(5)
    } else if is_first_of_six(byte) {
        Some(6)
    } else {
        None
    }
}

/// A complete sequence by itself (ASCII).
#[inline]
pub fn is_single_byte_glyph(byte: u8) -> bool {
    byte <= 0x7F
}

/// `10xxxxxx`: only valid after a lead byte.
#[inline]
pub fn is_continuation_byte(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}

#[inline]
pub fn is_first_of_two(byte: u8) -> bool {
    byte & 0xE0 == 0xC0
}

#[inline]
pub fn is_first_of_three(byte: u8) -> bool {
    byte & 0xF0 == 0xE0
}

#[inline]
pub fn is_first_of_four(byte: u8) -> bool {
    byte & 0xF8 == 0xF0
}

#[inline]
pub fn is_first_of_five(byte: u8) -> bool {
    byte & 0xFC == 0xF8
}

#[inline]
pub fn is_first_of_six(byte: u8) -> bool {
    byte & 0xFE == 0xFC
}

/// 0xFE and 0xFF. Lead bytes of overlong forms (0xC0, 0xC1) are not included;
/// those are caught once their sequence completes.
#[inline]
pub fn is_illegal_byte(byte: u8) -> bool {
    byte == 0xFE || byte == 0xFF
}

/// Anything that is not a continuation byte.
#[inline]
pub fn is_starting_byte(byte: u8) -> bool {
    !is_continuation_byte(byte)
}
