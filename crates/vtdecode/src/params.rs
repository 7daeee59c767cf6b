//! Tokenizer for delimiter-separated numeric parameter lists.
//!
//! Terminal sequences carry their arguments as decimal integers separated by a
//! delimiter, as in `CSI 12;;7 m` or the SIXEL color command `#1;2;100;0;0`.
//! [`ParameterDecoder`] consumes such a list one byte at a time and stops at
//! the first byte that is neither a digit nor the delimiter. That byte is
//! handed back to the caller (see [`Step::consumed`]) because it belongs to
//! whatever grammar embeds the list.
//!
//! Parsing never fails. Empty slots are recorded as [`Parameter::Undefined`]
//! and values that do not fit are recorded as [`Parameter::Overflow`]; both
//! surface only when a value is requested.

use std::fmt;

use log::trace;
use thiserror::Error;

/// Delimiter used when none is given.
pub const DEFAULT_DELIMITER: u8 = b';';

/// Number of slots kept per list. Further slots are parsed but dropped.
pub const MAX_PARAMETERS: usize = 256;

/// One slot of a parameter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    /// A complete nonnegative integer.
    Value(u16),
    /// No digits were given for this slot.
    Undefined,
    /// The digits describe a value larger than `u16::MAX`.
    Overflow,
}

impl Parameter {
    fn push_digit(self, digit: u8) -> Self {
        let digit = u16::from(digit);
        match self {
            Parameter::Undefined => Parameter::Value(digit),
            Parameter::Value(value) => value
                .checked_mul(10)
                .and_then(|value| value.checked_add(digit))
                .map_or(Parameter::Overflow, Parameter::Value),
            Parameter::Overflow => Parameter::Overflow,
        }
    }
}

/// Reasons a parameter cannot be returned as a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParameterError {
    /// The slot exists but no digits were given for it.
    #[error("parameter is undefined")]
    Undefined,

    /// The slot held more digits than fit in a `u16`.
    #[error("parameter value overflowed")]
    Overflow,

    /// The list has fewer slots than the requested index.
    #[error("parameter index {index} out of range (list has {len})")]
    OutOfRange { index: usize, len: usize },
}

/// Position of a [`ParameterDecoder`] within its grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// No bytes seen yet.
    #[default]
    Initial,
    /// A digit was just accumulated.
    SeenDigit,
    /// A delimiter was just seen; a new slot is open.
    ResetParameter,
    /// A byte outside the grammar ended the list.
    Terminated,
}

impl State {
    /// Short name for log output.
    pub fn name(self) -> &'static str {
        match self {
            State::Initial => "init",
            State::SeenDigit => "digit",
            State::ResetParameter => "next",
            State::Terminated => "term",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of feeding a single byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// State after the byte was handled.
    pub state: State,
    /// `false` if the byte ended the list and must be handled by the caller.
    pub consumed: bool,
}

/// Byte-at-a-time parser for `digits (delimiter digits)*`.
///
/// ```
/// use vtdecode::params::{Parameter, ParameterDecoder};
///
/// let mut decoder = ParameterDecoder::new();
/// for &byte in b"1;;3" {
///     assert!(decoder.feed_byte(byte).consumed);
/// }
/// assert!(!decoder.feed_byte(b'm').consumed);
/// assert_eq!(
///     decoder.parameters(),
///     &[Parameter::Value(1), Parameter::Undefined, Parameter::Value(3)]
/// );
/// ```
#[derive(Debug, Clone)]
pub struct ParameterDecoder {
    parameters: Vec<Parameter>,
    /// Open slot; `None` until the first digit or delimiter.
    pending: Option<Parameter>,
    delimiter: u8,
    state: State,
}

impl Default for ParameterDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterDecoder {
    /// Creates a decoder that splits on `;`.
    pub fn new() -> Self {
        Self::with_delimiter(DEFAULT_DELIMITER)
    }

    /// Creates a decoder that splits on `delimiter`.
    ///
    /// A digit delimiter would make every list ambiguous, so digits are
    /// replaced by the default delimiter.
    pub fn with_delimiter(delimiter: u8) -> Self {
        let delimiter = if delimiter.is_ascii_digit() {
            DEFAULT_DELIMITER
        } else {
            delimiter
        };
        Self {
            parameters: Vec::new(),
            pending: None,
            delimiter,
            state: State::Initial,
        }
    }

    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    #[inline]
    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// Completed slots in the order they were parsed.
    ///
    /// The slot being accumulated is not part of this list until a delimiter
    /// or terminator closes it.
    #[inline]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Advances the machine by one byte.
    ///
    /// Once [`State::Terminated`] is reached every further byte is reported as
    /// not consumed until [`reset`](Self::reset) is called.
    pub fn feed_byte(&mut self, byte: u8) -> Step {
        let consumed = match self.state {
            State::Terminated => false,
            _ if byte.is_ascii_digit() => {
                let slot = self.pending.unwrap_or(Parameter::Undefined);
                let slot = slot.push_digit(byte - b'0');
                if slot == Parameter::Overflow && self.pending != Some(Parameter::Overflow) {
                    trace!("parameter {} overflowed", self.parameters.len());
                }
                self.pending = Some(slot);
                self.state = State::SeenDigit;
                true
            }
            _ if byte == self.delimiter => {
                let slot = self.pending.unwrap_or(Parameter::Undefined);
                self.push(slot);
                self.pending = Some(Parameter::Undefined);
                self.state = State::ResetParameter;
                true
            }
            _ => {
                if let Some(slot) = self.pending.take() {
                    self.push(slot);
                }
                self.state = State::Terminated;
                false
            }
        };
        Step {
            state: self.state,
            consumed,
        }
    }

    /// Returns the value at `index`.
    ///
    /// # Errors
    ///
    /// [`ParameterError::Undefined`] or [`ParameterError::Overflow`] for those
    /// slots, [`ParameterError::OutOfRange`] past the end of the list.
    pub fn get_parameter(&self, index: usize) -> Result<u16, ParameterError> {
        match self.parameters.get(index) {
            Some(Parameter::Value(value)) => Ok(*value),
            Some(Parameter::Undefined) => Err(ParameterError::Undefined),
            Some(Parameter::Overflow) => Err(ParameterError::Overflow),
            None => Err(ParameterError::OutOfRange {
                index,
                len: self.parameters.len(),
            }),
        }
    }

    /// Returns the value at `index`, or `default` for missing or empty slots.
    ///
    /// # Errors
    ///
    /// Only [`ParameterError::Overflow`]; there is no sensible substitute for a
    /// value the sender meant to be large.
    pub fn get_parameter_or_default(
        &self,
        index: usize,
        default: u16,
    ) -> Result<u16, ParameterError> {
        match self.get_parameter(index) {
            Err(ParameterError::Undefined | ParameterError::OutOfRange { .. }) => Ok(default),
            other => other,
        }
    }

    /// Forgets all parsed slots and returns to [`State::Initial`].
    ///
    /// The parameter storage keeps its capacity.
    pub fn reset(&mut self) {
        self.parameters.clear();
        self.pending = None;
        self.state = State::Initial;
    }

    fn push(&mut self, slot: Parameter) {
        if self.parameters.len() < MAX_PARAMETERS {
            self.parameters.push(slot);
        }
    }
}
