//! # vtdecode
//!
//! Restartable, byte-at-a-time decoders for the data that arrives on a
//! terminal's input stream.
//!
//! ## Features
//!
//! - **[`params`]**: tokenizer for `12;;7`-style numeric parameter lists
//! - **[`utf8`]**: UTF-8 decoder that recovers from illegal, overlong and truncated sequences
//! - **[`sixel`]**: SIXEL graphics state machine reporting to a [`SixelSink`]
//! - **[`decoder`]**: complete SIXEL sequences decoded to RGBA images
//!
//! None of the decoders fail on bad input. Problems are recorded as sentinel
//! values, replaced with U+FFFD, or skipped, and decoding carries on. They
//! log what they recover from through the [`log`] facade.
//!
//! ## Quick Start
//!
//! ### Decoding SIXEL to image data
//!
//! ```
//! use vtdecode::sixel_decode;
//!
//! let sixel_data = b"\x1bPq#0;2;100;0;0#0~-\x1b\\";
//! let image = sixel_decode(sixel_data)?;
//! // image.pixels contains RGBA pixel data (4 bytes per pixel)
//! println!("{}x{}", image.width, image.height);
//! # Ok::<(), vtdecode::SixelError>(())
//! ```
//!
//! ### Streaming SIXEL commands
//!
//! ```
//! use vtdecode::sixel::{SixelDecoder, SixelRun, SixelSink};
//!
//! #[derive(Default)]
//! struct Columns(u32);
//!
//! impl SixelSink for Columns {
//!     fn on_sixel_run(&mut self, run: SixelRun) {
//!         self.0 += run.columns();
//!     }
//! }
//!
//! let mut decoder = SixelDecoder::new();
//! let mut columns = Columns::default();
//! for &byte in b"#1~~!3@" {
//!     decoder.feed_byte(byte, &mut columns);
//! }
//! assert_eq!(columns.0, 6);
//! ```

use thiserror::Error;

pub mod decoder;
pub mod params;
pub mod sixel;
pub mod utf8;

pub use decoder::{sixel_decode, PixelAspectRatio, SixelCanvas, SixelImage, SixelSequence};
pub use params::{Parameter, ParameterDecoder, ParameterError};
pub use sixel::{get_sixel_bits, Callbacks, ColorType, SixelBits, SixelDecoder, SixelRun, SixelSink};
pub use utf8::{Utf8Decoder, Utf8Error};

/// Errors that can occur while turning a SIXEL sequence into an image.
///
/// The streaming decoders never return errors; these come only from
/// [`sixel_decode`] and [`SixelCanvas::finish`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SixelError {
    /// Image dimensions exceed the width, height or pixel-count limits
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    /// Invalid SIXEL data format
    #[error("invalid SIXEL data: {0}")]
    InvalidData(String),
}

/// Result type for SIXEL operations.
pub type Result<T> = core::result::Result<T, SixelError>;

/// Number of palette entries a canvas keeps.
pub const SIXEL_PALETTE_MAX: usize = 256;
/// Widest image a canvas will grow to.
pub const SIXEL_WIDTH_LIMIT: usize = 1_000_000;
/// Tallest image a canvas will grow to.
pub const SIXEL_HEIGHT_LIMIT: usize = 1_000_000;
