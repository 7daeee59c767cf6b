//! SIXEL command-stream state machine.
//!
//! [`SixelDecoder`] walks the body of a SIXEL device control string (the part
//! after `q`) one byte at a time and reports what it finds to a [`SixelSink`]:
//!
//! - `#Pc` selects palette entry `Pc`,
//! - `#Pc;Pu;Px;Py;Pz` defines entry `Pc` in color space `Pu` and selects it,
//! - `?`..`~` paints one column of six vertically stacked pixels,
//! - `!Pn` followed by a data byte paints that column `1 + Pn` times,
//! - `"Pan;Pad;Ph;Pv` sets the pixel aspect ratio and the image extent,
//! - `$` returns the cursor to column 0 and `-` also moves it one band down.
//!
//! Every numeric argument goes through the embedded
//! [`ParameterDecoder`]. Bytes that make no sense in the current state are
//! dropped and the machine goes back to scanning for a command, so any input
//! decodes to something.
//!
//! The decoder knows nothing about pixels or colors beyond their numbers.
//! [`SixelCanvas`](crate::decoder::SixelCanvas) is a sink that rasterizes into
//! an RGBA buffer; [`Callbacks`] adapts plain closures.

use std::fmt;

use log::{debug, trace};

use crate::params::ParameterDecoder;

/// Value subtracted from a data byte to get its six pixel bits.
pub const SIXEL_BASE: u8 = 0x3F;

/// Pixel rows covered by one data byte.
pub const SIXEL_CELL_HEIGHT: u32 = 6;

/// Largest number of extra repetitions a `!` command can request.
pub const REPEAT_COUNT_MAXIMUM: u16 = 2048;

/// Upper bound of a hue component, in degrees.
pub const HUE_MAXIMUM: u16 = 360;

/// Upper bound of every other color component, in percent.
pub const INTENSITY_MAXIMUM: u16 = 100;

/// Color space of a palette definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorType {
    /// Hue (0-360), lightness (0-100), saturation (0-100).
    Hls = 1,
    /// Red, green, blue (0-100 each).
    Rgb = 2,
}

impl TryFrom<u16> for ColorType {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ColorType::Hls),
            2 => Ok(ColorType::Rgb),
            other => Err(other),
        }
    }
}

/// The six pixel bits of one data byte; bit 0 is the top row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct SixelBits(u8);

impl SixelBits {
    /// All six pixels set.
    pub const FULL: SixelBits = SixelBits(0x3F);

    /// Builds the set from its 6-bit pattern; higher bits are ignored.
    #[inline]
    pub const fn from_pattern(pattern: u8) -> Self {
        SixelBits(pattern & 0x3F)
    }

    #[inline]
    pub const fn pattern(self) -> u8 {
        self.0
    }

    /// Whether the pixel in `row` (0 = top) is set. Rows past 5 are never set.
    #[inline]
    pub const fn get(self, row: usize) -> bool {
        row < SIXEL_CELL_HEIGHT as usize && self.0 & (1 << row) != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_full(self) -> bool {
        self.0 == Self::FULL.0
    }

    #[inline]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Rows that are set, top to bottom.
    pub fn rows(self) -> impl Iterator<Item = usize> {
        (0..SIXEL_CELL_HEIGHT as usize).filter(move |&row| self.get(row))
    }
}

/// Splits a data byte into its pixel bits.
///
/// Bytes outside `?`..`~` carry no pixels.
#[inline]
pub fn get_sixel_bits(byte: u8) -> SixelBits {
    if is_sixel_data(byte) {
        SixelBits::from_pattern(byte - SIXEL_BASE)
    } else {
        SixelBits::default()
    }
}

#[inline]
fn is_sixel_data(byte: u8) -> bool {
    (b'?'..=b'~').contains(&byte)
}

/// Formatting bytes that encoders put between commands.
#[inline]
fn is_layout_noise(byte: u8) -> bool {
    byte.is_ascii_control() || byte == b' '
}

/// Physical size of one sixel pixel, in device dots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSize {
    /// Dots across one column.
    pub width: u16,
    /// Dots down each of the six rows.
    pub height: u16,
}

/// Converts an aspect ratio into dots per pixel.
///
/// `pan` is the vertical and `pad` the horizontal part of the ratio; the
/// shorter side is one dot and the longer side the rounded quotient. Zero is
/// treated as one.
pub fn get_sixel_size_from_pan_pad(pan: u16, pad: u16) -> CellSize {
    let pan = u32::from(pan.max(1));
    let pad = u32::from(pad.max(1));
    let ratio =
        |long: u32, short: u32| u16::try_from((long + short / 2) / short).unwrap_or(u16::MAX);
    if pan >= pad {
        CellSize {
            width: 1,
            height: ratio(pan, pad),
        }
    } else {
        CellSize {
            width: ratio(pad, pan),
            height: 1,
        }
    }
}

/// Maps the DCS `P1` selector to `(pan, pad)`.
///
/// Missing or unknown selectors give the VT default of 2:1.
pub fn aspect_ratio_from_selector(selector: Option<u16>) -> (u16, u16) {
    match selector {
        Some(2) => (5, 1),
        Some(3 | 4) => (3, 1),
        Some(7..=9) => (1, 1),
        _ => (2, 1),
    }
}

/// One data byte, painted `repeat + 1` times starting at the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SixelRun {
    /// The data byte as received (`?`..`~`).
    pub raw: u8,
    /// Repetitions beyond the first.
    pub repeat: u16,
    /// Column of the first painted pixel.
    pub x: u32,
    /// Band index; the top pixel row is `y * 6`.
    pub y: u32,
}

impl SixelRun {
    #[inline]
    pub fn bits(&self) -> SixelBits {
        get_sixel_bits(self.raw)
    }

    /// Number of columns painted.
    #[inline]
    pub fn columns(&self) -> u32 {
        u32::from(self.repeat) + 1
    }

    /// Top pixel row covered by the run.
    #[inline]
    pub fn pixel_row(&self) -> u32 {
        self.y.saturating_mul(SIXEL_CELL_HEIGHT)
    }
}

/// Receiver of decoded SIXEL commands.
///
/// Every method has an empty default so a sink only implements what it uses.
pub trait SixelSink {
    /// Palette entry `index` becomes the current color.
    fn on_color_select(&mut self, index: u16) {
        let _ = index;
    }

    /// Palette entry `index` is (re)defined.
    ///
    /// For [`ColorType::Hls`] the components are hue, lightness and
    /// saturation; for [`ColorType::Rgb`] red, green and blue. They are
    /// already clamped to their ranges. The decoder follows every definition
    /// with [`on_color_select`](Self::on_color_select) for the same index.
    fn on_color_define(&mut self, index: u16, color_type: ColorType, v1: u16, v2: u16, v3: u16) {
        let _ = (index, color_type, v1, v2, v3);
    }

    /// Paint `run` with the current color.
    fn on_sixel_run(&mut self, run: SixelRun) {
        let _ = run;
    }
}

impl SixelSink for () {}

type ColorChooser<'a> = Box<dyn FnMut(u16) + 'a>;
type ColorCreator<'a> = Box<dyn FnMut(u16, ColorType, u16, u16, u16) + 'a>;
type SixelHandler<'a> = Box<dyn FnMut(u8, u16) + 'a>;

/// A [`SixelSink`] made of optional closures.
///
/// ```
/// use vtdecode::sixel::{Callbacks, SixelDecoder};
///
/// let mut columns = 0;
/// let mut callbacks = Callbacks::new();
/// callbacks.set_sixel_handler(|_raw, repeat| columns += u32::from(repeat) + 1);
///
/// let mut decoder = SixelDecoder::new();
/// decoder.feed(b"~~!3~", &mut callbacks);
/// drop(callbacks);
/// assert_eq!(columns, 6);
/// ```
#[derive(Default)]
pub struct Callbacks<'a> {
    color_chooser: Option<ColorChooser<'a>>,
    color_creator: Option<ColorCreator<'a>>,
    sixel_handler: Option<SixelHandler<'a>>,
}

impl<'a> Callbacks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the index of every selected color.
    pub fn set_color_chooser(&mut self, chooser: impl FnMut(u16) + 'a) -> &mut Self {
        self.color_chooser = Some(Box::new(chooser));
        self
    }

    /// Called with `(index, type, v1, v2, v3)` for every color definition.
    pub fn set_color_creator(
        &mut self,
        creator: impl FnMut(u16, ColorType, u16, u16, u16) + 'a,
    ) -> &mut Self {
        self.color_creator = Some(Box::new(creator));
        self
    }

    /// Called with `(raw byte, extra repeats)` for every painted run.
    pub fn set_sixel_handler(&mut self, handler: impl FnMut(u8, u16) + 'a) -> &mut Self {
        self.sixel_handler = Some(Box::new(handler));
        self
    }
}

impl fmt::Debug for Callbacks<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("color_chooser", &self.color_chooser.is_some())
            .field("color_creator", &self.color_creator.is_some())
            .field("sixel_handler", &self.sixel_handler.is_some())
            .finish()
    }
}

impl SixelSink for Callbacks<'_> {
    fn on_color_select(&mut self, index: u16) {
        if let Some(chooser) = self.color_chooser.as_mut() {
            chooser(index);
        }
    }

    fn on_color_define(&mut self, index: u16, color_type: ColorType, v1: u16, v2: u16, v3: u16) {
        if let Some(creator) = self.color_creator.as_mut() {
            creator(index, color_type, v1, v2, v3);
        }
    }

    fn on_sixel_run(&mut self, run: SixelRun) {
        if let Some(handler) = self.sixel_handler.as_mut() {
            handler(run.raw, run.repeat);
        }
    }
}

/// Position of a [`SixelDecoder`] within the command grammar.
///
/// `...ApplyParams`, `SetPixels`, the cursor-motion states and `RepeatApply`
/// are entered for exactly one byte: their effect happens on entry, and the
/// next byte is read as a new command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// No bytes seen yet.
    #[default]
    Initial,
    /// Scanning for the next command.
    ExpectCommand,
    RasterAttrsInitParams,
    RasterAttrsDecodeParams,
    RasterAttrsApplyParams,
    SetPixels,
    CarriageReturn,
    CarriageReturnLineFeed,
    LineFeed,
    /// `!` seen.
    RepeatBegin,
    RepeatReadCount,
    /// Count parsed; the next byte must be a data byte.
    RepeatExpectCharacter,
    RepeatApply,
    SetColorInitParams,
    SetColorDecodeParams,
    SetColorApplyParams,
}

impl State {
    pub fn name(self) -> &'static str {
        match self {
            State::Initial => "init",
            State::ExpectCommand => "root",
            State::RasterAttrsInitParams => "anew",
            State::RasterAttrsDecodeParams => "aprm",
            State::RasterAttrsApplyParams => "asav",
            State::SetPixels => "spix",
            State::CarriageReturn => "crtn",
            State::CarriageReturnLineFeed => "crlf",
            State::LineFeed => "newl",
            State::RepeatBegin => "rbgn",
            State::RepeatReadCount => "rcnt",
            State::RepeatExpectCharacter => "rxch",
            State::RepeatApply => "rsav",
            State::SetColorInitParams => "cnew",
            State::SetColorDecodeParams => "cprm",
            State::SetColorApplyParams => "csav",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Byte-at-a-time SIXEL decoder.
///
/// Cursor coordinates are in pixel columns (`x`) and six-pixel bands (`y`).
#[derive(Debug, Clone)]
pub struct SixelDecoder {
    params: ParameterDecoder,
    state: State,
    have_set_raster_attributes: bool,
    repetition_character: u8,
    repetition_count: u16,
    cursor_x: u32,
    cursor_y: u32,
    cursor_max_x: u32,
    cursor_max_y: u32,
    /// Lowest band holding at least one set pixel.
    painted_max_y: Option<u32>,
    pan: u16,
    pad: u16,
    initial_aspect_ratio: (u16, u16),
    suggested_width: u16,
    suggested_height: u16,
}

impl Default for SixelDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SixelDecoder {
    /// Creates a decoder with the VT default aspect ratio of 2:1.
    pub fn new() -> Self {
        let (pan, pad) = aspect_ratio_from_selector(None);
        Self::with_aspect_ratio(pan, pad)
    }

    /// Creates a decoder whose aspect ratio starts at `pan:pad`.
    ///
    /// Raster attributes in the stream override it; [`reset`](Self::reset)
    /// restores it.
    pub fn with_aspect_ratio(pan: u16, pad: u16) -> Self {
        let initial_aspect_ratio = (pan.max(1), pad.max(1));
        Self {
            params: ParameterDecoder::new(),
            state: State::Initial,
            have_set_raster_attributes: false,
            repetition_character: 0,
            repetition_count: 0,
            cursor_x: 0,
            cursor_y: 0,
            cursor_max_x: 0,
            cursor_max_y: 0,
            painted_max_y: None,
            pan: initial_aspect_ratio.0,
            pad: initial_aspect_ratio.1,
            initial_aspect_ratio,
            suggested_width: 0,
            suggested_height: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    /// The embedded parameter decoder, holding the arguments of the last
    /// parameterized command.
    #[inline]
    pub fn parameters(&self) -> &ParameterDecoder {
        &self.params
    }

    /// Current `(x, y)` cursor position.
    #[inline]
    pub fn cursor(&self) -> (u32, u32) {
        (self.cursor_x, self.cursor_y)
    }

    /// Largest `(x, y)` the cursor has reached.
    #[inline]
    pub fn cursor_max(&self) -> (u32, u32) {
        (self.cursor_max_x, self.cursor_max_y)
    }

    /// Current `(pan, pad)`.
    #[inline]
    pub fn aspect_ratio(&self) -> (u16, u16) {
        (self.pan, self.pad)
    }

    #[inline]
    pub fn have_set_raster_attributes(&self) -> bool {
        self.have_set_raster_attributes
    }

    /// `(Ph, Pv)` from raster attributes; zero where not given.
    #[inline]
    pub fn suggested_size(&self) -> (u16, u16) {
        (self.suggested_width, self.suggested_height)
    }

    /// Pending `(character, extra repeats)` of a `!` command.
    #[inline]
    pub fn repetition(&self) -> (u8, u16) {
        (self.repetition_character, self.repetition_count)
    }

    /// Dots per sixel pixel at the current aspect ratio.
    pub fn get_sixel_size(&self) -> CellSize {
        get_sixel_size_from_pan_pad(self.pan, self.pad)
    }

    /// Lowest band a run painted a pixel in, if any.
    #[inline]
    pub fn painted_max_y(&self) -> Option<u32> {
        self.painted_max_y
    }

    /// Image `(width, height)` in pixels.
    ///
    /// Each axis uses the raster attribute extent when one was given. Without
    /// it the width is the furthest column the cursor reached and the height
    /// ends with the lowest band that holds a set pixel, so a trailing `-`
    /// adds no rows. While decoding is in progress this only covers what has
    /// been seen so far.
    pub fn image_size(&self) -> (u32, u32) {
        let width = match self.suggested_width {
            0 => self.cursor_max_x,
            width => u32::from(width),
        };
        let height = match self.suggested_height {
            0 => self.painted_max_y.map_or(0, |y| {
                y.saturating_add(1).saturating_mul(SIXEL_CELL_HEIGHT)
            }),
            height => u32::from(height),
        };
        (width, height)
    }

    /// Advances the machine by one byte, reporting completed commands to `sink`.
    pub fn feed_byte<S: SixelSink + ?Sized>(&mut self, byte: u8, sink: &mut S) {
        // a byte handed back by a sub-grammar is read again as a command
        while !self.step(byte, sink) {}
    }

    /// Feeds every byte of `bytes` in order.
    pub fn feed<S: SixelSink + ?Sized>(&mut self, bytes: &[u8], sink: &mut S) {
        for &byte in bytes {
            self.feed_byte(byte, sink);
        }
    }

    /// Returns to [`State::Initial`], clearing the cursor, raster attributes
    /// and pending parameters. The aspect ratio reverts to the one given at
    /// construction.
    pub fn reset(&mut self) {
        self.params.reset();
        self.state = State::Initial;
        self.have_set_raster_attributes = false;
        self.repetition_character = 0;
        self.repetition_count = 0;
        self.cursor_x = 0;
        self.cursor_y = 0;
        self.cursor_max_x = 0;
        self.cursor_max_y = 0;
        self.painted_max_y = None;
        (self.pan, self.pad) = self.initial_aspect_ratio;
        self.suggested_width = 0;
        self.suggested_height = 0;
    }

    /// Handles `byte` in the current state; `false` means it must be read again.
    fn step<S: SixelSink + ?Sized>(&mut self, byte: u8, sink: &mut S) -> bool {
        match self.state {
            State::RasterAttrsInitParams | State::RasterAttrsDecodeParams => self.decode_params(
                byte,
                State::RasterAttrsDecodeParams,
                State::RasterAttrsApplyParams,
                sink,
            ),
            State::SetColorInitParams | State::SetColorDecodeParams => self.decode_params(
                byte,
                State::SetColorDecodeParams,
                State::SetColorApplyParams,
                sink,
            ),
            State::RepeatBegin | State::RepeatReadCount => self.decode_params(
                byte,
                State::RepeatReadCount,
                State::RepeatExpectCharacter,
                sink,
            ),
            // wrapped lines may split a repeat from its data byte
            State::RepeatExpectCharacter if is_layout_noise(byte) => true,
            State::RepeatExpectCharacter => {
                if is_sixel_data(byte) {
                    self.repetition_character = byte;
                    self.enter(State::RepeatApply, byte, sink);
                    true
                } else {
                    debug!("repeat without data byte, got {byte:#04x}");
                    self.enter(State::ExpectCommand, byte, sink);
                    false
                }
            }
            _ => {
                let next = self.command_state(byte);
                self.enter(next, byte, sink);
                true
            }
        }
    }

    fn decode_params<S: SixelSink + ?Sized>(
        &mut self,
        byte: u8,
        decoding: State,
        done: State,
        sink: &mut S,
    ) -> bool {
        if is_layout_noise(byte) {
            return true;
        }
        if self.params.feed_byte(byte).consumed {
            self.state = decoding;
            true
        } else {
            self.enter(done, byte, sink);
            false
        }
    }

    fn command_state(&self, byte: u8) -> State {
        match byte {
            b'"' => State::RasterAttrsInitParams,
            b'#' => State::SetColorInitParams,
            b'!' => State::RepeatBegin,
            b'$' => State::CarriageReturn,
            b'-' if self.cursor_x == 0 => State::LineFeed,
            b'-' => State::CarriageReturnLineFeed,
            _ if is_sixel_data(byte) => State::SetPixels,
            _ => {
                if !is_layout_noise(byte) {
                    debug!("ignoring SIXEL byte {byte:#04x} in state {}", self.state);
                }
                State::ExpectCommand
            }
        }
    }

    fn enter<S: SixelSink + ?Sized>(&mut self, next: State, byte: u8, sink: &mut S) {
        self.state = next;
        match next {
            State::RasterAttrsInitParams | State::SetColorInitParams | State::RepeatBegin => {
                self.params.reset()
            }
            State::RasterAttrsApplyParams => self.apply_raster_attributes(),
            State::SetColorApplyParams => self.apply_color(sink),
            State::RepeatExpectCharacter => {
                self.repetition_count = self.clamped_parameter(0, 0, REPEAT_COUNT_MAXIMUM);
            }
            State::RepeatApply => {
                let count = std::mem::take(&mut self.repetition_count);
                self.handle_command_character(self.repetition_character, count, sink);
            }
            State::SetPixels => self.handle_command_character(byte, 0, sink),
            State::CarriageReturn => self.cursor_x = 0,
            State::CarriageReturnLineFeed => {
                self.cursor_x = 0;
                self.line_feed();
            }
            State::LineFeed => self.line_feed(),
            _ => {}
        }
    }

    /// Reads parameter `index`, substituting `default` when it is missing and
    /// `maximum` when it is too large.
    fn clamped_parameter(&self, index: usize, default: u16, maximum: u16) -> u16 {
        match self.params.get_parameter_or_default(index, default) {
            Ok(value) if value <= maximum => value,
            Ok(value) => {
                debug!("clamping SIXEL parameter {index} from {value} to {maximum}");
                maximum
            }
            Err(error) => {
                debug!("SIXEL parameter {index}: {error}, using {maximum}");
                maximum
            }
        }
    }

    fn apply_raster_attributes(&mut self) {
        let params = &self.params;
        let pan = params.get_parameter_or_default(0, self.pan).unwrap_or(self.pan);
        let pad = params.get_parameter_or_default(1, self.pad).unwrap_or(self.pad);
        let width = params
            .get_parameter_or_default(2, self.suggested_width)
            .unwrap_or(self.suggested_width);
        let height = params
            .get_parameter_or_default(3, self.suggested_height)
            .unwrap_or(self.suggested_height);

        self.pan = pan.max(1);
        self.pad = pad.max(1);
        self.suggested_width = width;
        self.suggested_height = height;
        self.have_set_raster_attributes = true;
        trace!(
            "raster attributes: aspect {}:{}, extent {}x{}",
            self.pan,
            self.pad,
            width,
            height
        );
    }

    fn apply_color<S: SixelSink + ?Sized>(&mut self, sink: &mut S) {
        let index = match self.params.get_parameter_or_default(0, 0) {
            Ok(index) => index,
            Err(error) => {
                debug!("ignoring color command: index {error}");
                return;
            }
        };

        if self.params.len() > 1 {
            match self.params.get_parameter(1).map(ColorType::try_from) {
                Ok(Ok(color_type)) => {
                    let first_maximum = match color_type {
                        ColorType::Hls => HUE_MAXIMUM,
                        ColorType::Rgb => INTENSITY_MAXIMUM,
                    };
                    let v1 = self.clamped_parameter(2, 0, first_maximum);
                    let v2 = self.clamped_parameter(3, 0, INTENSITY_MAXIMUM);
                    let v3 = self.clamped_parameter(4, 0, INTENSITY_MAXIMUM);
                    trace!("define color {index} as {color_type:?}({v1}, {v2}, {v3})");
                    sink.on_color_define(index, color_type, v1, v2, v3);
                }
                Ok(Err(unknown)) => debug!("color {index}: unknown color type {unknown}"),
                Err(error) => debug!("color {index}: color type {error}"),
            }
        }

        sink.on_color_select(index);
    }

    /// Paints `raw` once plus `extra` more times at the cursor.
    fn handle_command_character<S: SixelSink + ?Sized>(
        &mut self,
        raw: u8,
        extra: u16,
        sink: &mut S,
    ) {
        let run = SixelRun {
            raw,
            repeat: extra,
            x: self.cursor_x,
            y: self.cursor_y,
        };
        if !run.bits().is_empty() {
            self.painted_max_y = self.painted_max_y.max(Some(self.cursor_y));
        }
        sink.on_sixel_run(run);
        self.cursor_x = self.cursor_x.saturating_add(u32::from(extra) + 1);
        self.cursor_max_x = self.cursor_max_x.max(self.cursor_x);
        self.cursor_max_y = self.cursor_max_y.max(self.cursor_y);
    }

    fn line_feed(&mut self) {
        self.cursor_y = self.cursor_y.saturating_add(1);
        self.cursor_max_y = self.cursor_max_y.max(self.cursor_y);
    }
}
