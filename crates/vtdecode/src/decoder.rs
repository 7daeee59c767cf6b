use log::debug;

use crate::params::ParameterDecoder;
use crate::sixel::{
    aspect_ratio_from_selector, ColorType, SixelDecoder, SixelRun, SixelSink, SIXEL_CELL_HEIGHT,
};
use crate::{Result, SixelError, SIXEL_HEIGHT_LIMIT, SIXEL_PALETTE_MAX, SIXEL_WIDTH_LIMIT};

const CELL_HEIGHT: usize = SIXEL_CELL_HEIGHT as usize;

/// Max 256 MB of pixel data (64 million pixels * 4 bytes)
const MAX_PIXELS: usize = 64 * 1024 * 1024;

/// Pixel aspect ratio of a SIXEL image.
///
/// SIXEL images can specify a pixel aspect ratio that indicates how pixels
/// should be displayed. This is a historical feature from when terminals had
/// non-square pixels. Most modern terminals display square pixels and ignore
/// this setting, but the information is preserved for applications that need it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelAspectRatio {
    /// Pixel Aspect Numerator (vertical component)
    pub pan: u16,
    /// Pixel Aspect Denominator (horizontal component)
    pub pad: u16,
}

impl PixelAspectRatio {
    /// Returns the aspect ratio as a floating point value (pan/pad).
    /// Values > 1.0 mean pixels are taller than wide.
    /// Values < 1.0 mean pixels are wider than tall.
    /// Value of 1.0 means square pixels.
    #[inline]
    pub fn as_f32(&self) -> f32 {
        f32::from(self.pan) / f32::from(self.pad.max(1))
    }

    /// Returns true if the aspect ratio represents square pixels.
    #[inline]
    pub fn is_square(&self) -> bool {
        self.pan == self.pad
    }
}

impl Default for PixelAspectRatio {
    fn default() -> Self {
        Self { pan: 1, pad: 1 } // Square pixels
    }
}

/// A decoded SIXEL image with full metadata.
#[derive(Debug, Clone)]
pub struct SixelImage {
    /// RGBA pixel data (4 bytes per pixel: R, G, B, A)
    pub pixels: Vec<u8>,
    /// Image width in pixels
    pub width: usize,
    /// Image height in pixels
    pub height: usize,
    /// Pixel aspect ratio from DCS parameters or raster attributes
    pub aspect_ratio: PixelAspectRatio,
    /// Whether the image uses transparency (P2=1)
    pub has_transparency: bool,
}

impl SixelImage {
    /// Returns the corrected dimensions if aspect ratio is applied.
    ///
    /// For non-square pixels, returns the dimensions that would result
    /// from scaling the image to have square pixels.
    pub fn corrected_dimensions(&self) -> (usize, usize) {
        let pan = usize::from(self.aspect_ratio.pan.max(1));
        let pad = usize::from(self.aspect_ratio.pad.max(1));
        if pan == pad {
            (self.width, self.height)
        } else if pan > pad {
            // Taller pixels: stretch vertically
            (self.width, self.height * pan / pad)
        } else {
            // Wider pixels: stretch horizontally
            (self.width * pad / pan, self.height)
        }
    }
}

/// Decodes a complete ANSI SIXEL sequence.
///
/// # SIXEL Format
///
/// A complete SIXEL sequence has the format:
/// ```text
/// ESC P <params> q <sixel_data> ESC \
/// ```
/// Where:
/// - `ESC P` (0x1B 0x50) or 0x90: DCS introducer
/// - `<params>`: Optional `P1;P2;P3` (aspect ratio selector, background mode, grid size)
/// - `q`: SIXEL command
/// - `<sixel_data>`: The actual SIXEL graphics data
/// - `ESC \` (0x1B 0x5C) or 0x9C: String terminator
///
/// Input without a DCS introducer is decoded as bare `<sixel_data>`.
///
/// # Pixel Format
///
/// The returned pixel data is in RGBA format with 4 bytes per pixel, in
/// row-major order. Undrawn pixels take palette color 0, or are fully
/// transparent when `P2` is 1.
///
/// # Example
///
/// ```rust
/// use vtdecode::sixel_decode;
///
/// let sixel_data = b"\x1bPq#0;2;100;0;0#0~~~\x1b\\";
/// let image = sixel_decode(sixel_data)?;
///
/// assert_eq!((image.width, image.height), (3, 6));
/// assert_eq!(&image.pixels[0..4], &[255, 0, 0, 255]);
/// # Ok::<(), vtdecode::SixelError>(())
/// ```
///
/// # Errors
///
/// Returns an error if:
/// - The DCS introducer is present but the `q` final byte is missing
/// - The resulting image dimensions exceed the width/height/pixel limits
#[must_use = "this returns the decoded SixelImage"]
pub fn sixel_decode(data: &[u8]) -> Result<SixelImage> {
    let parsed = SixelSequence::parse(data)?;
    let (pan, pad) = aspect_ratio_from_selector(parsed.aspect_selector);
    let has_transparency = parsed.background_select == Some(1);

    let mut decoder = SixelDecoder::with_aspect_ratio(pan, pad);
    let mut canvas = SixelCanvas::new(has_transparency);
    decoder.feed(parsed.payload, &mut canvas);

    let (width, height) = decoder.image_size();
    let width = (width as usize).max(1);
    let height = (height as usize).max(1);
    let pixels = canvas.finish(width, height)?;

    let (pan, pad) = decoder.aspect_ratio();
    Ok(SixelImage {
        pixels,
        width,
        height,
        aspect_ratio: PixelAspectRatio { pan, pad },
        has_transparency,
    })
}

/// The parts of a SIXEL device control string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SixelSequence<'a> {
    /// DCS `P1`, the pixel aspect ratio selector.
    pub aspect_selector: Option<u16>,
    /// DCS `P2`; 1 leaves undrawn pixels transparent.
    pub background_select: Option<u16>,
    /// Command stream between `q` and the string terminator.
    pub payload: &'a [u8],
}

impl<'a> SixelSequence<'a> {
    /// Splits `bytes` into DCS parameters and payload.
    ///
    /// Bytes before the introducer are skipped. Without an introducer the
    /// whole input, up to the first ESC or 0x9C, is the payload.
    ///
    /// # Errors
    ///
    /// [`SixelError::InvalidData`] if the introducer is not followed by `q`.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let mut idx = 0;
        while idx < bytes.len() {
            match bytes[idx] {
                0x90 => {
                    return Self::parse_dcs(bytes, idx + 1);
                }
                0x1b if bytes.get(idx + 1) == Some(&b'P') => {
                    return Self::parse_dcs(bytes, idx + 2);
                }
                _ => idx += 1,
            }
        }

        Ok(SixelSequence {
            aspect_selector: None,
            background_select: None,
            payload: payload_until_terminator(bytes),
        })
    }

    fn parse_dcs(bytes: &'a [u8], mut idx: usize) -> Result<Self> {
        let mut params = ParameterDecoder::new();
        while idx < bytes.len() && params.feed_byte(bytes[idx]).consumed {
            idx += 1;
        }

        // intermediates between the parameters and the final byte are ignored
        loop {
            match bytes.get(idx) {
                Some(b'q') => break,
                Some(0x1b | 0x9c) | None => {
                    return Err(SixelError::InvalidData("missing SIXEL final byte 'q'".to_string()));
                }
                Some(_) => idx += 1,
            }
        }

        Ok(SixelSequence {
            aspect_selector: params.get_parameter(0).ok(),
            background_select: params.get_parameter(1).ok(),
            payload: payload_until_terminator(&bytes[idx + 1..]),
        })
    }
}

/// Cuts `data` at the string terminator (ESC or 0x9C).
fn payload_until_terminator(data: &[u8]) -> &[u8] {
    let end = data
        .iter()
        .position(|&byte| byte == 0x1b || byte == 0x9c)
        .unwrap_or(data.len());
    &data[..end]
}

/// A [`SixelSink`] that paints into an RGBA buffer.
///
/// The palette starts with the VT340 defaults and is private to the canvas.
/// The buffer grows as runs land outside it; growth beyond the size limits
/// stops painting and is reported by [`finish`](Self::finish).
#[derive(Debug)]
pub struct SixelCanvas {
    canvas: Canvas,
    palette: Palette,
    color_index: usize,
    current_color: [u8; 4], // RGBA with alpha channel
    background: [u8; 4],
    error: Option<SixelError>,
}

impl SixelCanvas {
    /// Creates an empty canvas. With `transparent_mode` undrawn pixels have
    /// alpha 0; otherwise they take palette color 0.
    pub fn new(transparent_mode: bool) -> Self {
        let palette = Palette::new();
        let background = if transparent_mode {
            [0, 0, 0, 0]
        } else {
            palette.rgb_bytes(0)
        };
        Self {
            canvas: Canvas::default(),
            current_color: palette.rgb_bytes(0),
            palette,
            color_index: 0,
            background,
            error: None,
        }
    }

    /// Width of the painted area so far.
    #[inline]
    pub fn width(&self) -> usize {
        self.canvas.width
    }

    /// Height of the painted area so far.
    #[inline]
    pub fn height(&self) -> usize {
        self.canvas.height
    }

    /// RGBA value of palette entry `index`.
    pub fn palette_color(&self, index: u16) -> [u8; 4] {
        self.palette.rgb_bytes(usize::from(index))
    }

    /// Returns the pixels cropped or extended to `width` x `height`.
    ///
    /// # Errors
    ///
    /// [`SixelError::InvalidDimensions`] if painting hit a size limit, or if
    /// the requested size is beyond the limits itself.
    pub fn finish(mut self, width: usize, height: usize) -> Result<Vec<u8>> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        guard_dimensions(width, height)?;
        self.canvas.resize(width, height, self.background);
        Ok(self.canvas.data)
    }
}

impl SixelSink for SixelCanvas {
    fn on_color_select(&mut self, index: u16) {
        self.color_index = usize::from(index).min(SIXEL_PALETTE_MAX - 1);
        self.current_color = self.palette.rgb_bytes(self.color_index);
    }

    fn on_color_define(&mut self, index: u16, color_type: ColorType, v1: u16, v2: u16, v3: u16) {
        let index = usize::from(index).min(SIXEL_PALETTE_MAX - 1);
        let (v1, v2, v3) = (i32::from(v1), i32::from(v2), i32::from(v3));
        match color_type {
            ColorType::Hls => self.palette.set_hls(index, v1, v2, v3),
            ColorType::Rgb => self.palette.set_rgb_percent(index, v1, v2, v3),
        }
    }

    fn on_sixel_run(&mut self, run: SixelRun) {
        if self.error.is_some() {
            return;
        }

        let x = run.x as usize;
        let y = run.pixel_row() as usize;
        let span = run.columns() as usize;
        let width_needed = x.saturating_add(span);
        let height_needed = y.saturating_add(CELL_HEIGHT);

        if let Err(error) = guard_dimensions(width_needed, height_needed) {
            debug!("stopping SIXEL canvas: {error}");
            self.error = Some(error);
            return;
        }
        self.canvas.ensure_visible(width_needed, height_needed, self.background);

        let color = self.current_color;
        for row in run.bits().rows() {
            self.canvas.paint_span(y + row, x, span, color);
        }
    }
}

fn guard_dimensions(width: usize, height: usize) -> Result<()> {
    if width > SIXEL_WIDTH_LIMIT
        || height > SIXEL_HEIGHT_LIMIT
        || width.saturating_mul(height) > MAX_PIXELS
    {
        return Err(SixelError::InvalidDimensions { width, height });
    }
    Ok(())
}

#[derive(Debug)]
struct Palette {
    colors: [u32; SIXEL_PALETTE_MAX],
}

impl Palette {
    fn new() -> Self {
        let mut colors = [0u32; SIXEL_PALETTE_MAX];
        const BASE: &[(i32, i32, i32)] = &[
            (0, 0, 0),
            (20, 20, 80),
            (80, 13, 13),
            (20, 80, 20),
            (80, 20, 80),
            (20, 80, 80),
            (80, 80, 20),
            (53, 53, 53),
            (26, 26, 26),
            (33, 33, 60),
            (60, 26, 26),
            (33, 60, 33),
            (60, 33, 60),
            (33, 60, 60),
            (60, 60, 33),
            (80, 80, 80),
        ];

        for (idx, &(r, g, b)) in BASE.iter().enumerate() {
            colors[idx] = pack_rgb(percent_to_byte(r), percent_to_byte(g), percent_to_byte(b));
        }

        // 6x6x6 color cube, then a gray ramp, then white
        let cube = (0..6).flat_map(|r| (0..6).flat_map(move |g| (0..6).map(move |b| (r, g, b))));
        let cube = cube.map(|(r, g, b)| {
            pack_rgb(
                percent_to_byte(r * 20),
                percent_to_byte(g * 20),
                percent_to_byte(b * 20),
            )
        });
        let ramp = (0..24).map(|level| {
            let value = percent_to_byte(level * 100 / 23);
            pack_rgb(value, value, value)
        });
        let rest = cube.chain(ramp).chain(std::iter::repeat(0x00ff_ffff));
        for (slot, color) in colors[BASE.len()..].iter_mut().zip(rest) {
            *slot = color;
        }

        Self { colors }
    }

    fn rgb_bytes(&self, index: usize) -> [u8; 4] {
        let color = self.colors[index.min(SIXEL_PALETTE_MAX - 1)];
        [
            ((color >> 16) & 0xff) as u8,
            ((color >> 8) & 0xff) as u8,
            (color & 0xff) as u8,
            0xFF, // Alpha channel
        ]
    }

    fn set_rgb_percent(&mut self, index: usize, r: i32, g: i32, b: i32) {
        if let Some(slot) = self.colors.get_mut(index) {
            *slot = pack_rgb(percent_to_byte(r), percent_to_byte(g), percent_to_byte(b));
        }
    }

    fn set_hls(&mut self, index: usize, h: i32, l: i32, s: i32) {
        if let Some(slot) = self.colors.get_mut(index) {
            let rgb = hls_to_rgb(h, l, s);
            *slot = pack_rgb(rgb[0], rgb[1], rgb[2]);
        }
    }
}

#[derive(Debug, Default)]
struct Canvas {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl Canvas {
    fn ensure_visible(&mut self, width: usize, height: usize, background: [u8; 4]) {
        if width <= self.width && height <= self.height {
            return;
        }
        self.resize(width.max(self.width), height.max(self.height), background);
    }

    /// Crops or extends to `new_width` x `new_height`, keeping the top-left
    /// corner and filling new area with `background`.
    fn resize(&mut self, new_width: usize, new_height: usize, background: [u8; 4]) {
        if new_width == self.width && new_height == self.height {
            return;
        }
        if new_width == 0 || new_height == 0 {
            self.data.clear();
            self.width = new_width;
            self.height = new_height;
            return;
        }

        let mut new_data = vec![0u8; new_width * new_height * 4];
        let kept_width = self.width.min(new_width) * 4;

        for (row, dst) in new_data.chunks_exact_mut(new_width * 4).enumerate() {
            if row < self.height {
                let src_start = row * self.width * 4;
                dst[..kept_width].copy_from_slice(&self.data[src_start..src_start + kept_width]);
                fill_rgba_span(&mut dst[kept_width..], background);
            } else {
                fill_rgba_span(dst, background);
            }
        }

        self.data = new_data;
        self.width = new_width;
        self.height = new_height;
    }

    #[inline]
    fn paint_span(&mut self, y: usize, x: usize, len: usize, color: [u8; 4]) {
        if len == 0 || y >= self.height || x >= self.width {
            return;
        }
        // Clip the span to the available width
        let actual_len = len.min(self.width - x);
        let start = (y * self.width + x) * 4;
        fill_rgba_span(&mut self.data[start..start + actual_len * 4], color);
    }
}

fn fill_rgba_span(buf: &mut [u8], color: [u8; 4]) {
    for pixel in buf.chunks_exact_mut(4) {
        pixel.copy_from_slice(&color);
    }
}

fn percent_to_byte(value: i32) -> u8 {
    let clamped = value.clamp(0, 100);
    ((clamped * 255 + 50) / 100) as u8
}

fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
    (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
}

/// DEC HLS: hue 0 is blue, 120 red, 240 green.
fn hls_to_rgb(h: i32, l: i32, s: i32) -> [u8; 3] {
    if s <= 0 {
        let gray = percent_to_byte(l);
        return [gray, gray, gray];
    }

    let hue = f64::from((h + 240).rem_euclid(360)) / 360.0;
    let lum = f64::from(l.clamp(0, 100)) / 100.0;
    let sat = f64::from(s.clamp(0, 100)) / 100.0;

    let q = if lum < 0.5 {
        lum * (1.0 + sat)
    } else {
        lum + sat - lum * sat
    };
    let p = 2.0 * lum - q;

    let r = hue_to_rgb(p, q, hue + 1.0 / 3.0);
    let g = hue_to_rgb(p, q, hue);
    let b = hue_to_rgb(p, q, hue - 1.0 / 3.0);

    [
        (r * 255.0 + 0.5).floor().clamp(0.0, 255.0) as u8,
        (g * 255.0 + 0.5).floor().clamp(0.0, 255.0) as u8,
        (b * 255.0 + 0.5).floor().clamp(0.0, 255.0) as u8,
    ]
}

fn hue_to_rgb(p: f64, q: f64, mut t: f64) -> f64 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 1.0 / 2.0 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}
