//! vtdecode - Inspect terminal input streams
//!
//! A command-line tool for decoding SIXEL graphics, UTF-8 text and numeric
//! parameter lists the way a terminal would.

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{info, warn};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use vtdecode::sixel::{aspect_ratio_from_selector, SixelDecoder, SixelSink};
use vtdecode::utf8::Utf8Decoder;
use vtdecode::{sixel_decode, ColorType, Parameter, ParameterDecoder, SixelRun, SixelSequence};

#[derive(Parser)]
#[command(name = "vtdecode")]
#[command(version)]
#[command(about = "Decode SIXEL graphics, UTF-8 text and parameter lists", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a SIXEL file to PNG
    Decode {
        /// Input SIXEL file (use - for stdin)
        input: PathBuf,

        /// Output PNG file (default: input with .png extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report the commands in a SIXEL file without rendering it
    Info {
        /// Input SIXEL file (use - for stdin)
        input: PathBuf,
    },

    /// Decode UTF-8 to stdout, replacing malformed sequences with U+FFFD
    Text {
        /// Input file (use - for stdin)
        input: PathBuf,
    },

    /// Split a parameter list such as `1;;3` into its slots
    Params {
        /// Parameter text; decoding stops at the first byte that is neither
        /// a digit nor the delimiter
        text: String,

        /// Delimiter between parameters
        #[arg(short, long, default_value_t = ';')]
        delimiter: char,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Decode { input, output } => {
            let sixel_data = read_input(&input)?;
            info!("Decoding ({} bytes)", sixel_data.len());

            let image = sixel_decode(&sixel_data)?;

            let output_path = output.unwrap_or_else(|| {
                let mut p = input.clone();
                p.set_extension("png");
                p
            });

            let img =
                image::RgbaImage::from_raw(image.width as u32, image.height as u32, image.pixels)
                    .ok_or("Failed to create image from decoded data")?;
            img.save(&output_path)?;

            eprintln!(
                "Decoded: {}x{} pixels (aspect {}:{}) -> '{}'",
                image.width,
                image.height,
                image.aspect_ratio.pan,
                image.aspect_ratio.pad,
                output_path.display()
            );
        }

        Commands::Info { input } => {
            let sixel_data = read_input(&input)?;
            let sequence = SixelSequence::parse(&sixel_data)?;
            let (pan, pad) = aspect_ratio_from_selector(sequence.aspect_selector);

            let mut decoder = SixelDecoder::with_aspect_ratio(pan, pad);
            let mut stats = Stats::default();
            decoder.feed(sequence.payload, &mut stats);

            let (width, height) = decoder.image_size();
            let (pan, pad) = decoder.aspect_ratio();
            let cell = decoder.get_sixel_size();
            let background = match sequence.background_select {
                Some(1) => "transparent",
                _ => "color 0",
            };
            let mut out = io::stdout().lock();
            writeln!(out, "payload:      {} bytes", sequence.payload.len())?;
            writeln!(out, "background:   {background}")?;
            writeln!(out, "raster attrs: {}", decoder.have_set_raster_attributes())?;
            writeln!(
                out,
                "aspect ratio: {pan}:{pad} ({}x{} dots per pixel)",
                cell.width, cell.height
            )?;
            writeln!(out, "suggested:    {:?}", decoder.suggested_size())?;
            writeln!(out, "size:         {width}x{height}")?;
            writeln!(
                out,
                "colors:       {} defined ({} HLS), {} selected",
                stats.defined, stats.hls, stats.selected
            )?;
            writeln!(out, "runs:         {} painting {} columns", stats.runs, stats.columns)?;
        }

        Commands::Text { input } => {
            let data = read_input(&input)?;
            let mut decoder = Utf8Decoder::new();
            let mut text = String::with_capacity(data.len());
            let mut replaced = 0usize;
            for &byte in &data {
                for c in decoder.next_state(byte) {
                    replaced += usize::from(c == char::REPLACEMENT_CHARACTER);
                    text.push(c);
                }
            }
            if let Some(c) = decoder.finish() {
                replaced += 1;
                text.push(c);
            }

            io::stdout().write_all(text.as_bytes())?;
            if replaced > 0 {
                warn!(
                    "{replaced} malformed sequence(s) replaced, last: {:?}",
                    decoder.last_error()
                );
            }
        }

        Commands::Params { text, delimiter } => {
            let delimiter = u8::try_from(delimiter)
                .ok()
                .filter(u8::is_ascii)
                .ok_or("Delimiter must be an ASCII character")?;
            let mut decoder = ParameterDecoder::with_delimiter(delimiter);
            let consumed = text
                .bytes()
                .position(|byte| !decoder.feed_byte(byte).consumed)
                .unwrap_or(text.len());

            let mut out = io::stdout().lock();
            for (index, parameter) in decoder.parameters().iter().enumerate() {
                match parameter {
                    Parameter::Value(value) => writeln!(out, "{index}: {value}")?,
                    Parameter::Undefined => writeln!(out, "{index}: (default)")?,
                    Parameter::Overflow => writeln!(out, "{index}: (overflow)")?,
                }
            }
            if consumed < text.len() {
                eprintln!("Stopped at byte {consumed}: {:?}", &text[consumed..]);
            }
        }
    }

    Ok(())
}

fn read_input(input: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    if input.to_string_lossy() == "-" {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        Ok(fs::read(input).map_err(|e| format!("Failed to read '{}': {}", input.display(), e))?)
    }
}

#[derive(Default)]
struct Stats {
    defined: usize,
    hls: usize,
    selected: usize,
    runs: usize,
    columns: u64,
}

impl SixelSink for Stats {
    fn on_color_select(&mut self, _index: u16) {
        self.selected += 1;
    }

    fn on_color_define(
        &mut self,
        _index: u16,
        color_type: ColorType,
        _v1: u16,
        _v2: u16,
        _v3: u16,
    ) {
        self.defined += 1;
        self.hls += usize::from(color_type == ColorType::Hls);
    }

    fn on_sixel_run(&mut self, run: SixelRun) {
        self.runs += 1;
        self.columns += u64::from(run.columns());
    }
}
