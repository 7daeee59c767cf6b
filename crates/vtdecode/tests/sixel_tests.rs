use pretty_assertions::assert_eq;
use vtdecode::sixel::{
    aspect_ratio_from_selector, get_sixel_size_from_pan_pad, CellSize, State, REPEAT_COUNT_MAXIMUM,
};
use vtdecode::*;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Select(u16),
    Define(u16, ColorType, u16, u16, u16),
    Run(SixelRun),
}

#[derive(Debug, Default)]
struct Recorder {
    events: Vec<Event>,
}

impl SixelSink for Recorder {
    fn on_color_select(&mut self, index: u16) {
        self.events.push(Event::Select(index));
    }

    fn on_color_define(&mut self, index: u16, color_type: ColorType, v1: u16, v2: u16, v3: u16) {
        self.events.push(Event::Define(index, color_type, v1, v2, v3));
    }

    fn on_sixel_run(&mut self, run: SixelRun) {
        self.events.push(Event::Run(run));
    }
}

fn record(input: &[u8]) -> (SixelDecoder, Vec<Event>) {
    let mut decoder = SixelDecoder::new();
    let mut recorder = Recorder::default();
    for &byte in input {
        decoder.feed_byte(byte, &mut recorder);
    }
    (decoder, recorder.events)
}

fn run_at(raw: u8, repeat: u16, x: u32, y: u32) -> Event {
    Event::Run(SixelRun { raw, repeat, x, y })
}

/// Every painted column as `(x, y, pattern)`.
fn painted_columns(events: &[Event]) -> Vec<(u32, u32, u8)> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Run(run) => Some(*run),
            _ => None,
        })
        .flat_map(|run| (0..run.columns()).map(move |dx| (run.x + dx, run.y, run.bits().pattern())))
        .collect()
}

#[test]
fn test_sixel_bits() {
    let full = get_sixel_bits(0x7E);
    assert!(full.is_full());
    assert!((0..6).all(|row| full.get(row)));
    assert_eq!(full.count(), 6);

    let empty = get_sixel_bits(0x3F);
    assert!(empty.is_empty());
    assert!((0..6).all(|row| !empty.get(row)));

    // '@' is the top pixel only, '_' the bottom one
    assert_eq!(get_sixel_bits(b'@').rows().collect::<Vec<_>>(), vec![0]);
    assert_eq!(get_sixel_bits(b'_').rows().collect::<Vec<_>>(), vec![5]);
    assert!(get_sixel_bits(b' ').is_empty());
    assert!(!full.get(6));
}

#[test]
fn test_repeat_matches_individual_bytes() {
    let (repeated, repeated_events) = record(b"!3~");
    let (single, single_events) = record(b"~~~~");

    assert_eq!(repeated_events, vec![run_at(b'~', 3, 0, 0)]);
    assert_eq!(painted_columns(&repeated_events), painted_columns(&single_events));
    assert_eq!(repeated.cursor(), single.cursor());
    assert_eq!(repeated.cursor(), (4, 0));
}

#[test]
fn test_repeat_without_digits_paints_once() {
    let (decoder, events) = record(b"!~");
    assert_eq!(events, vec![run_at(b'~', 0, 0, 0)]);
    assert_eq!(decoder.cursor(), (1, 0));
}

#[test]
fn test_repeat_count_is_clamped() {
    let (_, events) = record(b"!5000~!99999999@");
    assert_eq!(
        events,
        vec![
            run_at(b'~', REPEAT_COUNT_MAXIMUM, 0, 0),
            run_at(b'@', REPEAT_COUNT_MAXIMUM, u32::from(REPEAT_COUNT_MAXIMUM) + 1, 0),
        ]
    );
}

#[test]
fn test_repeat_interrupted_by_command() {
    // the repeat is dropped and '#' is read as a command
    let (_, events) = record(b"!3#2~");
    assert_eq!(events, vec![Event::Select(2), run_at(b'~', 0, 0, 0)]);
}

#[test]
fn test_repeat_states() {
    let mut decoder = SixelDecoder::new();
    let mut sink = ();
    decoder.feed_byte(b'!', &mut sink);
    assert_eq!(decoder.state(), State::RepeatBegin);
    decoder.feed_byte(b'1', &mut sink);
    assert_eq!(decoder.state(), State::RepeatReadCount);
    decoder.feed_byte(b'2', &mut sink);
    assert_eq!(decoder.state(), State::RepeatReadCount);
    decoder.feed_byte(b'~', &mut sink);
    assert_eq!(decoder.state(), State::RepeatApply);
    assert_eq!(decoder.cursor(), (13, 0));
}

#[test]
fn test_color_select_and_define() {
    let (_, events) = record(b"#3~#1;2;100;50;0~");
    assert_eq!(
        events,
        vec![
            Event::Select(3),
            run_at(b'~', 0, 0, 0),
            Event::Define(1, ColorType::Rgb, 100, 50, 0),
            Event::Select(1),
            run_at(b'~', 0, 1, 0),
        ]
    );
}

#[test]
fn test_color_components_are_clamped() {
    let (_, events) = record(b"#1;1;400;120;50#2;2;101;0;70000#");
    assert_eq!(
        events,
        vec![
            Event::Define(1, ColorType::Hls, 360, 100, 50),
            Event::Select(1),
            Event::Define(2, ColorType::Rgb, 100, 0, 100),
            Event::Select(2),
        ]
    );
}

#[test]
fn test_color_edge_cases() {
    // unknown color space: select only
    let (_, events) = record(b"#4;7;1;2;3~");
    assert_eq!(events[0], Event::Select(4));
    assert_eq!(events.len(), 2);

    // missing components default to zero, index above 255 is passed through
    let (_, events) = record(b"#300;2;10~");
    assert_eq!(events[0], Event::Define(300, ColorType::Rgb, 10, 0, 0));

    // an index that overflows drops the command entirely
    let (_, events) = record(b"#70000;2;1;2;3~");
    assert_eq!(events, vec![run_at(b'~', 0, 0, 0)]);
}

#[test]
fn test_color_states() {
    let mut decoder = SixelDecoder::new();
    let mut sink = ();
    decoder.feed_byte(b'#', &mut sink);
    assert_eq!(decoder.state(), State::SetColorInitParams);
    decoder.feed_byte(b'1', &mut sink);
    assert_eq!(decoder.state(), State::SetColorDecodeParams);
    decoder.feed_byte(b'~', &mut sink);
    // the terminator is re-read as a command once the color is applied
    assert_eq!(decoder.state(), State::SetPixels);
}

#[test]
fn test_raster_attributes() {
    let (decoder, events) = record(b"\"1;1;20;12~");
    assert_eq!(events, vec![run_at(b'~', 0, 0, 0)]);
    assert!(decoder.have_set_raster_attributes());
    assert_eq!(decoder.aspect_ratio(), (1, 1));
    assert_eq!(decoder.suggested_size(), (20, 12));
    assert_eq!(decoder.image_size(), (20, 12));
    assert_eq!(decoder.get_sixel_size(), CellSize { width: 1, height: 1 });
}

#[test]
fn test_partial_raster_attributes_fall_back_to_cursor() {
    let (decoder, _) = record(b"\"3;1~~");
    assert_eq!(decoder.aspect_ratio(), (3, 1));
    assert_eq!(decoder.suggested_size(), (0, 0));
    assert_eq!(decoder.image_size(), (2, 6));
    assert_eq!(decoder.get_sixel_size(), CellSize { width: 1, height: 3 });

    let (decoder, _) = record(b"\"1;1;0;30~~~");
    assert_eq!(decoder.image_size(), (3, 30));
}

#[test]
fn test_raster_states() {
    let mut decoder = SixelDecoder::new();
    let mut sink = ();
    decoder.feed_byte(b'"', &mut sink);
    assert_eq!(decoder.state(), State::RasterAttrsInitParams);
    decoder.feed_byte(b'1', &mut sink);
    assert_eq!(decoder.state(), State::RasterAttrsDecodeParams);
    // line breaks inside the list are skipped
    decoder.feed_byte(b'\n', &mut sink);
    assert_eq!(decoder.state(), State::RasterAttrsDecodeParams);
    assert!(!decoder.have_set_raster_attributes());
    decoder.feed_byte(b'$', &mut sink);
    assert_eq!(decoder.state(), State::CarriageReturn);
    assert!(decoder.have_set_raster_attributes());
}

#[test]
fn test_cursor_motion() {
    let (decoder, events) = record(b"~~$~-~");
    assert_eq!(
        events,
        vec![
            run_at(b'~', 0, 0, 0),
            run_at(b'~', 0, 1, 0),
            run_at(b'~', 0, 0, 0),
            run_at(b'~', 0, 0, 1)
        ]
    );
    assert_eq!(decoder.cursor(), (1, 1));
    assert_eq!(decoder.cursor_max(), (2, 1));
    assert_eq!(decoder.painted_max_y(), Some(1));
    assert_eq!(decoder.image_size(), (2, 12));
}

#[test]
fn test_trailing_line_feed_adds_no_rows() {
    for input in [&b"~~-"[..], b"~~$-", b"~~-$-"] {
        let (decoder, _) = record(input);
        assert!(decoder.cursor_max().1 >= 1);
        assert_eq!(decoder.painted_max_y(), Some(0));
        assert_eq!(decoder.image_size(), (2, 6), "input {input:?}");
    }

    // a band of empty sixels does not count as painted
    let (decoder, _) = record(b"~~-??");
    assert_eq!(decoder.image_size(), (2, 6));

    // only motion: nothing to size
    let (decoder, _) = record(b"--");
    assert_eq!(decoder.cursor_max(), (0, 2));
    assert_eq!(decoder.image_size(), (0, 0));
}

#[test]
fn test_line_breaks_inside_commands_are_skipped() {
    let (_, events) = record(b"!3\n~!\r\n2@");
    assert_eq!(events, vec![run_at(b'~', 3, 0, 0), run_at(b'@', 2, 4, 0)]);

    let (_, events) = record(b"#1;2;\n100;0;0\r\n~");
    assert_eq!(
        events,
        vec![
            Event::Define(1, ColorType::Rgb, 100, 0, 0),
            Event::Select(1),
            run_at(b'~', 0, 0, 0)
        ]
    );

    let (decoder, _) = record(b"\"1;1;\n8;\n12~");
    assert_eq!(decoder.suggested_size(), (8, 12));
}

#[test]
fn test_motion_states() {
    let mut decoder = SixelDecoder::new();
    let mut sink = ();
    assert_eq!(decoder.state(), State::Initial);
    decoder.feed_byte(b'~', &mut sink);
    assert_eq!(decoder.state(), State::SetPixels);
    decoder.feed_byte(b'-', &mut sink);
    assert_eq!(decoder.state(), State::CarriageReturnLineFeed);
    decoder.feed_byte(b'~', &mut sink);
    decoder.feed_byte(b'$', &mut sink);
    assert_eq!(decoder.state(), State::CarriageReturn);
    decoder.feed_byte(b'-', &mut sink);
    assert_eq!(decoder.state(), State::LineFeed);
    assert_eq!(decoder.cursor(), (0, 2));
}

#[test]
fn test_malformed_bytes_are_skipped() {
    let (decoder, events) = record(b"~%\x01&\r\n ~");
    assert_eq!(events, vec![run_at(b'~', 0, 0, 0), run_at(b'~', 0, 1, 0)]);
    assert_eq!(decoder.state(), State::SetPixels);

    let (decoder, events) = record(b"~%");
    assert_eq!(events.len(), 1);
    assert_eq!(decoder.state(), State::ExpectCommand);
}

#[test]
fn test_empty_stream_has_no_size() {
    let (decoder, events) = record(b"");
    assert!(events.is_empty());
    assert_eq!(decoder.image_size(), (0, 0));
}

#[test]
fn test_callbacks() {
    let mut selected = Vec::new();
    let mut defined = Vec::new();
    let mut runs = Vec::new();
    {
        let mut callbacks = Callbacks::new();
        callbacks
            .set_color_chooser(|index| selected.push(index))
            .set_color_creator(|index, color_type, v1, v2, v3| {
                defined.push((index, color_type, v1, v2, v3))
            })
            .set_sixel_handler(|raw, repeat| runs.push((raw, repeat)));

        let mut decoder = SixelDecoder::new();
        decoder.feed(b"#0;2;0;0;100!2N#0?", &mut callbacks);
    }
    assert_eq!(selected, vec![0, 0]);
    assert_eq!(defined, vec![(0, ColorType::Rgb, 0, 0, 100)]);
    assert_eq!(runs, vec![(b'N', 2), (b'?', 0)]);
}

#[test]
fn test_reset_restores_initial_state() {
    let mut decoder = SixelDecoder::with_aspect_ratio(5, 1);
    let mut sink = ();
    decoder.feed(b"\"1;1;40;40~~-!7~#1;2", &mut sink);
    assert_eq!(decoder.state(), State::SetColorDecodeParams);

    decoder.reset();
    assert_eq!(decoder.state(), State::Initial);
    assert_eq!(decoder.cursor(), (0, 0));
    assert_eq!(decoder.cursor_max(), (0, 0));
    assert_eq!(decoder.aspect_ratio(), (5, 1));
    assert_eq!(decoder.suggested_size(), (0, 0));
    assert_eq!(decoder.repetition(), (0, 0));
    assert!(!decoder.have_set_raster_attributes());
    assert!(decoder.parameters().is_empty());
    assert_eq!(decoder.image_size(), (0, 0));

    decoder.reset();
    assert_eq!(decoder.state(), State::Initial);

    // decoding starts over cleanly
    let mut recorder = Recorder::default();
    decoder.feed(b"~", &mut recorder);
    assert_eq!(recorder.events, vec![run_at(b'~', 0, 0, 0)]);
}

#[test]
fn test_sixel_size_from_pan_pad() {
    assert_eq!(get_sixel_size_from_pan_pad(2, 1), CellSize { width: 1, height: 2 });
    assert_eq!(get_sixel_size_from_pan_pad(1, 2), CellSize { width: 2, height: 1 });
    assert_eq!(get_sixel_size_from_pan_pad(5, 2), CellSize { width: 1, height: 3 });
    assert_eq!(get_sixel_size_from_pan_pad(0, 0), CellSize { width: 1, height: 1 });
    assert_eq!(SixelDecoder::new().get_sixel_size(), CellSize { width: 1, height: 2 });
}

#[test]
fn test_aspect_ratio_selector() {
    assert_eq!(aspect_ratio_from_selector(None), (2, 1));
    assert_eq!(aspect_ratio_from_selector(Some(0)), (2, 1));
    assert_eq!(aspect_ratio_from_selector(Some(2)), (5, 1));
    assert_eq!(aspect_ratio_from_selector(Some(4)), (3, 1));
    assert_eq!(aspect_ratio_from_selector(Some(6)), (2, 1));
    assert_eq!(aspect_ratio_from_selector(Some(9)), (1, 1));
    assert_eq!(aspect_ratio_from_selector(Some(42)), (2, 1));
}

#[test]
fn test_state_names() {
    assert_eq!(State::ExpectCommand.to_string(), "root");
    assert_eq!(State::RepeatExpectCharacter.name(), "rxch");
}
