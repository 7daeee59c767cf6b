#![no_main]

use libfuzzer_sys::fuzz_target;
use vtdecode::sixel::SixelDecoder;
use vtdecode::sixel_decode;

fuzz_target!(|data: &[u8]| {
    // The decoder should never panic, regardless of input
    if let Ok(image) = sixel_decode(data) {
        assert_eq!(image.pixels.len(), image.width * image.height * 4);
    }

    // Feeding in two halves must match feeding in one go
    let split = data.len() / 2;
    let mut whole = SixelDecoder::new();
    whole.feed(data, &mut ());
    let mut halves = SixelDecoder::new();
    halves.feed(&data[..split], &mut ());
    halves.feed(&data[split..], &mut ());
    assert_eq!(whole.cursor(), halves.cursor());
    assert_eq!(whole.image_size(), halves.image_size());
});
