#![no_main]

use libfuzzer_sys::fuzz_target;
use tidemark_core::framed::FramedReader;
use tidemark_core::stream::StreamReader;

fuzz_target!(|data: &[u8]| {
    // Feed arbitrary bytes to both stream decoders. They must handle all
    // malformed input gracefully:
    // - Truncated frames and varints
    // - Control bytes with missing terminator bits
    // - Overlong varint encodings
    if let Ok(mut reader) = FramedReader::new(data) {
        while reader.next().is_ok() {}
    }

    let mut reader = StreamReader::new(data);
    while reader.next().is_ok() {}
});
