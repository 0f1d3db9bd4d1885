#![no_main]

use libfuzzer_sys::fuzz_target;
use tidemark_core::decode_chunk;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as a chunk body. The decoder should only return
    // Ok or Err — never panic or loop:
    // - Corrupt delta/zigzag varints
    // - Zero-length RLE runs
    // - Value length codes out of range
    // - Truncated columns
    for n in [0u32, 1, 2, 100, 4096] {
        let _ = decode_chunk(data, n);
    }
});
