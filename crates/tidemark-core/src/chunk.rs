//! Column-oriented chunk (de)serialization.
//!
//! A chunk is three equal-length columns describing one row each:
//! timestamp, series identifier, value. On disk the columns are laid out
//! back to back inside the range the [`ChunkWriter`] hands out:
//!
//! ```text
//! ┌────────────────────────────┬──────────────────────┬─────────────────┐
//! │ timestamps                 │ series ids           │ values          │
//! │ delta → zigzag → varint    │ RLE pairs as varints │ nibble-coded    │
//! │                            │ (terminator incl.)   │ XOR payloads    │
//! └────────────────────────────┴──────────────────────┴─────────────────┘
//! ```
//!
//! The element count and the first/last timestamp travel out-of-band (the
//! summary returned by [`encode_chunk`]); the bytes do not self-describe
//! their length.
//!
//! ## Value column
//!
//! Each value's raw bits are XORed with the previous value's bits
//! (starting from zero). Two 4-bit length codes share one prefix byte;
//! each code is the significant-byte count of the next XOR (0 = value
//! repeated, 8 = full width), and the payloads follow low-byte first.
//! Round-trips are bit-exact for every IEEE-754 double, including ±0,
//! NaN payloads, and subnormals.
//!
//! ## Row orderings
//!
//! *Chunk order* sorts rows by `(series id, timestamp)` and produces the
//! long id runs RLE wants; *time order* sorts by `(timestamp, series id)`.
//! The conversions are stable, so rows with equal keys keep their
//! relative order.

use crate::error::{Error, Result};
use crate::stream::{StreamReader, StreamWriter};
use crate::transform::{
    DeltaReader, DeltaWriter, RleReader, RleWriter, UintReader, UintWriter, ZigZagReader,
    ZigZagWriter,
};

/// Three equal-length columns; index `i` across them is one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UncompressedChunk {
    pub timestamps: Vec<u64>,
    pub paramids: Vec<u64>,
    pub values: Vec<f64>,
}

impl UncompressedChunk {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            timestamps: Vec::with_capacity(n),
            paramids: Vec::with_capacity(n),
            values: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    fn columns_aligned(&self) -> bool {
        self.timestamps.len() == self.paramids.len() && self.timestamps.len() == self.values.len()
    }
}

/// Destination for one encoded chunk: hand out a scratch range, then be
/// told how much of it was used.
pub trait ChunkWriter {
    /// Borrow the scratch range for the next chunk.
    fn allocate(&mut self) -> Result<&mut [u8]>;

    /// Accept the first `bytes_written` bytes of the allocated range.
    fn commit(&mut self, bytes_written: usize) -> Result<()>;
}

/// Out-of-band description of an encoded chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSummary {
    pub n_elements: u32,
    pub ts_begin: u64,
    pub ts_end: u64,
}

/// Encode `chunk` into the range provided by `writer`.
///
/// Fails with `OutOfBounds` when the encoded form does not fit the
/// allocated range, and with `BadData` when the columns are misaligned or
/// the chunk is empty.
pub fn encode_chunk(writer: &mut dyn ChunkWriter, chunk: &UncompressedChunk) -> Result<ChunkSummary> {
    if !chunk.columns_aligned() {
        return Err(Error::BadData("chunk columns have unequal lengths".to_string()));
    }
    if chunk.is_empty() {
        return Err(Error::BadData("empty chunk".to_string()));
    }

    let range = writer.allocate()?;
    let mut stream = StreamWriter::new(range);

    {
        let mut ts = DeltaWriter::new(ZigZagWriter::new(&mut stream));
        for &t in &chunk.timestamps {
            ts.put(t)?;
        }
        ts.commit()?;
    }
    {
        let mut ids = RleWriter::new(&mut stream);
        for &id in &chunk.paramids {
            ids.put(id)?;
        }
        ids.commit()?;
    }
    compress_doubles(&mut stream, &chunk.values)?;

    let bytes_written = stream.size();
    writer.commit(bytes_written)?;

    Ok(ChunkSummary {
        n_elements: chunk.len() as u32,
        ts_begin: chunk.timestamps[0],
        ts_end: chunk.timestamps[chunk.len() - 1],
    })
}

/// Decode `n_elements` rows from `bytes`, reversing [`encode_chunk`].
pub fn decode_chunk(bytes: &[u8], n_elements: u32) -> Result<UncompressedChunk> {
    let n = n_elements as usize;
    let mut chunk = UncompressedChunk::with_capacity(n);
    let mut reader = StreamReader::new(bytes);

    {
        let mut ts = DeltaReader::new(ZigZagReader::new(&mut reader));
        for _ in 0..n {
            chunk.timestamps.push(ts.next()?);
        }
    }
    {
        let mut ids = RleReader::new(&mut reader);
        for _ in 0..n {
            chunk.paramids.push(ids.next()?);
        }
    }
    decompress_doubles(&mut reader, n, &mut chunk.values)?;

    Ok(chunk)
}

fn significant_bytes(x: u64) -> u8 {
    ((64 - x.leading_zeros() as usize).div_ceil(8)) as u8
}

/// Write the value column: paired 4-bit length codes plus XOR payloads.
///
/// Returns the number of bytes the column occupies.
pub fn compress_doubles(stream: &mut StreamWriter<'_>, values: &[f64]) -> Result<usize> {
    let start = stream.size();
    let mut prev = 0u64;
    let mut ix = 0;
    while ix < values.len() {
        let first = values[ix].to_bits() ^ prev;
        prev = values[ix].to_bits();
        let len_first = significant_bytes(first);

        let (second, len_second) = if ix + 1 < values.len() {
            let bits = values[ix + 1].to_bits();
            let xor = bits ^ prev;
            prev = bits;
            (xor, significant_bytes(xor))
        } else {
            (0, 0)
        };

        stream.put_raw_u8(len_first | (len_second << 4))?;
        for shift in 0..len_first {
            stream.put_raw_u8((first >> (8 * shift as u32)) as u8)?;
        }
        for shift in 0..len_second {
            stream.put_raw_u8((second >> (8 * shift as u32)) as u8)?;
        }
        ix += 2;
    }
    Ok(stream.size() - start)
}

/// Read `n` values written by [`compress_doubles`].
pub fn decompress_doubles(
    reader: &mut StreamReader<'_>,
    n: usize,
    output: &mut Vec<f64>,
) -> Result<()> {
    let mut prev = 0u64;
    let mut read = 0;
    while read < n {
        let codes = reader.read_raw_u8()?;
        for len in [codes & 0x0F, codes >> 4] {
            if read == n {
                break;
            }
            if len > 8 {
                return Err(Error::BadData(format!("value length code {} out of range", len)));
            }
            let mut xor = 0u64;
            for shift in 0..len {
                xor |= (reader.read_raw_u8()? as u64) << (8 * shift as u32);
            }
            prev ^= xor;
            output.push(f64::from_bits(prev));
            read += 1;
        }
    }
    Ok(())
}

fn reorder(chunk: &UncompressedChunk, order: &[usize]) -> UncompressedChunk {
    let mut out = UncompressedChunk::with_capacity(chunk.len());
    for &ix in order {
        out.timestamps.push(chunk.timestamps[ix]);
        out.paramids.push(chunk.paramids[ix]);
        out.values.push(chunk.values[ix]);
    }
    out
}

/// Re-sort a chunk-ordered chunk into time order `(timestamp, series id)`.
///
/// Stable: rows with equal keys keep their relative order. Fails only
/// when the column lengths disagree.
pub fn convert_from_chunk_order(chunk: &UncompressedChunk) -> Result<UncompressedChunk> {
    if !chunk.columns_aligned() {
        return Err(Error::BadData("chunk columns have unequal lengths".to_string()));
    }
    let mut order: Vec<usize> = (0..chunk.len()).collect();
    order.sort_by_key(|&ix| (chunk.timestamps[ix], chunk.paramids[ix]));
    Ok(reorder(chunk, &order))
}

/// Re-sort a time-ordered chunk into chunk order `(series id, timestamp)`.
pub fn convert_from_time_order(chunk: &UncompressedChunk) -> Result<UncompressedChunk> {
    if !chunk.columns_aligned() {
        return Err(Error::BadData("chunk columns have unequal lengths".to_string()));
    }
    let mut order: Vec<usize> = (0..chunk.len()).collect();
    order.sort_by_key(|&ix| (chunk.paramids[ix], chunk.timestamps[ix]));
    Ok(reorder(chunk, &order))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Growable in-memory destination for tests.
    struct VecChunkWriter {
        buf: Vec<u8>,
        committed: usize,
    }

    impl VecChunkWriter {
        fn new(capacity: usize) -> Self {
            Self {
                buf: vec![0; capacity],
                committed: 0,
            }
        }

        fn bytes(&self) -> &[u8] {
            &self.buf[..self.committed]
        }
    }

    impl ChunkWriter for VecChunkWriter {
        fn allocate(&mut self) -> Result<&mut [u8]> {
            Ok(&mut self.buf)
        }

        fn commit(&mut self, bytes_written: usize) -> Result<()> {
            self.committed = bytes_written;
            Ok(())
        }
    }

    fn sample_chunk() -> UncompressedChunk {
        UncompressedChunk {
            timestamps: vec![100, 101, 102, 105, 105],
            paramids: vec![7, 7, 7, 9, 9],
            values: vec![1.5, 1.5, -2.25, 0.0, 1e300],
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let chunk = sample_chunk();
        let mut writer = VecChunkWriter::new(4096);
        let summary = encode_chunk(&mut writer, &chunk).unwrap();
        assert_eq!(summary.n_elements, 5);
        assert_eq!(summary.ts_begin, 100);
        assert_eq!(summary.ts_end, 105);

        let decoded = decode_chunk(writer.bytes(), summary.n_elements).unwrap();
        assert_eq!(decoded.timestamps, chunk.timestamps);
        assert_eq!(decoded.paramids, chunk.paramids);
        assert_eq!(decoded.values, chunk.values);
    }

    #[test]
    fn test_encode_rejects_misaligned_columns() {
        let mut chunk = sample_chunk();
        chunk.values.pop();
        let mut writer = VecChunkWriter::new(4096);
        assert!(matches!(
            encode_chunk(&mut writer, &chunk),
            Err(Error::BadData(_))
        ));
    }

    #[test]
    fn test_encode_rejects_empty_chunk() {
        let mut writer = VecChunkWriter::new(4096);
        assert!(encode_chunk(&mut writer, &UncompressedChunk::default()).is_err());
    }

    #[test]
    fn test_encode_does_not_fit() {
        let chunk = sample_chunk();
        let mut writer = VecChunkWriter::new(4);
        assert!(matches!(
            encode_chunk(&mut writer, &chunk),
            Err(Error::OutOfBounds(_))
        ));
    }

    #[test]
    fn test_decode_truncated_is_error() {
        let chunk = sample_chunk();
        let mut writer = VecChunkWriter::new(4096);
        let summary = encode_chunk(&mut writer, &chunk).unwrap();
        let bytes = writer.bytes();
        assert!(decode_chunk(&bytes[..bytes.len() - 1], summary.n_elements).is_err());
    }

    #[test]
    fn test_doubles_bit_exact_specials() {
        let specials = vec![
            0.0,
            -0.0,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::from_bits(0x7FF8_0000_0000_0001), // NaN with payload
            f64::from_bits(0xFFF0_0000_0000_0042), // another NaN payload
            f64::MIN_POSITIVE,
            f64::from_bits(1), // smallest subnormal
            f64::MAX,
            -1234.5678,
        ];
        let mut buf = vec![0u8; 256];
        let written = {
            let mut stream = StreamWriter::new(&mut buf);
            compress_doubles(&mut stream, &specials).unwrap();
            stream.size()
        };

        let mut reader = StreamReader::new(&buf[..written]);
        let mut out = Vec::new();
        decompress_doubles(&mut reader, specials.len(), &mut out).unwrap();
        let want: Vec<u64> = specials.iter().map(|v| v.to_bits()).collect();
        let got: Vec<u64> = out.iter().map(|v| v.to_bits()).collect();
        assert_eq!(got, want);
    }

    #[test]
    fn test_doubles_repeated_value_takes_no_payload() {
        let values = vec![42.0, 42.0];
        let mut buf = vec![0u8; 64];
        let written = {
            let mut stream = StreamWriter::new(&mut buf);
            compress_doubles(&mut stream, &values).unwrap();
            stream.size()
        };
        // One prefix byte, payload for the first value only; the repeat's
        // length code is zero.
        assert_eq!(written, 1 + significant_bytes(42.0f64.to_bits()) as usize);
        assert_eq!(buf[0] >> 4, 0);
    }

    #[test]
    fn test_doubles_odd_count() {
        let values = vec![1.0, 2.0, 3.0];
        let mut buf = vec![0u8; 64];
        let written = {
            let mut stream = StreamWriter::new(&mut buf);
            compress_doubles(&mut stream, &values).unwrap();
            stream.size()
        };
        let mut reader = StreamReader::new(&buf[..written]);
        let mut out = Vec::new();
        decompress_doubles(&mut reader, values.len(), &mut out).unwrap();
        assert_eq!(out, values);
        assert_eq!(reader.space_left(), 0);
    }

    #[test]
    fn test_decode_bad_length_code() {
        // Length code 9 is out of range.
        let bytes = [0x09u8, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let mut reader = StreamReader::new(&bytes);
        let mut out = Vec::new();
        assert!(matches!(
            decompress_doubles(&mut reader, 1, &mut out),
            Err(Error::BadData(_))
        ));
    }

    #[test]
    fn test_order_conversions_stable() {
        // Time-ordered input with a duplicate (timestamp, id) key: the
        // 0.2 / 0.25 rows must keep their relative order.
        let chunk = UncompressedChunk {
            timestamps: vec![10, 10, 10, 11, 12],
            paramids: vec![1, 2, 2, 1, 1],
            values: vec![0.1, 0.2, 0.25, 0.3, 0.5],
        };
        let chunk_order = convert_from_time_order(&chunk).unwrap();
        assert_eq!(chunk_order.paramids, vec![1, 1, 1, 2, 2]);
        assert_eq!(chunk_order.timestamps, vec![10, 11, 12, 10, 10]);
        assert_eq!(chunk_order.values, vec![0.1, 0.3, 0.5, 0.2, 0.25]);

        let back = convert_from_chunk_order(&chunk_order).unwrap();
        assert_eq!(back, chunk);
    }

    #[test]
    fn test_order_conversion_preserves_rows() {
        let chunk = sample_chunk();
        let time_order = convert_from_chunk_order(&chunk).unwrap();
        let mut original: Vec<_> = (0..chunk.len())
            .map(|i| (chunk.paramids[i], chunk.timestamps[i], chunk.values[i].to_bits()))
            .collect();
        let mut converted: Vec<_> = (0..time_order.len())
            .map(|i| {
                (
                    time_order.paramids[i],
                    time_order.timestamps[i],
                    time_order.values[i].to_bits(),
                )
            })
            .collect();
        original.sort_unstable();
        converted.sort_unstable();
        assert_eq!(original, converted);
    }
}
