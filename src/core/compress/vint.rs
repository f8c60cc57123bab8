//! Variable-length-integer baseline strategy: no batching (window 1), one
//! 7-bit-group encoded integer after another. Slower and usually larger than
//! the frame codec, but trivially correct and useful as a reference point.

use crate::common::errors::CompressError;
use crate::core::compress::{BlockCompressor, BlockDecompressor};
use crate::directory::put_vint;

#[derive(Debug, Clone, Copy, Default)]
pub struct VIntBlockCompressor;

impl BlockCompressor for VIntBlockCompressor {
    fn window_size(&self) -> usize {
        1
    }

    fn max_compressed_size(&self, n: usize) -> usize {
        5 * n
    }

    fn compress(&self, input: &[u32], output: &mut Vec<u8>) -> Result<(), CompressError> {
        output.clear();
        for &value in input {
            put_vint(output, value);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VIntBlockDecompressor;

impl BlockDecompressor for VIntBlockDecompressor {
    fn window_size(&self) -> usize {
        1
    }

    fn decompress(&self, input: &[u8], output: &mut Vec<u32>) -> Result<(), CompressError> {
        output.clear();
        let mut cursor = input;
        while !cursor.is_empty() {
            output.push(read_one(&mut cursor)?);
        }
        Ok(())
    }

    fn skip(&self, input: &mut &[u8], n: usize) -> usize {
        let mut skipped = 0;
        let mut cursor = *input;
        while skipped < n {
            let Some(end) = cursor.iter().position(|b| b & 0x80 == 0) else {
                break;
            };
            cursor = &cursor[end + 1..];
            skipped += 1;
        }
        *input = cursor;
        skipped
    }
}

fn read_one(cursor: &mut &[u8]) -> Result<u32, CompressError> {
    let mut value = 0u32;
    let mut shift = 0u32;
    loop {
        let Some((&byte, rest)) = cursor.split_first() else {
            return Err(CompressError::TruncatedPayload(
                "vint cut off mid-value".to_string(),
            ));
        };
        *cursor = rest;
        if shift > 28 {
            return Err(CompressError::TruncatedPayload(
                "vint longer than 5 bytes".to_string(),
            ));
        }
        value |= ((byte & 0x7F) as u32) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

#[cfg(test)]
mod test {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn test_roundtrip() {
        let input = vec![0u32, 1, 127, 128, 300, 16384, u32::MAX];
        let mut compressed = Vec::new();
        VIntBlockCompressor.compress(&input, &mut compressed).unwrap();
        assert!(compressed.len() <= VIntBlockCompressor.max_compressed_size(input.len()));

        let mut decoded = Vec::new();
        VIntBlockDecompressor.decompress(&compressed, &mut decoded).unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn test_skip_is_exact() {
        let mut rng = StdRng::seed_from_u64(7);
        let input: Vec<u32> = (0..257).map(|_| rng.gen_range(0..1_000_000)).collect();
        let mut compressed = Vec::new();
        VIntBlockCompressor.compress(&input, &mut compressed).unwrap();

        for n in [0usize, 1, 37, 256, 257, 400] {
            let mut cursor = compressed.as_slice();
            let skipped = VIntBlockDecompressor.skip(&mut cursor, n);
            assert_eq!(skipped, n.min(input.len()));
            let mut rest = Vec::new();
            VIntBlockDecompressor.decompress(cursor, &mut rest).unwrap();
            assert_eq!(rest, input[skipped..]);
        }
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let input = vec![100_000u32];
        let mut compressed = Vec::new();
        VIntBlockCompressor.compress(&input, &mut compressed).unwrap();
        let mut decoded = Vec::new();
        let err = VIntBlockDecompressor
            .decompress(&compressed[..compressed.len() - 1], &mut decoded)
            .unwrap_err();
        assert!(matches!(err, CompressError::TruncatedPayload(_)));
    }
}
