//! Adaptive frame-of-reference strategy. Input is cut into frames of 32, 16
//! or 8 integers; each frame stores its values bit-packed at the width of the
//! largest value it covers, behind one selector byte. The partition is chosen
//! per block to minimize the encoded byte count. The final frame is padded
//! with zeros, so decoding can yield more integers than were compressed;
//! readers truncate to the block length from the header.

use crate::common::errors::CompressError;
use crate::core::compress::afor_frames::{
    bits_required, pack_frame, selector_for, FRAME_DECODERS, FRAME_LENGTHS, FRAME_SIZES,
    MAX_FRAME_SIZE, NUM_SELECTORS,
};
use crate::core::compress::{BlockCompressor, BlockDecompressor};

const CHUNK: usize = 8;

#[derive(Debug, Clone, Copy, Default)]
pub struct AForBlockCompressor;

impl BlockCompressor for AForBlockCompressor {
    fn window_size(&self) -> usize {
        MAX_FRAME_SIZE
    }

    fn max_compressed_size(&self, n: usize) -> usize {
        // An all-8-frame partition costs at most 1 + 32 bytes per started
        // chunk, and the chosen partition never costs more than that.
        n.div_ceil(CHUNK) * 33
    }

    fn compress(&self, input: &[u32], output: &mut Vec<u8>) -> Result<(), CompressError> {
        output.clear();
        if input.is_empty() {
            return Ok(());
        }

        let chunks = input.len().div_ceil(CHUNK);
        let mut chunk_width = vec![0usize; chunks];
        for (i, value) in input.iter().enumerate() {
            let w = bits_required(*value);
            if w > chunk_width[i / CHUNK] {
                chunk_width[i / CHUNK] = w;
            }
        }

        // Minimal-cost partition into 8/16/32-integer frames, computed over
        // 8-integer chunks from the back.
        let mut cost = vec![0usize; chunks + 1];
        let mut choice = vec![1usize; chunks];
        for c in (0..chunks).rev() {
            cost[c] = 1 + chunk_width[c] + cost[c + 1];
            choice[c] = 1;
            if c + 2 <= chunks {
                let w = chunk_width[c].max(chunk_width[c + 1]);
                let candidate = 1 + 2 * w + cost[c + 2];
                if candidate < cost[c] {
                    cost[c] = candidate;
                    choice[c] = 2;
                }
            }
            if c + 4 <= chunks {
                let w = chunk_width[c..c + 4].iter().copied().max().unwrap_or(0);
                let candidate = 1 + 4 * w + cost[c + 4];
                if candidate < cost[c] {
                    cost[c] = candidate;
                    choice[c] = 4;
                }
            }
        }

        let mut frame = [0u32; MAX_FRAME_SIZE];
        let mut c = 0;
        while c < chunks {
            let span = choice[c];
            let frame_size = span * CHUNK;
            let width = chunk_width[c..c + span].iter().copied().max().unwrap_or(0);
            let start = c * CHUNK;
            let end = (start + frame_size).min(input.len());
            frame[..end - start].copy_from_slice(&input[start..end]);
            frame[end - start..frame_size].fill(0);
            output.push(selector_for(frame_size, width));
            pack_frame(&frame[..frame_size], width, output);
            c += span;
        }

        if output.len() > self.max_compressed_size(input.len()) {
            return Err(CompressError::OutputOverflow(format!(
                "{} integers became {} bytes",
                input.len(),
                output.len()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AForBlockDecompressor;

impl BlockDecompressor for AForBlockDecompressor {
    fn window_size(&self) -> usize {
        MAX_FRAME_SIZE
    }

    fn decompress(&self, input: &[u8], output: &mut Vec<u32>) -> Result<(), CompressError> {
        output.clear();
        let mut cursor = input;
        while let Some((&selector, payload)) = cursor.split_first() {
            let selector = selector as usize;
            if selector >= NUM_SELECTORS {
                return Err(CompressError::UnknownSelector(selector as u8));
            }
            let length = FRAME_LENGTHS[selector];
            if payload.len() < length {
                return Err(CompressError::TruncatedPayload(format!(
                    "frame selector {selector} needs {length} bytes, {} left",
                    payload.len()
                )));
            }
            FRAME_DECODERS[selector](&payload[..length], output);
            cursor = &payload[length..];
        }
        Ok(())
    }

    /// Drops whole frames only; stops at the first frame that would overshoot
    /// `n` or that cannot be parsed.
    fn skip(&self, input: &mut &[u8], n: usize) -> usize {
        let mut skipped = 0;
        while let Some((&selector, payload)) = input.split_first() {
            let selector = selector as usize;
            if selector >= NUM_SELECTORS {
                break;
            }
            let size = FRAME_SIZES[selector];
            let length = FRAME_LENGTHS[selector];
            if skipped + size > n || payload.len() < length {
                break;
            }
            *input = &payload[length..];
            skipped += size;
        }
        skipped
    }
}
