use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};

use crate::common::errors::CompressError;

pub mod afor;
pub mod afor_frames;
pub mod vint;

pub use afor::{AForBlockCompressor, AForBlockDecompressor};
pub use vint::{VIntBlockCompressor, VIntBlockDecompressor};

/// One-shot block encoder for non-negative integers.
#[enum_dispatch]
pub trait BlockCompressor {
    /// Number of integers the strategy works on at a time. Callers size their
    /// buffers in multiples of this.
    fn window_size(&self) -> usize;

    /// Worst-case compressed byte length for `n` integers.
    fn max_compressed_size(&self, n: usize) -> usize;

    /// Compresses `input` into `output`, replacing its contents. The encoded
    /// form may decode to more integers than `input` holds when the strategy
    /// pads to its window; readers truncate to the length from the block
    /// header.
    fn compress(&self, input: &[u32], output: &mut Vec<u8>) -> Result<(), CompressError>;
}

#[enum_dispatch]
pub trait BlockDecompressor {
    fn window_size(&self) -> usize;

    /// Decompresses all of `input`, replacing the contents of `output`.
    fn decompress(&self, input: &[u8], output: &mut Vec<u32>) -> Result<(), CompressError>;

    /// Advances `input` past at most `n` integers without decoding them.
    /// Returns how many were skipped, which may be less than `n` when the
    /// strategy can only drop aligned groups; the caller decodes the rest and
    /// discards the difference.
    fn skip(&self, input: &mut &[u8], n: usize) -> usize;
}

#[enum_dispatch(BlockCompressor)]
#[derive(Debug, Clone, Copy)]
pub enum Compressor {
    VInt(VIntBlockCompressor),
    AFor(AForBlockCompressor),
}

#[enum_dispatch(BlockDecompressor)]
#[derive(Debug, Clone, Copy)]
pub enum Decompressor {
    VInt(VIntBlockDecompressor),
    AFor(AForBlockDecompressor),
}

/// Compression strategy selector, persisted in the postings configuration.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Default, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum CompressorKind {
    #[serde(rename = "vint")]
    VInt,

    #[default]
    #[serde(rename = "afor")]
    AFor,
}

impl CompressorKind {
    pub fn compressor(&self) -> Compressor {
        match self {
            CompressorKind::VInt => Compressor::VInt(VIntBlockCompressor),
            CompressorKind::AFor => Compressor::AFor(AForBlockCompressor),
        }
    }

    pub fn decompressor(&self) -> Decompressor {
        match self {
            CompressorKind::VInt => Decompressor::VInt(VIntBlockDecompressor),
            CompressorKind::AFor => Decompressor::AFor(AForBlockDecompressor),
        }
    }
}
