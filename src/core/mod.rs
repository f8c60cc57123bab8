pub mod block;
pub mod compress;
pub mod postings;
pub mod skip;

use smallvec::SmallVec;

/// Dewey-style node address, root component first. Most paths are shallow,
/// so they live inline.
pub type NodePath = SmallVec<[u32; 8]>;

pub use block::{BlockReader, InputIndex, OutputIndex};
pub use compress::{BlockCompressor, BlockDecompressor, Compressor, CompressorKind, Decompressor};
pub use postings::{
    DocMapping, PostingsConfig, PostingsIterator, PostingsReader, PostingsWriter, TermState,
};
pub use skip::{SkipListReader, SkipListWriter, SkipResult};
