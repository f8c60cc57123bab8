//! On-disk postings format for a tree-addressed inverted index.
//!
//! A term's occurrences are spread over three synchronized block streams
//! (documents, nodes within documents, and positions within nodes) plus a
//! multi-level skip list over the document blocks. Blocks are compressed
//! with a frame-based bit-packing codec and decoded lazily, so consumers
//! that only walk documents never pay for nodes or positions.
//!
//! [`PostingsWriter`] encodes one term at a time into the four stream files
//! of a segment; [`PostingsReader`] memory-maps them and hands out
//! independent enumerators.

pub mod common;
pub mod core;
pub mod directory;

/// Segment-local document identifier.
pub type DocId = u32;

/// Term position within one node.
pub type Position = u32;

pub use crate::common::errors::{BlockError, CompressError, PostingsError};
pub use crate::common::file_ops::FileOperationError;
pub use crate::core::{
    NodePath, PostingsConfig, PostingsIterator, PostingsReader, PostingsWriter, TermState,
};
