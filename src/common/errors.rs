use std::{io, sync::Arc};

use thiserror::Error;

use crate::common::file_ops::FileOperationError;

/// Errors raised by the compression strategies.
///
/// `UnknownSelector` and `TruncatedPayload` mean the compressed bytes are
/// corrupt; `OutputOverflow` means an encoder bug (the compressed form grew
/// past `max_compressed_size`). All of them poison the stream they came from.
#[derive(Debug, Clone, Error)]
pub enum CompressError {
    #[error("Compressed output overflows its declared bound: '{0}'")]
    OutputOverflow(String),

    #[error("Unknown frame selector byte: {0}")]
    UnknownSelector(u8),

    #[error("Truncated compressed payload: '{0}'")]
    TruncatedPayload(String),
}

/// Errors of the block framing layer and the underlying files.
#[derive(Debug, Error)]
pub enum BlockError {
    /// IO Error.
    #[error("An IO error occurred: '{0}'")]
    IoError(Arc<io::Error>),

    #[error(transparent)]
    CompressError(#[from] CompressError),

    /// Data corruption.
    #[error("Data corrupted: '{0}'")]
    DataCorruption(String),

    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// A reader tried to decode past the declared length of the current block.
    #[error("Block exhausted: '{0}'")]
    ExhaustedBlock(String),
}

impl From<io::Error> for BlockError {
    fn from(io_err: io::Error) -> BlockError {
        BlockError::IoError(Arc::new(io_err))
    }
}

/// The crate's top-level error enum.
#[derive(Debug, Error)]
pub enum PostingsError {
    #[error(transparent)]
    BlockError(#[from] BlockError),

    /// The caller broke the encoding call protocol (out-of-order documents,
    /// non-monotonic node paths or positions, a document with no node, an
    /// empty term). The writer that raised it must be discarded.
    #[error("Encoding contract violated: '{0}'")]
    ContractViolation(String),

    #[error("Invalid postings configuration: '{0}'")]
    InvalidConfig(String),

    #[error("'{0:?}'")]
    FileOperationError(#[from] FileOperationError),
}

impl From<io::Error> for PostingsError {
    fn from(io_err: io::Error) -> PostingsError {
        PostingsError::BlockError(BlockError::from(io_err))
    }
}

impl From<CompressError> for PostingsError {
    fn from(e: CompressError) -> PostingsError {
        PostingsError::BlockError(BlockError::from(e))
    }
}
