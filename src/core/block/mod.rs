//! Block framing shared by the three postings streams: file-position
//! bookmarks with absolute/delta serialization, and the reader-side block
//! cursor with its pending-seek protocol.

pub mod doc_block;
pub mod node_block;
pub mod pos_block;

use crate::common::errors::BlockError;
use crate::directory::{get_vlong, put_vlong, IndexInput};

/// Rounds `len` up to a whole number of compressor windows.
pub fn min_buffer_size(len: usize, window: usize) -> usize {
    len.div_ceil(window.max(1)).max(1) * window.max(1)
}

/// A bookmark into a stream being written. Serializing it emits either the
/// absolute position or the delta against the previous position this bookmark
/// serialized, so a sequence of bookmarks written delta-style stays small.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputIndex {
    fp: u64,
    last_fp: u64,
}

impl OutputIndex {
    pub fn new() -> OutputIndex {
        OutputIndex::default()
    }

    /// Re-bases the delta chain, e.g. at the start of a term.
    pub fn reset(&mut self, base: u64) {
        self.fp = base;
        self.last_fp = base;
    }

    /// Captures a stream position.
    pub fn mark(&mut self, fp: u64) {
        self.fp = fp;
    }

    pub fn copy_from(&mut self, other: &OutputIndex) {
        *self = *other;
    }

    pub fn file_pointer(&self) -> u64 {
        self.fp
    }

    pub fn write(&mut self, buf: &mut Vec<u8>, absolute: bool) {
        if absolute {
            put_vlong(buf, self.fp);
        } else {
            put_vlong(buf, self.fp - self.last_fp);
        }
        self.last_fp = self.fp;
    }
}

/// Reader-side counterpart of [`OutputIndex`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InputIndex {
    fp: u64,
}

impl InputIndex {
    pub fn new() -> InputIndex {
        InputIndex::default()
    }

    pub fn read(&mut self, bytes: &mut &[u8], absolute: bool) -> Result<(), BlockError> {
        let value = get_vlong(bytes)?;
        self.fp = if absolute { value } else { self.fp + value };
        Ok(())
    }

    pub fn file_pointer(&self) -> u64 {
        self.fp
    }
}

/// Cursor state every block reader embeds: its own clone of the stream and
/// the pending-seek bookkeeping. A requested seek is only applied when the
/// next block is actually loaded, so repositioning a reader that is never
/// read again costs nothing.
#[derive(Clone)]
pub struct BlockReaderCore {
    pub input: IndexInput,
    seek_pending: bool,
    pending_fp: u64,
    last_block_fp: Option<u64>,
}

impl BlockReaderCore {
    pub fn new(input: IndexInput) -> BlockReaderCore {
        BlockReaderCore {
            input,
            seek_pending: false,
            pending_fp: 0,
            last_block_fp: None,
        }
    }

    /// Requests repositioning to the block starting at `fp`. Returns false if
    /// that block is the one currently loaded, in which case no new block
    /// needs to be decoded.
    pub fn seek(&mut self, fp: u64) -> bool {
        if !self.seek_pending && self.last_block_fp == Some(fp) {
            return false;
        }
        self.seek_pending = true;
        self.pending_fp = fp;
        true
    }

    /// Schedules the cursor to continue at `fp`, without the loaded-block
    /// check. Used to jump over unread payload of the current block.
    pub fn advance_to(&mut self, fp: u64) {
        self.seek_pending = true;
        self.pending_fp = fp;
    }

    pub fn seek_pending(&self) -> bool {
        self.seek_pending
    }

    fn apply_pending_seek(&mut self) -> Result<(), BlockError> {
        if self.seek_pending {
            self.seek_pending = false;
            self.input.seek(self.pending_fp)?;
        }
        Ok(())
    }
}

/// A reader over one stream of length-prefixed compressed blocks.
pub trait BlockReader {
    fn core(&mut self) -> &mut BlockReaderCore;

    /// Resets all decode state for a fresh block.
    fn init_block(&mut self);

    fn read_header(&mut self) -> Result<(), BlockError>;

    /// Schedules a jump over the payload bytes of the current block that were
    /// never decoded.
    fn skip_payload(&mut self) -> Result<(), BlockError>;

    fn is_exhausted(&self) -> bool;

    /// Advances to the next block: leftover payload of the current block is
    /// jumped over unless a seek is pending, then the header of the new block
    /// is decoded. Payload decoding stays lazy.
    fn next_block(&mut self) -> Result<(), BlockError> {
        if !self.core().seek_pending() {
            self.skip_payload()?;
        }
        self.core().apply_pending_seek()?;
        let fp = self.core().input.position();
        self.core().last_block_fp = Some(fp);
        self.init_block();
        self.read_header()
    }
}
