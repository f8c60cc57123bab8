//! Position stream: per block one compressed array of position deltas. The
//! delta baseline resets at every node, so the first position of a node is
//! stored raw. One position block holds the positions of the documents of
//! exactly one doc block.

use log::error;

use crate::common::errors::BlockError;
use crate::core::block::{BlockReader, BlockReaderCore};
use crate::core::compress::{
    BlockCompressor, BlockDecompressor, Compressor, CompressorKind, Decompressor,
};
use crate::directory::{IndexInput, IndexOutput};
use crate::Position;

pub struct PosBlockWriter {
    out: IndexOutput,
    compressor: Compressor,
    deltas: Vec<u32>,
    last_pos: Position,
    compressed: Vec<u8>,
}

impl PosBlockWriter {
    pub fn new(out: IndexOutput, kind: CompressorKind) -> PosBlockWriter {
        PosBlockWriter {
            out,
            compressor: kind.compressor(),
            deltas: Vec::new(),
            last_pos: 0,
            compressed: Vec::new(),
        }
    }

    pub fn file_pointer(&self) -> u64 {
        self.out.file_pointer()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Caller guarantees positions strictly increase within a node; see
    /// `PostingsWriter`.
    pub fn write_position(&mut self, pos: Position) {
        self.deltas.push(pos - self.last_pos);
        self.last_pos = pos;
    }

    /// Drops the delta baseline; called at every node change.
    pub fn reset_current_position(&mut self) {
        self.last_pos = 0;
    }

    pub fn flush(&mut self) -> Result<(), BlockError> {
        if self.is_empty() {
            return Ok(());
        }
        self.compressor.compress(&self.deltas, &mut self.compressed)?;
        self.out.write_vint(self.deltas.len() as u32)?;
        self.out.write_vint(self.compressed.len() as u32)?;
        self.out.write_bytes(&self.compressed)?;
        self.deltas.clear();
        self.last_pos = 0;
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), BlockError> {
        self.out.write_footer()?;
        self.out.flush()
    }
}

pub struct PosBlockReader {
    core: BlockReaderCore,
    decompressor: Decompressor,
    block_len: usize,
    compressed_len: usize,
    deltas: Vec<u32>,
    read: usize,
    base: usize,
    pending: bool,
    current_pos: Position,
    scratch: Vec<u8>,
}

impl PosBlockReader {
    pub fn new(input: IndexInput, kind: CompressorKind) -> PosBlockReader {
        PosBlockReader {
            core: BlockReaderCore::new(input),
            decompressor: kind.decompressor(),
            block_len: 0,
            compressed_len: 0,
            deltas: Vec::new(),
            read: 0,
            base: 0,
            pending: false,
            current_pos: 0,
            scratch: Vec::new(),
        }
    }

    pub fn seek(&mut self, fp: u64) -> bool {
        self.core.seek(fp)
    }

    /// Drops the delta baseline; called when decoding reaches a new node.
    pub fn reset_current_position(&mut self) {
        self.current_pos = 0;
    }

    pub fn next_position(&mut self) -> Result<Position, BlockError> {
        if self.pending {
            self.decode()?;
        }
        if self.read >= self.block_len {
            error!("position read past block of {} entries", self.block_len);
            return Err(BlockError::ExhaustedBlock(format!(
                "position read past block of {} entries",
                self.block_len
            )));
        }
        let pos = self.deltas[self.read - self.base] + self.current_pos;
        self.read += 1;
        self.current_pos = pos;
        Ok(pos)
    }

    /// Advances past `n` positions of nodes that were never visited. Whole
    /// compressed frames are dropped undecoded; the caller resets the delta
    /// baseline before the next `next_position`.
    pub fn skip_positions(&mut self, n: usize) -> Result<(), BlockError> {
        if n == 0 {
            return Ok(());
        }
        if self.read + n > self.block_len {
            error!(
                "position skip of {} past block of {} entries",
                n, self.block_len
            );
            return Err(BlockError::ExhaustedBlock(format!(
                "position skip of {n} past block of {} entries",
                self.block_len
            )));
        }
        if self.pending {
            self.core.input.read_into(&mut self.scratch, self.compressed_len)?;
            let mut cursor = self.scratch.as_slice();
            let skipped = self.decompressor.skip(&mut cursor, n);
            self.decompressor.decompress(cursor, &mut self.deltas)?;
            let logical_rest = self.block_len - skipped;
            if self.deltas.len() < logical_rest {
                return Err(short_payload(self.deltas.len() + skipped, self.block_len));
            }
            self.deltas.truncate(logical_rest);
            self.base = skipped;
            self.pending = false;
        }
        self.read += n;
        Ok(())
    }

    fn decode(&mut self) -> Result<(), BlockError> {
        self.core.input.read_into(&mut self.scratch, self.compressed_len)?;
        self.decompressor.decompress(&self.scratch, &mut self.deltas)?;
        if self.deltas.len() < self.block_len {
            return Err(short_payload(self.deltas.len(), self.block_len));
        }
        self.deltas.truncate(self.block_len);
        self.base = 0;
        self.pending = false;
        Ok(())
    }
}

impl BlockReader for PosBlockReader {
    fn core(&mut self) -> &mut BlockReaderCore {
        &mut self.core
    }

    fn init_block(&mut self) {
        self.block_len = 0;
        self.compressed_len = 0;
        self.read = 0;
        self.base = 0;
        self.pending = false;
        self.current_pos = 0;
    }

    fn read_header(&mut self) -> Result<(), BlockError> {
        self.block_len = self.core.input.read_vint()? as usize;
        self.compressed_len = self.core.input.read_vint()? as usize;
        self.pending = true;
        Ok(())
    }

    fn skip_payload(&mut self) -> Result<(), BlockError> {
        let remaining = if self.pending {
            self.compressed_len as u64
        } else {
            0
        };
        let fp = self.core.input.position() + remaining;
        self.core.advance_to(fp);
        Ok(())
    }

    fn is_exhausted(&self) -> bool {
        self.read >= self.block_len
    }
}

fn short_payload(got: usize, want: usize) -> BlockError {
    error!("position payload decoded to {} entries, block declares {}", got, want);
    BlockError::DataCorruption(format!(
        "position payload decoded to {got} entries, block declares {want}"
    ))
}
