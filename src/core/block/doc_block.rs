//! Document stream: per doc-block, the compressed document deltas and the
//! per-document node frequencies, behind a header that also carries the file
//! positions of the node and position blocks flushed in lockstep with it.
//!
//! Blocks are self-contained: the first entry stores `doc + 1`, later entries
//! the strictly positive delta to the previous document. A reader repositioned
//! at any block boundary can therefore decode it with no carried state.

use log::error;

use crate::common::errors::BlockError;
use crate::core::block::{min_buffer_size, BlockReader, BlockReaderCore};
use crate::core::compress::{
    BlockCompressor, BlockDecompressor, Compressor, CompressorKind, Decompressor,
};
use crate::directory::{IndexInput, IndexOutput};
use crate::DocId;

pub struct DocBlockWriter {
    out: IndexOutput,
    compressor: Compressor,
    max_block_size: usize,
    doc_deltas: Vec<u32>,
    node_freqs: Vec<u32>,
    first_doc: Option<DocId>,
    last_doc: DocId,
    compressed_docs: Vec<u8>,
    compressed_freqs: Vec<u8>,
}

impl DocBlockWriter {
    pub fn new(out: IndexOutput, kind: CompressorKind, max_block_size: usize) -> DocBlockWriter {
        let compressor = kind.compressor();
        let capacity = min_buffer_size(max_block_size, compressor.window_size());
        DocBlockWriter {
            out,
            compressor,
            max_block_size,
            doc_deltas: Vec::with_capacity(capacity),
            node_freqs: Vec::with_capacity(capacity),
            first_doc: None,
            last_doc: 0,
            compressed_docs: Vec::new(),
            compressed_freqs: Vec::new(),
        }
    }

    pub fn file_pointer(&self) -> u64 {
        self.out.file_pointer()
    }

    /// First document id buffered for the current block, the value the skip
    /// list records for it.
    pub fn first_doc_id(&self) -> Option<DocId> {
        self.first_doc
    }

    pub fn is_empty(&self) -> bool {
        self.doc_deltas.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.doc_deltas.len() >= self.max_block_size
    }

    /// Caller guarantees strictly increasing doc ids; see `PostingsWriter`.
    pub fn write_doc(&mut self, doc: DocId) {
        debug_assert!(!self.is_full());
        if self.first_doc.is_none() {
            self.first_doc = Some(doc);
            self.doc_deltas.push(doc + 1);
        } else {
            self.doc_deltas.push(doc - self.last_doc);
        }
        self.last_doc = doc;
    }

    /// One per document, after all its nodes. `freq` is >= 1.
    pub fn write_node_freq(&mut self, freq: u32) {
        self.node_freqs.push(freq - 1);
    }

    /// Compresses and writes the buffered block. `node_fp` and `pos_fp` are
    /// the stream positions where the node and position blocks flushed
    /// together with this block begin.
    pub fn flush(&mut self, node_fp: u64, pos_fp: u64) -> Result<(), BlockError> {
        if self.is_empty() {
            return Ok(());
        }
        debug_assert_eq!(self.doc_deltas.len(), self.node_freqs.len());
        self.compressor
            .compress(&self.doc_deltas, &mut self.compressed_docs)?;
        self.compressor
            .compress(&self.node_freqs, &mut self.compressed_freqs)?;

        self.out.write_vint(self.doc_deltas.len() as u32)?;
        self.out.write_vint(self.compressed_docs.len() as u32)?;
        self.out.write_vint(self.compressed_freqs.len() as u32)?;
        self.out.write_vlong(node_fp)?;
        self.out.write_vlong(pos_fp)?;
        self.out.write_bytes(&self.compressed_docs)?;
        self.out.write_bytes(&self.compressed_freqs)?;

        self.doc_deltas.clear();
        self.node_freqs.clear();
        self.first_doc = None;
        self.last_doc = 0;
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), BlockError> {
        self.out.write_footer()?;
        self.out.flush()
    }
}

pub struct DocBlockReader {
    core: BlockReaderCore,
    decompressor: Decompressor,
    block_len: usize,
    docs_compressed_len: usize,
    freqs_compressed_len: usize,
    doc_deltas: Vec<u32>,
    docs_read: usize,
    docs_pending: bool,
    node_freqs: Vec<u32>,
    freqs_read: usize,
    freqs_pending: bool,
    node_fp: u64,
    pos_fp: u64,
    last_doc: DocId,
    scratch: Vec<u8>,
}

impl DocBlockReader {
    pub fn new(input: IndexInput, kind: CompressorKind) -> DocBlockReader {
        DocBlockReader {
            core: BlockReaderCore::new(input),
            decompressor: kind.decompressor(),
            block_len: 0,
            docs_compressed_len: 0,
            freqs_compressed_len: 0,
            doc_deltas: Vec::new(),
            docs_read: 0,
            docs_pending: false,
            node_freqs: Vec::new(),
            freqs_read: 0,
            freqs_pending: false,
            node_fp: 0,
            pos_fp: 0,
            last_doc: 0,
            scratch: Vec::new(),
        }
    }

    /// File position of the node block synchronized with the current block.
    pub fn node_fp(&self) -> u64 {
        self.node_fp
    }

    pub fn pos_fp(&self) -> u64 {
        self.pos_fp
    }

    pub fn seek(&mut self, fp: u64) -> bool {
        self.core.seek(fp)
    }

    pub fn next_doc(&mut self) -> Result<DocId, BlockError> {
        if self.docs_pending {
            self.decode_docs()?;
        }
        if self.docs_read >= self.block_len {
            return Err(exhausted("document", self.block_len));
        }
        let delta = self.doc_deltas[self.docs_read];
        if delta == 0 {
            error!("zero document delta at entry {}", self.docs_read);
            return Err(BlockError::DataCorruption(
                "zero delta in document block".to_string(),
            ));
        }
        let doc = if self.docs_read == 0 {
            delta - 1
        } else {
            self.last_doc + delta
        };
        self.docs_read += 1;
        self.last_doc = doc;
        Ok(doc)
    }

    pub fn next_node_freq(&mut self) -> Result<u32, BlockError> {
        if self.freqs_pending {
            self.decode_freqs()?;
        }
        if self.freqs_read >= self.block_len {
            return Err(exhausted("node frequency", self.block_len));
        }
        let freq = self.node_freqs[self.freqs_read] + 1;
        self.freqs_read += 1;
        Ok(freq)
    }

    fn decode_docs(&mut self) -> Result<(), BlockError> {
        self.core
            .input
            .read_into(&mut self.scratch, self.docs_compressed_len)?;
        self.decompressor
            .decompress(&self.scratch, &mut self.doc_deltas)?;
        if self.doc_deltas.len() < self.block_len {
            return Err(short_payload("document", self.doc_deltas.len(), self.block_len));
        }
        self.doc_deltas.truncate(self.block_len);
        self.docs_pending = false;
        Ok(())
    }

    fn decode_freqs(&mut self) -> Result<(), BlockError> {
        if self.docs_pending {
            // frequency bytes sit behind the doc bytes in the file
            self.decode_docs()?;
        }
        self.core
            .input
            .read_into(&mut self.scratch, self.freqs_compressed_len)?;
        self.decompressor
            .decompress(&self.scratch, &mut self.node_freqs)?;
        if self.node_freqs.len() < self.block_len {
            return Err(short_payload("node frequency", self.node_freqs.len(), self.block_len));
        }
        self.node_freqs.truncate(self.block_len);
        self.freqs_pending = false;
        Ok(())
    }
}

impl BlockReader for DocBlockReader {
    fn core(&mut self) -> &mut BlockReaderCore {
        &mut self.core
    }

    fn init_block(&mut self) {
        self.block_len = 0;
        self.docs_compressed_len = 0;
        self.freqs_compressed_len = 0;
        self.docs_read = 0;
        self.docs_pending = false;
        self.freqs_read = 0;
        self.freqs_pending = false;
        self.node_fp = 0;
        self.pos_fp = 0;
        self.last_doc = 0;
    }

    fn read_header(&mut self) -> Result<(), BlockError> {
        self.block_len = self.core.input.read_vint()? as usize;
        self.docs_compressed_len = self.core.input.read_vint()? as usize;
        self.freqs_compressed_len = self.core.input.read_vint()? as usize;
        self.node_fp = self.core.input.read_vlong()?;
        self.pos_fp = self.core.input.read_vlong()?;
        self.docs_pending = true;
        self.freqs_pending = true;
        Ok(())
    }

    fn skip_payload(&mut self) -> Result<(), BlockError> {
        let mut remaining = 0u64;
        if self.docs_pending {
            remaining += self.docs_compressed_len as u64;
        }
        if self.freqs_pending {
            remaining += self.freqs_compressed_len as u64;
        }
        let fp = self.core.input.position() + remaining;
        self.core.advance_to(fp);
        Ok(())
    }

    fn is_exhausted(&self) -> bool {
        self.docs_read >= self.block_len
    }
}

fn exhausted(what: &str, block_len: usize) -> BlockError {
    error!("{} read past block of {} entries", what, block_len);
    BlockError::ExhaustedBlock(format!("{what} read past block of {block_len} entries"))
}

fn short_payload(what: &str, got: usize, want: usize) -> BlockError {
    error!("{} payload decoded to {} entries, block declares {}", what, got, want);
    BlockError::DataCorruption(format!(
        "{what} payload decoded to {got} entries, block declares {want}"
    ))
}
