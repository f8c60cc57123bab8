//! Node stream: per block, three sub-streams: node path lengths (minus one),
//! prefix-delta-encoded path components, and per-node term frequencies (minus
//! one). One node block holds the nodes of the documents of exactly one doc
//! block.
//!
//! Path encoding compares a path with the previous one in the same document,
//! component by component from the root: while they agree a 0 is emitted, at
//! the first divergence the difference, afterwards the raw component. The
//! baseline resets at every document start.

use log::error;

use crate::common::errors::BlockError;
use crate::core::block::{BlockReader, BlockReaderCore};
use crate::core::compress::{
    BlockCompressor, BlockDecompressor, Compressor, CompressorKind, Decompressor,
};
use crate::core::NodePath;
use crate::directory::{IndexInput, IndexOutput};

pub struct NodeBlockWriter {
    out: IndexOutput,
    compressor: Compressor,
    lens: Vec<u32>,
    values: Vec<u32>,
    term_freqs: Vec<u32>,
    current_path: NodePath,
    compressed_lens: Vec<u8>,
    compressed_values: Vec<u8>,
    compressed_freqs: Vec<u8>,
}

impl NodeBlockWriter {
    pub fn new(out: IndexOutput, kind: CompressorKind) -> NodeBlockWriter {
        NodeBlockWriter {
            out,
            compressor: kind.compressor(),
            lens: Vec::new(),
            values: Vec::new(),
            term_freqs: Vec::new(),
            current_path: NodePath::new(),
            compressed_lens: Vec::new(),
            compressed_values: Vec::new(),
            compressed_freqs: Vec::new(),
        }
    }

    pub fn file_pointer(&self) -> u64 {
        self.out.file_pointer()
    }

    pub fn is_empty(&self) -> bool {
        self.lens.is_empty()
    }

    /// Buffers one node path, delta-encoded against the previous path of the
    /// same document. Caller guarantees lexicographic order and non-empty
    /// paths; see `PostingsWriter`.
    pub fn write_path(&mut self, path: &[u32]) {
        debug_assert!(!path.is_empty());
        self.lens.push(path.len() as u32 - 1);
        let mut on_prefix = !self.current_path.is_empty();
        for (i, &component) in path.iter().enumerate() {
            if on_prefix && i < self.current_path.len() {
                let delta = component - self.current_path[i];
                self.values.push(delta);
                if delta != 0 {
                    on_prefix = false;
                }
            } else {
                self.values.push(component);
                on_prefix = false;
            }
        }
        self.current_path.clear();
        self.current_path.extend_from_slice(path);
    }

    /// One per node, after all its positions. `freq` is >= 1.
    pub fn write_term_freq(&mut self, freq: u32) {
        self.term_freqs.push(freq - 1);
    }

    /// Drops the delta baseline; called at every document start.
    pub fn reset_current_path(&mut self) {
        self.current_path.clear();
    }

    pub fn flush(&mut self) -> Result<(), BlockError> {
        if self.is_empty() {
            return Ok(());
        }
        self.compressor.compress(&self.lens, &mut self.compressed_lens)?;
        self.compressor.compress(&self.values, &mut self.compressed_values)?;
        self.compressor.compress(&self.term_freqs, &mut self.compressed_freqs)?;

        self.out.write_vint(self.lens.len() as u32)?;
        self.out.write_vint(self.values.len() as u32)?;
        self.out.write_vint(self.term_freqs.len() as u32)?;
        self.out.write_vint(self.compressed_lens.len() as u32)?;
        self.out.write_vint(self.compressed_values.len() as u32)?;
        self.out.write_vint(self.compressed_freqs.len() as u32)?;
        self.out.write_bytes(&self.compressed_lens)?;
        self.out.write_bytes(&self.compressed_values)?;
        self.out.write_bytes(&self.compressed_freqs)?;

        self.lens.clear();
        self.values.clear();
        self.term_freqs.clear();
        self.current_path.clear();
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), BlockError> {
        self.out.write_footer()?;
        self.out.flush()
    }
}

pub struct NodeBlockReader {
    core: BlockReaderCore,
    decompressor: Decompressor,
    lens_len: usize,
    values_len: usize,
    freqs_len: usize,
    lens_compressed_len: usize,
    values_compressed_len: usize,
    freqs_compressed_len: usize,
    lens: Vec<u32>,
    lens_read: usize,
    lens_pending: bool,
    values: Vec<u32>,
    values_read: usize,
    values_base: usize,
    values_pending: bool,
    freqs: Vec<u32>,
    freqs_read: usize,
    freqs_pending: bool,
    current_path: NodePath,
    scratch: Vec<u8>,
}

impl NodeBlockReader {
    pub fn new(input: IndexInput, kind: CompressorKind) -> NodeBlockReader {
        NodeBlockReader {
            core: BlockReaderCore::new(input),
            decompressor: kind.decompressor(),
            lens_len: 0,
            values_len: 0,
            freqs_len: 0,
            lens_compressed_len: 0,
            values_compressed_len: 0,
            freqs_compressed_len: 0,
            lens: Vec::new(),
            lens_read: 0,
            lens_pending: false,
            values: Vec::new(),
            values_read: 0,
            values_base: 0,
            values_pending: false,
            freqs: Vec::new(),
            freqs_read: 0,
            freqs_pending: false,
            current_path: NodePath::new(),
            scratch: Vec::new(),
        }
    }

    pub fn seek(&mut self, fp: u64) -> bool {
        self.core.seek(fp)
    }

    /// Drops the delta baseline; called when decoding reaches a new document.
    pub fn reset_current_node(&mut self) {
        self.current_path.clear();
    }

    pub fn next_node(&mut self) -> Result<NodePath, BlockError> {
        if self.lens_pending {
            self.decode_lens()?;
        }
        if self.lens_read >= self.lens_len {
            return Err(exhausted("node", self.lens_len));
        }
        if self.values_pending {
            self.decode_values()?;
        }
        let len = self.lens[self.lens_read] as usize + 1;
        let start = self.values_read - self.values_base;
        if start + len > self.values.len() {
            error!(
                "node of {} components at {} overruns {} decoded path values",
                len,
                start,
                self.values.len()
            );
            return Err(BlockError::DataCorruption(
                "node path overruns the value sub-stream".to_string(),
            ));
        }

        let mut path = NodePath::new();
        let mut on_prefix = !self.current_path.is_empty();
        for (i, &delta) in self.values[start..start + len].iter().enumerate() {
            let component = if on_prefix && i < self.current_path.len() {
                let v = delta + self.current_path[i];
                if delta != 0 {
                    on_prefix = false;
                }
                v
            } else {
                on_prefix = false;
                delta
            };
            path.push(component);
        }
        self.lens_read += 1;
        self.values_read += len;
        self.current_path = path.clone();
        Ok(path)
    }

    pub fn next_term_freq(&mut self) -> Result<u32, BlockError> {
        if self.freqs_pending {
            self.decode_freqs()?;
        }
        if self.freqs_read >= self.freqs_len {
            return Err(exhausted("term frequency", self.freqs_len));
        }
        let freq = self.freqs[self.freqs_read] + 1;
        self.freqs_read += 1;
        Ok(freq)
    }

    /// Advances past `n` nodes without materializing their paths. Whole
    /// compressed frames of the value sub-stream are dropped undecoded; the
    /// caller resets the delta baseline before the next `next_node`.
    pub fn skip_nodes(&mut self, n: usize) -> Result<(), BlockError> {
        if n == 0 {
            return Ok(());
        }
        if self.lens_pending {
            self.decode_lens()?;
        }
        let mut component_count = 0usize;
        for _ in 0..n {
            if self.lens_read >= self.lens_len {
                return Err(exhausted("node", self.lens_len));
            }
            component_count += self.lens[self.lens_read] as usize + 1;
            self.lens_read += 1;
        }

        if self.values_pending {
            self.core
                .input
                .read_into(&mut self.scratch, self.values_compressed_len)?;
            let mut cursor = self.scratch.as_slice();
            let skipped = self.decompressor.skip(&mut cursor, component_count);
            self.decompressor.decompress(cursor, &mut self.values)?;
            let logical_rest = self.values_len - skipped;
            if self.values.len() < logical_rest {
                return Err(short_payload("path value", self.values.len() + skipped, self.values_len));
            }
            self.values.truncate(logical_rest);
            self.values_base = skipped;
            self.values_pending = false;
        }
        self.values_read += component_count;
        Ok(())
    }

    fn decode_lens(&mut self) -> Result<(), BlockError> {
        self.core
            .input
            .read_into(&mut self.scratch, self.lens_compressed_len)?;
        self.decompressor.decompress(&self.scratch, &mut self.lens)?;
        if self.lens.len() < self.lens_len {
            return Err(short_payload("node length", self.lens.len(), self.lens_len));
        }
        self.lens.truncate(self.lens_len);
        self.lens_pending = false;
        Ok(())
    }

    fn decode_values(&mut self) -> Result<(), BlockError> {
        self.core
            .input
            .read_into(&mut self.scratch, self.values_compressed_len)?;
        self.decompressor
            .decompress(&self.scratch, &mut self.values)?;
        if self.values.len() < self.values_len {
            return Err(short_payload("path value", self.values.len(), self.values_len));
        }
        self.values.truncate(self.values_len);
        self.values_base = 0;
        self.values_pending = false;
        Ok(())
    }

    fn decode_freqs(&mut self) -> Result<(), BlockError> {
        // sub-streams sit in file order: lengths, values, frequencies
        if self.lens_pending {
            self.decode_lens()?;
        }
        if self.values_pending {
            self.decode_values()?;
        }
        self.core
            .input
            .read_into(&mut self.scratch, self.freqs_compressed_len)?;
        self.decompressor.decompress(&self.scratch, &mut self.freqs)?;
        if self.freqs.len() < self.freqs_len {
            return Err(short_payload("term frequency", self.freqs.len(), self.freqs_len));
        }
        self.freqs.truncate(self.freqs_len);
        self.freqs_pending = false;
        Ok(())
    }
}

impl BlockReader for NodeBlockReader {
    fn core(&mut self) -> &mut BlockReaderCore {
        &mut self.core
    }

    fn init_block(&mut self) {
        self.lens_len = 0;
        self.values_len = 0;
        self.freqs_len = 0;
        self.lens_compressed_len = 0;
        self.values_compressed_len = 0;
        self.freqs_compressed_len = 0;
        self.lens_read = 0;
        self.lens_pending = false;
        self.values_read = 0;
        self.values_base = 0;
        self.values_pending = false;
        self.freqs_read = 0;
        self.freqs_pending = false;
        self.current_path.clear();
    }

    fn read_header(&mut self) -> Result<(), BlockError> {
        self.lens_len = self.core.input.read_vint()? as usize;
        self.values_len = self.core.input.read_vint()? as usize;
        self.freqs_len = self.core.input.read_vint()? as usize;
        self.lens_compressed_len = self.core.input.read_vint()? as usize;
        self.values_compressed_len = self.core.input.read_vint()? as usize;
        self.freqs_compressed_len = self.core.input.read_vint()? as usize;
        self.lens_pending = true;
        self.values_pending = true;
        self.freqs_pending = true;
        Ok(())
    }

    fn skip_payload(&mut self) -> Result<(), BlockError> {
        let mut remaining = 0u64;
        if self.lens_pending {
            remaining += self.lens_compressed_len as u64;
        }
        if self.values_pending {
            remaining += self.values_compressed_len as u64;
        }
        if self.freqs_pending {
            remaining += self.freqs_compressed_len as u64;
        }
        let fp = self.core.input.position() + remaining;
        self.core.advance_to(fp);
        Ok(())
    }

    fn is_exhausted(&self) -> bool {
        self.lens_read >= self.lens_len
    }
}

fn exhausted(what: &str, len: usize) -> BlockError {
    error!("{} read past block of {} entries", what, len);
    BlockError::ExhaustedBlock(format!("{what} read past block of {len} entries"))
}

fn short_payload(what: &str, got: usize, want: usize) -> BlockError {
    error!("{} payload decoded to {} entries, block declares {}", what, got, want);
    BlockError::DataCorruption(format!(
        "{what} payload decoded to {got} entries, block declares {want}"
    ))
}
