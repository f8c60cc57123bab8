//! Encoding driver. One `PostingsWriter` owns the four stream files of a
//! segment and is fed one term at a time:
//!
//! ```text
//! start_term
//!   start_doc(d)        docs strictly increasing
//!     write_node(path)  paths in lexicographic order within the doc
//!       write_position(p)  positions strictly increasing within the node
//!   finish_doc
//! finish_term -> TermState
//! ```
//!
//! The doc stream decides block boundaries: when its buffer is full, the
//! node and position writers are flushed with it, whatever they hold, so the
//! three streams advance in lockstep and one doc block maps to exactly one
//! node block and one position block.

use std::path::Path;

use log::error;

use crate::common::errors::PostingsError;
use crate::core::block::doc_block::DocBlockWriter;
use crate::core::block::node_block::NodeBlockWriter;
use crate::core::block::pos_block::PosBlockWriter;
use crate::core::postings::reader::PostingsIterator;
use crate::core::postings::term_state::TermState;
use crate::core::postings::{
    stream_path, PostingsConfig, DOC_EXTENSION, NODE_EXTENSION, POS_EXTENSION, SKIP_EXTENSION,
};
use crate::core::skip::SkipListWriter;
use crate::core::NodePath;
use crate::directory::IndexOutput;
use crate::{DocId, Position};

/// Doc-id translation used by the merge append path.
pub trait DocMapping {
    /// New id for `doc`, or None when the document is deleted.
    fn remap(&self, doc: DocId) -> Option<DocId>;
}

impl DocMapping for Vec<Option<DocId>> {
    fn remap(&self, doc: DocId) -> Option<DocId> {
        self.get(doc as usize).copied().flatten()
    }
}

pub struct IdentityMapping;

impl DocMapping for IdentityMapping {
    fn remap(&self, doc: DocId) -> Option<DocId> {
        Some(doc)
    }
}

pub struct PostingsWriter {
    config: PostingsConfig,
    doc_writer: DocBlockWriter,
    node_writer: NodeBlockWriter,
    pos_writer: PosBlockWriter,
    skip_out: IndexOutput,
    skip_writer: SkipListWriter,
    block_count: usize,
    term_doc_fp: u64,
    doc_count: u32,
    last_doc: Option<DocId>,
    last_node_path: NodePath,
    has_node: bool,
    node_freq: u32,
    term_freq: u32,
    last_pos: Option<Position>,
    in_term: bool,
    in_doc: bool,
}

impl PostingsWriter {
    /// Creates the four stream files `<segment>.{doc,nod,pos,skp}` under
    /// `dir` and persists `config` next to them.
    pub fn create(
        dir: &Path,
        segment: &str,
        config: PostingsConfig,
    ) -> Result<PostingsWriter, PostingsError> {
        config.validate()?;
        config.save(dir)?;
        let doc_out = IndexOutput::create(&stream_path(dir, segment, DOC_EXTENSION))?;
        let node_out = IndexOutput::create(&stream_path(dir, segment, NODE_EXTENSION))?;
        let pos_out = IndexOutput::create(&stream_path(dir, segment, POS_EXTENSION))?;
        let skip_out = IndexOutput::create(&stream_path(dir, segment, SKIP_EXTENSION))?;
        Ok(PostingsWriter {
            doc_writer: DocBlockWriter::new(doc_out, config.compressor, config.max_block_size),
            node_writer: NodeBlockWriter::new(node_out, config.compressor),
            pos_writer: PosBlockWriter::new(pos_out, config.compressor),
            skip_out,
            skip_writer: SkipListWriter::new(config.block_skip_interval, config.max_skip_levels),
            config,
            block_count: 0,
            term_doc_fp: 0,
            doc_count: 0,
            last_doc: None,
            last_node_path: NodePath::new(),
            has_node: false,
            node_freq: 0,
            term_freq: 0,
            last_pos: None,
            in_term: false,
            in_doc: false,
        })
    }

    pub fn config(&self) -> &PostingsConfig {
        &self.config
    }

    pub fn start_term(&mut self) -> Result<(), PostingsError> {
        if self.in_term {
            return Err(violation("start_term while a term is open"));
        }
        self.term_doc_fp = self.doc_writer.file_pointer();
        self.skip_writer.reset(self.term_doc_fp);
        self.block_count = 0;
        self.doc_count = 0;
        self.last_doc = None;
        self.in_term = true;
        Ok(())
    }

    pub fn start_doc(&mut self, doc: DocId) -> Result<(), PostingsError> {
        if !self.in_term || self.in_doc {
            return Err(violation("start_doc outside a term or inside a document"));
        }
        if doc == DocId::MAX {
            // the first entry of a block stores doc + 1
            return Err(violation(&format!("document id {doc} is reserved")));
        }
        if let Some(last) = self.last_doc {
            if doc <= last {
                return Err(violation(&format!(
                    "document ids must increase: {doc} after {last}"
                )));
            }
        }
        if self.doc_writer.is_full() {
            self.flush_block_set()?;
        }
        self.doc_writer.write_doc(doc);
        self.node_writer.reset_current_path();
        self.last_doc = Some(doc);
        self.last_node_path.clear();
        self.has_node = false;
        self.node_freq = 0;
        self.term_freq = 0;
        self.last_pos = None;
        self.in_doc = true;
        self.doc_count += 1;
        Ok(())
    }

    /// Opens the next node of the current document. Closes out the previous
    /// node by writing its term frequency.
    pub fn write_node(&mut self, path: &[u32]) -> Result<(), PostingsError> {
        if !self.in_doc {
            return Err(violation("write_node outside a document"));
        }
        if path.is_empty() {
            return Err(violation("empty node path"));
        }
        if self.has_node {
            if path <= self.last_node_path.as_slice() {
                return Err(violation(&format!(
                    "node paths must increase: {:?} after {:?}",
                    path, self.last_node_path
                )));
            }
            if self.term_freq == 0 {
                return Err(violation("node without positions"));
            }
            self.node_writer.write_term_freq(self.term_freq);
        }
        self.node_writer.write_path(path);
        self.pos_writer.reset_current_position();
        self.last_node_path.clear();
        self.last_node_path.extend_from_slice(path);
        self.has_node = true;
        self.node_freq += 1;
        self.term_freq = 0;
        self.last_pos = None;
        Ok(())
    }

    pub fn write_position(&mut self, pos: Position) -> Result<(), PostingsError> {
        if !self.has_node {
            return Err(violation("write_position outside a node"));
        }
        if let Some(last) = self.last_pos {
            if pos <= last {
                return Err(violation(&format!(
                    "positions must increase: {pos} after {last}"
                )));
            }
        }
        self.pos_writer.write_position(pos);
        self.last_pos = Some(pos);
        self.term_freq += 1;
        Ok(())
    }

    pub fn finish_doc(&mut self) -> Result<(), PostingsError> {
        if !self.in_doc {
            return Err(violation("finish_doc outside a document"));
        }
        if !self.has_node || self.term_freq == 0 {
            return Err(violation("document without a node or positions"));
        }
        self.node_writer.write_term_freq(self.term_freq);
        self.doc_writer.write_node_freq(self.node_freq);
        self.in_doc = false;
        Ok(())
    }

    /// Flushes whatever is buffered and emits the term's skip data when it
    /// spans enough blocks.
    pub fn finish_term(&mut self) -> Result<TermState, PostingsError> {
        if !self.in_term || self.in_doc {
            return Err(violation("finish_term outside a term or inside a document"));
        }
        if self.doc_count == 0 {
            return Err(violation("term with no documents"));
        }
        if !self.doc_writer.is_empty() {
            self.flush_block_set()?;
        }
        let skip_fp = if self.block_count >= self.config.block_skip_minimum {
            self.skip_writer
                .write_skip(&mut self.skip_out, self.block_count)?
        } else {
            None
        };
        self.in_term = false;
        Ok(TermState {
            doc_fp: self.term_doc_fp,
            block_count: self.block_count,
            skip_fp,
        })
    }

    /// Bulk path for merges: re-streams an already-decoded enumeration into
    /// this writer, translating doc ids and dropping deleted documents.
    /// Returns the appended document count and total term frequency.
    pub fn append(
        &mut self,
        postings: &mut PostingsIterator,
        mapping: &dyn DocMapping,
    ) -> Result<(u32, u64), PostingsError> {
        let mut doc_count = 0u32;
        let mut total_term_freq = 0u64;
        while postings.next_document()? {
            let Some(doc) = postings.doc() else { break };
            let Some(mapped) = mapping.remap(doc) else {
                continue;
            };
            self.start_doc(mapped)?;
            while postings.next_node()? {
                let path: NodePath = NodePath::from_slice(postings.node());
                self.write_node(&path)?;
                while postings.next_position()? {
                    let Some(pos) = postings.pos() else { break };
                    self.write_position(pos)?;
                    total_term_freq += 1;
                }
            }
            self.finish_doc()?;
            doc_count += 1;
        }
        Ok((doc_count, total_term_freq))
    }

    /// Writes the stream footers and flushes everything to disk.
    pub fn close(&mut self) -> Result<(), PostingsError> {
        if self.in_term || self.in_doc {
            return Err(violation("close with an unfinished term"));
        }
        self.doc_writer.close()?;
        self.node_writer.close()?;
        self.pos_writer.close()?;
        self.skip_out.write_footer()?;
        self.skip_out.flush()?;
        Ok(())
    }

    /// Counts the buffered doc block, records its skip entry when due, and
    /// writes the three synchronized blocks out.
    fn flush_block_set(&mut self) -> Result<(), PostingsError> {
        debug_assert!(!self.doc_writer.is_empty());
        self.block_count += 1;
        if self.block_count % self.config.block_skip_interval == 0 {
            if let Some(first_doc) = self.doc_writer.first_doc_id() {
                self.skip_writer
                    .set_skip_data(first_doc, self.doc_writer.file_pointer());
                self.skip_writer.buffer_skip(self.block_count);
            }
        }
        let node_fp = self.node_writer.file_pointer();
        let pos_fp = self.pos_writer.file_pointer();
        self.doc_writer.flush(node_fp, pos_fp)?;
        self.node_writer.flush()?;
        self.pos_writer.flush()?;
        Ok(())
    }
}

fn violation(msg: &str) -> PostingsError {
    error!("{}", msg);
    PostingsError::ContractViolation(msg.to_string())
}

#[cfg(test)]
mod test {
    use tempfile::tempdir;

    use super::*;

    fn writer(dir: &Path) -> PostingsWriter {
        PostingsWriter::create(dir, "seg0", PostingsConfig::default()).unwrap()
    }

    #[test]
    fn test_call_protocol_enforced() {
        let dir = tempdir().unwrap();
        let mut w = writer(dir.path());

        assert!(matches!(
            w.start_doc(0),
            Err(PostingsError::ContractViolation(_))
        ));
        w.start_term().unwrap();
        assert!(w.write_node(&[0]).is_err()); // no open document
        w.start_doc(4).unwrap();
        assert!(w.write_position(0).is_err()); // no open node
        assert!(w.write_node(&[]).is_err()); // empty path
        w.write_node(&[1, 2]).unwrap();
        w.write_position(0).unwrap();
        assert!(w.finish_term().is_err()); // document still open
        w.finish_doc().unwrap();
        let state = w.finish_term().unwrap();
        assert_eq!(state.block_count, 1);
        assert_eq!(state.skip_fp, None);
        w.close().unwrap();
    }

    #[test]
    fn test_empty_term_rejected() {
        let dir = tempdir().unwrap();
        let mut w = writer(dir.path());
        w.start_term().unwrap();
        assert!(matches!(
            w.finish_term(),
            Err(PostingsError::ContractViolation(_))
        ));
    }

    #[test]
    fn test_doc_order_violation_is_fatal() {
        let dir = tempdir().unwrap();
        let mut w = writer(dir.path());
        w.start_term().unwrap();
        w.start_doc(10).unwrap();
        w.write_node(&[0]).unwrap();
        w.write_position(1).unwrap();
        w.finish_doc().unwrap();
        assert!(matches!(
            w.start_doc(10),
            Err(PostingsError::ContractViolation(_))
        ));
        assert!(w.start_doc(9).is_err());
    }

    #[test]
    fn test_max_doc_id_rejected() {
        // the first entry of a block is stored as doc + 1
        let dir = tempdir().unwrap();
        let mut w = writer(dir.path());
        w.start_term().unwrap();
        assert!(matches!(
            w.start_doc(DocId::MAX),
            Err(PostingsError::ContractViolation(_))
        ));
        w.start_doc(DocId::MAX - 1).unwrap();
        w.write_node(&[0]).unwrap();
        w.write_position(0).unwrap();
        w.finish_doc().unwrap();
        w.finish_term().unwrap();
        w.close().unwrap();
    }

    #[test]
    fn test_node_and_position_order_violations() {
        let dir = tempdir().unwrap();
        let mut w = writer(dir.path());
        w.start_term().unwrap();
        w.start_doc(0).unwrap();
        w.write_node(&[1, 5]).unwrap();
        w.write_position(7).unwrap();
        assert!(w.write_position(6).is_err());
        assert!(w.write_position(7).is_err()); // repeated position
        assert!(w.write_node(&[1, 5]).is_err()); // repeated path
        assert!(w.write_node(&[1, 4]).is_err()); // goes backwards
        w.write_node(&[1, 5, 0]).unwrap();
        w.write_position(0).unwrap();
        w.finish_doc().unwrap();
    }

    #[test]
    fn test_skip_fp_appears_above_minimum() {
        let dir = tempdir().unwrap();
        let mut w = writer(dir.path());
        w.start_term().unwrap();
        // 3 blocks of 32 docs, above the default minimum of 2
        for doc in 0..96u32 {
            w.start_doc(doc).unwrap();
            w.write_node(&[0]).unwrap();
            w.write_position(0).unwrap();
            w.finish_doc().unwrap();
        }
        let state = w.finish_term().unwrap();
        assert_eq!(state.block_count, 3);
        assert!(state.skip_fp.is_some());
        w.close().unwrap();
    }

    #[test]
    fn test_config_persisted_on_create() {
        let dir = tempdir().unwrap();
        let _w = writer(dir.path());
        let loaded = PostingsConfig::load(dir.path()).unwrap();
        assert_eq!(loaded, PostingsConfig::default());
    }
}
