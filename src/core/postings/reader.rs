//! Decoding driver. A `PostingsReader` holds the memory-mapped stream files
//! of a segment; each call to [`PostingsReader::postings`] hands out an
//! independent [`PostingsIterator`] over one term, built from clones of the
//! mapped inputs.
//!
//! The iterator is lazy at two levels. Block payloads decode only when a
//! value from them is first needed, and within the enumeration every
//! sub-stream is consumed only as far as the caller asks: advancing over
//! documents without touching their nodes or positions just counts what is
//! owed, and the debt is settled in bulk (skipping whole compressed frames
//! where possible) when the caller next descends.

use std::sync::Arc;

use log::error;

use crate::common::errors::{BlockError, PostingsError};
use crate::core::block::doc_block::DocBlockReader;
use crate::core::block::node_block::NodeBlockReader;
use crate::core::block::pos_block::PosBlockReader;
use crate::core::block::BlockReader;
use crate::core::postings::term_state::TermState;
use crate::core::postings::{
    stream_path, LiveDocs, PostingsConfig, DOC_EXTENSION, NODE_EXTENSION, POS_EXTENSION,
    SKIP_EXTENSION,
};
use crate::core::skip::SkipListReader;
use crate::core::NodePath;
use crate::directory::IndexInput;
use crate::{DocId, Position};

pub struct PostingsReader {
    config: PostingsConfig,
    doc_input: IndexInput,
    node_input: IndexInput,
    pos_input: IndexInput,
    skip_input: IndexInput,
}

impl PostingsReader {
    /// Opens the four stream files of `segment`, decoding with the
    /// configuration persisted next to them.
    pub fn open(dir: &std::path::Path, segment: &str) -> Result<PostingsReader, PostingsError> {
        let config = PostingsConfig::load(dir)?;
        let doc_input = IndexInput::open(&stream_path(dir, segment, DOC_EXTENSION))?;
        let node_input = IndexInput::open(&stream_path(dir, segment, NODE_EXTENSION))?;
        let pos_input = IndexInput::open(&stream_path(dir, segment, POS_EXTENSION))?;
        let skip_input = IndexInput::open(&stream_path(dir, segment, SKIP_EXTENSION))?;
        Ok(PostingsReader {
            config,
            doc_input,
            node_input,
            pos_input,
            skip_input,
        })
    }

    pub fn config(&self) -> &PostingsConfig {
        &self.config
    }

    /// Verifies the footer checksum of all four streams.
    pub fn check_integrity(&self) -> Result<(), BlockError> {
        self.doc_input.verify_footer()?;
        self.node_input.verify_footer()?;
        self.pos_input.verify_footer()?;
        self.skip_input.verify_footer()?;
        Ok(())
    }

    /// Starts an enumeration over one term. `live_docs`, when present,
    /// filters deleted documents out of the enumeration.
    pub fn postings(
        &self,
        state: &TermState,
        live_docs: Option<Arc<dyn LiveDocs>>,
    ) -> Result<PostingsIterator, PostingsError> {
        if state.block_count == 0 {
            error!("term state with zero blocks");
            return Err(PostingsError::BlockError(BlockError::DataCorruption(
                "term state with zero blocks".to_string(),
            )));
        }
        if state.block_count >= self.config.block_skip_minimum && state.skip_fp.is_none() {
            error!("term spanning {} blocks lacks skip data", state.block_count);
            return Err(PostingsError::BlockError(BlockError::DataCorruption(
                "term state lacks expected skip data".to_string(),
            )));
        }
        let mut doc_reader = DocBlockReader::new(self.doc_input.clone(), self.config.compressor);
        doc_reader.seek(state.doc_fp);
        Ok(PostingsIterator {
            config: self.config,
            doc_reader,
            node_reader: NodeBlockReader::new(self.node_input.clone(), self.config.compressor),
            pos_reader: PosBlockReader::new(self.pos_input.clone(), self.config.compressor),
            skip_input: self.skip_input.clone(),
            live_docs,
            term_doc_fp: state.doc_fp,
            block_limit: state.block_count,
            skip_fp: state.skip_fp,
            blocks_read: 0,
            block_decodes: 0,
            doc: None,
            node_freq: 0,
            node: NodePath::new(),
            term_freq: 0,
            term_freq_pending: false,
            pos: None,
            pending: PendingCounters::default(),
            skipper: None,
            exhausted: false,
        })
    }
}

/// Work counted but not yet done: entries of the current or earlier
/// documents that were buffered by the writer but not yet consumed here.
#[derive(Debug, Default, Clone, Copy)]
struct PendingCounters {
    /// Node-frequency entries of documents advanced past.
    node_freqs: u64,
    /// Node entries owed through the current document.
    nodes: u64,
    /// Term-frequency entries owed through the current node.
    term_freqs: u64,
    /// Position entries owed through the current node.
    positions: u64,
}

impl PendingCounters {
    fn reset(&mut self) {
        *self = PendingCounters::default();
    }
}

pub struct PostingsIterator {
    config: PostingsConfig,
    doc_reader: DocBlockReader,
    node_reader: NodeBlockReader,
    pos_reader: PosBlockReader,
    skip_input: IndexInput,
    live_docs: Option<Arc<dyn LiveDocs>>,
    term_doc_fp: u64,
    block_limit: usize,
    skip_fp: Option<u64>,
    blocks_read: usize,
    block_decodes: usize,
    doc: Option<DocId>,
    node_freq: u32,
    node: NodePath,
    term_freq: u32,
    term_freq_pending: bool,
    pos: Option<Position>,
    pending: PendingCounters,
    skipper: Option<SkipListReader>,
    exhausted: bool,
}

impl PostingsIterator {
    /// Current document, None before the first advance and after the end.
    pub fn doc(&self) -> Option<DocId> {
        self.doc
    }

    /// Current node path, empty when no node is selected.
    pub fn node(&self) -> &[u32] {
        &self.node
    }

    /// Current position, None until `next_position` succeeds in a node.
    pub fn pos(&self) -> Option<Position> {
        self.pos
    }

    /// Number of doc blocks decoded so far by this enumerator.
    pub fn block_decodes(&self) -> usize {
        self.block_decodes
    }

    /// Advances to the next live document. Nodes and positions of the
    /// previous document that were never visited are only counted, not
    /// decoded.
    pub fn next_document(&mut self) -> Result<bool, PostingsError> {
        loop {
            if self.exhausted {
                return Ok(false);
            }
            if self.doc_reader.is_exhausted() {
                if self.blocks_read >= self.block_limit {
                    self.exhausted = true;
                    self.doc = None;
                    self.node.clear();
                    self.pos = None;
                    return Ok(false);
                }
                self.advance_block()?;
            }
            let doc = self.doc_reader.next_doc()?;
            self.pending.node_freqs += 1;
            self.node_freq = 0;
            self.term_freq = 0;
            self.term_freq_pending = false;
            self.node.clear();
            self.pos = None;
            self.doc = Some(doc);
            match &self.live_docs {
                Some(live) if !live.is_live(doc) => continue,
                _ => return Ok(true),
            }
        }
    }

    /// Number of nodes the term occurs in within the current document.
    pub fn node_freq_in_doc(&mut self) -> Result<u32, PostingsError> {
        if self.doc.is_none() {
            return Ok(0);
        }
        if self.node_freq == 0 {
            // settle the node-frequency entries of every document advanced
            // past; the last one read belongs to the current document
            while self.pending.node_freqs > 0 {
                let freq = self.doc_reader.next_node_freq()?;
                self.pending.node_freqs -= 1;
                self.pending.nodes += freq as u64;
                self.pending.term_freqs += freq as u64;
                self.node_freq = freq;
            }
        }
        Ok(self.node_freq)
    }

    /// Advances to the next node of the current document.
    pub fn next_node(&mut self) -> Result<bool, PostingsError> {
        if self.doc.is_none() {
            return Ok(false);
        }
        let node_freq = self.node_freq_in_doc()? as u64;
        self.term_freq = 0;
        self.pos = None;
        if self.pending.nodes == 0 {
            self.node.clear();
            self.term_freq_pending = false;
            return Ok(false);
        }
        if self.pending.nodes > node_freq {
            // nodes of earlier documents that were never visited; their term
            // frequencies stay owed and settle in term_freq_in_node
            self.node_reader
                .skip_nodes((self.pending.nodes - node_freq) as usize)?;
            self.pending.nodes = node_freq;
        }
        if self.pending.nodes == node_freq {
            // first node of the current document
            self.node_reader.reset_current_node();
        }
        self.node = self.node_reader.next_node()?;
        self.pending.nodes -= 1;
        self.term_freq_pending = true;
        Ok(true)
    }

    /// Number of positions the term occupies in the current node.
    pub fn term_freq_in_node(&mut self) -> Result<u32, PostingsError> {
        if self.term_freq_pending {
            // entries before the current node's: total owed minus the nodes
            // not yet visited minus the current node itself
            while self.pending.term_freqs > self.pending.nodes + 1 {
                let freq = self.node_reader.next_term_freq()?;
                self.pending.term_freqs -= 1;
                self.pending.positions += freq as u64;
            }
            let freq = self.node_reader.next_term_freq()?;
            self.pending.term_freqs -= 1;
            self.pending.positions += freq as u64;
            self.term_freq = freq;
            self.term_freq_pending = false;
        }
        Ok(self.term_freq)
    }

    /// Advances to the next position of the current node.
    pub fn next_position(&mut self) -> Result<bool, PostingsError> {
        if self.doc.is_none() || self.node.is_empty() {
            return Ok(false);
        }
        let term_freq = self.term_freq_in_node()? as u64;
        if self.pending.positions > term_freq {
            // positions of nodes visited without descending into them
            self.pos_reader
                .skip_positions((self.pending.positions - term_freq) as usize)?;
            self.pending.positions = term_freq;
        }
        if self.pending.positions == 0 {
            self.pos = None;
            return Ok(false);
        }
        if self.pending.positions == term_freq {
            // first position of the current node
            self.pos_reader.reset_current_position();
        }
        let pos = self.pos_reader.next_position()?;
        self.pending.positions -= 1;
        self.pos = Some(pos);
        Ok(true)
    }

    /// Advances to the first live document at or beyond `target`, using the
    /// term's skip data when the jump is worth it. Targets must not decrease
    /// across calls.
    pub fn skip_to(&mut self, target: DocId) -> Result<bool, PostingsError> {
        if let Some(doc) = self.doc {
            if doc >= target {
                return Ok(true);
            }
        }
        if self.exhausted {
            return Ok(false);
        }
        let skip_span = (self.config.block_skip_interval * self.config.max_block_size) as i64;
        let current = self.doc.map(|d| d as i64).unwrap_or(-1);
        if self.block_limit >= self.config.block_skip_minimum
            && target as i64 - skip_span >= current
        {
            if self.skipper.is_none() {
                if let Some(skip_fp) = self.skip_fp {
                    self.skipper = Some(SkipListReader::open(
                        &self.skip_input,
                        self.config.block_skip_interval,
                        self.config.max_skip_levels,
                        skip_fp,
                        self.term_doc_fp,
                        self.block_limit,
                    )?);
                }
            }
            if let Some(skipper) = self.skipper.as_mut() {
                if let Some(result) = skipper.skip_to(target)? {
                    // reposition only if the target block lies beyond the
                    // one currently loaded
                    if result.blocks_skipped + 1 > self.blocks_read {
                        self.doc_reader.seek(result.doc_fp);
                        self.doc_reader.init_block();
                        self.blocks_read = result.blocks_skipped;
                        self.pending.reset();
                        self.node_freq = 0;
                        self.term_freq = 0;
                        self.term_freq_pending = false;
                    }
                }
            }
        }
        while self.next_document()? {
            if let Some(doc) = self.doc {
                if doc >= target {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Moves all three streams to the next synchronized block set.
    fn advance_block(&mut self) -> Result<(), PostingsError> {
        self.doc_reader.next_block()?;
        self.blocks_read += 1;
        self.block_decodes += 1;
        if self.node_reader.seek(self.doc_reader.node_fp()) {
            self.node_reader.next_block()?;
        }
        if self.pos_reader.seek(self.doc_reader.pos_fp()) {
            self.pos_reader.next_block()?;
        }
        self.pending.reset();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use tempfile::tempdir;

    use super::*;
    use crate::core::postings::writer::PostingsWriter;

    /// doc -> [(path, [positions])]
    type TermDocs = Vec<(DocId, Vec<(Vec<u32>, Vec<Position>)>)>;

    fn write_term(dir: &std::path::Path, config: PostingsConfig, docs: &TermDocs) -> TermState {
        let mut writer = PostingsWriter::create(dir, "seg0", config).unwrap();
        writer.start_term().unwrap();
        for (doc, nodes) in docs {
            writer.start_doc(*doc).unwrap();
            for (path, positions) in nodes {
                writer.write_node(path).unwrap();
                for &pos in positions {
                    writer.write_position(pos).unwrap();
                }
            }
            writer.finish_doc().unwrap();
        }
        let state = writer.finish_term().unwrap();
        writer.close().unwrap();
        state
    }

    fn small_fixture() -> TermDocs {
        vec![
            (3, vec![(vec![0], vec![0])]),
            (7, vec![(vec![0], vec![0]), (vec![1, 2], vec![0])]),
            (9, vec![(vec![0, 0], vec![0])]),
        ]
    }

    #[test]
    fn test_full_enumeration() {
        let dir = tempdir().unwrap();
        let docs = small_fixture();
        let state = write_term(dir.path(), PostingsConfig::default(), &docs);

        let reader = PostingsReader::open(dir.path(), "seg0").unwrap();
        reader.check_integrity().unwrap();
        let mut postings = reader.postings(&state, None).unwrap();

        for (doc, nodes) in &docs {
            assert!(postings.next_document().unwrap());
            assert_eq!(postings.doc(), Some(*doc));
            assert_eq!(postings.node_freq_in_doc().unwrap(), nodes.len() as u32);
            for (path, positions) in nodes {
                assert!(postings.next_node().unwrap());
                assert_eq!(postings.node(), path.as_slice());
                assert_eq!(
                    postings.term_freq_in_node().unwrap(),
                    positions.len() as u32
                );
                for &pos in positions {
                    assert!(postings.next_position().unwrap());
                    assert_eq!(postings.pos(), Some(pos));
                }
                assert!(!postings.next_position().unwrap());
            }
            assert!(!postings.next_node().unwrap());
        }
        assert!(!postings.next_document().unwrap());
        assert_eq!(postings.doc(), None);
        assert!(!postings.next_document().unwrap());
    }

    #[test]
    fn test_documents_only_enumeration() {
        // walking documents without ever touching nodes or positions
        let dir = tempdir().unwrap();
        let docs = small_fixture();
        let state = write_term(dir.path(), PostingsConfig::default(), &docs);

        let reader = PostingsReader::open(dir.path(), "seg0").unwrap();
        let mut postings = reader.postings(&state, None).unwrap();
        let mut seen = Vec::new();
        while postings.next_document().unwrap() {
            seen.push(postings.doc().unwrap());
        }
        assert_eq!(seen, vec![3, 7, 9]);
    }

    #[test]
    fn test_partial_descent_settles_debt() {
        // visit doc 3 fully, skim doc 7, then descend fully into doc 9
        let dir = tempdir().unwrap();
        let docs = small_fixture();
        let state = write_term(dir.path(), PostingsConfig::default(), &docs);

        let reader = PostingsReader::open(dir.path(), "seg0").unwrap();
        let mut postings = reader.postings(&state, None).unwrap();

        assert!(postings.next_document().unwrap());
        assert!(postings.next_node().unwrap());
        assert!(postings.next_position().unwrap());
        assert_eq!(postings.pos(), Some(0));

        assert!(postings.next_document().unwrap()); // doc 7, untouched

        assert!(postings.next_document().unwrap());
        assert_eq!(postings.doc(), Some(9));
        assert_eq!(postings.node_freq_in_doc().unwrap(), 1);
        assert!(postings.next_node().unwrap());
        assert_eq!(postings.node(), &[0, 0]);
        assert_eq!(postings.term_freq_in_node().unwrap(), 1);
        assert!(postings.next_position().unwrap());
        assert_eq!(postings.pos(), Some(0));
    }

    #[test]
    fn test_live_docs_filter() {
        let dir = tempdir().unwrap();
        let docs = small_fixture();
        let state = write_term(dir.path(), PostingsConfig::default(), &docs);

        let mut live = vec![true; 10];
        live[7] = false;
        let reader = PostingsReader::open(dir.path(), "seg0").unwrap();
        let mut postings = reader.postings(&state, Some(Arc::new(live))).unwrap();

        assert!(postings.next_document().unwrap());
        assert_eq!(postings.doc(), Some(3));
        assert!(postings.next_document().unwrap());
        assert_eq!(postings.doc(), Some(9));
        // node decoding still lines up after the filtered document
        assert!(postings.next_node().unwrap());
        assert_eq!(postings.node(), &[0, 0]);
        assert!(!postings.next_document().unwrap());
    }

    #[test]
    fn test_skip_to_within_and_beyond() {
        let dir = tempdir().unwrap();
        // 200 docs with ids 2*i, several blocks of 32
        let docs: TermDocs = (0..200u32)
            .map(|i| (2 * i, vec![(vec![i % 7], vec![0u32, 3])]))
            .collect();
        let state = write_term(dir.path(), PostingsConfig::default(), &docs);
        assert_eq!(state.block_count, 7);

        let reader = PostingsReader::open(dir.path(), "seg0").unwrap();
        let mut postings = reader.postings(&state, None).unwrap();

        assert!(postings.skip_to(250).unwrap());
        assert_eq!(postings.doc(), Some(250));
        // the enumeration still decodes correctly after the jump
        assert_eq!(postings.node_freq_in_doc().unwrap(), 1);
        assert!(postings.next_node().unwrap());
        assert_eq!(postings.node(), &[125 % 7]);
        assert_eq!(postings.term_freq_in_node().unwrap(), 2);

        assert!(postings.skip_to(251).unwrap());
        assert_eq!(postings.doc(), Some(252));

        assert!(!postings.skip_to(399).unwrap());
        assert!(postings.doc().is_none());
    }

    #[test]
    fn test_append_with_mapping() {
        use crate::core::postings::writer::DocMapping;

        let dir = tempdir().unwrap();
        let src_dir = dir.path().join("src");
        let dst_dir = dir.path().join("dst");
        std::fs::create_dir_all(&src_dir).unwrap();
        std::fs::create_dir_all(&dst_dir).unwrap();

        let docs = small_fixture();
        let state = write_term(&src_dir, PostingsConfig::default(), &docs);

        // drop doc 7, shift the others
        struct Shift;
        impl DocMapping for Shift {
            fn remap(&self, doc: DocId) -> Option<DocId> {
                (doc != 7).then_some(doc + 100)
            }
        }

        let src_reader = PostingsReader::open(&src_dir, "seg0").unwrap();
        let mut src = src_reader.postings(&state, None).unwrap();

        let mut writer =
            PostingsWriter::create(&dst_dir, "seg1", PostingsConfig::default()).unwrap();
        writer.start_term().unwrap();
        let (doc_count, total_tf) = writer.append(&mut src, &Shift).unwrap();
        assert_eq!(doc_count, 2);
        assert_eq!(total_tf, 2);
        let merged_state = writer.finish_term().unwrap();
        writer.close().unwrap();

        let dst_reader = PostingsReader::open(&dst_dir, "seg1").unwrap();
        let mut merged = dst_reader.postings(&merged_state, None).unwrap();
        assert!(merged.next_document().unwrap());
        assert_eq!(merged.doc(), Some(103));
        assert!(merged.next_node().unwrap());
        assert_eq!(merged.node(), &[0]);
        assert!(merged.next_position().unwrap());
        assert_eq!(merged.pos(), Some(0));
        assert!(merged.next_document().unwrap());
        assert_eq!(merged.doc(), Some(109));
        assert!(merged.next_node().unwrap());
        assert_eq!(merged.node(), &[0, 0]);
        assert!(!merged.next_document().unwrap());
    }
}
