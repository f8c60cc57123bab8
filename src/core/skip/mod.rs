//! Multi-level skip list over flushed doc blocks.
//!
//! The writer buffers one entry per `interval` flushed blocks at level 0, one
//! per `interval` level-0 entries at level 1, and so on. An entry records the
//! first document id of the block being flushed and the doc-stream position
//! where that block starts, both delta-encoded per level; entries above level
//! 0 also carry a byte offset to the end of their mirror entry one level
//! below. At term end the levels are serialized top-down, each level but the
//! lowest prefixed with its byte length.
//!
//! The reader walks from the top level down, consuming entries while their
//! document id is below the target, and follows child offsets into the level
//! below. The result names the last accepted entry: a block start position,
//! its first document id, and how many blocks precede it.

use log::error;

use crate::common::errors::BlockError;
use crate::core::block::OutputIndex;
use crate::directory::{put_vint, IndexInput, IndexOutput};
use crate::DocId;

/// Number of skip levels that have at least one entry for `total_blocks`
/// flushed blocks.
pub fn levels_for(total_blocks: usize, interval: usize, max_levels: usize) -> usize {
    let mut levels = 0;
    let mut span = interval;
    while levels < max_levels && span <= total_blocks {
        levels += 1;
        match span.checked_mul(interval) {
            Some(next) => span = next,
            None => break,
        }
    }
    levels
}

pub struct SkipListWriter {
    interval: usize,
    max_levels: usize,
    level_buffers: Vec<Vec<u8>>,
    last_doc: Vec<DocId>,
    doc_index: Vec<OutputIndex>,
    cur_doc: DocId,
    cur_fp: u64,
}

impl SkipListWriter {
    pub fn new(interval: usize, max_levels: usize) -> SkipListWriter {
        SkipListWriter {
            interval,
            max_levels,
            level_buffers: vec![Vec::new(); max_levels],
            last_doc: vec![0; max_levels],
            doc_index: vec![OutputIndex::new(); max_levels],
            cur_doc: 0,
            cur_fp: 0,
        }
    }

    /// Clears all buffered entries and re-bases the per-level position deltas
    /// at `base_fp`, the doc-stream position where the term starts.
    pub fn reset(&mut self, base_fp: u64) {
        for buf in &mut self.level_buffers {
            buf.clear();
        }
        for doc in &mut self.last_doc {
            *doc = 0;
        }
        for index in &mut self.doc_index {
            index.reset(base_fp);
        }
    }

    /// Records the block about to be flushed: its first document id and the
    /// doc-stream position it will be written at.
    pub fn set_skip_data(&mut self, first_doc: DocId, doc_fp: u64) {
        self.cur_doc = first_doc;
        self.cur_fp = doc_fp;
    }

    /// Buffers one skip entry. `block_count` is the number of blocks flushed
    /// so far including the one just recorded, and must be a multiple of the
    /// skip interval.
    pub fn buffer_skip(&mut self, block_count: usize) {
        debug_assert!(block_count % self.interval == 0);
        let mut num_levels = 1;
        let mut count = block_count / self.interval;
        while count % self.interval == 0 && num_levels < self.max_levels {
            num_levels += 1;
            count /= self.interval;
        }

        let mut child_pointer = 0u64;
        for level in 0..num_levels {
            let buf = &mut self.level_buffers[level];
            put_vint(buf, self.cur_doc - self.last_doc[level]);
            self.last_doc[level] = self.cur_doc;
            self.doc_index[level].mark(self.cur_fp);
            self.doc_index[level].write(buf, false);
            if level > 0 {
                crate::directory::put_vlong(buf, child_pointer);
            }
            child_pointer = buf.len() as u64;
        }
    }

    /// Serializes the buffered levels, top level first. Returns the start
    /// position of the skip data, or None when no entry was buffered.
    pub fn write_skip(
        &mut self,
        out: &mut IndexOutput,
        total_blocks: usize,
    ) -> Result<Option<u64>, BlockError> {
        let levels = levels_for(total_blocks, self.interval, self.max_levels);
        if levels == 0 {
            return Ok(None);
        }
        let start = out.file_pointer();
        for level in (1..levels).rev() {
            let buf = &self.level_buffers[level];
            out.write_vlong(buf.len() as u64)?;
            out.write_bytes(buf)?;
        }
        out.write_bytes(&self.level_buffers[0])?;
        Ok(Some(start))
    }
}

/// Where a successful skip leaves the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipResult {
    /// First document id of the block to decode next.
    pub doc: DocId,
    /// Doc-stream position of that block.
    pub doc_fp: u64,
    /// Number of doc blocks that precede it.
    pub blocks_skipped: usize,
}

#[derive(Debug, Clone, Copy)]
struct LevelEntry {
    doc: DocId,
    fp: u64,
    /// Writer-side block counter at the time the entry was buffered.
    count: usize,
    child: u64,
}

struct LevelState {
    stream: IndexInput,
    start_fp: u64,
    per_entry_blocks: usize,
    total_entries: usize,
    consumed: usize,
    cum_doc: DocId,
    cum_fp: u64,
    next: Option<LevelEntry>,
}

pub struct SkipListReader {
    levels: Vec<LevelState>,
    last_doc: DocId,
    last_fp: u64,
    last_count: usize,
    accepted: bool,
}

impl SkipListReader {
    /// `skip_fp` is the position the matching writer returned, `base_fp` the
    /// doc-stream position of the term start, `block_count` the term's total
    /// number of doc blocks.
    pub fn open(
        input: &IndexInput,
        interval: usize,
        max_levels: usize,
        skip_fp: u64,
        base_fp: u64,
        block_count: usize,
    ) -> Result<SkipListReader, BlockError> {
        let num_levels = levels_for(block_count, interval, max_levels);
        let mut cursor = input.clone();
        cursor.seek(skip_fp)?;

        let mut starts = vec![0u64; num_levels];
        for level in (1..num_levels).rev() {
            let len = cursor.read_vlong()?;
            starts[level] = cursor.position();
            cursor.seek(cursor.position() + len)?;
        }
        if num_levels > 0 {
            starts[0] = cursor.position();
        }

        let mut reader = SkipListReader {
            levels: Vec::with_capacity(num_levels),
            last_doc: 0,
            last_fp: base_fp,
            last_count: 0,
            accepted: false,
        };
        let mut per_entry_blocks = interval;
        for &start_fp in starts.iter() {
            let mut stream = input.clone();
            stream.seek(start_fp)?;
            reader.levels.push(LevelState {
                stream,
                start_fp,
                per_entry_blocks,
                total_entries: block_count / per_entry_blocks,
                consumed: 0,
                cum_doc: 0,
                cum_fp: base_fp,
                next: None,
            });
            per_entry_blocks = match per_entry_blocks.checked_mul(interval) {
                Some(next) => next,
                None => break,
            };
        }
        for level in 0..reader.levels.len() {
            reader.load_next(level)?;
        }
        Ok(reader)
    }

    /// Consumes skip entries up to (but excluding) the first one whose
    /// document id reaches `target`. Returns where the last accepted entry
    /// points, or None if no entry was ever accepted. Targets must not
    /// decrease across calls.
    pub fn skip_to(&mut self, target: DocId) -> Result<Option<SkipResult>, BlockError> {
        if self.levels.is_empty() {
            return Ok(None);
        }
        let mut level = self.levels.len() - 1;
        loop {
            let mut descend_child = None;
            while let Some(entry) = self.levels[level].next {
                if entry.doc >= target {
                    break;
                }
                self.last_doc = entry.doc;
                self.last_fp = entry.fp;
                self.last_count = entry.count;
                self.accepted = true;
                if level > 0 {
                    descend_child = Some(entry.child);
                }
                let state = &mut self.levels[level];
                state.consumed += 1;
                state.cum_doc = entry.doc;
                state.cum_fp = entry.fp;
                self.load_next(level)?;
            }
            if level == 0 {
                break;
            }
            level -= 1;
            if let Some(child) = descend_child {
                self.seek_level(level, child)?;
            }
        }
        Ok(self.accepted.then(|| SkipResult {
            doc: self.last_doc,
            doc_fp: self.last_fp,
            blocks_skipped: self.last_count - 1,
        }))
    }

    fn load_next(&mut self, level: usize) -> Result<(), BlockError> {
        let state = &mut self.levels[level];
        if state.consumed >= state.total_entries {
            state.next = None;
            return Ok(());
        }
        let doc_delta = state.stream.read_vint()?;
        let fp_delta = state.stream.read_vlong()?;
        let child = if level > 0 { state.stream.read_vlong()? } else { 0 };
        state.next = Some(LevelEntry {
            doc: state.cum_doc + doc_delta,
            fp: state.cum_fp + fp_delta,
            count: (state.consumed + 1) * state.per_entry_blocks,
            child,
        });
        Ok(())
    }

    /// Repositions `level` behind the mirror of the entry just accepted one
    /// level above it.
    fn seek_level(&mut self, level: usize, child_offset: u64) -> Result<(), BlockError> {
        let state = &mut self.levels[level];
        state.stream.seek(state.start_fp + child_offset)?;
        if self.last_count % state.per_entry_blocks != 0 {
            error!(
                "skip child pointer at block count {} not aligned to level covering {} blocks",
                self.last_count, state.per_entry_blocks
            );
            return Err(BlockError::DataCorruption(
                "misaligned skip child pointer".to_string(),
            ));
        }
        state.consumed = self.last_count / state.per_entry_blocks;
        state.cum_doc = self.last_doc;
        state.cum_fp = self.last_fp;
        self.load_next(level)
    }
}

#[cfg(test)]
mod test {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_levels_for() {
        assert_eq!(levels_for(0, 2, 10), 0);
        assert_eq!(levels_for(1, 2, 10), 0);
        assert_eq!(levels_for(2, 2, 10), 1);
        assert_eq!(levels_for(3, 2, 10), 1);
        assert_eq!(levels_for(4, 2, 10), 2);
        assert_eq!(levels_for(64, 2, 10), 6);
        assert_eq!(levels_for(313, 2, 10), 8);
        assert_eq!(levels_for(1 << 20, 2, 10), 10);
    }

    /// Blocks get first doc `10 * index` and fp `100 * index`.
    fn build_skip(dir: &std::path::Path, total_blocks: usize) -> (IndexInput, u64) {
        let path = dir.join("skip");
        let mut out = IndexOutput::create(&path).unwrap();
        let mut writer = SkipListWriter::new(2, 10);
        writer.reset(0);
        for count in 1..=total_blocks {
            if count % 2 == 0 {
                let index = (count - 1) as u32;
                writer.set_skip_data(10 * index, 100 * index as u64);
                writer.buffer_skip(count);
            }
        }
        let skip_fp = writer.write_skip(&mut out, total_blocks).unwrap().unwrap();
        out.write_footer().unwrap();
        (IndexInput::open(&path).unwrap(), skip_fp)
    }

    fn expected(total_blocks: usize, target: DocId) -> Option<SkipResult> {
        (2..=total_blocks)
            .filter(|count| count % 2 == 0)
            .map(|count| {
                let index = (count - 1) as u32;
                (count, 10 * index, 100 * index as u64)
            })
            .filter(|&(_, doc, _)| doc < target)
            .next_back()
            .map(|(count, doc, fp)| SkipResult {
                doc,
                doc_fp: fp,
                blocks_skipped: count - 1,
            })
    }

    #[test]
    fn test_skip_to_matches_linear_reference() {
        let dir = tempdir().unwrap();
        for total_blocks in [2usize, 3, 5, 16, 64, 313] {
            let (input, skip_fp) = build_skip(dir.path(), total_blocks);
            for target in [0u32, 5, 11, 95, 200, 633, 3119, 100_000] {
                let mut reader =
                    SkipListReader::open(&input, 2, 10, skip_fp, 0, total_blocks).unwrap();
                assert_eq!(
                    reader.skip_to(target).unwrap(),
                    expected(total_blocks, target),
                    "total_blocks={total_blocks} target={target}"
                );
            }
        }
    }

    #[test]
    fn test_successive_targets() {
        let dir = tempdir().unwrap();
        let total_blocks = 64;
        let (input, skip_fp) = build_skip(dir.path(), total_blocks);
        let mut reader = SkipListReader::open(&input, 2, 10, skip_fp, 0, total_blocks).unwrap();
        for target in [3u32, 42, 43, 199, 200, 580, 640, 10_000] {
            assert_eq!(
                reader.skip_to(target).unwrap(),
                expected(total_blocks, target),
                "target={target}"
            );
        }
    }

    #[test]
    fn test_below_minimum_writes_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("skip");
        let mut out = IndexOutput::create(&path).unwrap();
        let mut writer = SkipListWriter::new(2, 10);
        writer.reset(0);
        assert!(writer.write_skip(&mut out, 1).unwrap().is_none());
    }
}
