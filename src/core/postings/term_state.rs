use crate::common::errors::BlockError;
use crate::core::block::{InputIndex, OutputIndex};
use crate::directory::{get_vint, get_vlong, put_vint, put_vlong};

/// Everything a reader needs to start enumerating one term: where its first
/// doc block starts, how many doc blocks it spans, and where its skip data
/// starts when it has any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TermState {
    pub doc_fp: u64,
    pub block_count: usize,
    pub skip_fp: Option<u64>,
}

/// Encodes consecutive term states into a term-dictionary byte buffer. File
/// positions are delta-encoded between terms; an `absolute` write re-bases
/// the chain (the first term of a dictionary block).
pub struct TermStateSerializer {
    skip_minimum: usize,
    doc_index: OutputIndex,
    last_skip_fp: u64,
}

impl TermStateSerializer {
    pub fn new(skip_minimum: usize) -> TermStateSerializer {
        TermStateSerializer {
            skip_minimum,
            doc_index: OutputIndex::new(),
            last_skip_fp: 0,
        }
    }

    pub fn write(&mut self, buf: &mut Vec<u8>, state: &TermState, absolute: bool) {
        debug_assert!(state.block_count < self.skip_minimum || state.skip_fp.is_some());
        put_vint(buf, state.block_count as u32);
        self.doc_index.mark(state.doc_fp);
        self.doc_index.write(buf, absolute);
        if let Some(skip_fp) = state.skip_fp {
            if absolute {
                put_vlong(buf, skip_fp);
            } else {
                put_vlong(buf, skip_fp - self.last_skip_fp);
            }
            self.last_skip_fp = skip_fp;
        }
    }
}

pub struct TermStateDeserializer {
    skip_minimum: usize,
    doc_index: InputIndex,
    last_skip_fp: u64,
}

impl TermStateDeserializer {
    pub fn new(skip_minimum: usize) -> TermStateDeserializer {
        TermStateDeserializer {
            skip_minimum,
            doc_index: InputIndex::new(),
            last_skip_fp: 0,
        }
    }

    pub fn read(&mut self, bytes: &mut &[u8], absolute: bool) -> Result<TermState, BlockError> {
        let block_count = get_vint(bytes)? as usize;
        self.doc_index.read(bytes, absolute)?;
        let skip_fp = if block_count >= self.skip_minimum {
            let value = get_vlong(bytes)?;
            self.last_skip_fp = if absolute {
                value
            } else {
                self.last_skip_fp + value
            };
            Some(self.last_skip_fp)
        } else {
            None
        };
        Ok(TermState {
            doc_fp: self.doc_index.file_pointer(),
            block_count,
            skip_fp,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_term_state_chain_roundtrip() {
        let states = [
            TermState { doc_fp: 0, block_count: 1, skip_fp: None },
            TermState { doc_fp: 57, block_count: 4, skip_fp: Some(10) },
            TermState { doc_fp: 310, block_count: 2, skip_fp: Some(95) },
            TermState { doc_fp: 411, block_count: 1, skip_fp: None },
        ];

        let mut buf = Vec::new();
        let mut serializer = TermStateSerializer::new(2);
        for (i, state) in states.iter().enumerate() {
            serializer.write(&mut buf, state, i == 0);
        }

        let mut cursor = buf.as_slice();
        let mut deserializer = TermStateDeserializer::new(2);
        for (i, state) in states.iter().enumerate() {
            assert_eq!(deserializer.read(&mut cursor, i == 0).unwrap(), *state);
        }
        assert!(cursor.is_empty());
    }
}
