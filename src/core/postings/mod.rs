pub mod config;
pub mod reader;
pub mod term_state;
pub mod writer;

use std::path::{Path, PathBuf};

use crate::DocId;

pub use config::{
    PostingsConfig, DEFAULT_BLOCK_SKIP_INTERVAL, DEFAULT_MAX_BLOCK_SIZE, DEFAULT_MAX_SKIP_LEVELS,
    POSTINGS_CONFIG_FILE,
};
pub use reader::{PostingsIterator, PostingsReader};
pub use term_state::{TermState, TermStateDeserializer, TermStateSerializer};
pub use writer::{DocMapping, IdentityMapping, PostingsWriter};

pub const DOC_EXTENSION: &str = "doc";
pub const NODE_EXTENSION: &str = "nod";
pub const POS_EXTENSION: &str = "pos";
pub const SKIP_EXTENSION: &str = "skp";

pub fn stream_path(dir: &Path, segment: &str, extension: &str) -> PathBuf {
    dir.join(format!("{segment}.{extension}"))
}

/// Predicate over deleted documents, supplied by whoever tracks deletions.
pub trait LiveDocs: Send + Sync {
    fn is_live(&self, doc: DocId) -> bool;
}

impl LiveDocs for Vec<bool> {
    fn is_live(&self, doc: DocId) -> bool {
        self.get(doc as usize).copied().unwrap_or(false)
    }
}
