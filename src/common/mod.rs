pub mod errors;
pub mod file_ops;

pub use errors::*;
pub use file_ops::{atomic_save_json, read_json, FileOperationError};
