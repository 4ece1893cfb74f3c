pub mod extract;
pub mod hash;
pub mod scan;

pub use extract::*;
pub use hash::*;
pub use scan::*;

use std::path::PathBuf;

use thiserror::Error;

/// Problems reading a file off the inbox. Never fatal: the file stays
/// unledgered and is retried on a later cycle.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Could not decode {file} as UTF-8 text (byte offset {offset})")]
    Undecodable { file: String, offset: usize },

    #[error("File changed while being read: {0}")]
    ChangedDuringRead(String),

    #[error("Path {path} is outside inbox {root}")]
    OutsideInbox { path: PathBuf, root: PathBuf },
}
