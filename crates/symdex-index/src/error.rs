//! Error types for the index.

use std::path::PathBuf;

use symdex_formats::ParseError;
use thiserror::Error;

/// Error type for building and querying the index.
#[derive(Error, Debug)]
pub enum Error {
    /// Opening or mapping a file failed.
    #[error("{}: {source}", path.display())]
    Os {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file's ELF or DWARF data could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The DIE hash ran out of slots.
    #[error("DIE hash is full")]
    HashFull,

    /// `find` matched nothing.
    #[error("no DIE named {0:?}")]
    NotFound(String),

    /// A collaborator factory failed to build an object for a result.
    #[error("object construction failed: {0}")]
    Factory(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, Error>;
