use std::{io, path::PathBuf};

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while building, fetching or aggregating.
///
/// `Configuration`, `CacheCorrupt` and `Io` are fatal and abort the run.
/// The remaining variants describe a single task or chunk and are recovered
/// locally by the fetch pipeline and the aggregator.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("failed fetching chunk #{index}: {source}")]
    Network {
        index: usize,
        #[source]
        source: NetworkError,
    },

    #[error("chunk `{}` contains no usable features", path.display())]
    EmptyChunk { path: PathBuf },

    #[error("failed parsing chunk `{}`: {reason}", path.display())]
    ChunkParse { path: PathBuf, reason: String },

    #[error("cache file `{}` is corrupt ({reason}), delete it to rebuild", path.display())]
    CacheCorrupt { path: PathBuf, reason: String },

    #[error("i/o error on `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::CacheCorrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// A failed network request for a single chunk.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum NetworkError {
    #[error("request timed out")]
    Timeout,

    #[error("server responded with status {0}")]
    Status(u16),

    #[error("connection failed: {0}")]
    Connection(String),
}
