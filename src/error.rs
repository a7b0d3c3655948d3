//! Error types for mneme

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("document {0} is already indexed")]
    IdConflict(u32),

    #[error("document {0} was deleted and cannot be re-added")]
    IdTombstoned(u32),

    #[error("storage {op} failed for {name}: {source}")]
    Storage {
        op: &'static str,
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("index corruption: {0}")]
    Corruption(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Wrap a blob-store failure with the operation and blob name it hit.
    pub(crate) fn storage(op: &'static str, name: &str) -> impl FnOnce(io::Error) -> Error {
        let name = name.to_string();
        move |source| Error::Storage { op, name, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
