use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HoneypotError {
    // Recorder or blocklist could not read/write its file
    #[error("storage unavailable at {}: {source}", path.display())]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed record on line {line}: {source}")]
    MalformedRecord {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    // Identity cannot be used as a storage key
    #[error("invalid client identity {0:?}")]
    InvalidIdentity(String),

    #[error("request log root {} does not exist, has the honeypot run yet?", .0.display())]
    MissingLogRoot(PathBuf),

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl HoneypotError {
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        HoneypotError::StorageUnavailable {
            path: path.into(),
            source,
        }
    }
}
