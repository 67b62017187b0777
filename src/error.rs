use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("stream '{entity}': file path does not exist: {}", .path.display())]
    PathNotFound { entity: String, path: PathBuf },

    #[error(
        "stream '{entity}' has no acceptable files under {}; provide files ending in '.log'",
        .path.display()
    )]
    NoAcceptableFiles { entity: String, path: PathBuf },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("malformed log line in {} ({reason}): {line}", .file.display())]
    MalformedLogLine {
        file: PathBuf,
        line: String,
        reason: String,
    },

    #[error("invalid log format {format:?}: {reason}")]
    InvalidFormat { format: String, reason: String },

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
