use std::io;
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure modes of index construction and retrieval.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad paths or settings, reported before any index file is touched.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A term or document identifier that was never assigned.
    #[error("not found: {0}")]
    NotFound(String),

    /// Corrupt or truncated postings data.
    #[error("encoding error in {}: {reason}", path.display())]
    Encoding { path: PathBuf, reason: String },

    /// Programmer error, e.g. a non-increasing term id handed to a postings writer.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The caller-supplied deadline passed between postings fetches.
    #[error("query timed out")]
    Timeout,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn encoding(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Encoding { path: path.into(), reason: reason.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
