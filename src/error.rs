use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error: {status} for URL: {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("Server does not support byte ranges: {0}")]
    RangeUnsupported(String),

    #[error("Chunk {index} mismatch: {reason}")]
    ChunkMismatch { index: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl FetchError {
    /// Short machine-readable code, used in session error callbacks and reports.
    pub fn code(&self) -> &'static str {
        match self {
            FetchError::InvalidUrl(_) => "invalid_url",
            FetchError::Network(_) | FetchError::Status { .. } => "network",
            FetchError::RangeUnsupported(_) => "range_unsupported",
            FetchError::ChunkMismatch { .. } => "chunk_mismatch",
            FetchError::Io(_) => "io",
            FetchError::Csv(_) => "csv",
        }
    }
}
