use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("embedding dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("index file format error: {0}")]
    IndexFormat(String),

    #[error("vector index covers {indexed} of {ledger} ledger records; rebuild it before adding")]
    IndexOutOfSync { ledger: usize, indexed: usize },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

impl IngestError {
    /// True when the failure was caused by bad caller input rather than the environment.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            IngestError::InvalidArgument(_)
                | IngestError::MissingFileName(_)
                | IngestError::Store(StoreError::InvalidInput(_))
        )
    }
}
