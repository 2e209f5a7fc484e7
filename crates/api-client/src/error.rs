/// Failure of a single backend call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never completed: connect, timeout, or body read failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("{status}: {detail}")]
    Backend { status: u16, detail: String },

    /// A declared-JSON response did not parse.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The file was rejected before any request was made.
    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Backend-provided detail message, if the failure carried one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Backend { detail, .. } => Some(detail),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Backend { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
