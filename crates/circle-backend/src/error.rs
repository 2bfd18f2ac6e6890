use circle_types::{RowError, Table};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid JSON from backend: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("malformed {table} row: {reason}")]
    Malformed { table: Table, reason: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("not found")]
    NotFound,

    #[error("realtime channel error: {0}")]
    Realtime(String),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Local(#[from] anyhow::Error),
}

impl From<RowError> for BackendError {
    fn from(e: RowError) -> Self {
        Self::Malformed {
            table: e.table,
            reason: e.reason,
        }
    }
}

impl BackendError {
    /// True for failures worth showing as "could not reach the server".
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status, .. } => *status >= 500,
            Self::Realtime(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BackendError>;
