use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Connectivity error: {0}")]
    Connectivity(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Submission rejected with status {status}: {body}")]
    Submission { status: u16, body: String },
    #[error("Transaction ID '{0}' not found")]
    TransactionNotFound(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Queue error: {0}")]
    Queue(String),
    #[error("Email error: {0}")]
    Email(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    /// Errors that must abort the whole invocation instead of a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::Auth(_) | RelayError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
