use thiserror::Error;

#[derive(Error, Debug)]
pub enum VqError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query execution error: {0}")]
    QueryError(String),

    #[error("Cursor error: {0}")]
    CursorError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Database error: {0}")]
    PostgresError(#[from] postgres::Error),

    #[error("SSL error: {0}")]
    SslError(#[from] openssl::error::ErrorStack),

    #[error("Readline error: {0}")]
    ReadlineError(#[from] rustyline::error::ReadlineError),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl VqError {
    /// Configuration and connection failures end the program; everything else
    /// is reported and the prompt comes back.
    pub fn is_fatal(&self) -> bool {
        matches!(self, VqError::ConfigError(_) | VqError::ConnectionError(_))
    }
}

pub type VqResult<T> = Result<T, VqError>;
