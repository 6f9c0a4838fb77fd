//! Error types for fc-agent

use thiserror::Error;

/// Main error type for agent operations
#[derive(Error, Debug)]
pub enum Error {
    /// Oracle text did not match the expected markers
    #[error("Parse failure: {0}")]
    ParseFailure(String),

    /// Snippet imports modules that are not available
    #[error("Missing dependencies: {}", .0.join(", "))]
    DependencyMissing(Vec<String>),

    #[error("Execution failure: {0}")]
    ExecutionFailure(String),

    /// `fix` was requested with nothing to fix
    #[error("No previous code execution to fix")]
    NoPriorTurn,

    /// Transport-level failure talking to the oracle
    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("No dataset loaded")]
    NoDataset,

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a parse failure
    pub fn parse_failure(msg: impl Into<String>) -> Self {
        Error::ParseFailure(msg.into())
    }

    /// Create an execution failure
    pub fn execution_failure(msg: impl Into<String>) -> Self {
        Error::ExecutionFailure(msg.into())
    }

    /// Create an oracle unavailable error
    pub fn oracle_unavailable(msg: impl Into<String>) -> Self {
        Error::OracleUnavailable(msg.into())
    }

    /// Create a dataset error
    pub fn dataset(msg: impl Into<String>) -> Self {
        Error::Dataset(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Whether the session can carry on after this error.
    ///
    /// Only a dead oracle at startup is fatal.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::OracleUnavailable(_))
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(format!("{:#}", err))
    }
}
