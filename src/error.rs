use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BankError>;

#[derive(Error, Debug)]
pub enum BankError {
    #[error("Format error: {0}")]
    FormatError(String),
    #[error("Invalid command: {0}")]
    InvalidCommandError(String),
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
    #[error("Authorization error: {0}")]
    AuthorizationError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFoundError(String),
    #[error("Insufficient funds: {0}")]
    InsufficientFundsError(String),
    #[error("Conflict: {0}")]
    ConflictError(String),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDBError(#[from] rocksdb::Error),
}

/// Coarse classification of a [`BankError`], as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Format,
    InvalidCommand,
    Authentication,
    Authorization,
    Validation,
    NotFound,
    InsufficientFunds,
    Conflict,
    Internal,
}

impl BankError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into().into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FormatError(_) => ErrorKind::Format,
            Self::InvalidCommandError(_) => ErrorKind::InvalidCommand,
            Self::AuthenticationError(_) => ErrorKind::Authentication,
            Self::AuthorizationError(_) => ErrorKind::Authorization,
            Self::ValidationError(_) => ErrorKind::Validation,
            Self::NotFoundError(_) => ErrorKind::NotFound,
            Self::InsufficientFundsError(_) => ErrorKind::InsufficientFunds,
            Self::ConflictError(_) => ErrorKind::Conflict,
            Self::InternalError(_) | Self::IoError(_) => ErrorKind::Internal,
            #[cfg(feature = "storage-rocksdb")]
            Self::RocksDBError(_) => ErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for BankError {
    fn from(err: serde_json::Error) -> Self {
        Self::InternalError(Box::new(err))
    }
}
