use thiserror::Error;

/// Coarse error classes callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input. Never retried.
    Argument,
    /// Schema or domain violation. Never retried.
    Domain,
    /// A classified backend condition the storage layer may resolve once.
    Recoverable,
    /// Anything else coming out of the SQL layer.
    Backend,
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Field '{0}' is required and has no default")]
    MissingRequired(String),

    #[error("Duplicate value: {0}")]
    Duplicate(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Cannot index parallel arrays '{0}' and '{1}'")]
    ParallelArray(String, String),

    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    #[error("Could not match an index for fields [{0}]")]
    NoMatchingIndex(String),

    #[error("Unsupported sort field '{0}'")]
    UnsupportedSort(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::Argument,
            Self::MissingRequired(_)
            | Self::Duplicate(_)
            | Self::TypeMismatch(_)
            | Self::ParallelArray(..)
            | Self::InvalidIndex(_)
            | Self::NoMatchingIndex(_)
            | Self::UnsupportedSort(_) => ErrorKind::Domain,
            Self::TableNotFound(_) => ErrorKind::Recoverable,
            Self::Connection(_) | Self::Serialization(_) | Self::Backend(_) => ErrorKind::Backend,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::Recoverable
    }
}

impl From<rmp_serde::encode::Error> for DbError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for DbError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
