//! Error types for the project database layer.
//!
//! Driver, configuration and registry failures are collected into a single
//! [`DbError`] so callers can propagate them with `?`.

use thiserror::Error;

/// Errors raised by the engine, sessions and the model registry.
#[derive(Error, Debug)]
pub enum DbError {
    /// Error surfaced by the PostgreSQL driver
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection URL could not be parsed or uses an unsupported scheme
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),

    /// A parameter could not be encoded for the driver
    #[error("Encode error: {0}")]
    Encode(String),

    /// A result column could not be converted to JSON
    #[error("Decode error: {0}")]
    Decode(String),

    /// Invalid table or column definition, or an insert naming unknown columns
    #[error("Model error: {0}")]
    Model(String),

    /// Registry conflict (e.g., the same table registered twice)
    #[error("Registry error: {0}")]
    Registry(String),

    /// Operation attempted on a closed session
    #[error("Session is closed")]
    SessionClosed,
}

/// Result type alias using DbError.
pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// Short, stable label for the error category, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            DbError::Database(_) => "database",
            DbError::Config(_) => "config",
            DbError::InvalidUrl(_) => "invalid_url",
            DbError::Encode(_) => "encode",
            DbError::Decode(_) => "decode",
            DbError::Model(_) => "model",
            DbError::Registry(_) => "registry",
            DbError::SessionClosed => "session_closed",
        }
    }

    /// SQLSTATE reported by the server, if this error came from a statement.
    pub fn sqlstate(&self) -> Option<String> {
        match self {
            DbError::Database(sqlx::Error::Database(e)) => e.code().map(|c| c.into_owned()),
            _ => None,
        }
    }
}

impl From<envy::Error> for DbError {
    fn from(err: envy::Error) -> Self {
        DbError::Config(err.to_string())
    }
}

impl From<url::ParseError> for DbError {
    fn from(err: url::ParseError) -> Self {
        DbError::InvalidUrl(err.to_string())
    }
}
