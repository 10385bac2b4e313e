use credentials::CredentialError;
use http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Malformed connection string: {0}")]
    MalformedConnectionString(String),

    #[error("Failed to acquire an access token: {0}")]
    Credential(#[from] CredentialError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Result handling failed: {0}")]
    ResultHandling(String),

    #[error("The operation was cancelled before it completed")]
    Cancelled,
}

impl DbError {
    /// The vendor error code (a PostgreSQL SQLSTATE), when this error wraps
    /// a response the server actually sent. Network-level and non-database
    /// failures have no code.
    pub fn vendor_code(&self) -> Option<String> {
        match self {
            DbError::Database(sqlx::Error::Database(db)) => db.code().map(|c| c.into_owned()),
            _ => None,
        }
    }
}

/// The externally visible failure representation.
///
/// Produced exactly once per `execute_with_retry` call, when the executor
/// gives up or hits a fatal error. Callers never see the intermediate
/// attempt outcomes; the last underlying cause is attached for diagnostics.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ServiceError {
    pub status: StatusCode,
    pub message: String,
    #[source]
    pub source: Option<DbError>,
}

impl ServiceError {
    /// Wraps a terminal failure as an internal server error, the status both
    /// retry exhaustion and fatal classification surface as.
    pub fn internal(message: impl Into<String>, source: DbError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            source: Some(source),
        }
    }
}
