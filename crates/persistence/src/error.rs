//! Error types for the persistence layer.
//!
//! Errors follow a small hierarchy. Connection, identifier, provisioning and
//! credential failures each have their own type and are wrapped transparently
//! by [`StoreError`], which every [`RecordStore`](crate::RecordStore)
//! operation returns.
//!
//! # Categories
//!
//! Callers that face end users should not show engine-native text. Instead,
//! [`StoreError::category`] collapses every error into one of four buckets:
//!
//! | Error | Category |
//! |-------|----------|
//! | `RejectedIdentifierError` | BadRequest |
//! | `StoreError::EmptyRecord` / `InvalidRecord` / `TypeMismatch` | BadRequest |
//! | `StoreError::NotFound` | NotFound |
//! | `ProvisionError::Conflict` | Conflict |
//! | everything else | Internal |

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

use crate::core::EngineKind;

/// Boxed engine-native error kept as a source for logging.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The primary error type for all record store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Connection establishment errors
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Unsafe table, column or field names
    #[error(transparent)]
    Identifier(#[from] RejectedIdentifierError),

    /// Table provisioning errors
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    /// Password hashing errors
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// No record matched the lookup that an update was keyed on.
    #[error("no matching record in '{relation}'")]
    NotFound { relation: String },

    /// The engine or the operation deadline timed out.
    #[error("{operation} timed out")]
    Timeout { operation: String },

    /// The engine refused the statement.
    #[error("{engine} rejected the operation: {message}")]
    EngineRejected {
        engine: EngineKind,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The engine cannot perform the requested operation.
    #[error("{operation} is not supported by {engine}")]
    Unsupported {
        engine: EngineKind,
        operation: String,
    },

    /// A value cannot be stored in an existing column without loss.
    #[error("value for column '{column}' does not fit its {expected} type")]
    TypeMismatch { column: String, expected: String },

    /// A record or filter had no usable fields.
    #[error("{what} must contain at least one field")]
    EmptyRecord { what: &'static str },

    /// A payload could not be turned into a record.
    #[error("invalid record: {message}")]
    InvalidRecord { message: String },
}

/// Result type for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Coarse classification used when reporting errors to end users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The caller sent something unusable.
    BadRequest,
    /// The tenant or record does not exist.
    NotFound,
    /// A concurrent writer won a race that could not be reconciled.
    Conflict,
    /// Anything else, including misconfiguration and engine failures.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::BadRequest => write!(f, "bad request"),
            ErrorCategory::NotFound => write!(f, "not found"),
            ErrorCategory::Conflict => write!(f, "conflict"),
            ErrorCategory::Internal => write!(f, "internal error"),
        }
    }
}

impl StoreError {
    /// Wraps an engine-native error, keeping it as the source.
    pub fn engine_rejected<E>(engine: EngineKind, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::EngineRejected {
            engine,
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Returns the user-facing category for this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            StoreError::Identifier(_)
            | StoreError::EmptyRecord { .. }
            | StoreError::InvalidRecord { .. }
            | StoreError::TypeMismatch { .. } => ErrorCategory::BadRequest,
            StoreError::NotFound { .. } => ErrorCategory::NotFound,
            StoreError::Provision(ProvisionError::Conflict { .. }) => ErrorCategory::Conflict,
            _ => ErrorCategory::Internal,
        }
    }

    /// Returns true if the error came from a deadline rather than a refusal.
    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout { .. })
    }
}

/// Errors raised while opening a connection to a tenant's engine.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The engine is unknown or not compiled into this build.
    #[error("storage engine '{engine}' is not supported")]
    Unsupported { engine: String },

    /// The engine refused the supplied credentials.
    #[error("authentication with {engine} failed: {message}")]
    AuthFailed { engine: EngineKind, message: String },

    /// The engine could not be reached.
    #[error("{engine} is unreachable: {message}")]
    Unreachable {
        engine: EngineKind,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The connection settings could not be interpreted.
    #[error("invalid {engine} connection settings: {message}")]
    ParseFailed { engine: EngineKind, message: String },
}

impl ConnectionError {
    /// Builds an unreachable error from an engine-native error.
    pub fn unreachable<E>(engine: EngineKind, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ConnectionError::Unreachable {
            engine,
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Builds a parse error.
    pub fn parse_failed(engine: EngineKind, message: impl Into<String>) -> Self {
        ConnectionError::ParseFailed {
            engine,
            message: message.into(),
        }
    }
}

/// An identifier that cannot be embedded safely in a query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("identifier '{name}' rejected for {engine}: {reason}")]
pub struct RejectedIdentifierError {
    pub name: String,
    pub engine: EngineKind,
    pub reason: RejectionReason,
}

/// Why an identifier was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    #[error("identifier is empty")]
    Empty,

    #[error("contains the quote character {0:?}")]
    QuoteCharacter(char),

    #[error("contains the character {0:?}")]
    IllegalCharacter(char),

    #[error("must start with a letter or underscore")]
    IllegalStart,

    #[error("longer than {max} characters")]
    TooLong { max: usize },
}

/// Errors raised while creating a relation.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Another writer created the relation concurrently.
    #[error("relation '{relation}' was created concurrently")]
    Conflict { relation: String },

    /// The engine refused the CREATE statement.
    #[error("creating relation '{relation}' failed: {message}")]
    EngineRejected {
        relation: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl ProvisionError {
    /// Wraps an engine-native error raised by a CREATE statement.
    pub fn rejected<E>(relation: &str, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ProvisionError::EngineRejected {
            relation: relation.to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

/// Errors raised while hashing or verifying credentials.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("credential hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("credential task failed: {message}")]
    Task { message: String },
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                StoreError::Timeout {
                    operation: "sqlite statement".to_string(),
                }
            }
            _ => StoreError::engine_rejected(EngineKind::Sqlite, err),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for StoreError {
    fn from(err: tokio_postgres::Error) -> Self {
        use tokio_postgres::error::SqlState;

        if err.code() == Some(&SqlState::QUERY_CANCELED) {
            return StoreError::Timeout {
                operation: "postgres statement".to_string(),
            };
        }
        StoreError::engine_rejected(EngineKind::Postgres, err)
    }
}

#[cfg(feature = "mysql")]
impl From<mysql_async::Error> for StoreError {
    fn from(err: mysql_async::Error) -> Self {
        match &err {
            // ER_QUERY_TIMEOUT, ER_LOCK_WAIT_TIMEOUT
            mysql_async::Error::Server(server) if server.code == 3024 || server.code == 1205 => {
                StoreError::Timeout {
                    operation: "mysql statement".to_string(),
                }
            }
            _ => StoreError::engine_rejected(EngineKind::MySql, err),
        }
    }
}

#[cfg(feature = "mongodb")]
impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        match err.kind.as_ref() {
            ErrorKind::Authentication { message, .. } => {
                StoreError::Connection(ConnectionError::AuthFailed {
                    engine: EngineKind::MongoDb,
                    message: message.clone(),
                })
            }
            ErrorKind::ServerSelection { .. } => StoreError::Connection(
                ConnectionError::unreachable(EngineKind::MongoDb, err),
            ),
            ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
                StoreError::Timeout {
                    operation: "mongodb command".to_string(),
                }
            }
            _ => StoreError::engine_rejected(EngineKind::MongoDb, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_error_display() {
        let err = RejectedIdentifierError {
            name: "users\"; DROP".to_string(),
            engine: EngineKind::Postgres,
            reason: RejectionReason::QuoteCharacter('"'),
        };
        assert_eq!(
            err.to_string(),
            "identifier 'users\"; DROP' rejected for postgresql: contains the quote character '\"'"
        );
    }

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::Unsupported {
            engine: "oracle".to_string(),
        };
        assert_eq!(err.to_string(), "storage engine 'oracle' is not supported");

        let err = ConnectionError::parse_failed(EngineKind::MongoDb, "missing database name");
        assert_eq!(
            err.to_string(),
            "invalid mongodb connection settings: missing database name"
        );
    }

    #[test]
    fn test_store_error_from_connection_error() {
        let err: StoreError = ConnectionError::Unsupported {
            engine: "oracle".to_string(),
        }
        .into();
        assert!(matches!(
            err,
            StoreError::Connection(ConnectionError::Unsupported { .. })
        ));
        assert_eq!(err.category(), ErrorCategory::Internal);
    }

    #[test]
    fn test_categories() {
        let identifier: StoreError = RejectedIdentifierError {
            name: String::new(),
            engine: EngineKind::Sqlite,
            reason: RejectionReason::Empty,
        }
        .into();
        assert_eq!(identifier.category(), ErrorCategory::BadRequest);

        let conflict: StoreError = ProvisionError::Conflict {
            relation: "signups".to_string(),
        }
        .into();
        assert_eq!(conflict.category(), ErrorCategory::Conflict);

        let rejected: StoreError = ProvisionError::EngineRejected {
            relation: "signups".to_string(),
            message: "syntax error".to_string(),
            source: None,
        }
        .into();
        assert_eq!(rejected.category(), ErrorCategory::Internal);

        let not_found = StoreError::NotFound {
            relation: "users".to_string(),
        };
        assert_eq!(not_found.category(), ErrorCategory::NotFound);

        let timeout = StoreError::Timeout {
            operation: "insert".to_string(),
        };
        assert!(timeout.is_timeout());
        assert_eq!(timeout.category(), ErrorCategory::Internal);
    }

    #[test]
    fn test_engine_rejected_keeps_source() {
        use std::error::Error as _;

        let io = std::io::Error::other("disk full");
        let err = StoreError::engine_rejected(EngineKind::Sqlite, io);
        assert_eq!(err.to_string(), "sqlite rejected the operation: disk full");
        assert!(err.source().is_some());
    }
}
