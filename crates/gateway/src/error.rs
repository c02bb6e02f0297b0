//! Error types for submission handling.
//!
//! # Error Mapping
//!
//! Every failure maps to a status code and a message that is safe to show to
//! the submitter. Store errors are mapped through their
//! [`ErrorCategory`](formgate_persistence::error::ErrorCategory):
//!
//! | Error | Status | Public message |
//! |-------|--------|----------------|
//! | TenantNotFound | 404 | Tenant not found |
//! | Validation | 400 | Validation failed, with field details |
//! | MissingField | 400 | Email is required |
//! | VerificationInvalid | 400 | Invalid verification code |
//! | VerificationExpired | 400 | Verification code has expired |
//! | PasswordMismatch | 400 | Passwords do not match |
//! | RecordNotFound | 404 | No user found with this email |
//! | Notification | 500 | Could not deliver the message |
//! | Store, bad request | 400 | The store's own description |
//! | Store, not found | 404 | Record not found |
//! | Store, conflict | 409 | Please retry |
//! | Store, internal | 500 | Internal error |

use formgate_persistence::StoreError;
use formgate_persistence::error::{ConnectionError, ErrorCategory};
use serde_json::{Value, json};
use thiserror::Error;

use crate::validation::ValidationError;

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors returned by [`SubmissionService`](crate::SubmissionService).
#[derive(Error, Debug)]
pub enum GatewayError {
    /// No profile is registered for the tenant.
    #[error("tenant '{tenant_id}' not found")]
    TenantNotFound {
        /// The requested tenant.
        tenant_id: String,
    },

    /// The submission broke the tenant's rules.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A field the operation needs is absent or empty.
    #[error("{field} is required")]
    MissingField {
        /// The missing field.
        field: String,
    },

    /// No unused code matched.
    #[error("invalid verification code")]
    VerificationInvalid,

    /// The code matched but has expired.
    #[error("verification code has expired")]
    VerificationExpired,

    /// The new password and its confirmation differ.
    #[error("passwords do not match")]
    PasswordMismatch,

    /// No stored record has the given address.
    #[error("no record found with this {field}")]
    RecordNotFound {
        /// The field that was looked up.
        field: String,
    },

    /// A code could not be delivered.
    #[error("sending {kind} to {destination} failed: {message}")]
    Notification {
        /// Kind of message.
        kind: String,
        /// Recipient.
        destination: String,
        /// Provider description.
        message: String,
    },

    /// The record store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GatewayError {
    /// Shorthand for [`GatewayError::MissingField`].
    pub fn missing(field: impl Into<String>) -> Self {
        GatewayError::MissingField {
            field: field.into(),
        }
    }

    /// The user-facing category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            GatewayError::Validation(_)
            | GatewayError::MissingField { .. }
            | GatewayError::VerificationInvalid
            | GatewayError::VerificationExpired
            | GatewayError::PasswordMismatch => ErrorCategory::BadRequest,
            GatewayError::TenantNotFound { .. } | GatewayError::RecordNotFound { .. } => {
                ErrorCategory::NotFound
            }
            GatewayError::Notification { .. } => ErrorCategory::Internal,
            GatewayError::Store(err) => err.category(),
        }
    }

    /// HTTP-style status code.
    pub fn status_code(&self) -> u16 {
        match self.category() {
            ErrorCategory::BadRequest => 400,
            ErrorCategory::NotFound => 404,
            ErrorCategory::Conflict => 409,
            ErrorCategory::Internal => 500,
        }
    }

    /// A message that never includes engine or provider text.
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::TenantNotFound { .. } => "Tenant not found".to_string(),
            GatewayError::Validation(_) => "Validation failed".to_string(),
            GatewayError::MissingField { field } => {
                format!("{} is required", capitalize(&field.replace('_', " ")))
            }
            GatewayError::VerificationInvalid => "Invalid verification code".to_string(),
            GatewayError::VerificationExpired => "Verification code has expired".to_string(),
            GatewayError::PasswordMismatch => "Passwords do not match".to_string(),
            GatewayError::RecordNotFound { field } => format!("No user found with this {field}"),
            GatewayError::Notification { .. } => "Could not deliver the message".to_string(),
            GatewayError::Store(err) => match err.category() {
                // Identifier, empty record and type errors describe the
                // submission itself.
                ErrorCategory::BadRequest => capitalize(&err.to_string()),
                ErrorCategory::NotFound => "Record not found".to_string(),
                ErrorCategory::Conflict => {
                    "The destination is being set up by another request, please retry".to_string()
                }
                ErrorCategory::Internal => match err {
                    StoreError::Connection(ConnectionError::Unsupported { .. }) => {
                        "The tenant's storage engine is not supported".to_string()
                    }
                    _ => "Internal error".to_string(),
                },
            },
        }
    }

    /// The error as a response body: `{"error": ..., "details": ...}`.
    ///
    /// Validation failures carry their per-field messages as details.
    pub fn to_json(&self) -> Value {
        match self {
            GatewayError::Validation(err) => json!({
                "error": self.public_message(),
                "details": err.errors,
            }),
            _ => json!({ "error": self.public_message() }),
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Errors raised while loading a tenant directory.
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// The directory file could not be read.
    #[error("cannot read tenant directory '{path}': {source}")]
    Io {
        /// Path of the file.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The directory is not valid JSON or does not match the profile layout.
    #[error("invalid tenant directory: {0}")]
    Parse(#[from] serde_json::Error),

    /// A profile has no tenant id.
    #[error("a tenant profile has an empty tenant_id")]
    MissingTenantId,

    /// Two profiles share a tenant id.
    #[error("tenant '{tenant_id}' is defined more than once")]
    Duplicate {
        /// The repeated tenant id.
        tenant_id: String,
    },

    /// A profile's storage settings are incomplete.
    #[error("tenant '{tenant_id}': {source}")]
    InvalidTenant {
        /// The offending tenant.
        tenant_id: String,
        /// What is wrong with its settings.
        #[source]
        source: ConnectionError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use formgate_persistence::EngineKind;
    use formgate_persistence::error::{ProvisionError, RejectedIdentifierError, RejectionReason};

    #[test]
    fn test_status_codes() {
        assert_eq!(
            GatewayError::TenantNotFound {
                tenant_id: "acme".to_string()
            }
            .status_code(),
            404
        );
        assert_eq!(GatewayError::missing("email").status_code(), 400);
        assert_eq!(GatewayError::VerificationExpired.status_code(), 400);
        assert_eq!(GatewayError::PasswordMismatch.status_code(), 400);
        assert_eq!(
            GatewayError::RecordNotFound {
                field: "email".to_string()
            }
            .status_code(),
            404
        );

        let conflict: GatewayError = StoreError::from(ProvisionError::Conflict {
            relation: "signups".to_string(),
        })
        .into();
        assert_eq!(conflict.status_code(), 409);
    }

    #[test]
    fn test_public_message_hides_engine_text() {
        let err: GatewayError = StoreError::EngineRejected {
            engine: EngineKind::Postgres,
            message: "relation \"signups\" violates check constraint \"secret_ck\"".to_string(),
            source: None,
        }
        .into();
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.public_message(), "Internal error");
        assert!(!err.to_json().to_string().contains("secret_ck"));

        let err: GatewayError = StoreError::from(ConnectionError::AuthFailed {
            engine: EngineKind::MySql,
            message: "Access denied for user 'forms'@'10.0.0.4'".to_string(),
        })
        .into();
        assert_eq!(err.public_message(), "Internal error");

        let err = GatewayError::Notification {
            kind: "verification".to_string(),
            destination: "jo@x.com".to_string(),
            message: "SMTP 535 authentication failed".to_string(),
        };
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.public_message(), "Could not deliver the message");
    }

    #[test]
    fn test_identifier_error_is_bad_request() {
        let err: GatewayError = StoreError::from(RejectedIdentifierError {
            name: "x;drop".to_string(),
            engine: EngineKind::Sqlite,
            reason: RejectionReason::IllegalCharacter(';'),
        })
        .into();
        assert_eq!(err.status_code(), 400);
        assert!(err.public_message().starts_with("Identifier 'x;drop' rejected"));
    }

    #[test]
    fn test_validation_json() {
        let mut details = ValidationError::default();
        details.add("email", "This field is required.");
        let err = GatewayError::from(details);

        assert_eq!(err.status_code(), 400);
        assert_eq!(
            err.to_json(),
            json!({
                "error": "Validation failed",
                "details": {"email": ["This field is required."]}
            })
        );
    }

    #[test]
    fn test_missing_field_message() {
        assert_eq!(
            GatewayError::missing("email").public_message(),
            "Email is required"
        );
        assert_eq!(
            GatewayError::missing("verification_code").to_json(),
            json!({"error": "Verification code is required"})
        );
    }
}
