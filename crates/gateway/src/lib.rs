//! # formgate-gateway - Submission Handling
//!
//! This crate turns raw form submissions into stored records for a tenant.
//! It sits on top of [`formgate_persistence`] and adds the parts of a
//! submission flow that are not about storage: looking up the tenant,
//! checking the tenant's validation rules, gating a submission behind an
//! email or SMS verification code, sending welcome messages, and the
//! password reset exchange.
//!
//! ## Flows
//!
//! | Operation | Result |
//! |-----------|--------|
//! | [`SubmissionService::submit`] | Stored record id, or a pending verification |
//! | [`SubmissionService::verify_and_submit`] | Stored record id |
//! | [`SubmissionService::request_password_reset`] | Reset code sent |
//! | [`SubmissionService::confirm_password_reset`] | Password replaced |
//! | [`SubmissionService::resend_verification`] | New code sent, older codes invalidated |
//! | [`SubmissionService::check_credentials`] | Matching record without its credential |
//!
//! ## Collaborators
//!
//! The service reaches everything outside the tenant database through traits,
//! each with an in-process implementation:
//!
//! - [`TenantDirectory`] / [`InMemoryTenantDirectory`] - tenant profiles, loadable from JSON
//! - [`VerificationStore`] / [`InMemoryVerificationStore`] - single-use codes with expiry
//! - [`Notifier`] / [`LoggingNotifier`] - template rendering and delivery
//!
//! ## Error Handling
//!
//! Every operation returns a [`GatewayError`]. Its [`status_code`](GatewayError::status_code)
//! and [`public_message`](GatewayError::public_message) are safe to show to
//! the person who submitted the form; engine-native text stays in the logs.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use formgate_gateway::{
//!     InMemoryTenantDirectory, InMemoryVerificationStore, LoggingNotifier, SubmissionService,
//! };
//! use formgate_persistence::{RecordStore, StoreSettings};
//!
//! let directory = InMemoryTenantDirectory::load("tenants.json")?;
//! let service = SubmissionService::new(
//!     RecordStore::new(StoreSettings::from_env()),
//!     Arc::new(directory),
//!     Arc::new(InMemoryVerificationStore::new()),
//!     Arc::new(LoggingNotifier::new()),
//! );
//! let outcome = service.submit(&"acme".into(), record).await?;
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod notify;
pub mod profile;
pub mod service;
pub mod validation;
pub mod verification;

pub use error::{DirectoryError, GatewayError, GatewayResult};
pub use notify::{Channel, LoggingNotifier, NotificationKind, Notifier, NotifyError};
pub use profile::{InMemoryTenantDirectory, TenantDirectory, TenantProfile, VerificationMethod};
pub use service::{CodeSent, SubmissionService, SubmitOutcome};
pub use validation::{FieldRule, FieldType, ValidationError, ValidationRules};
pub use verification::{ConsumeOutcome, InMemoryVerificationStore, IssuedCode, VerificationStore};

/// Initializes the tracing subscriber for logging.
///
/// This should be called once at application startup.
///
/// # Arguments
///
/// * `level` - The log level (error, warn, info, debug, trace)
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "formgate_gateway={level},formgate_persistence={level},formgate={level}"
        ))
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
