//! The submission service.

use std::fmt;
use std::sync::Arc;

use formgate_persistence::RecordStore;
use formgate_persistence::error::ErrorCategory;
use formgate_persistence::tenant::TenantId;
use formgate_persistence::types::{CONFIRM_PASSWORD_FIELD, Record, RecordId};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult};
use crate::notify::{Channel, NotificationKind, Notifier};
use crate::profile::{TenantDirectory, TenantProfile};
use crate::validation::PASSWORD_FIELD;
use crate::verification::{ConsumeOutcome, VerificationStore};

/// Field that receives email notifications.
pub const EMAIL_FIELD: &str = "email";

/// Field that receives SMS notifications.
pub const PHONE_FIELD: &str = "phone";

/// Result of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// A code was sent; the submission is stored once the code comes back.
    VerificationRequired {
        /// Identifier of the pending verification.
        verification_id: Uuid,
        /// Where the code was sent.
        destination: String,
    },
    /// The submission was stored.
    Stored {
        /// Identifier the tenant's engine assigned.
        id: RecordId,
    },
}

/// A code sent for a password reset or a resent verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeSent {
    /// Identifier of the pending verification.
    pub verification_id: Uuid,
    /// Where the code was sent.
    pub destination: String,
}

/// Validates, gates and stores form submissions for every tenant.
///
/// The service is cheap to clone; clones share their collaborators.
#[derive(Clone)]
pub struct SubmissionService {
    store: RecordStore,
    directory: Arc<dyn TenantDirectory>,
    verifications: Arc<dyn VerificationStore>,
    notifier: Arc<dyn Notifier>,
}

impl fmt::Debug for SubmissionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmissionService")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl SubmissionService {
    /// Creates a service over the given store and collaborators.
    pub fn new(
        store: RecordStore,
        directory: Arc<dyn TenantDirectory>,
        verifications: Arc<dyn VerificationStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            directory,
            verifications,
            notifier,
        }
    }

    /// The underlying record store.
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Validates a submission and either stores it or sends a verification
    /// code, depending on the tenant's verification method.
    ///
    /// Stored submissions trigger welcome messages to their `email` and
    /// `phone` fields; a failed welcome message does not fail the call.
    #[instrument(skip_all, fields(tenant = %tenant_id))]
    pub async fn submit(&self, tenant_id: &TenantId, record: Record) -> GatewayResult<SubmitOutcome> {
        async {
            let profile = self.profile(tenant_id).await?;
            profile.rules.validate(&record)?;

            if profile.verification.is_required() {
                let field = profile.verification.field();
                let destination = required_text(&record, field)?;
                let sent = self
                    .send_code(&profile, NotificationKind::Verification, destination)
                    .await?;
                return Ok(SubmitOutcome::VerificationRequired {
                    verification_id: sent.verification_id,
                    destination: sent.destination,
                });
            }

            let id = self.store_and_welcome(&profile, record).await?;
            Ok(SubmitOutcome::Stored { id })
        }
        .await
        .inspect_err(|err| report("submit", err))
    }

    /// Checks a verification code and stores the submission it gated.
    #[instrument(skip_all, fields(tenant = %tenant_id))]
    pub async fn verify_and_submit(
        &self,
        tenant_id: &TenantId,
        code: &str,
        record: Record,
    ) -> GatewayResult<RecordId> {
        async {
            let profile = self.profile(tenant_id).await?;
            if code.trim().is_empty() {
                return Err(GatewayError::missing("verification_code"));
            }
            if record.is_empty() {
                return Err(GatewayError::missing("data"));
            }
            profile.rules.validate(&record)?;

            let destination = required_text(&record, profile.verification.field())?;
            self.consume(&profile, destination, code).await?;

            self.store_and_welcome(&profile, record).await
        }
        .await
        .inspect_err(|err| report("verify_and_submit", err))
    }

    /// Sends a password reset code to an existing user.
    #[instrument(skip_all, fields(tenant = %tenant_id))]
    pub async fn request_password_reset(
        &self,
        tenant_id: &TenantId,
        destination: &str,
    ) -> GatewayResult<CodeSent> {
        async {
            let profile = self.profile(tenant_id).await?;
            let field = profile.verification.field();
            if destination.trim().is_empty() {
                return Err(GatewayError::missing(field));
            }

            let filter = Record::new().with(field, destination);
            if self.store.find_one(&profile.storage, &filter).await?.is_none() {
                return Err(GatewayError::RecordNotFound {
                    field: field.to_string(),
                });
            }

            self.send_code(&profile, NotificationKind::PasswordReset, destination)
                .await
        }
        .await
        .inspect_err(|err| report("request_password_reset", err))
    }

    /// Checks a password reset code and replaces the user's password.
    #[instrument(skip_all, fields(tenant = %tenant_id))]
    pub async fn confirm_password_reset(
        &self,
        tenant_id: &TenantId,
        destination: &str,
        code: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> GatewayResult<()> {
        async {
            let profile = self.profile(tenant_id).await?;
            if code.trim().is_empty() {
                return Err(GatewayError::missing("verification_code"));
            }
            if new_password.is_empty() {
                return Err(GatewayError::missing("new_password"));
            }
            if confirm_password.is_empty() {
                return Err(GatewayError::missing(CONFIRM_PASSWORD_FIELD));
            }
            if new_password != confirm_password {
                return Err(GatewayError::PasswordMismatch);
            }
            let field = profile.verification.field();
            if destination.trim().is_empty() {
                return Err(GatewayError::missing(field));
            }

            self.consume(&profile, destination, code).await?;

            let filter = Record::new().with(field, destination);
            let not_found = || GatewayError::RecordNotFound {
                field: field.to_string(),
            };
            if self.store.find_one(&profile.storage, &filter).await?.is_none() {
                return Err(not_found());
            }
            if !self
                .store
                .update_password(&profile.storage, filter, new_password)
                .await?
            {
                return Err(not_found());
            }
            info!(tenant = %tenant_id, "Password updated");
            Ok(())
        }
        .await
        .inspect_err(|err| report("confirm_password_reset", err))
    }

    /// Replaces any pending verification code for `destination` with a new one.
    ///
    /// The destination must belong to a stored user or have a pending code.
    #[instrument(skip_all, fields(tenant = %tenant_id))]
    pub async fn resend_verification(
        &self,
        tenant_id: &TenantId,
        destination: &str,
    ) -> GatewayResult<CodeSent> {
        async {
            let profile = self.profile(tenant_id).await?;
            let field = profile.verification.field();
            if destination.trim().is_empty() {
                return Err(GatewayError::missing(field));
            }

            let filter = Record::new().with(field, destination);
            let known = self.store.find_one(&profile.storage, &filter).await?.is_some()
                || self.verifications.has_pending(tenant_id, destination).await;
            if !known {
                return Err(GatewayError::RecordNotFound {
                    field: field.to_string(),
                });
            }

            self.verifications
                .invalidate_pending(tenant_id, destination)
                .await;
            self.send_code(&profile, NotificationKind::Verification, destination)
                .await
        }
        .await
        .inspect_err(|err| report("resend_verification", err))
    }

    /// Looks up a user by `filter` and checks `password` against the stored
    /// credential. Returns the user without the credential on a match.
    #[instrument(skip_all, fields(tenant = %tenant_id))]
    pub async fn check_credentials(
        &self,
        tenant_id: &TenantId,
        filter: &Record,
        password: &str,
    ) -> GatewayResult<Option<Record>> {
        async {
            let profile = self.profile(tenant_id).await?;
            Ok(self
                .store
                .verify_credential(&profile.storage, filter, password)
                .await?)
        }
        .await
        .inspect_err(|err| report("check_credentials", err))
    }

    async fn profile(&self, tenant_id: &TenantId) -> GatewayResult<TenantProfile> {
        self.directory
            .lookup(tenant_id)
            .await
            .ok_or_else(|| GatewayError::TenantNotFound {
                tenant_id: tenant_id.to_string(),
            })
    }

    async fn consume(&self, profile: &TenantProfile, destination: &str, code: &str) -> GatewayResult<()> {
        match self
            .verifications
            .consume(profile.tenant_id(), destination, code.trim())
            .await
        {
            ConsumeOutcome::Accepted => Ok(()),
            ConsumeOutcome::Expired => Err(GatewayError::VerificationExpired),
            ConsumeOutcome::Invalid => Err(GatewayError::VerificationInvalid),
        }
    }

    /// Issues a code and sends it; the code is withdrawn if sending fails.
    async fn send_code(
        &self,
        profile: &TenantProfile,
        kind: NotificationKind,
        destination: &str,
    ) -> GatewayResult<CodeSent> {
        let channel = profile.verification.channel();
        let issued = self
            .verifications
            .issue(profile.tenant_id(), channel, destination)
            .await;

        if let Err(err) = self
            .notifier
            .send_code(profile, kind, channel, destination, &issued.code)
            .await
        {
            self.verifications.revoke(issued.verification_id).await;
            return Err(GatewayError::Notification {
                kind: kind.to_string(),
                destination: destination.to_string(),
                message: err.message,
            });
        }

        Ok(CodeSent {
            verification_id: issued.verification_id,
            destination: destination.to_string(),
        })
    }

    async fn store_and_welcome(&self, profile: &TenantProfile, record: Record) -> GatewayResult<RecordId> {
        let context = record.without(PASSWORD_FIELD).without(CONFIRM_PASSWORD_FIELD);
        let id = self.store.insert(&profile.storage, record).await?;
        info!(tenant = %profile.tenant_id(), %id, "Stored submission");

        for (field, channel) in [(EMAIL_FIELD, Channel::Email), (PHONE_FIELD, Channel::Sms)] {
            let Some(destination) = context.get_str(field).filter(|d| !d.is_empty()) else {
                continue;
            };
            if let Err(err) = self
                .notifier
                .send_notification(profile, NotificationKind::Welcome, channel, destination, &context)
                .await
            {
                warn!(tenant = %profile.tenant_id(), %channel, error = %err, "Welcome message not sent");
            }
        }
        Ok(id)
    }
}

/// Returns the text of a field that must be present and non-empty.
fn required_text<'a>(record: &'a Record, field: &str) -> GatewayResult<&'a str> {
    record
        .get_str(field)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| GatewayError::missing(field))
}

fn report(operation: &str, err: &GatewayError) {
    if err.category() == ErrorCategory::Internal {
        error!(operation, error = %err, "Submission operation failed");
    }
}
