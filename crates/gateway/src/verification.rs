//! Verification codes.
//!
//! A code is issued for one tenant and one destination (an email address or
//! phone number), expires after a fixed lifetime, and can be consumed once.
//! Consuming requires the same tenant, destination and code.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use formgate_persistence::tenant::TenantId;
use parking_lot::Mutex;
use rand::Rng;
use tracing::debug;
use uuid::Uuid;

use crate::notify::Channel;

/// Lifetime of a verification code, in seconds.
pub const DEFAULT_CODE_TTL_SECS: i64 = 3600;

/// Number of digits in a verification code.
pub const CODE_DIGITS: usize = 6;

/// A freshly issued code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCode {
    /// Identifier of the pending verification.
    pub verification_id: Uuid,
    /// The code sent to the destination.
    pub code: String,
    /// When the code stops being accepted.
    pub expires_at: DateTime<Utc>,
}

/// Result of presenting a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// The code matched and is now used.
    Accepted,
    /// The code matched but its lifetime has passed.
    Expired,
    /// No unused code matched.
    Invalid,
}

/// Issues and checks verification codes.
#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Issues a new code for `destination`.
    async fn issue(&self, tenant_id: &TenantId, channel: Channel, destination: &str) -> IssuedCode;

    /// Accepts and removes a matching unused code.
    async fn consume(&self, tenant_id: &TenantId, destination: &str, code: &str) -> ConsumeOutcome;

    /// Withdraws a code that could not be delivered.
    async fn revoke(&self, verification_id: Uuid);

    /// Drops every unused code for `destination`. Returns how many codes
    /// were invalidated.
    async fn invalidate_pending(&self, tenant_id: &TenantId, destination: &str) -> usize;

    /// Returns true if `destination` has an unused code.
    async fn has_pending(&self, tenant_id: &TenantId, destination: &str) -> bool;
}

#[derive(Debug, Clone)]
struct Entry {
    id: Uuid,
    tenant_id: TenantId,
    channel: Channel,
    destination: String,
    code: String,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn is_for(&self, tenant_id: &TenantId, destination: &str) -> bool {
        self.tenant_id == *tenant_id && self.destination == destination
    }
}

/// Verification codes held in memory.
///
/// Used codes are dropped at once. Unused codes are kept for one more
/// lifetime after they expire, so a resend can still find them, and are
/// pruned on the next issue after that.
#[derive(Debug)]
pub struct InMemoryVerificationStore {
    entries: Mutex<Vec<Entry>>,
    ttl: Duration,
}

impl Default for InMemoryVerificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryVerificationStore {
    /// Creates a store issuing codes valid for one hour.
    pub fn new() -> Self {
        Self::with_ttl(Duration::seconds(DEFAULT_CODE_TTL_SECS))
    }

    /// Creates a store issuing codes valid for `ttl`.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            ttl,
        }
    }

    /// Number of codes not yet used, expired or not.
    pub fn pending_count(&self) -> usize {
        self.entries.lock().len()
    }
}

fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..10u32.pow(CODE_DIGITS as u32));
    format!("{n:0width$}", width = CODE_DIGITS)
}

#[async_trait]
impl VerificationStore for InMemoryVerificationStore {
    async fn issue(&self, tenant_id: &TenantId, channel: Channel, destination: &str) -> IssuedCode {
        let entry = Entry {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.clone(),
            channel,
            destination: destination.to_string(),
            code: generate_code(),
            expires_at: Utc::now() + self.ttl,
        };
        debug!(tenant = %tenant_id, %channel, verification_id = %entry.id, "Issued verification code");

        let issued = IssuedCode {
            verification_id: entry.id,
            code: entry.code.clone(),
            expires_at: entry.expires_at,
        };
        let mut entries = self.entries.lock();
        let now = Utc::now();
        entries.retain(|e| e.expires_at + self.ttl >= now);
        entries.push(entry);
        issued
    }

    async fn consume(&self, tenant_id: &TenantId, destination: &str, code: &str) -> ConsumeOutcome {
        let mut entries = self.entries.lock();
        let Some(index) = entries
            .iter()
            .position(|e| e.is_for(tenant_id, destination) && e.code == code)
        else {
            return ConsumeOutcome::Invalid;
        };

        if Utc::now() > entries[index].expires_at {
            return ConsumeOutcome::Expired;
        }
        let entry = entries.swap_remove(index);
        debug!(tenant = %tenant_id, channel = %entry.channel, verification_id = %entry.id, "Verification code accepted");
        ConsumeOutcome::Accepted
    }

    async fn revoke(&self, verification_id: Uuid) {
        self.entries.lock().retain(|e| e.id != verification_id);
    }

    async fn invalidate_pending(&self, tenant_id: &TenantId, destination: &str) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| !e.is_for(tenant_id, destination));
        before - entries.len()
    }

    async fn has_pending(&self, tenant_id: &TenantId, destination: &str) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|e| e.is_for(tenant_id, destination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acme() -> TenantId {
        TenantId::new("acme")
    }

    #[test]
    fn test_generate_code() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_DIGITS);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn test_issue_and_consume_once() {
        let store = InMemoryVerificationStore::new();
        let issued = store.issue(&acme(), Channel::Email, "jo@x.com").await;
        assert!(issued.expires_at > Utc::now() + Duration::minutes(59));

        assert_eq!(
            store.consume(&acme(), "jo@x.com", &issued.code).await,
            ConsumeOutcome::Accepted
        );
        assert_eq!(
            store.consume(&acme(), "jo@x.com", &issued.code).await,
            ConsumeOutcome::Invalid
        );
    }

    #[tokio::test]
    async fn test_code_bound_to_tenant_and_destination() {
        let store = InMemoryVerificationStore::new();
        let issued = store.issue(&acme(), Channel::Email, "jo@x.com").await;

        assert_eq!(
            store.consume(&TenantId::new("beta"), "jo@x.com", &issued.code).await,
            ConsumeOutcome::Invalid
        );
        assert_eq!(
            store.consume(&acme(), "ann@x.com", &issued.code).await,
            ConsumeOutcome::Invalid
        );
        assert!(store.has_pending(&acme(), "jo@x.com").await);
    }

    #[tokio::test]
    async fn test_expired_code() {
        let store = InMemoryVerificationStore::with_ttl(Duration::seconds(-1));
        let issued = store.issue(&acme(), Channel::Sms, "+15550100").await;

        assert_eq!(
            store.consume(&acme(), "+15550100", &issued.code).await,
            ConsumeOutcome::Expired
        );
        // An expired code is still pending until it is replaced.
        assert!(store.has_pending(&acme(), "+15550100").await);
    }

    #[tokio::test]
    async fn test_revoke() {
        let store = InMemoryVerificationStore::new();
        let issued = store.issue(&acme(), Channel::Email, "jo@x.com").await;
        store.revoke(issued.verification_id).await;

        assert!(!store.has_pending(&acme(), "jo@x.com").await);
        assert_eq!(
            store.consume(&acme(), "jo@x.com", &issued.code).await,
            ConsumeOutcome::Invalid
        );
    }

    #[tokio::test]
    async fn test_used_codes_are_not_retained() {
        let store = InMemoryVerificationStore::new();
        for _ in 0..200 {
            let issued = store.issue(&acme(), Channel::Email, "jo@x.com").await;
            assert_eq!(
                store.consume(&acme(), "jo@x.com", &issued.code).await,
                ConsumeOutcome::Accepted
            );
        }
        assert_eq!(store.entries.lock().len(), 0);

        for _ in 0..50 {
            store.issue(&acme(), Channel::Email, "ann@x.com").await;
            store.invalidate_pending(&acme(), "ann@x.com").await;
        }
        assert_eq!(store.entries.lock().len(), 0);
    }

    #[tokio::test]
    async fn test_stale_codes_pruned_on_issue() {
        let store = InMemoryVerificationStore::with_ttl(Duration::seconds(-1));
        for _ in 0..100 {
            store.issue(&acme(), Channel::Sms, "+15550100").await;
        }
        // Only the newest code survives; older ones were past their grace period.
        assert_eq!(store.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_pending() {
        let store = InMemoryVerificationStore::new();
        let first = store.issue(&acme(), Channel::Email, "jo@x.com").await;
        store.issue(&acme(), Channel::Email, "jo@x.com").await;
        store.issue(&acme(), Channel::Email, "ann@x.com").await;

        assert_eq!(store.invalidate_pending(&acme(), "jo@x.com").await, 2);
        assert!(!store.has_pending(&acme(), "jo@x.com").await);
        assert!(store.has_pending(&acme(), "ann@x.com").await);
        assert_eq!(store.pending_count(), 1);
        assert_eq!(
            store.consume(&acme(), "jo@x.com", &first.code).await,
            ConsumeOutcome::Invalid
        );
    }
}
