//! Notification templates and delivery.
//!
//! Messages are rendered from a small table of default templates, one per
//! [`NotificationKind`] and [`Channel`], which a tenant may override in its
//! profile. Templates use `{{placeholder}}` syntax; each field of the
//! context record replaces its placeholder, and placeholders without a
//! matching field are left as written.
//!
//! | Kind | Email subject | Context |
//! |------|---------------|---------|
//! | `verification` | Verify your account | `code` |
//! | `welcome` | Welcome to our service! | submitted fields, credentials removed |
//! | `password_reset` | Reset your password | `code` |

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use formgate_persistence::types::Record;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::profile::TenantProfile;

/// Context field carrying a verification code.
pub const CODE_FIELD: &str = "code";

/// What a message is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A code confirming the submitter owns the address.
    Verification,
    /// Sent after a submission is stored.
    Welcome,
    /// A code authorizing a password change.
    PasswordReset,
}

impl NotificationKind {
    /// The configuration tag of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Verification => "verification",
            NotificationKind::Welcome => "welcome",
            NotificationKind::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a message reaches its recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Email to an address.
    Email,
    /// Text message to a phone number.
    Sms,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Email => write!(f, "email"),
            Channel::Sms => write!(f, "sms"),
        }
    }
}

/// An email template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTemplate {
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Per-tenant template overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateOverrides {
    /// Email templates by kind.
    pub email: HashMap<NotificationKind, EmailTemplate>,
    /// SMS texts by kind.
    pub sms: HashMap<NotificationKind, String>,
}

/// A message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    /// Subject line; email only.
    pub subject: Option<String>,
    /// Message text.
    pub body: String,
}

fn default_email(kind: NotificationKind) -> (&'static str, &'static str) {
    match kind {
        NotificationKind::Welcome => (
            "Welcome to our service!",
            "Hello {{name}},\n\nWelcome to our service! We are excited to have you on board.\n\nBest regards,\nThe Team",
        ),
        NotificationKind::Verification => (
            "Verify your account",
            "Hello,\n\nYour verification code is: {{code}}\n\nThis code will expire in 1 hour.\n\nBest regards,\nThe Team",
        ),
        NotificationKind::PasswordReset => (
            "Reset your password",
            "Hello,\n\nYou requested a password reset. Your code is: {{code}}\n\nIf you did not request this, please ignore this email.\n\nBest regards,\nThe Team",
        ),
    }
}

fn default_sms(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::Welcome => "Welcome to our service! We are excited to have you on board.",
        NotificationKind::Verification => {
            "Your verification code is: {{code}}. This code will expire in 1 hour."
        }
        NotificationKind::PasswordReset => {
            "You requested a password reset. Your code is: {{code}}. If you did not request this, please ignore this message."
        }
    }
}

/// Replaces each `{{field}}` in `template` with the field's value.
pub fn render_template(template: &str, context: &Record) -> String {
    context.iter().fold(template.to_string(), |text, (name, value)| {
        text.replace(&format!("{{{{{name}}}}}"), &value.to_string())
    })
}

impl TemplateOverrides {
    /// Renders a message, preferring the tenant's template over the default.
    pub fn render(&self, kind: NotificationKind, channel: Channel, context: &Record) -> RenderedMessage {
        match channel {
            Channel::Email => {
                let (subject, body) = match self.email.get(&kind) {
                    Some(template) => (template.subject.as_str(), template.body.as_str()),
                    None => default_email(kind),
                };
                RenderedMessage {
                    subject: Some(render_template(subject, context)),
                    body: render_template(body, context),
                }
            }
            Channel::Sms => {
                let body = self
                    .sms
                    .get(&kind)
                    .map(String::as_str)
                    .unwrap_or_else(|| default_sms(kind));
                RenderedMessage {
                    subject: None,
                    body: render_template(body, context),
                }
            }
        }
    }
}

/// A delivery failure reported by a [`Notifier`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct NotifyError {
    /// Provider-supplied description.
    pub message: String,
}

impl NotifyError {
    /// Creates an error with the given description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Delivers messages to submitters.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends a rendered notification of `kind` to `destination`.
    async fn send_notification(
        &self,
        profile: &TenantProfile,
        kind: NotificationKind,
        channel: Channel,
        destination: &str,
        context: &Record,
    ) -> Result<(), NotifyError>;

    /// Sends a verification or password reset code.
    async fn send_code(
        &self,
        profile: &TenantProfile,
        kind: NotificationKind,
        channel: Channel,
        destination: &str,
        code: &str,
    ) -> Result<(), NotifyError> {
        let context = Record::new().with(CODE_FIELD, code);
        self.send_notification(profile, kind, channel, destination, &context)
            .await
    }
}

/// A message handed to the [`LoggingNotifier`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    /// Tenant the message was sent for.
    pub tenant_id: String,
    /// Message kind.
    pub kind: NotificationKind,
    /// Delivery channel.
    pub channel: Channel,
    /// Recipient address or number.
    pub destination: String,
    /// Context the message was rendered from.
    pub context: Record,
    /// The rendered message.
    pub message: RenderedMessage,
}

/// Renders messages and emits them as tracing events.
///
/// Every message is also kept in memory and can be read back with
/// [`sent`](Self::sent).
#[derive(Debug, Default)]
pub struct LoggingNotifier {
    sent: Mutex<Vec<SentMessage>>,
}

impl LoggingNotifier {
    /// Creates a notifier with an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far, oldest first.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// The code in the most recent message to `destination`.
    pub fn last_code(&self, destination: &str) -> Option<String> {
        self.sent
            .lock()
            .iter()
            .rev()
            .filter(|m| m.destination == destination)
            .find_map(|m| m.context.get_str(CODE_FIELD).map(str::to_string))
    }
}

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send_notification(
        &self,
        profile: &TenantProfile,
        kind: NotificationKind,
        channel: Channel,
        destination: &str,
        context: &Record,
    ) -> Result<(), NotifyError> {
        let message = profile.templates.render(kind, channel, context);

        info!(
            tenant = %profile.tenant_id(),
            %kind,
            %channel,
            destination,
            subject = message.subject.as_deref().unwrap_or_default(),
            "Sending notification"
        );
        debug!(body = %message.body, "Notification body");

        self.sent.lock().push(SentMessage {
            tenant_id: profile.tenant_id().to_string(),
            kind,
            channel,
            destination: destination.to_string(),
            context: context.clone(),
            message,
        });
        Ok(())
    }
}
