//! Delivery channels for composed messages.

pub mod credentials;
pub mod smtp;
pub mod webhook;

pub use credentials::{CredentialProvider, PromptCredential, StaticCredential};
pub use smtp::{LettreConnector, SmtpChannel, SmtpConnector, SmtpSession};
pub use webhook::WebhookChannel;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::DeliveryError;

/// SMTP envelope addresses for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailEnvelope {
    pub from: String,
    pub to: String,
    pub bcc: Option<String>,
}

impl MailEnvelope {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            bcc: None,
        }
    }

    /// Attach a BCC address; empty strings are ignored.
    pub fn with_bcc(mut self, bcc: Option<&str>) -> Self {
        self.bcc = bcc
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        self
    }

    /// Every envelope recipient: `to`, then `bcc` if present.
    pub fn recipients(&self) -> Vec<&str> {
        std::iter::once(self.to.as_str())
            .chain(self.bcc.as_deref())
            .collect()
    }
}

/// Delivers formatted email documents.
#[async_trait]
pub trait EmailDelivery: Send {
    fn name(&self) -> &str;

    /// Send one document to the envelope recipients.
    async fn send(&mut self, envelope: &MailEnvelope, document: &str)
    -> Result<(), DeliveryError>;

    /// Release any open session. Calling it again is a no-op.
    async fn close(&mut self) -> Result<(), DeliveryError>;
}

/// Delivers JSON payloads to a per-recipient webhook.
#[async_trait]
pub trait WebhookDelivery: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, user_id: &str, payload: Map<String, Value>)
    -> Result<(), DeliveryError>;
}
