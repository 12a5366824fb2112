//! Dispatch loop: compose and deliver one message per recipient, in order.

use crate::channels::{EmailDelivery, MailEnvelope, WebhookDelivery};
use crate::error::{ConfigError, DeliveryError, Error};
use crate::recipients::Recipient;
use crate::template::{ChannelKind, ComposedMessage, Composer};

/// What to do when a single delivery fails.
///
/// Template and tag errors always abort; this only governs delivery errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the run at the first delivery error.
    #[default]
    Abort,
    /// Record the error and move on to the next recipient.
    Continue,
}

/// Outcome of a completed run.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub sent: usize,
    pub skipped: usize,
    /// Recipient label and error, for deliveries continued past.
    pub failures: Vec<(String, DeliveryError)>,
}

/// Owns the delivery channels for the duration of a run.
pub struct Dispatcher {
    composer: Composer,
    email: Box<dyn EmailDelivery>,
    webhook: Option<Box<dyn WebhookDelivery>>,
    policy: FailurePolicy,
}

impl Dispatcher {
    /// Fails if the template needs a webhook channel and none was given.
    pub fn new(
        composer: Composer,
        email: Box<dyn EmailDelivery>,
        webhook: Option<Box<dyn WebhookDelivery>>,
    ) -> Result<Self, ConfigError> {
        if composer.kind() == ChannelKind::Webhook && webhook.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "webhook_route".into(),
                hint: "The template is a webhook template but no webhook is configured".into(),
            });
        }
        Ok(Self {
            composer,
            email,
            webhook,
            policy: FailurePolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Send to every eligible recipient. The email channel is closed on
    /// every exit path, whether or not anything was sent over it.
    pub async fn run(&mut self, recipients: &[Recipient]) -> Result<DispatchReport, Error> {
        let mut report = DispatchReport::default();
        let outcome = self.send_all(recipients, &mut report).await;

        if let Err(e) = self.email.close().await {
            tracing::warn!("Failed to close {} channel: {e}", self.email.name());
        }

        outcome.map(|()| report)
    }

    async fn send_all(
        &mut self,
        recipients: &[Recipient],
        report: &mut DispatchReport,
    ) -> Result<(), Error> {
        let total = recipients.len();
        let kind = self.composer.kind();

        for (i, recipient) in recipients.iter().enumerate() {
            if !recipient.is_eligible() {
                tracing::warn!(row = i + 1, "Skipping row with neither email nor user_id");
                report.skipped += 1;
                continue;
            }
            let identifier = match kind {
                ChannelKind::Webhook => recipient.user_id(),
                ChannelKind::PlainText | ChannelKind::Markdown => recipient.email(),
            };
            let Some(identifier) = identifier else {
                tracing::warn!(
                    row = i + 1,
                    "Skipping {} (no {} for this channel)",
                    recipient.label(),
                    if kind.is_email() { "email" } else { "user_id" }
                );
                report.skipped += 1;
                continue;
            };

            let message = self.composer.compose(recipient)?;
            tracing::info!(progress = %format!("{}/{total}", i + 1), "Sending {identifier}...");

            let delivered = match &message {
                ComposedMessage::Webhook { payload } => match &self.webhook {
                    Some(webhook) => webhook.send(identifier, payload.clone()).await,
                    None => Err(DeliveryError::SendFailed {
                        name: "webhook".into(),
                        reason: "no webhook channel configured".into(),
                    }),
                },
                ComposedMessage::PlainText { document } | ComposedMessage::Markdown { document } => {
                    let config = self.composer.config();
                    let envelope =
                        MailEnvelope::new(config.display_email(), identifier).with_bcc(config.bcc());
                    self.email.send(&envelope, document).await
                }
            };

            match delivered {
                Ok(()) => report.sent += 1,
                Err(e) => match self.policy {
                    FailurePolicy::Abort => return Err(e.into()),
                    FailurePolicy::Continue => {
                        tracing::error!("Delivery to {identifier} failed: {e}");
                        report.failures.push((identifier.to_string(), e));
                    }
                },
            }
        }
        Ok(())
    }
}
