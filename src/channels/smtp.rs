//! SMTP channel: one long-lived authenticated session, rotated on a schedule.
//!
//! The session is opened lazily on the first send. Every `rotation.every`
//! sends it is closed, the channel sleeps for `rotation.cooldown`, and a fresh
//! session is authenticated before the next message goes out.

use async_trait::async_trait;
use lettre::address::{Address, Envelope};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{SmtpConnection, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use secrecy::{ExposeSecret, SecretString};

use crate::channels::{CredentialProvider, EmailDelivery, MailEnvelope};
use crate::config::{RotationPolicy, SmtpSettings};
use crate::error::DeliveryError;

const CHANNEL_NAME: &str = "smtp";

// ── Session seam ────────────────────────────────────────────────────

/// An open, authenticated SMTP session.
pub trait SmtpSession: Send {
    fn send(&mut self, envelope: &MailEnvelope, document: &str) -> Result<(), DeliveryError>;

    /// Terminate the session gracefully.
    fn close(&mut self) -> Result<(), DeliveryError>;
}

/// Opens authenticated sessions.
pub trait SmtpConnector: Send + Sync {
    fn connect(
        &self,
        account: &str,
        password: &SecretString,
    ) -> Result<Box<dyn SmtpSession>, DeliveryError>;
}

// ── lettre implementation ───────────────────────────────────────────

/// STARTTLS + LOGIN sessions via lettre's SMTP client.
pub struct LettreConnector {
    settings: SmtpSettings,
}

impl LettreConnector {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }
}

impl SmtpConnector for LettreConnector {
    fn connect(
        &self,
        account: &str,
        password: &SecretString,
    ) -> Result<Box<dyn SmtpSession>, DeliveryError> {
        let hello = ClientId::Domain(self.settings.helo_domain.clone());
        let connect_failed = |e: lettre::transport::smtp::Error| DeliveryError::ConnectFailed {
            name: CHANNEL_NAME.into(),
            reason: format!("{}:{}: {e}", self.settings.host, self.settings.port),
        };

        let mut conn = SmtpConnection::connect(
            (self.settings.host.as_str(), self.settings.port),
            Some(self.settings.timeout),
            &hello,
            None,
            None,
        )
        .map_err(connect_failed)?;

        let tls = TlsParameters::new(self.settings.host.clone()).map_err(connect_failed)?;
        conn.starttls(&tls, &hello).map_err(connect_failed)?;

        let creds = Credentials::new(account.to_string(), password.expose_secret().to_string());
        conn.auth(&[Mechanism::Login], &creds)
            .map_err(|e| DeliveryError::AuthFailed {
                name: CHANNEL_NAME.into(),
                reason: e.to_string(),
            })?;

        tracing::debug!(host = %self.settings.host, account, "SMTP session authenticated");
        Ok(Box::new(LettreSession { conn }))
    }
}

struct LettreSession {
    conn: SmtpConnection,
}

impl SmtpSession for LettreSession {
    fn send(&mut self, envelope: &MailEnvelope, document: &str) -> Result<(), DeliveryError> {
        let envelope = build_envelope(envelope)?;
        self.conn
            .send(&envelope, to_crlf(document).as_bytes())
            .map_err(|e| DeliveryError::SendFailed {
                name: CHANNEL_NAME.into(),
                reason: format!("SMTP send failed: {e}"),
            })?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeliveryError> {
        self.conn
            .quit()
            .map(|_| ())
            .map_err(|e| DeliveryError::SendFailed {
                name: CHANNEL_NAME.into(),
                reason: format!("SMTP quit failed: {e}"),
            })
    }
}

/// Convert addresses into a lettre envelope (to, then bcc).
pub fn build_envelope(envelope: &MailEnvelope) -> Result<Envelope, DeliveryError> {
    let from = parse_address(&envelope.from)?;
    let to = envelope
        .recipients()
        .into_iter()
        .map(parse_address)
        .collect::<Result<Vec<_>, _>>()?;
    Envelope::new(Some(from), to).map_err(|e| DeliveryError::InvalidAddress {
        address: envelope.to.clone(),
        reason: e.to_string(),
    })
}

fn parse_address(address: &str) -> Result<Address, DeliveryError> {
    address
        .trim()
        .parse()
        .map_err(|e: lettre::address::AddressError| DeliveryError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Normalize line endings to CRLF for the DATA phase.
pub fn to_crlf(document: &str) -> String {
    document.replace("\r\n", "\n").replace('\n', "\r\n")
}

// ── Channel ─────────────────────────────────────────────────────────

/// SMTP delivery with lazy connect and scheduled rotation.
pub struct SmtpChannel {
    account: String,
    connector: Box<dyn SmtpConnector>,
    credentials: Box<dyn CredentialProvider>,
    rotation: RotationPolicy,
    password: Option<SecretString>,
    session: Option<Box<dyn SmtpSession>>,
    send_count: u64,
    reconnects: u64,
}

impl SmtpChannel {
    pub fn new(
        account: impl Into<String>,
        connector: Box<dyn SmtpConnector>,
        credentials: Box<dyn CredentialProvider>,
        rotation: RotationPolicy,
    ) -> Self {
        Self {
            account: account.into(),
            connector,
            credentials,
            rotation,
            password: None,
            session: None,
            send_count: 0,
            reconnects: 0,
        }
    }

    /// Channel talking to a real server through lettre.
    pub fn with_settings(
        account: impl Into<String>,
        settings: SmtpSettings,
        credentials: Box<dyn CredentialProvider>,
    ) -> Self {
        let rotation = settings.rotation;
        Self::new(
            account,
            Box::new(LettreConnector::new(settings)),
            credentials,
            rotation,
        )
    }

    /// Sends attempted so far, including failed ones.
    pub fn send_count(&self) -> u64 {
        self.send_count
    }

    /// Scheduled rotations performed so far.
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn rotation_due(&self) -> bool {
        self.rotation.every > 0 && self.send_count != 0 && self.send_count % self.rotation.every == 0
    }

    fn open(&mut self) -> Result<(), DeliveryError> {
        if self.password.is_none() {
            self.password = Some(self.credentials.credential(&self.account)?);
        }
        let Some(password) = self.password.as_ref() else {
            return Err(DeliveryError::Credential("no password available".into()));
        };
        self.session = Some(self.connector.connect(&self.account, password)?);
        tracing::debug!(account = %self.account, "SMTP session opened");
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), DeliveryError> {
        if let Some(mut session) = self.session.take() {
            session.close()?;
            tracing::debug!(account = %self.account, "SMTP session closed");
        }
        Ok(())
    }

    async fn rotate(&mut self) -> Result<(), DeliveryError> {
        if let Err(e) = self.shutdown() {
            tracing::warn!("Ignoring error while closing SMTP session for rotation: {e}");
        }
        tracing::warn!(
            sends = self.send_count,
            "Pausing for {}s (every {} sends)...",
            self.rotation.cooldown.as_secs(),
            self.rotation.every
        );
        tokio::time::sleep(self.rotation.cooldown).await;
        self.open()?;
        self.reconnects += 1;
        Ok(())
    }
}

#[async_trait]
impl EmailDelivery for SmtpChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn send(
        &mut self,
        envelope: &MailEnvelope,
        document: &str,
    ) -> Result<(), DeliveryError> {
        // Pre-increment count decides rotation; the send counts even if the reconnect fails.
        let due = self.rotation_due();
        self.send_count += 1;
        if due {
            self.rotate().await?;
        }

        if self.session.is_none() {
            self.open()?;
        }
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| DeliveryError::SendFailed {
                name: CHANNEL_NAME.into(),
                reason: "no open session".into(),
            })?;
        session.send(envelope, document)?;

        tracing::debug!(to = %envelope.to, count = self.send_count, "Email sent");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DeliveryError> {
        self.shutdown()
    }
}

// ── Tests ───────────────────────────────────────────────────────────
