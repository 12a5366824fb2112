//! Configuration types.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ConfigError;

/// Environment variable that overrides the config document path.
pub const CONFIG_PATH_ENV: &str = "MAILMERGE_CONFIG";

/// Default location of the persisted sender config.
pub const DEFAULT_CONFIG_PATH: &str = "./config.json";

// ── Sender config ───────────────────────────────────────────────────

/// Sender identity and delivery settings, persisted as a JSON document.
///
/// Immutable for the duration of a run. Every non-secret field is merged
/// into the substitution context, so templates can reference
/// `{{sender_first_name}}` or any extra key stored in the document.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct MailerConfig {
    #[serde(default)]
    pub sender_first_name: String,
    #[serde(default)]
    pub sender_last_name: String,
    /// Account used to authenticate with the SMTP server.
    #[serde(default)]
    pub sender_email: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_secret"
    )]
    pub sender_password: Option<SecretString>,
    /// Address shown in `From:` when it differs from the account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_display_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bcc_email: Option<String>,
    /// Webhook route, must contain `:user_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_route: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_secret"
    )]
    pub webhook_token: Option<SecretString>,
    /// Any other keys in the document. String values become merge fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn serialize_secret<S: Serializer>(
    secret: &Option<SecretString>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

impl MailerConfig {
    /// Address used as the visible sender and as the SMTP envelope sender.
    pub fn display_email(&self) -> &str {
        self.sender_display_email
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.sender_email)
    }

    /// `"First Last <display@address>"`.
    pub fn from_header(&self) -> String {
        format!(
            "{} {} <{}>",
            self.sender_first_name,
            self.sender_last_name,
            self.display_email()
        )
    }

    /// BCC address, if one is configured and non-empty.
    pub fn bcc(&self) -> Option<&str> {
        self.bcc_email.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Fields exposed to tag substitution. Secrets are never included.
    pub fn merge_fields(&self) -> BTreeMap<String, String> {
        let mut fields: BTreeMap<String, String> = self
            .extra
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect();

        fields.insert("sender_first_name".into(), self.sender_first_name.clone());
        fields.insert("sender_last_name".into(), self.sender_last_name.clone());
        fields.insert("sender_email".into(), self.sender_email.clone());
        fields.insert(
            "sender_display_email".into(),
            self.display_email().to_string(),
        );
        if let Some(bcc) = self.bcc() {
            fields.insert("bcc_email".into(), bcc.to_string());
        }
        if let Some(route) = &self.webhook_route {
            fields.insert("webhook_route".into(), route.clone());
        }
        fields
    }

    /// Parse a config document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Serialize to a pretty JSON document (includes a stored password if present).
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl fmt::Debug for MailerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailerConfig")
            .field("sender_first_name", &self.sender_first_name)
            .field("sender_last_name", &self.sender_last_name)
            .field("sender_email", &self.sender_email)
            .field("sender_password", &self.sender_password.as_ref().map(|_| "[REDACTED]"))
            .field("sender_display_email", &self.sender_display_email)
            .field("bcc_email", &self.bcc_email)
            .field("webhook_route", &self.webhook_route)
            .field("webhook_token", &self.webhook_token.as_ref().map(|_| "[REDACTED]"))
            .field("extra", &self.extra)
            .finish()
    }
}

// ── SMTP settings ───────────────────────────────────────────────────

/// Forced reconnect schedule for the SMTP session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Number of sends per session before rotating.
    pub every: u64,
    /// Pause between closing and reopening the session.
    pub cooldown: Duration,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            every: 75,
            cooldown: Duration::from_secs(300), // 5 minutes
        }
    }
}

/// Mail submission server settings.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    /// Domain announced in EHLO.
    pub helo_domain: String,
    pub timeout: Duration,
    pub rotation: RotationPolicy,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 587,
            helo_domain: "gmail.com".to_string(),
            timeout: Duration::from_secs(60),
            rotation: RotationPolicy::default(),
        }
    }
}

impl SmtpSettings {
    /// Defaults, overridden by `MAILMERGE_*` environment variables.
    /// Unparseable numeric values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = std::env::var("MAILMERGE_SMTP_HOST").unwrap_or(defaults.host);

        let port: u16 = std::env::var("MAILMERGE_SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.port);

        let helo_domain = std::env::var("MAILMERGE_SMTP_HELO").unwrap_or(defaults.helo_domain);

        let every: u64 = std::env::var("MAILMERGE_ROTATE_EVERY")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.rotation.every);

        let cooldown = std::env::var("MAILMERGE_COOLDOWN_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.rotation.cooldown);

        Self {
            host,
            port,
            helo_domain,
            timeout: defaults.timeout,
            rotation: RotationPolicy { every, cooldown },
        }
    }
}

// ── Template markers ────────────────────────────────────────────────

/// Literal markers recognised in a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMarkers {
    pub begin_subject: String,
    pub end_subject: String,
    pub begin_body: String,
    pub end_body: String,
    pub markdown: String,
    pub webhook: String,
}

impl Default for TemplateMarkers {
    fn default() -> Self {
        Self {
            begin_subject: "{---BEGIN_SUBJECT---}".to_string(),
            end_subject: "{---END_SUBJECT---}".to_string(),
            begin_body: "{---BEGIN_BODY---}".to_string(),
            end_body: "{---END_BODY---}".to_string(),
            markdown: "{---MARKDOWN---}".to_string(),
            webhook: "{---WEBHOOK---}".to_string(),
        }
    }
}
