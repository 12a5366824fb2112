//! Error types for mailmerge.

/// Top-level error type for a dispatch run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Input error: {0}")]
    Input(#[from] InputError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Template structure and substitution errors. All of these abort the run.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Template should have one {region} region, found none")]
    MissingRegion { region: &'static str },

    #[error("Template should have one {region} region, found more than one")]
    DuplicateRegion { region: &'static str },

    #[error(
        "Template contains merge tags that are not in the config or mailing list: {}",
        describe_tags(.tags)
    )]
    UnresolvedTags { tags: Vec<String> },

    #[error("Webhook body is not a valid JSON object: {reason}")]
    InvalidWebhookPayload { reason: String },
}

fn describe_tags(tags: &[String]) -> String {
    if tags.is_empty() {
        return "unmatched {{ }} left in the rendered text".to_string();
    }
    tags.iter()
        .map(|t| format!("{{{{{t}}}}}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Delivery errors from the SMTP and webhook channels.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Channel {name} failed to connect: {reason}")]
    ConnectFailed { name: String, reason: String },

    #[error("Authentication failed for channel {name}: {reason}")]
    AuthFailed { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Webhook HTTP status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Could not obtain credential: {0}")]
    Credential(String),
}

impl DeliveryError {
    /// Remote HTTP status, when the failure came from a webhook response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors reading operator input (recipient lists, prompts, files).
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("No file selected for {0}")]
    Cancelled(String),
}

/// Result type alias for mailmerge.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_tags_message_lists_tags() {
        let err = TemplateError::UnresolvedTags {
            tags: vec!["first_name".into(), "city".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("{{first_name}}"));
        assert!(msg.contains("{{city}}"));
    }

    #[test]
    fn unresolved_tags_message_without_names() {
        let err = TemplateError::UnresolvedTags { tags: vec![] };
        assert!(err.to_string().ends_with("unmatched {{ }} left in the rendered text"));
    }

    #[test]
    fn http_error_exposes_status() {
        let err = DeliveryError::Http {
            status: 404,
            message: "Not Found".into(),
        };
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("404"));
        assert_eq!(DeliveryError::Credential("x".into()).status(), None);
    }

    #[test]
    fn nested_errors_convert_to_top_level() {
        let err: Error = TemplateError::MissingRegion { region: "BODY" }.into();
        assert!(matches!(err, Error::Template(_)));
        assert!(err.to_string().contains("BODY"));
    }
}
