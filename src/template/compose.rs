//! Per-recipient message composition.

use serde_json::{Map, Value};

use crate::config::{MailerConfig, TemplateMarkers};
use crate::error::TemplateError;
use crate::recipients::Recipient;
use crate::template::markdown;
use crate::template::parser::{ChannelKind, ParsedTemplate, TemplateParser};
use crate::template::tags::{self, MergeContext};

/// Boundary token separating the parts of a multipart message.
pub const MIME_BOUNDARY: &str = "2012squid";

/// A fully rendered message, tagged with the channel that delivers it.
#[derive(Debug, Clone, PartialEq)]
pub enum ComposedMessage {
    /// Headers plus a text body.
    PlainText { document: String },
    /// `multipart/alternative` document with text and HTML parts.
    Markdown { document: String },
    /// JSON object sent as webhook parameters.
    Webhook { payload: Map<String, Value> },
}

impl ComposedMessage {
    pub fn kind(&self) -> ChannelKind {
        match self {
            Self::PlainText { .. } => ChannelKind::PlainText,
            Self::Markdown { .. } => ChannelKind::Markdown,
            Self::Webhook { .. } => ChannelKind::Webhook,
        }
    }

    /// The email document, for the email channels.
    pub fn document(&self) -> Option<&str> {
        match self {
            Self::PlainText { document } | Self::Markdown { document } => Some(document),
            Self::Webhook { .. } => None,
        }
    }
}

/// Renders one template for many recipients.
///
/// The template is parsed once at construction, so structural errors
/// surface before any recipient is processed.
#[derive(Debug, Clone)]
pub struct Composer {
    template: ParsedTemplate,
    config: MailerConfig,
    config_fields: MergeContext,
}

impl Composer {
    pub fn new(
        raw_template: &str,
        markers: TemplateMarkers,
        config: MailerConfig,
    ) -> Result<Self, TemplateError> {
        let template = TemplateParser::new(markers).parse(raw_template)?;
        Ok(Self::from_parsed(template, config))
    }

    pub fn from_parsed(template: ParsedTemplate, config: MailerConfig) -> Self {
        let config_fields = config.merge_fields();
        Self {
            template,
            config,
            config_fields,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.template.kind
    }

    pub fn template(&self) -> &ParsedTemplate {
        &self.template
    }

    pub fn config(&self) -> &MailerConfig {
        &self.config
    }

    /// Render the template for one recipient.
    pub fn compose(&self, recipient: &Recipient) -> Result<ComposedMessage, TemplateError> {
        let context = tags::merge_context(&self.config_fields, recipient.fields());
        let body = tags::render(&self.template.body, &context)?;

        if self.template.kind == ChannelKind::Webhook {
            return Ok(ComposedMessage::Webhook {
                payload: parse_payload(&body)?,
            });
        }

        let subject = match &self.template.subject {
            Some(subject) => tags::render(subject, &context)?,
            None => return Err(TemplateError::MissingRegion { region: "SUBJECT" }),
        };
        let from = self.config.from_header();
        let to = recipient.email().unwrap_or_default();

        Ok(match self.template.kind {
            ChannelKind::Markdown => ComposedMessage::Markdown {
                document: format_markdown_message(&from, to, &subject, &body),
            },
            _ => ComposedMessage::PlainText {
                document: format_plain_text_message(&from, to, &subject, &body),
            },
        })
    }
}

/// Compose with the default markers.
pub fn compose(
    recipient: &Recipient,
    raw_template: &str,
    config: &MailerConfig,
) -> Result<ComposedMessage, TemplateError> {
    Composer::new(raw_template, TemplateMarkers::default(), config.clone())?.compose(recipient)
}

/// Headers followed by a blank line and the body.
pub fn format_plain_text_message(from: &str, to: &str, subject: &str, body: &str) -> String {
    format!("From: {from}\nTo: {to}\nSubject: {subject}\n\n{body}")
}

/// `multipart/alternative` document: plain-text part first, HTML part second.
pub fn format_markdown_message(from: &str, to: &str, subject: &str, body: &str) -> String {
    let plain = markdown::to_plain_text(body);
    let html = markdown::to_html_document(body);

    let mut message = String::from("MIME-Version: 1.0");
    message.push_str(&format!("\nFrom: {from}\nTo: {to}\nSubject: {subject}"));
    message.push_str(&format!(
        "\nContent-Type: multipart/alternative; boundary=\"{MIME_BOUNDARY}\"\n"
    ));
    message.push_str(&format!(
        "\n--{MIME_BOUNDARY}\nContent-Type: text/plain; charset=\"UTF-8\"\n\n{plain}"
    ));
    message.push_str(&format!(
        "\n--{MIME_BOUNDARY}\nContent-Type: text/html; charset=\"UTF-8\"\n\n{html}"
    ));
    message.push_str(&format!("\n--{MIME_BOUNDARY}--"));
    message
}

fn parse_payload(body: &str) -> Result<Map<String, Value>, TemplateError> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(TemplateError::InvalidWebhookPayload {
            reason: format!("expected an object, got {other}"),
        }),
        Err(e) => Err(TemplateError::InvalidWebhookPayload {
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MailerConfig {
        MailerConfig {
            sender_first_name: "A".into(),
            sender_last_name: "B".into(),
            sender_email: "a@b.com".into(),
            sender_display_email: Some("a@b.com".into()),
            ..Default::default()
        }
    }

    fn recipient(pairs: &[(&str, &str)]) -> Recipient {
        Recipient::from_pairs(pairs.iter().copied())
    }

    fn plain_template(subject: &str, body: &str) -> String {
        format!(
            "{{---BEGIN_SUBJECT---}}{subject}{{---END_SUBJECT---}}\n\
             {{---BEGIN_BODY---}}\n{body}\n{{---END_BODY---}}"
        )
    }

    #[test]
    fn plain_text_document() {
        let template = plain_template("Hello {{first_name}}", "Hi {{first_name}} from {{sender_first_name}}");
        let msg = compose(
            &recipient(&[("email", "ada@example.com"), ("first_name", "Ada")]),
            &template,
            &config(),
        )
        .unwrap();

        assert_eq!(msg.kind(), ChannelKind::PlainText);
        assert_eq!(
            msg.document().unwrap(),
            "From: A B <a@b.com>\nTo: ada@example.com\nSubject: Hello Ada\n\nHi Ada from A"
        );
    }

    #[test]
    fn unresolved_tag_in_body_is_error() {
        let template = plain_template("Hi", "Hi {{first_name}}");
        let err = compose(&recipient(&[("email", "a@b.com")]), &template, &config()).unwrap_err();
        assert!(matches!(err, TemplateError::UnresolvedTags { ref tags } if tags == &["first_name"]));
    }

    #[test]
    fn unresolved_tag_in_subject_is_error() {
        let template = plain_template("For {{nickname}}", "Hi");
        let err = compose(&recipient(&[("email", "a@b.com")]), &template, &config()).unwrap_err();
        assert!(matches!(err, TemplateError::UnresolvedTags { .. }));
    }

    #[test]
    fn tag_syntax_in_recipient_value_is_error() {
        let template = plain_template("Hi", "Hi {{first_name}}");
        let err = compose(
            &recipient(&[("email", "a@b.com"), ("first_name", "{{nickname}}")]),
            &template,
            &config(),
        )
        .unwrap_err();
        assert!(matches!(err, TemplateError::UnresolvedTags { ref tags } if tags == &["nickname"]));
    }

    #[test]
    fn stray_braces_in_body_are_error() {
        let template = plain_template("Hi", "a }} b {{ c");
        let err = compose(&recipient(&[("email", "a@b.com")]), &template, &config()).unwrap_err();
        assert!(matches!(err, TemplateError::UnresolvedTags { .. }));
    }

    #[test]
    fn recipient_values_override_config() {
        let template = plain_template("S", "{{sender_first_name}}");
        let msg = compose(
            &recipient(&[("email", "x@y.com"), ("sender_first_name", "Override")]),
            &template,
            &config(),
        )
        .unwrap();
        assert!(msg.document().unwrap().ends_with("\n\nOverride"));
    }

    #[test]
    fn markdown_multipart_document() {
        let template = format!(
            "{{---MARKDOWN---}}\n{}",
            plain_template("News", "# Hi {{first_name}}\n\nSome **bold** text")
        );
        let msg = compose(
            &recipient(&[("email", "ada@example.com"), ("first_name", "Ada")]),
            &template,
            &config(),
        )
        .unwrap();
        assert_eq!(msg.kind(), ChannelKind::Markdown);

        let doc = msg.document().unwrap();
        assert!(doc.starts_with("MIME-Version: 1.0\nFrom: A B <a@b.com>\nTo: ada@example.com\nSubject: News\n"));
        assert!(doc.contains("Content-Type: multipart/alternative; boundary=\"2012squid\""));
        assert!(doc.ends_with("\n--2012squid--"));

        let plain_at = doc.find("Content-Type: text/plain").unwrap();
        let html_at = doc.find("Content-Type: text/html").unwrap();
        assert!(plain_at < html_at);
        assert!(doc.contains("\n\nHi Ada\n\nSome bold text\n--2012squid"));
        assert!(doc.contains("<html><body><h1>Hi Ada</h1>"));
        assert!(doc.contains("<strong>bold</strong>"));
    }

    #[test]
    fn webhook_payload_is_json_object() {
        let template = "{---WEBHOOK---}{---BEGIN_BODY---}\
                        {\"title\": \"Hi {{first_name}}\", \"days_until_expire\": 3}\
                        {---END_BODY---}";
        let msg = compose(
            &recipient(&[("user_id", "42"), ("first_name", "Ada")]),
            template,
            &config(),
        )
        .unwrap();
        match msg {
            ComposedMessage::Webhook { payload } => {
                assert_eq!(payload["title"], "Hi Ada");
                assert_eq!(payload["days_until_expire"], 3);
            }
            other => panic!("expected webhook, got {other:?}"),
        }
    }

    #[test]
    fn webhook_invalid_json_is_error() {
        let template = "{---WEBHOOK---}{---BEGIN_BODY---}not json{---END_BODY---}";
        let err = compose(&recipient(&[("user_id", "1")]), template, &config()).unwrap_err();
        assert!(matches!(err, TemplateError::InvalidWebhookPayload { .. }));
    }

    #[test]
    fn webhook_non_object_is_error() {
        let template = "{---WEBHOOK---}{---BEGIN_BODY---}[1, 2]{---END_BODY---}";
        let err = compose(&recipient(&[("user_id", "1")]), template, &config()).unwrap_err();
        assert!(matches!(err, TemplateError::InvalidWebhookPayload { .. }));
    }

    #[test]
    fn composer_parses_once_and_reports_structure_errors() {
        let err = Composer::new("no regions here", TemplateMarkers::default(), config()).unwrap_err();
        assert!(matches!(err, TemplateError::MissingRegion { .. }));
    }
}
