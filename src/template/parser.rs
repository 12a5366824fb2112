//! Template region extraction and channel classification.

use regex::Regex;

use crate::config::TemplateMarkers;
use crate::error::TemplateError;

/// How a composed message is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    PlainText,
    Markdown,
    Webhook,
}

impl ChannelKind {
    /// Email channels go over SMTP; webhook goes over HTTP.
    pub fn is_email(self) -> bool {
        !matches!(self, Self::Webhook)
    }
}

/// A template split into its regions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTemplate {
    /// `None` for webhook templates, which have no subject.
    pub subject: Option<String>,
    pub body: String,
    pub kind: ChannelKind,
}

/// A begin/end marker pair compiled into a dot-all greedy match.
struct Region {
    name: &'static str,
    begin: String,
    end: String,
    regex: Regex,
}

impl Region {
    fn new(name: &'static str, begin: &str, end: &str) -> Self {
        let pattern = format!("(?s){}(.*){}", regex::escape(begin), regex::escape(end));
        let regex = Regex::new(&pattern).expect("escaped markers always form a valid regex");
        Self {
            name,
            begin: begin.to_string(),
            end: end.to_string(),
            regex,
        }
    }

    /// Contents between the first begin marker and the last end marker, trimmed.
    ///
    /// Another begin or end marker inside that span means the template holds
    /// more than one region.
    fn extract(&self, raw: &str) -> Result<String, TemplateError> {
        let inner = self
            .regex
            .captures(raw)
            .and_then(|c| c.get(1))
            .ok_or(TemplateError::MissingRegion { region: self.name })?
            .as_str();

        if inner.contains(&self.begin) || inner.contains(&self.end) {
            return Err(TemplateError::DuplicateRegion { region: self.name });
        }
        Ok(inner.trim().to_string())
    }
}

/// Parses raw templates against a fixed set of markers.
pub struct TemplateParser {
    markers: TemplateMarkers,
    subject: Region,
    body: Region,
}

impl TemplateParser {
    pub fn new(markers: TemplateMarkers) -> Self {
        let subject = Region::new("SUBJECT", &markers.begin_subject, &markers.end_subject);
        let body = Region::new("BODY", &markers.begin_body, &markers.end_body);
        Self {
            markers,
            subject,
            body,
        }
    }

    pub fn markers(&self) -> &TemplateMarkers {
        &self.markers
    }

    /// Classify by marker literals in the raw text. Webhook wins over markdown.
    pub fn classify(&self, raw: &str) -> ChannelKind {
        if raw.contains(&self.markers.webhook) {
            ChannelKind::Webhook
        } else if raw.contains(&self.markers.markdown) {
            ChannelKind::Markdown
        } else {
            ChannelKind::PlainText
        }
    }

    /// Split a template into subject, body and channel.
    pub fn parse(&self, raw: &str) -> Result<ParsedTemplate, TemplateError> {
        let kind = self.classify(raw);
        let subject = match kind {
            ChannelKind::Webhook => None,
            ChannelKind::PlainText | ChannelKind::Markdown => Some(self.subject.extract(raw)?),
        };
        let body = self.body.extract(raw)?;
        Ok(ParsedTemplate {
            subject,
            body,
            kind,
        })
    }
}

impl Default for TemplateParser {
    fn default() -> Self {
        Self::new(TemplateMarkers::default())
    }
}

/// Parse with the default markers.
pub fn parse(raw: &str) -> Result<ParsedTemplate, TemplateError> {
    TemplateParser::default().parse(raw)
}
