//! Recipient records and mailing-list loading.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use crate::config::MailerConfig;
use crate::error::InputError;

/// One row of the mailing list: field name → value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipient {
    fields: BTreeMap<String, String>,
}

impl Recipient {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Non-empty `email` field.
    pub fn email(&self) -> Option<&str> {
        self.get("email")
    }

    /// Non-empty `user_id` field.
    pub fn user_id(&self) -> Option<&str> {
        self.get("user_id")
    }

    /// A recipient needs an email or a user id to be sent anything.
    pub fn is_eligible(&self) -> bool {
        self.email().is_some() || self.user_id().is_some()
    }

    /// Best identifier for progress output.
    pub fn label(&self) -> &str {
        self.email().or_else(|| self.user_id()).unwrap_or("(unidentified)")
    }
}

/// Read a CSV mailing list with a header row.
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<Recipient>, InputError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let mut recipients = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let fields = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect();
        recipients.push(Recipient::new(fields));
    }

    tracing::debug!(count = recipients.len(), "Loaded mailing list");
    Ok(recipients)
}

/// Load a CSV mailing list from disk.
pub fn load_csv(path: &Path) -> Result<Vec<Recipient>, InputError> {
    if !path.exists() {
        return Err(InputError::FileNotFound(path.display().to_string()));
    }
    let file = std::fs::File::open(path)?;
    read_csv(file)
}

/// Synthetic recipient for a test send to the sender's own account.
///
/// `ada@example.com` becomes `ada+test@example.com`.
pub fn test_recipient(config: &MailerConfig) -> Recipient {
    let mut fields = BTreeMap::new();
    fields.insert(
        "first_name".to_string(),
        format!("{}[test]", config.sender_first_name),
    );
    fields.insert(
        "last_name".to_string(),
        format!("{}[test]", config.sender_last_name),
    );
    fields.insert(
        "email".to_string(),
        config.sender_email.replace('@', "+test@"),
    );
    Recipient::new(fields)
}
