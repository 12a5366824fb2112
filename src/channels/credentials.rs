//! Credential sources for SMTP authentication.

use std::io::{BufRead, Write};

use secrecy::SecretString;

use crate::error::DeliveryError;

/// Supplies the SMTP password for an account.
pub trait CredentialProvider: Send + Sync {
    fn credential(&self, account: &str) -> Result<SecretString, DeliveryError>;
}

impl<F> CredentialProvider for F
where
    F: Fn(&str) -> Result<SecretString, DeliveryError> + Send + Sync,
{
    fn credential(&self, account: &str) -> Result<SecretString, DeliveryError> {
        self(account)
    }
}

/// A password stored in the config document.
pub struct StaticCredential(SecretString);

impl StaticCredential {
    pub fn new(secret: SecretString) -> Self {
        Self(secret)
    }
}

impl CredentialProvider for StaticCredential {
    fn credential(&self, _account: &str) -> Result<SecretString, DeliveryError> {
        Ok(self.0.clone())
    }
}

/// Asks for the password on the terminal. Nothing is written to disk.
pub struct PromptCredential;

impl CredentialProvider for PromptCredential {
    fn credential(&self, account: &str) -> Result<SecretString, DeliveryError> {
        let stdin = std::io::stdin();
        let mut input = stdin.lock();
        let mut output = std::io::stderr();
        read_secret(&mut input, &mut output, account)
    }
}

/// Prompt on `output` and read one line from `input`.
pub fn read_secret<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    account: &str,
) -> Result<SecretString, DeliveryError> {
    write!(output, "Enter password for {account} (won't be saved): ")
        .and_then(|_| output.flush())
        .map_err(|e| DeliveryError::Credential(e.to_string()))?;

    let mut line = String::new();
    let read = input
        .read_line(&mut line)
        .map_err(|e| DeliveryError::Credential(e.to_string()))?;
    if read == 0 {
        return Err(DeliveryError::Credential("no password entered".into()));
    }
    Ok(SecretString::from(line.trim().to_string()))
}
