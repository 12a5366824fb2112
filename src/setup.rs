//! Operator-facing setup: prompts, config persistence and file picking.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use secrecy::SecretString;

use crate::config::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH, MailerConfig};
use crate::error::{ConfigError, InputError};

const COCOA_DIALOG_PATH: &str = "/Applications/CocoaDialog.app/Contents/MacOS/CocoaDialog";

// ── Prompts ─────────────────────────────────────────────────────────

/// Print `question` and read one trimmed line.
pub fn ask<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> Result<String, InputError> {
    write!(output, "{question}")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Ask a yes/no question; only `y` (any case) counts as yes.
pub fn confirm<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> Result<bool, InputError> {
    Ok(ask(input, output, question)?.eq_ignore_ascii_case("y"))
}

/// Walk the operator through building a sender config.
pub fn collect_config<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
) -> Result<MailerConfig, InputError> {
    let mut config = MailerConfig {
        sender_first_name: ask(input, output, "Sender first name: ")?,
        sender_last_name: ask(input, output, "Sender last name: ")?,
        sender_email: ask(input, output, "Sender email account: ")?,
        ..Default::default()
    };

    if confirm(input, output, "Save password (y/n): ")? {
        config.sender_password = Some(SecretString::from(ask(input, output, "Password: ")?));
    }

    if confirm(input, output, "Use alternate display email (y/n): ")? {
        config.sender_display_email = Some(ask(input, output, "Alternate display email: ")?);
    } else {
        config.sender_display_email = Some(config.sender_email.clone());
    }

    if confirm(input, output, "Add BCC address (y/n): ")? {
        config.bcc_email = Some(ask(input, output, "BCC address: ")?);
    }

    if confirm(input, output, "Configure webhook (y/n): ")? {
        config.webhook_route = Some(ask(
            input,
            output,
            "Webhook route (must contain :user_id): ",
        )?);
        let token = ask(input, output, "Webhook token (blank for none): ")?;
        config.webhook_token = (!token.is_empty()).then(|| SecretString::from(token));
    }

    Ok(config)
}

// ── Persistence ─────────────────────────────────────────────────────

/// Resolve the config path: explicit argument, then `MAILMERGE_CONFIG`, then the default.
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

pub fn load_config(path: &Path) -> Result<MailerConfig, ConfigError> {
    let json = std::fs::read_to_string(path)?;
    MailerConfig::from_json(&json)
}

pub fn save_config(path: &Path, config: &MailerConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, config.to_json()?)?;
    tracing::info!(path = %path.display(), "Config saved");
    Ok(())
}

// ── File picker ─────────────────────────────────────────────────────

/// Let the operator choose a file: a native dialog where one is available,
/// otherwise a path typed on `input`.
pub fn pick_file<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    title: &str,
) -> Result<PathBuf, InputError> {
    let picked = if cfg!(target_os = "linux") {
        run_picker(Command::new("zenity").args(["--title", title, "--file-selection"]))
    } else if Path::new(COCOA_DIALOG_PATH).exists() {
        run_picker(Command::new(COCOA_DIALOG_PATH).args(["fileselect", "--title", title]))
    } else {
        if cfg!(target_os = "macos") {
            writeln!(
                output,
                "NOTICE: If you are using macOS, consider installing CocoaDialog."
            )?;
        }
        None
    };

    if let Some(path) = picked {
        return Ok(path);
    }

    let typed = ask(
        input,
        output,
        &format!("Please enter the file path for '{title}': "),
    )?;
    if typed.is_empty() {
        return Err(InputError::Cancelled(title.to_string()));
    }
    Ok(PathBuf::from(typed))
}

fn run_picker(cmd: &mut Command) -> Option<PathBuf> {
    match cmd.output() {
        Ok(out) if out.status.success() => {
            let path = String::from_utf8_lossy(&out.stdout).trim().to_string();
            (!path.is_empty()).then(|| PathBuf::from(path))
        }
        Ok(_) => None,
        Err(e) => {
            tracing::debug!("File picker unavailable: {e}");
            None
        }
    }
}
