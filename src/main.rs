use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use mailmerge::channels::{
    CredentialProvider, PromptCredential, SmtpChannel, StaticCredential, WebhookChannel,
    WebhookDelivery,
};
use mailmerge::config::{MailerConfig, SmtpSettings, TemplateMarkers};
use mailmerge::dispatch::{Dispatcher, FailurePolicy};
use mailmerge::recipients::{self, Recipient};
use mailmerge::setup;
use mailmerge::template::{ChannelKind, Composer};

/// Send a personalized email or webhook call to every row of a mailing list.
#[derive(Debug, Parser)]
#[command(name = "mailmerge", version)]
struct Cli {
    /// Template file with SUBJECT/BODY regions.
    template: Option<PathBuf>,

    /// Mailing list CSV with a header row.
    list: Option<PathBuf>,

    /// Sender config document.
    #[arg(long, env = "MAILMERGE_CONFIG")]
    config: Option<PathBuf>,

    /// Keep going when a single delivery fails.
    #[arg(long)]
    continue_on_error: bool,

    /// Send one test message to the sender's own account.
    #[arg(long, conflicts_with = "list")]
    test_send: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut output = std::io::stderr();

    // ── Config ──────────────────────────────────────────────────────────
    let config_path = setup::config_path(cli.config.clone());
    let config = if config_path.exists()
        && setup::confirm(&mut input, &mut output, "Use existing config y/n: ")?
    {
        setup::load_config(&config_path)
            .with_context(|| format!("Reading config {}", config_path.display()))?
    } else {
        let config = setup::collect_config(&mut input, &mut output)?;
        setup::save_config(&config_path, &config)?;
        config
    };

    // ── Template ────────────────────────────────────────────────────────
    let template_path = match cli.template.clone().filter(|p| p.exists()) {
        Some(path) => path,
        None => {
            setup::ask(&mut input, &mut output, "Pick template .txt file (just press enter): ")?;
            setup::pick_file(&mut input, &mut output, "Pick Template File")?
        }
    };
    let raw_template = std::fs::read_to_string(&template_path)
        .with_context(|| format!("Reading template {}", template_path.display()))?;

    // Structural template errors abort here, before any connection is made.
    let composer = Composer::new(&raw_template, TemplateMarkers::default(), config.clone())?;

    // ── Recipients ──────────────────────────────────────────────────────
    let list = load_recipients(&cli, &config, &mut input, &mut output)?;
    drop(input);

    // ── Channels ────────────────────────────────────────────────────────
    let webhook: Option<Box<dyn WebhookDelivery>> = match composer.kind() {
        ChannelKind::Webhook => Some(Box::new(WebhookChannel::from_config(&config)?)),
        ChannelKind::PlainText | ChannelKind::Markdown => None,
    };

    let credentials: Box<dyn CredentialProvider> = match &config.sender_password {
        Some(password) => Box::new(StaticCredential::new(password.clone())),
        None => Box::new(PromptCredential),
    };
    let smtp = SmtpChannel::with_settings(
        config.sender_email.clone(),
        SmtpSettings::from_env(),
        credentials,
    );

    let policy = if cli.continue_on_error {
        FailurePolicy::Continue
    } else {
        FailurePolicy::Abort
    };

    // ── Dispatch ────────────────────────────────────────────────────────
    let mut dispatcher = Dispatcher::new(composer, Box::new(smtp), webhook)?.with_policy(policy);
    let report = dispatcher.run(&list).await?;

    eprintln!(
        "Done: {} sent, {} skipped, {} failed",
        report.sent,
        report.skipped,
        report.failures.len()
    );
    for (recipient, err) in &report.failures {
        eprintln!("   {recipient}: {err}");
    }

    if report.failures.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} deliveries failed", report.failures.len())
    }
}

fn load_recipients(
    cli: &Cli,
    config: &MailerConfig,
    input: &mut impl std::io::BufRead,
    output: &mut impl std::io::Write,
) -> anyhow::Result<Vec<Recipient>> {
    if let Some(path) = cli.list.as_ref().filter(|p| p.exists()) {
        return Ok(recipients::load_csv(path)?);
    }

    let test_send = cli.test_send
        || setup::confirm(
            input,
            output,
            &format!("Test send to {} (y/n): ", config.sender_email),
        )?;
    if test_send {
        return Ok(vec![recipients::test_recipient(config)]);
    }

    setup::ask(input, output, "Pick mailing list .csv file (just press enter): ")?;
    let path = setup::pick_file(input, output, "Pick List File")?;
    Ok(recipients::load_csv(&path)?)
}
