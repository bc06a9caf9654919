//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Report, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use weeklypack_artifacts::ArtifactStore;
use weeklypack_core::{NotifyOutcome, Stage, StageReporter};
use weeklypack_shared::{
    AppConfig, PeriodKey, PipelineConfig, WeeklyPackError, init_config, load_config,
    load_config_from,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// WeeklyPack: generate, upload, publish and announce the weekly content bundle.
#[derive(Parser)]
#[command(
    name = "weeklypack",
    version,
    about = "Generate the weekly content bundle and distribute it.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.weeklypack/weeklypack.toml).
    #[arg(long, global = true, env = "WEEKLYPACK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate this week's pack, PDF, article and metadata.
    Generate {
        /// Generate for the ISO week containing this date (YYYY-MM-DD).
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Upload the latest period's documents to remote storage.
    Upload,

    /// Publish the latest period to the knowledge base.
    Publish,

    /// Notify the webhook that the latest period is ready.
    Notify,

    /// Run every stage in order for the current week.
    Run {
        /// Run for the ISO week containing this date (YYYY-MM-DD).
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Show the latest period and which artifacts exist for it.
    Status,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "weeklypack=info",
        1 => "weeklypack=debug",
        _ => "weeklypack=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

/// Process exit code for a failed command.
pub(crate) fn exit_code(report: &Report) -> u8 {
    let code = report
        .downcast_ref::<WeeklyPackError>()
        .map(|e| e.category().exit_code())
        .unwrap_or(1);
    u8::try_from(code).unwrap_or(1)
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let quiet = matches!(cli.log_format, LogFormat::Json);

    match cli.command {
        Command::Generate { date } => {
            let config = resolve_config(cli.config)?;
            cmd_generate(&config, date, &CliProgress::new(quiet)).await
        }
        Command::Upload => cmd_upload(&resolve_config(cli.config)?, &CliProgress::new(quiet)).await,
        Command::Publish => {
            cmd_publish(&resolve_config(cli.config)?, &CliProgress::new(quiet)).await
        }
        Command::Notify => cmd_notify(&resolve_config(cli.config)?, &CliProgress::new(quiet)).await,
        Command::Run { date } => {
            let config = resolve_config(cli.config)?;
            cmd_run(&config, date, &CliProgress::new(quiet)).await
        }
        Command::Status => cmd_status(&resolve_config(cli.config)?),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(cli.config),
        },
    }
}

fn load_app_config(path: Option<PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(&path)?,
        None => load_config()?,
    };
    Ok(config)
}

/// File config merged with the process environment, resolved once.
fn resolve_config(path: Option<PathBuf>) -> Result<PipelineConfig> {
    let app = load_app_config(path)?;
    Ok(PipelineConfig::resolve(&app, |k| std::env::var(k).ok()))
}

fn today_or(date: Option<NaiveDate>) -> NaiveDate {
    date.unwrap_or_else(|| Local::now().date_naive())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
    stage: Mutex<Option<Stage>>,
}

impl CliProgress {
    fn new(hidden: bool) -> Self {
        if hidden {
            return Self {
                spinner: ProgressBar::hidden(),
                stage: Mutex::new(None),
            };
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self {
            spinner,
            stage: Mutex::new(None),
        }
    }

    fn current(&self) -> Option<Stage> {
        self.stage.lock().map(|s| *s).unwrap_or(None)
    }
}

impl StageReporter for CliProgress {
    fn stage_started(&self, stage: Stage, key: &PeriodKey) {
        if let Ok(mut current) = self.stage.lock() {
            *current = Some(stage);
        }
        self.spinner.set_message(format!("[{stage}] {key}"));
    }

    fn phase(&self, name: &str) {
        match self.current() {
            Some(stage) => self.spinner.set_message(format!("[{stage}] {name}")),
            None => self.spinner.set_message(name.to_string()),
        }
    }

    fn stage_finished(&self, stage: Stage, summary: &str) {
        self.spinner.println(format!("  ✓ {stage}: {summary}"));
    }

    fn stage_skipped(&self, stage: Stage, reason: &str) {
        self.spinner.println(format!("  - {stage} skipped: {reason}"));
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_generate(
    config: &PipelineConfig,
    date: Option<NaiveDate>,
    progress: &CliProgress,
) -> Result<()> {
    let today = today_or(date);
    info!(%today, "generating bundle");

    let outcome = weeklypack_core::run_generate(config, today, progress).await?;
    progress.spinner.finish_and_clear();

    println!();
    println!("  Bundle generated");
    println!("  Period:  {}", outcome.key);
    println!("  Title:   {}", outcome.metadata.title);
    println!("  Pack:    {}", outcome.pack_source);
    println!("  Article: {}", outcome.article_source);
    for receipt in &outcome.receipts {
        println!("  Wrote:   {} ({} bytes)", receipt.path.display(), receipt.size_bytes);
    }
    println!();
    Ok(())
}

async fn cmd_upload(config: &PipelineConfig, progress: &CliProgress) -> Result<()> {
    let links = weeklypack_core::run_upload(config, progress).await?;
    progress.spinner.finish_and_clear();

    println!();
    println!("  Documents uploaded");
    println!("  PDF:      {}", links.rendered_url);
    println!("  Markdown: {}", links.primary_url);
    if let Some(folder) = &links.folder_url {
        println!("  Folder:   {folder}");
    }
    println!();
    Ok(())
}

async fn cmd_publish(config: &PipelineConfig, progress: &CliProgress) -> Result<()> {
    let record = weeklypack_core::run_publish(config, progress).await?;
    progress.spinner.finish_and_clear();

    println!();
    println!("  Published: {}", record.article_url);
    println!();
    Ok(())
}

async fn cmd_notify(config: &PipelineConfig, progress: &CliProgress) -> Result<()> {
    let outcome = weeklypack_core::run_notify(config, progress).await?;
    progress.spinner.finish_and_clear();

    match outcome {
        NotifyOutcome::Skipped => println!("Webhook not configured; nothing sent."),
        NotifyOutcome::Delivered { status, attempts } => {
            println!("Webhook delivered: HTTP {status} after {attempts} attempt(s).");
        }
    }
    Ok(())
}

async fn cmd_run(
    config: &PipelineConfig,
    date: Option<NaiveDate>,
    progress: &CliProgress,
) -> Result<()> {
    let today = today_or(date);
    info!(%today, "running all stages");

    let summary = weeklypack_core::run_all(config, today, progress).await?;
    progress.spinner.finish_and_clear();

    println!();
    println!("  Run complete for {}", summary.key);
    println!("  Title:     {}", summary.generated.metadata.title);
    if let Some(links) = &summary.storage_links {
        println!("  PDF:       {}", links.rendered_url);
    }
    if let Some(record) = &summary.published {
        println!("  Published: {}", record.article_url);
    }
    if let NotifyOutcome::Delivered { status, .. } = summary.notified {
        println!("  Webhook:   HTTP {status}");
    }
    println!();
    Ok(())
}

fn cmd_status(config: &PipelineConfig) -> Result<()> {
    let store = ArtifactStore::new(&config.output_root);
    let key = store.resolve_latest_existing()?;

    println!("Latest period: {key} ({})", store.period_dir(&key).display());
    for (kind, present) in store.inventory(&key) {
        let mark = if present { "✓" } else { "·" };
        println!("  {mark} {:<28} {}", kind.file_name(&key), kind.producer());
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<PathBuf>) -> Result<()> {
    let app = load_app_config(path)?;
    let toml_str = toml::to_string_pretty(&app)?;
    println!("{toml_str}");

    // Secrets are shown only as set/unset.
    let resolved = PipelineConfig::resolve(&app, |k| std::env::var(k).ok());
    println!("# environment");
    for value in [
        &resolved.generator.api_key,
        &resolved.storage.service_account_json,
        &resolved.storage.access_token,
        &resolved.storage.parent_folder_id,
        &resolved.knowledge_base.api_key,
        &resolved.knowledge_base.database_id,
        &resolved.knowledge_base.hub_page_id,
        &resolved.knowledge_base.repository,
        &resolved.webhook.url,
        &resolved.webhook.token,
    ] {
        println!("# {value:?}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_generate_date_override() {
        let cli = Cli::try_parse_from(["weeklypack", "generate", "--date", "2025-02-12"]).unwrap();
        match cli.command {
            Command::Generate { date } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2025, 2, 12));
            }
            _ => panic!("expected generate"),
        }
        assert!(Cli::try_parse_from(["weeklypack", "generate", "--date", "next week"]).is_err());
    }

    #[test]
    fn exit_codes_follow_error_category() {
        let config = Report::new(WeeklyPackError::config("WEBHOOK_URL is not set"));
        assert_eq!(exit_code(&config), 2);

        let missing = Report::new(WeeklyPackError::state_missing("2025-P07", "meta.json"));
        assert_eq!(exit_code(&missing), 3);

        let external = Report::new(WeeklyPackError::Storage("HTTP 403".into()));
        assert_eq!(exit_code(&external), 4);

        assert_eq!(exit_code(&color_eyre::eyre::eyre!("boom")), 1);
    }
}
