// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, info};
use std::io::Write;
use std::path::PathBuf;

use subrelay::app_config::{self, Config};
use subrelay::jobs::DispatchOutcome;
use subrelay::providers::ProviderKind;
use subrelay::settings::keys;
use subrelay::{Controller, NewTranslationRequest, TranslationStatus};

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

/// CLI Wrapper for TranslationStatus to implement ValueEnum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
    Failed,
}

impl From<CliStatus> for TranslationStatus {
    fn from(status: CliStatus) -> Self {
        match status {
            CliStatus::Pending => TranslationStatus::Pending,
            CliStatus::InProgress => TranslationStatus::InProgress,
            CliStatus::Completed => TranslationStatus::Completed,
            CliStatus::Cancelled => TranslationStatus::Cancelled,
            CliStatus::Failed => TranslationStatus::Failed,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Queue a subtitle file for translation
    Enqueue {
        /// Subtitle file to translate
        #[arg(value_name = "SUBTITLE_PATH")]
        subtitle: PathBuf,

        /// Target language code (e.g., 'fr', 'de')
        #[arg(short, long)]
        target_language: String,

        /// Source language code
        #[arg(short, long, default_value = "en")]
        source_language: String,

        /// Display title, the file stem when omitted
        #[arg(long)]
        title: Option<String>,
    },

    /// Translate every pending request, then exit
    Run {
        /// Do not draw progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// List translation requests
    List {
        /// Only show requests in this status
        #[arg(short, long, value_enum)]
        status: Option<CliStatus>,
    },

    /// Cancel a request that has not started yet
    Cancel {
        /// Request id
        id: i64,
    },

    /// Read or write provider settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Generate shell completions for subrelay
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Print a setting
    Get { key: String },
    /// Store a setting
    Set { key: String, value: String },
}

/// subrelay - subtitle translation job runner
///
/// Queues subtitle translation requests and translates them through
/// LibreTranslate, DeepL, OpenAI, Anthropic, LocalAI or a custom endpoint.
#[derive(Parser, Debug)]
#[command(name = "subrelay")]
#[command(version)]
#[command(about = "Subtitle translation job runner")]
#[command(long_about = "subrelay queues subtitle translation requests and runs them against a translation provider.

EXAMPLES:
    subrelay settings set service_type deepl        # Pick the provider
    subrelay settings set deepl_api_key KEY:fx      # Configure it
    subrelay enqueue -t fr movie.srt                # Queue movie.srt for French
    subrelay run                                    # Translate everything pending
    subrelay list --status failed                   # Inspect failures
    subrelay completions bash > subrelay.bash       # Generate bash completions

CONFIGURATION:
    Runtime configuration is stored in subrelay.json by default. If the file
    doesn't exist, a default one will be created automatically. Provider
    credentials are stored as settings in the database.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "subrelay.json", env = "SUBRELAY_CONFIG")]
    config_path: PathBuf,

    /// Set logging level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "1;31",
            Level::Warn => "1;33",
            Level::Info => "1;32",
            Level::Debug => "1;36",
            Level::Trace => "1;35",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "\x1B[{}m{} {:<5} {}\x1B[0m",
                Self::color_for_level(record.level()),
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Accept everything here; the effective level is applied through set_max_level
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "subrelay", &mut std::io::stdout());
        return Ok(());
    }

    let config = Config::load_or_create(&cli.config_path)?;
    let level = cli
        .log_level
        .map(app_config::LogLevel::from)
        .unwrap_or(config.log_level);
    log::set_max_level(level.into());

    let controller = Controller::with_config(config)?;

    match cli.command {
        Commands::Enqueue {
            subtitle,
            target_language,
            source_language,
            title,
        } => {
            let title = title.unwrap_or_else(|| {
                subtitle
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            let path = std::fs::canonicalize(&subtitle)
                .with_context(|| format!("Subtitle file not found: {}", subtitle.display()))?;
            let request = controller
                .enqueue(NewTranslationRequest::new(
                    title,
                    path.to_string_lossy(),
                    source_language,
                    target_language,
                ))
                .await?;
            println!("{}", request.id);
        }
        Commands::Run { no_progress } => {
            let reports = controller.run_pending(!no_progress).await?;
            let failed: Vec<_> = reports
                .iter()
                .filter(|r| !matches!(r.outcome, DispatchOutcome::Finished(_)))
                .collect();
            if !failed.is_empty() {
                return Err(anyhow!("{} translation request(s) failed", failed.len()));
            }
        }
        Commands::List { status } => {
            for request in controller.list(status.map(Into::into)).await? {
                println!(
                    "{:>5}  {:<11}  {} -> {}  {}  {}",
                    request.id,
                    request.status,
                    request.source_language,
                    request.target_language,
                    request.title,
                    request.subtitle_to_translate
                );
            }
        }
        Commands::Cancel { id } => {
            let request = controller.cancel(id).await?;
            info!("Request {} is now {}", request.id, request.status);
        }
        Commands::Settings { action } => match action {
            SettingsAction::Get { key } => match controller.get_setting(&key).await? {
                Some(value) => println!("{}", value),
                None => return Err(anyhow!("Setting '{}' is not set", key)),
            },
            SettingsAction::Set { key, value } => {
                if key == keys::SERVICE_TYPE {
                    value.parse::<ProviderKind>()?;
                }
                controller.set_setting(&key, &value).await?;
            }
        },
        Commands::Completions { .. } => {}
    }

    Ok(())
}
