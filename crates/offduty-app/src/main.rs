//! Offduty - call gatekeeper for the telephony platform.
//!
//! Commands:
//! - `serve` - run the HTTP decision endpoint
//! - `check` - decide one call offline against a config file
//! - `validate` - report malformed schedule windows in a config file

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args as ClapArgs, Parser, Subcommand};
use directories::ProjectDirs;
use offduty_core::schedule::ScheduleIssue;
use offduty_core::{
    AdmissionEngine, CallEvent, Config, ConfigSource, Decision, RemoteConfigSettings,
    RemoteConfigSource, StaticConfigSource,
};
use offduty_server::{AppState, Server, ServerConfig, DEFAULT_HOST, DEFAULT_PORT};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Offduty - forward calls from the whitelist or during working hours
#[derive(Parser, Debug)]
#[command(name = "offduty", version, about)]
struct Args {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Also write rotating log files to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP decision endpoint
    Serve(ServeArgs),
    /// Decide one call against a config file
    Check(CheckArgs),
    /// Check a config file for malformed windows
    Validate {
        /// Config file (JSON)
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(ClapArgs, Debug)]
struct ServeArgs {
    /// Host to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port to bind to
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Base URL of the remote config API
    #[arg(long, env = "API_URL")]
    api_url: Option<String>,

    /// Bearer token for the remote config API
    #[arg(long, env = "ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Remote config fetch timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    /// Serve a local config file instead of the remote API
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
struct CheckArgs {
    /// Caller identifier
    #[arg(long)]
    caller: String,

    /// Arrival time (RFC 3339); defaults to now
    #[arg(long, value_parser = parse_instant)]
    at: Option<DateTime<Utc>>,

    /// Config file (JSON)
    #[arg(long, required_unless_present = "default_config")]
    config: Option<PathBuf>,

    /// Use the built-in default config (Mon-Fri 09:00-17:00)
    #[arg(long, conflicts_with = "config")]
    default_config: bool,
}

fn parse_instant(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected RFC 3339 time: {e}"))
}

/// Get the default logs directory path.
fn default_logs_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "offduty", "Offduty").map(|dirs| dirs.data_dir().join("logs"))
}

/// Initialize logging: stderr always, plus daily-rotated files when a
/// directory is available.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "offduty={log_level},offduty_core={log_level},offduty_server={log_level},warn"
        ))
    });

    let log_dir = match (&args.log_dir, &args.command) {
        (Some(dir), _) => Some(dir.clone()),
        (None, Command::Serve(_)) => default_logs_dir(),
        (None, _) => None,
    };

    if let Some(log_dir) = log_dir {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("offduty")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().with_writer(std::io::stderr))
                    .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                    .init();

                tracing::info!("Logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    None
}

/// Builds the config source for `serve`.
fn config_source(args: &ServeArgs) -> Result<Arc<dyn ConfigSource>> {
    if let Some(path) = &args.config {
        let source = StaticConfigSource::from_path(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;
        return Ok(Arc::new(source));
    }

    let mut settings =
        RemoteConfigSettings::default().with_timeout(Duration::from_secs(args.timeout_secs));
    settings.api_url = args.api_url.clone();
    settings.access_token = args.access_token.clone();

    if settings.api_url.is_none() || settings.access_token.is_none() {
        // Still start: every call will be denied with config_error until fixed.
        tracing::warn!("API_URL or ACCESS_TOKEN not set; all calls will be denied");
    }

    let source = RemoteConfigSource::new(settings).context("failed to build HTTP client")?;
    Ok(Arc::new(source))
}

async fn serve(args: ServeArgs) -> Result<()> {
    let source = config_source(&args)?;
    tracing::info!(source = %source.describe(), "Config source ready");

    let config = ServerConfig::default()
        .with_host(args.host)
        .with_port(args.port);
    let server = Server::with_state(config, AppState::new(source))?;
    server.run().await?;
    Ok(())
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("failed to load config from {}", path.display()))
}

async fn check(args: &CheckArgs) -> Result<Decision> {
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    let at = args.at.unwrap_or_else(Utc::now);
    let engine = AdmissionEngine::new(StaticConfigSource::new(config));
    Ok(engine.evaluate(&CallEvent::new(args.caller.clone(), at)).await)
}

fn validate(path: &Path) -> Result<Vec<ScheduleIssue>> {
    let config = load_config(path)?;
    if let Some(problem) = config.schedule_problem() {
        bail!("schedule does not parse: {problem}");
    }
    Ok(config
        .schedule
        .as_ref()
        .map(|schedule| schedule.validate())
        .unwrap_or_default())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = init_logging(&args);

    match args.command {
        Command::Serve(serve_args) => serve(serve_args).await,
        Command::Check(check_args) => {
            let decision = check(&check_args).await?;
            println!("{}", serde_json::to_string_pretty(&decision)?);
            Ok(())
        }
        Command::Validate { config } => {
            let issues = validate(&config)?;
            if issues.is_empty() {
                println!("{}: ok", config.display());
                return Ok(());
            }
            for issue in &issues {
                println!("{}: {}", config.display(), issue);
            }
            bail!("{} malformed window(s)", issues.len());
        }
    }
}
