use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use medassist::api::{self, AppState};
use medassist::assistant::Assistant;
use medassist::config::AppConfig;
use medassist::db::Database;
use medassist::dispatcher::{NotificationHub, NotificationSink};
use medassist::external::{GeminiClient, GoogleTtsClient, SpeechSynthesizer, TextGenerator};
use medassist::logging::{init_logging, OperationTimer};
use medassist::metrics::MetricsCollector;
use medassist::scanner::Scanner;
use medassist::service::HealthService;
use medassist::time_parser::{classify, parse_natural_language_date};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server and the reminder scanner
    Serve {
        /// Address to bind (overrides configuration)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides configuration)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run a single scan cycle and exit
    ScanOnce,
    /// Show how a natural-language time expression is interpreted
    ParseDate {
        /// Expression such as "tomorrow" or "in 3 days"
        text: String,

        /// Reference instant in RFC 3339 (defaults to now)
        #[arg(long)]
        now: Option<String>,
    },
    /// Create the database and apply migrations
    InitDb,
}

fn open_store(config: &AppConfig) -> Result<Database> {
    let path = config.database_path();
    Database::with_options(
        &path,
        config.database.max_connections,
        Duration::from_secs(config.database.busy_timeout_secs),
    )
    .with_context(|| format!("Failed to open database at {}", path.display()))
}

fn text_generator(config: &AppConfig) -> Result<Arc<dyn TextGenerator>> {
    if config.generation.api_key.is_empty() {
        warn!("No text generation API key configured; chat and insights will degrade");
    }
    let client = GeminiClient::new(&config.generation).context("Failed to build text generation client")?;
    Ok(Arc::new(client))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize logging; the guard flushes the log file on exit
    let log_file = config.log_file();
    let _log_guard = init_logging(Some(&config.logging.level), &config.logging.format, log_file.as_deref())?;

    info!("Starting medassist");

    match cli.command {
        Commands::Serve { host, port } => serve(&config, host, port).await,
        Commands::ScanOnce => scan_once(&config).await,
        Commands::ParseDate { text, now } => parse_date(&text, now.as_deref()),
        Commands::InitDb => {
            open_store(&config)?;
            info!(path = %config.database_path().display(), "Database initialized");
            Ok(())
        },
    }
}

async fn serve(config: &AppConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    let store = open_store(config)?;
    let metrics = MetricsCollector::default();
    let hub = Arc::new(NotificationHub::new());
    let sink: Arc<dyn NotificationSink> = hub.clone();

    let generator = text_generator(config)?;
    let speech: Arc<dyn SpeechSynthesizer> =
        Arc::new(GoogleTtsClient::new(&config.speech).context("Failed to build speech client")?);

    let scanner = Scanner::new(store.clone(), sink, Arc::clone(&generator), metrics);
    let state = AppState {
        service: HealthService::new(store.clone(), metrics),
        assistant: Assistant::new(store, generator, speech, metrics, config.speech.default_language.clone()),
        hub,
        metrics,
    };

    let addr = format!(
        "{}:{}",
        host.unwrap_or_else(|| config.server.host.clone()),
        port.unwrap_or(config.server.port)
    );
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "HTTP server listening");

    let scanner_task = tokio::spawn(scanner.run());

    tokio::select! {
        served = axum::serve(listener, api::router(state)).into_future() => {
            served.context("HTTP server failed")?;
        },
        scanned = scanner_task => {
            scanned
                .context("Reminder scanner panicked")?
                .context("Reminder scanner stopped")?;
        },
    }

    Ok(())
}

async fn scan_once(config: &AppConfig) -> Result<()> {
    let timer = OperationTimer::new("scan_once");
    let store = open_store(config)?;
    let metrics = MetricsCollector::default();

    // Nobody is connected from this process; pushes are dropped
    let sink: Arc<dyn NotificationSink> = Arc::new(NotificationHub::new());
    let scanner = Scanner::new(store, sink, text_generator(config)?, metrics);

    let report = scanner.run_cycle(Utc::now()).await.context("Scan cycle failed")?;
    info!(
        medication_reminders = report.medication_reminders,
        appointment_reminders = report.appointment_reminders,
        timers_completed = report.timers_completed,
        insights_generated = report.insights_generated,
        failures = report.failures,
        duplicates = report.duplicates,
        "Scan cycle finished"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    timer.finish();
    Ok(())
}

fn parse_date(text: &str, now: Option<&str>) -> Result<()> {
    let now = match now {
        Some(value) => DateTime::parse_from_rfc3339(value)
            .with_context(|| format!("Invalid reference time: {value}"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let parsed = parse_natural_language_date(text, now);
    match classify(text) {
        Some(rule) => println!("{} ({rule:?})", parsed.to_rfc3339()),
        None => println!("{} (no pattern matched, reference time kept)", parsed.to_rfc3339()),
    }
    Ok(())
}
