#![forbid(unsafe_code)]

//! `reply-desk` server binary.
//!
//! Bootstraps configuration and storage, wires the Bot API gateway, the
//! marketplace sender, the AI engine and usage telemetry, then serves the
//! webhook and intake endpoints until shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use reply_desk::ai::AiReplyEngine;
use reply_desk::config::GlobalConfig;
use reply_desk::marketplace::HttpDelivery;
use reply_desk::operator::housekeeping::{spawn_housekeeping_task, PURGE_INTERVAL};
use reply_desk::operator::locks::ResolveLocks;
use reply_desk::operator::reply_state::ReplyStates;
use reply_desk::operator::suggestions::SuggestionCache;
use reply_desk::persistence::db;
use reply_desk::persistence::settings_repo::SettingsRepo;
use reply_desk::state::AppState;
use reply_desk::telegram::client::TelegramTransport;
use reply_desk::telegram::gateway::OutboundGateway;
use reply_desk::telegram::webhook;
use reply_desk::telemetry::batcher::{load_or_create_anonymous_id, spawn_flush_task};
use reply_desk::telemetry::{HttpTelemetrySink, UsageBatcher};
use reply_desk::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "reply-desk",
    about = "Operator reply desk for marketplace buyer messages",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the HTTP port from the configuration file.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("reply-desk bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(port) = args.port {
        config.http_port = port;
    }
    config.load_credentials().await?;
    let config = Arc::new(config);
    info!("configuration loaded");

    // ── Initialize database ─────────────────────────────
    let db_path = config.db_path.to_string_lossy().to_string();
    let db = Arc::new(db::connect(&db_path).await?);
    info!("database connected");

    // ── Collaborators ───────────────────────────────────
    let transport = TelegramTransport::new(
        &config.telegram,
        Duration::from_secs(config.gateway.request_timeout_seconds),
    )?;
    let gateway = Arc::new(OutboundGateway::new(Arc::new(transport), &config.gateway));
    let delivery = Arc::new(HttpDelivery::new(&config.marketplace, Arc::clone(&db))?);
    let ai = Arc::new(AiReplyEngine::new(
        Arc::clone(&db),
        Duration::from_secs(config.ai.request_timeout_seconds),
    ));

    let ct = CancellationToken::new();
    let (telemetry, flush_handle) = if config.telemetry.enabled {
        let sink = Arc::new(HttpTelemetrySink::new(&config.telemetry)?);
        let anonymous_id = load_or_create_anonymous_id(&SettingsRepo::new(Arc::clone(&db))).await;
        let batcher = Arc::new(UsageBatcher::new(sink, &config.telemetry, anonymous_id));
        let handle = spawn_flush_task(Arc::clone(&batcher), ct.clone());
        info!("usage telemetry enabled");
        (Some(batcher), Some(handle))
    } else {
        info!("usage telemetry disabled");
        (None, None)
    };

    let ttl = config.reply_state_ttl();
    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        db,
        gateway: Some(gateway),
        delivery,
        ai,
        locks: ResolveLocks::new(),
        reply_states: ReplyStates::new(ttl),
        suggestions: SuggestionCache::new(ttl),
        telemetry,
    });
    state.track(
        "app_start",
        serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }),
    );

    // ── Start HTTP surface ──────────────────────────────
    let http_ct = ct.clone();
    let http_state = Arc::clone(&state);
    let http_handle = tokio::spawn(async move {
        if let Err(err) = webhook::serve(http_state, http_ct).await {
            error!(%err, "http server failed");
        }
    });

    let housekeeping_handle =
        spawn_housekeeping_task(Arc::clone(&state), PURGE_INTERVAL, ct.clone());

    info!("reply-desk ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    let _ = tokio::join!(http_handle, housekeeping_handle);
    if let Some(handle) = flush_handle {
        let _ = handle.await;
    }
    info!("reply-desk shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
