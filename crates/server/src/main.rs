//! Voice Caller entry point
//!
//! `serve` runs the webhook server, `call` places an outbound call through
//! Twilio, `health` polls a running server and `check-config` reports which
//! settings are present.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voice_caller_config::{build_settings, load_settings, Settings};
use voice_caller_server::{create_router, init_metrics, AppState, TwilioClient};

#[derive(Parser, Debug)]
#[command(name = "voice-caller", version, about = "Outbound AI phone assistant")]
struct Cli {
    /// Environment overlay loaded from config/{env}.yaml
    #[arg(long, global = true, env = "VOICE_CALLER_ENV")]
    env: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the webhook server (default)
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Place an outbound call to the destination number
    Call {
        /// Callee in E.164 format; defaults to DESTINATION_NUMBER
        #[arg(long)]
        to: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Skip the account and caller-number check
        #[arg(long)]
        skip_check: bool,
    },
    /// Query /health on a running server
    Health {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Report which settings are present and whether they validate
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tracing is not up yet, so a missing .env is silently fine
    let dotenv = dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let env = cli.env.as_deref();

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => serve(env, port, dotenv.is_some()).await,
        Commands::Call {
            to,
            yes,
            skip_check,
        } => call(env, to, yes, skip_check).await,
        Commands::Health { port } => health(env, port).await,
        Commands::CheckConfig => check_config(env),
    }
}

async fn serve(env: Option<&str>, port: Option<u16>, dotenv_loaded: bool) -> anyhow::Result<()> {
    let mut config = load_settings(env).context("Invalid configuration")?;
    if let Some(port) = port {
        config.server.port = port;
    }

    init_tracing(&config)?;

    tracing::info!("Starting Voice Caller v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = ?config.environment,
        config_env = env.unwrap_or("default"),
        dotenv_loaded,
        model = %config.completion.model,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        init_metrics()?;
        tracing::info!("Initialized Prometheus metrics at /metrics");
    }

    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid server.host '{}'", config.server.host))?;
    let addr = SocketAddr::from((host, config.server.port));

    let state = AppState::new(config)?;
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn call(
    env: Option<&str>,
    to: Option<String>,
    yes: bool,
    skip_check: bool,
) -> anyhow::Result<()> {
    let mut config = load_settings(env).context("Invalid configuration")?;
    if let Some(to) = to {
        config.twilio.destination_number = Some(to);
    }
    init_tracing(&config)?;

    config
        .validate_for_dialing()
        .context("Configuration is not ready for dialing")?;

    let from = config.twilio.phone_number.clone().unwrap_or_default();
    let destination = config.twilio.destination_number.clone().unwrap_or_default();
    let Some(url) = config.outbound_url() else {
        bail!("WEBHOOK_BASE_URL is not set");
    };

    let client = TwilioClient::from_settings(&config.twilio)?;

    if !skip_check {
        let check = client
            .check_connection(&from)
            .await
            .context("Twilio connection check failed")?;
        println!("Connected to Twilio account: {}", check.account.friendly_name);
        if check.caller_number_found {
            println!("Caller number {from} belongs to this account");
        } else {
            println!("Warning: {from} was not among the account's numbers:");
            for number in &check.numbers {
                println!("  - {}", number.phone_number);
            }
        }
    }

    println!("From:    {from}");
    println!("To:      {destination}");
    println!("Webhook: {url}");

    if !yes && !confirm("Place this call? [y/N] ").await? {
        println!("Call cancelled");
        return Ok(());
    }

    let record = client.create_call(&destination, &from, &url).await?;
    println!("Call initiated");
    println!("Call SID: {}", record.sid);
    println!("Status:   {}", record.status);
    println!(
        "Monitor:  https://console.twilio.com/us1/monitor/logs/calls/{}",
        record.sid
    );
    Ok(())
}

async fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt}");
    std::io::stdout().flush()?;

    let line = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await??;

    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}

async fn health(env: Option<&str>, port: Option<u16>) -> anyhow::Result<()> {
    let vars: HashMap<String, String> = std::env::vars().collect();
    let config = build_settings(Path::new("config"), env, &vars)?;
    let port = port.unwrap_or(config.server.port);
    let url = format!("http://127.0.0.1:{port}/health");

    let response = reqwest::Client::new()
        .get(&url)
        .timeout(std::time::Duration::from_secs(
            config.completion.timeout_secs + 5,
        ))
        .send()
        .await
        .with_context(|| format!("Could not reach {url}"))?;

    let status = response.status();
    let body = response.text().await?;
    println!("{status} {body}");

    if !status.is_success() {
        bail!("Health check returned HTTP {}", status.as_u16());
    }
    Ok(())
}

fn check_config(env: Option<&str>) -> anyhow::Result<()> {
    let vars: HashMap<String, String> = std::env::vars().collect();
    let config = build_settings(Path::new("config"), env, &vars)?;

    for (name, present) in config.presence() {
        let mark = if present { "set" } else { "missing" };
        println!("{name:<22} {mark}");
    }

    config.validate()?;
    match config.validate_for_dialing() {
        Ok(()) => println!("\nReady to serve and dial"),
        Err(e) => println!("\nReady to serve; dialing not configured: {e}"),
    }
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn init_tracing(config: &Settings) -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("voice_caller={level},tower_http=debug").into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);

    let fmt_layer = match &config.observability.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {path}"))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            if config.observability.log_json {
                layer.json().boxed()
            } else {
                layer.boxed()
            }
        },
        None if config.observability.log_json => tracing_subscriber::fmt::layer().json().boxed(),
        None => tracing_subscriber::fmt::layer().boxed(),
    };

    subscriber
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing")?;
    Ok(())
}
