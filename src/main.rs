use anyhow::Context;
use clap::Parser;
use qsolive_agent::{
    config::{self, LoggingConfig},
    supabase::{self, RetryPolicy, SupabaseClient},
    udp,
};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "qsolive-agent")]
#[command(about = "Forwards live ADIF QSO broadcasts to the QSOlive map")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "qsolive.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match config::Config::load(&cli.config) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            eprintln!("Copy config.example.toml to {:?} and fill it in", cli.config);
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging)?;

    info!("QSOlive agent v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");
    info!(
        "Operator: {}",
        config.operator.callsign.as_deref().unwrap_or("(from STATION_CALLSIGN)")
    );
    info!("Supabase: {}", config.supabase.url);
    info!("===========================================");

    let client = SupabaseClient::new(&config.supabase, &config.delivery)?;
    let policy = RetryPolicy::from(&config.delivery);

    let socket = udp::bind(&config.udp).await?;

    // Delivery worker drains the queue; retries never block reception
    let (tx, rx) = mpsc::channel(config.delivery.queue_capacity);
    let worker = tokio::spawn(supabase::run_worker(Arc::new(client), rx, policy));

    info!("Waiting for UDP ADIF packets. Press Ctrl+C to stop.");

    let result = tokio::select! {
        res = udp::run_listener(socket, config.clone(), tx) => res,
        res = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            res.context("failed to listen for Ctrl+C")
        }
    };

    // Listener and its socket are dropped here, which closes the queue
    let grace = Duration::from_secs(config.delivery.shutdown_grace_secs);
    match tokio::time::timeout(grace, worker).await {
        Ok(Ok(stats)) => info!(
            "QSOlive agent stopped ({} delivered, {} failed)",
            stats.delivered, stats.failed
        ),
        Ok(Err(e)) => error!("Delivery worker panicked: {}", e),
        Err(_) => warn!(
            "Pending deliveries abandoned after {:?} shutdown grace",
            grace
        ),
    }

    result
}

fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let file_layer = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    Ok(())
}
