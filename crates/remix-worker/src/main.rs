//! Remix worker binary.
//!
//! Reads a JSON array of run requests from the path given as the first
//! argument (or `REMIX_MANIFEST`) and executes them as one batch.

use std::path::PathBuf;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use remix_worker::{BatchExecutor, RemixPipeline, RunConfig, RunRequest, Services, WorkerConfig};

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("remix=info".parse().unwrap())
        .add_directive("aws_config=warn".parse().unwrap())
        .add_directive("hyper=warn".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

fn run_config(worker: &WorkerConfig) -> anyhow::Result<RunConfig> {
    let mut config = RunConfig::default().with_work_dir(&worker.work_dir);
    if let Ok(style) = std::env::var("REMIX_STYLE") {
        config.style = style.parse().context("REMIX_STYLE")?;
    }
    if let Ok(prefix) = std::env::var("REMIX_OUTPUT_PREFIX") {
        config.output_prefix = prefix;
    }
    if let Some(fps) = std::env::var("REMIX_OUTPUT_FPS")
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|fps| *fps > 0.0)
    {
        config.fps_override = Some(fps);
    }
    Ok(config)
}

async fn load_manifest() -> anyhow::Result<Vec<RunRequest>> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("REMIX_MANIFEST").ok())
        .map(PathBuf::from)
        .context("usage: remix-worker <manifest.json> (or set REMIX_MANIFEST)")?;
    let raw = tokio::fs::read(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("parsing {}", path.display()))
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting remix-worker");

    let worker_config = WorkerConfig::from_env();
    info!("Worker config: {:?}", worker_config);

    let requests = match load_manifest().await {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to load run manifest: {:#}", e);
            std::process::exit(1);
        }
    };

    let config = match run_config(&worker_config) {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid run configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let services = match Services::from_env(&config) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create service clients: {:#}", e);
            std::process::exit(1);
        }
    };

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        cancel_tx.send(true).ok();
    });

    let executor = BatchExecutor::new(
        RemixPipeline::new(services, config),
        worker_config.max_concurrent_runs,
        cancel_rx,
    )
    .with_shutdown_timeout(worker_config.shutdown_timeout);

    let run_ids: Vec<_> = requests.iter().map(|r| r.run_id.clone()).collect();
    let results = executor.run_all(requests).await;

    let mut failed = 0;
    for (run_id, result) in run_ids.iter().zip(&results) {
        match result {
            Ok(report) => match serde_json::to_string(report) {
                Ok(json) => println!("{}", json),
                Err(e) => warn!(run_id = %run_id, "Failed to serialize report: {}", e),
            },
            Err(e) => {
                failed += 1;
                error!(
                    run_id = %run_id,
                    retryable = e.is_retryable(),
                    "Run failed: {}", e
                );
            }
        }
    }

    info!(runs = results.len(), failed, "Batch finished");
    if failed > 0 {
        std::process::exit(1);
    }
}
