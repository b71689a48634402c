use anyhow::Context;
use clap::Parser;
use recon_snap::{setup_logging, BrowserReaper, Cli, CliRunner, Config};
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

/// How long an interrupt waits for Chrome to die before exiting anyway.
const KILL_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    if let Err(e) = setup_logging(args.verbose) {
        eprintln!("Failed to initialize logging: {e}");
    }

    info!("Starting recon-snap v{}", env!("CARGO_PKG_VERSION"));

    // Interrupts end the process on the spot. In-flight captures may sit on
    // network calls that cannot be cancelled cheaply, so nothing is drained
    // and no partial report is written. Chrome is killed first.
    let reaper = BrowserReaper::default();
    tokio::spawn(shutdown_on_signal(reaper.clone()));

    let result = async {
        let config = load_config(&args).await?;
        let runner = CliRunner::new(config, &args).with_reaper(reaper);
        runner.run().await.context("Scan aborted")
    }
    .await;

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn load_config(args: &Cli) -> anyhow::Result<Config> {
    let mut config = if let Some(config_path) = &args.config {
        let content = tokio::fs::read_to_string(config_path)
            .await
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config {}", config_path.display()))?
    } else {
        Config::default()
    };

    args.apply_to(&mut config);
    config.validate()?;

    info!(
        "Concurrency: {}, timeout: {:?}, detection: {}",
        config.concurrency,
        config.capture_timeout,
        if config.detection_enabled { "on" } else { "off" }
    );

    Ok(config)
}

async fn shutdown_on_signal(reaper: BrowserReaper) {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                let _ = signal::ctrl_c().await;
                return interrupted("SIGINT", &reaper).await;
            }
        };

        tokio::select! {
            _ = signal::ctrl_c() => interrupted("SIGINT", &reaper).await,
            _ = sigterm.recv() => interrupted("SIGTERM", &reaper).await,
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        interrupted("Ctrl-C", &reaper).await;
    }
}

async fn interrupted(signal: &str, reaper: &BrowserReaper) {
    info!("Received {}, exiting without a report", signal);
    reaper.kill_all(KILL_GRACE).await;
    std::process::exit(130);
}
