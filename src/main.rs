mod analyze;
mod config;
mod delivery;
mod direction;
mod error;
mod identity;
mod matcher;
mod message;
mod monitor;
mod source;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::delivery::webhook::WebhookSink;
use crate::delivery::Dispatcher;
use crate::matcher::PhraseMatcher;
use crate::monitor::Monitor;
use crate::source::transcript::TranscriptSource;

/// What the command line asked for
#[derive(Debug, PartialEq, Eq)]
struct Invocation {
    config_path: PathBuf,
    /// Chat export to analyze offline instead of monitoring
    analyze: Option<PathBuf>,
}

/// `chatwatch [config.toml]` or `chatwatch --analyze <export.txt> [config.toml]`
fn parse_args(args: &[String]) -> Result<Invocation> {
    let mut config_path = None;
    let mut analyze = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--analyze" {
            let target = iter.next().context("--analyze requires a chat export path")?;
            analyze = Some(PathBuf::from(target));
        } else if config_path.is_none() {
            config_path = Some(PathBuf::from(arg));
        } else {
            anyhow::bail!("Unexpected argument: {}", arg);
        }
    }

    Ok(Invocation {
        config_path: config_path.unwrap_or_else(|| PathBuf::from("config.toml")),
        analyze,
    })
}

/// Start waiting on `signal` in a background task right away, so a signal
/// that arrives while a tick is still running is not lost. The returned
/// future resolves once the signal fires.
fn shutdown_listener<F>(signal: F) -> impl Future<Output = ()>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        match signal.await {
            Ok(()) => {
                let _ = tx.send(());
            }
            Err(e) => {
                error!("Failed to listen for Ctrl-C: {}", e);
                // Holding the sender keeps the monitor running
                std::future::pending::<()>().await;
            }
        }
    });
    async move {
        let _ = rx.await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chatwatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = parse_args(&args)?;

    info!(
        "Loading configuration from: {}",
        invocation.config_path.display()
    );
    let config = Config::load(&invocation.config_path).with_context(|| {
        format!(
            "Failed to load config from {}",
            invocation.config_path.display()
        )
    })?;

    let matcher = PhraseMatcher::new(config.alerts.phrases.clone(), config.alerts.threshold);

    if let Some(export) = invocation.analyze {
        let report = analyze::analyze_file(&export, &matcher)?;
        println!("\n=== Analysis complete ===");
        println!("Total checked: {}", report.checked);
        println!("Matches found: {}", report.matched);
        println!("Unmatched:     {}", report.unmatched());
        return Ok(());
    }

    info!("Configuration loaded successfully");
    info!("  Chat: {}", config.monitor.chat);
    info!("  Webhook: {}", config.webhook.base_url);
    info!("  Interval: {}s", config.monitor.interval_secs);
    if config.alerting_enabled() {
        info!(
            "  Alerting on phrases (min score {}): {:?}",
            config.alerts.threshold, config.alerts.phrases
        );
    }

    let source = TranscriptSource::new(&config.source.directory, &config.source.self_name);
    let sink = WebhookSink::new(&config.webhook)?;
    let dispatcher = Dispatcher::new(Box::new(sink), matcher);
    let mut monitor = Monitor::new(
        Box::new(source),
        dispatcher,
        Duration::from_secs(config.monitor.interval_secs),
    );

    let shutdown = shutdown_listener(tokio::signal::ctrl_c());
    monitor.open(&config.monitor.chat).await?;

    info!("Listening for messages...");
    monitor.run(shutdown).await;

    info!("Exiting...");
    Ok(())
}
