//! shelfwatch daemon entry point. Wires the store, fetch client, notifier,
//! poll loop, and Unix socket gateway together and runs until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use shelfwatch_common::{Config, EventBus};
use shelfwatch_engine::{
    AlertSink, LogAlerter, Notifier, NotifyFilter, PollOutcome, Poller,
};
use shelfwatch_gateway::Gateway;
use shelfwatch_store::CatalogStore;
use storefront_client::StorefrontClient;
use webhook_alert::WebhookAlerter;

#[derive(Parser, Debug)]
#[command(name = "shelfwatch", about = "Background storefront catalog monitor")]
struct Cli {
    /// Run a single poll cycle and exit instead of starting the daemon
    #[arg(long)]
    once: bool,

    /// Restrict a --once poll to a single item id
    #[arg(long, requires = "once")]
    target: Option<String>,

    /// Override the DATA_DIR environment variable
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the SOCKET_PATH environment variable
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Override the POLL_INTERVAL_SECS environment variable
    #[arg(long)]
    interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shelfwatch=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(socket) = cli.socket {
        config.socket_path = socket;
    }
    if let Some(secs) = cli.interval_secs {
        config.poll_interval_secs = secs;
    }
    config.log_redacted();

    let store = CatalogStore::open(config.data_dir.join("catalog.json")).await?;

    let source = Arc::new(StorefrontClient::new(
        &config.shop_url,
        config.session_cookie.as_deref(),
    ));
    let sink: Arc<dyn AlertSink> = match config.alert_webhook_url.as_deref() {
        Some(url) => Arc::new(WebhookAlerter::new(url)),
        None => {
            info!("No webhook configured, alerts go to the log");
            Arc::new(LogAlerter)
        }
    };

    let filter = NotifyFilter {
        max_price: config.notify_max_price,
        keywords: config.notify_keywords.clone(),
    };
    let window = chrono::Duration::minutes(config.notify_window_mins);
    let notifier = Notifier::recover(store.clone(), sink, filter, window).await;

    let events = EventBus::new(256);
    let poller = Arc::new(Poller::new(source, store.clone(), notifier, events.clone()));

    if cli.once {
        return match poller.execute_poll(cli.target.as_deref()).await {
            PollOutcome::Completed(summary) if summary.success => {
                info!(
                    items = summary.item_count,
                    new = summary.new_count,
                    duration_ms = summary.duration_ms,
                    "One-shot poll complete"
                );
                Ok(())
            }
            PollOutcome::Completed(summary) => {
                anyhow::bail!("poll failed: {}", summary.error.unwrap_or_default())
            }
            PollOutcome::AlreadyInProgress => anyhow::bail!("a poll is already in progress"),
        };
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let gateway = Gateway::new(
        &config.socket_path,
        store.clone(),
        events.clone(),
        Arc::clone(&poller),
    );
    let gateway_task = tokio::spawn(gateway.run(shutdown_tx.subscribe()));

    let poll_task = tokio::spawn(Arc::clone(&poller).run(
        std::time::Duration::from_secs(config.poll_interval_secs),
        chrono::Duration::days(config.notification_retention_days),
        shutdown_tx.subscribe(),
    ));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());

    if let Err(e) = poll_task.await {
        error!(error = %e, "Poll loop task panicked");
    }
    match gateway_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Gateway exited with error"),
        Err(e) => error!(error = %e, "Gateway task panicked"),
    }
    info!("Shutdown complete");

    Ok(())
}
