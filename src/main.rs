use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use zaobao_relay::config;
use zaobao_relay::dedup::DedupStore;
use zaobao_relay::delivery::DeliveryPipeline;
use zaobao_relay::runner::{Pacing, RunController};
use zaobao_relay::site::SiteClient;
use zaobao_relay::telegram::TelegramSink;

#[derive(Debug, Parser)]
#[command(author, version, about = "Relay new realtime articles to a Telegram channel, once")]
struct Args {
    /// Path to YAML config file (defaults are used when config.yaml is absent)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(args.config.as_deref()).context("failed to load configuration")?;
    cfg.ensure_dirs()?;

    // Everything that can fail is built before the store is opened, so an
    // opened store always reaches cleanup and close.
    let source = Arc::new(SiteClient::from_config(&cfg.site)?);
    let sink = Arc::new(TelegramSink::from_config(&cfg.telegram));
    let pipeline = DeliveryPipeline::standard(
        sink,
        Duration::from_secs(cfg.telegram.text_timeout_secs),
        Duration::from_secs(cfg.telegram.media_timeout_secs),
    );

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.database_url());
    let store = DedupStore::open(&database_url)
        .await
        .context("failed to open dedup store")?;
    let (pace_min, pace_max) = cfg.pace_window();
    let controller = RunController::new(
        source,
        pipeline,
        store.clone(),
        Pacing::new(pace_min, pace_max),
        cfg.retention(),
    );

    let result = controller.run_once().await;
    store.close().await;

    match result {
        Ok(summary) => {
            info!(
                delivered = summary.delivered.len(),
                failed = summary.failed.len(),
                "done"
            );
            Ok(())
        }
        Err(err) => {
            error!(%err, "run failed");
            Err(err.into())
        }
    }
}
