//! bundle-worker: builds content blocker bundles from a data directory.
//!
//! Reads filter lists from `<data-dir>/filters/<id>.txt`, the allow-list from
//! `<data-dir>/allowlist.txt` and flags from `<data-dir>/settings.json`, and
//! writes one `<bundle_id>.json` payload per bundle into the output directory.
//!
//! Without `--once` the worker watches the data directory and rebuilds after
//! every burst of changes until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use rulecast_core::config::{load_dotenv, Config};
use rulecast_core::BundleCatalog;
use rulecast_pipeline::{
    watch_data_dir, BundleEvent, CatalogPartitioner, ContentBlockerService, FileApplier, Sources,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Content blocker bundle worker.
#[derive(Parser, Debug)]
#[command(name = "bundle-worker", version, about)]
struct Cli {
    /// Directory holding filters/, allowlist.txt and settings.json.
    #[arg(long, env = "RULECAST_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Directory bundle payloads are written to.
    #[arg(long, env = "RULECAST_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// YAML bundle catalog. The built-in catalog is used when omitted.
    #[arg(long, env = "RULECAST_CATALOG")]
    catalog: Option<PathBuf>,

    /// Quiet window in milliseconds before a rebuild runs.
    #[arg(long, env = "RULECAST_DEBOUNCE_MS")]
    debounce_ms: Option<u64>,

    /// Rules per bundle above which a bundle is flagged over limit.
    #[arg(long, env = "RULECAST_RULES_LIMIT")]
    rules_limit: Option<usize>,

    /// Build once, print bundle status as JSON and exit.
    #[arg(long)]
    once: bool,

    /// Seconds to wait for bundle writes to be acknowledged.
    #[arg(long, default_value_t = 10)]
    ack_timeout: u64,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.data_dir {
            config.storage.data_dir = dir.clone();
            if self.output_dir.is_none() {
                config.storage.output_dir = dir.join("bundles");
            }
        }
        if let Some(dir) = &self.output_dir {
            config.storage.output_dir = dir.clone();
        }
        if let Some(path) = &self.catalog {
            config.storage.catalog_path = Some(path.clone());
        }
        if let Some(ms) = self.debounce_ms {
            config.pipeline.debounce_ms = ms;
        }
        if let Some(limit) = self.rules_limit {
            config.pipeline.rules_limit = limit;
        }
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();
    let mut config = Config::from_env();
    cli.apply(&mut config);
    config.log_summary();

    let catalog = Arc::new(BundleCatalog::load(config.storage.catalog_path.as_deref())?);
    let sources = Sources::from_data_dir(&config.storage.data_dir)?;
    let partitioner = Arc::new(CatalogPartitioner::new(Arc::clone(&catalog)));

    let service =
        ContentBlockerService::start(&config.pipeline, sources, Arc::clone(&catalog), partitioner)?;
    let consumer = service.spawn_consumer(FileApplier::new(&config.storage.output_dir));

    if cli.once {
        let report = service.run_now().await?;
        let expected: Vec<String> = report
            .outcomes
            .iter()
            .filter(|o| o.is_ok())
            .map(|o| o.bundle_id.clone())
            .collect();
        wait_for_acks(&service, &expected, Duration::from_secs(cli.ack_timeout)).await;

        let status = service.get_content_blockers_info();
        println!("{}", serde_json::to_string_pretty(&status)?);

        consumer.abort();
        service.shutdown().await;
        return Ok(());
    }

    let watcher = watch_data_dir(&config.storage.data_dir, service.coalescer())?;
    let summaries = spawn_summary_logger(&service);
    // build once at startup
    service.update_content_blocker();

    info!("bundle-worker running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    drop(watcher);
    // flushes an edit made within the last debounce window
    service.shutdown().await;
    consumer.abort();
    summaries.abort();
    info!("bundle-worker exited cleanly");
    Ok(())
}

/// Poll the status view until every expected bundle has been acknowledged.
async fn wait_for_acks(service: &ContentBlockerService, expected: &[String], limit: Duration) {
    let acked = async {
        loop {
            let cache = service.cache();
            if expected.iter().all(|id| cache.get(id).is_some()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    if tokio::time::timeout(limit, acked).await.is_err() {
        warn!(timeout_secs = limit.as_secs(), "not every bundle was acknowledged in time");
    }
}

fn spawn_summary_logger(service: &ContentBlockerService) -> tokio::task::JoinHandle<()> {
    let mut rx = service.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(BundleEvent::Updated(summary)) => info!(
                    rules = summary.rules_count,
                    over_limit = summary.rules_over_limit,
                    advanced = summary.advanced_blocking_rules_count,
                    "content blocker updated"
                ),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "summary logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}
