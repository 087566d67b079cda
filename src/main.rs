//! snowdrift: sync a document store into a partitioned key-value table and
//! infer a schema for each synced collection.

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use snowdrift::config::Config;
use snowdrift::error::{AddressParseSnafu, ConfigSnafu, MetricsSnafu, PipelineError};
use snowdrift::signal::cancel_on_signal;
use snowdrift::tracing::init_tracing;
use snowdrift::{metrics, run_sync};

/// Document store to key-value table sync tool.
#[derive(Parser, Debug)]
#[command(name = "snowdrift")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - validate configuration without syncing.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    info!("snowdrift starting");

    let config = Config::from_file(&args.config).context(ConfigSnafu)?;

    if args.dry_run {
        info!("Dry run mode - validating configuration");
        info!("Source: {}", config.source.url);
        match &config.target.snapshot_url {
            Some(url) => info!("Table snapshot: {url}"),
            None => info!("Table snapshot: none (in-memory only)"),
        }
        info!("Page size: {}", config.orchestrator.page_size);
        info!("Writers: {}", config.writer.concurrency);
        info!("Configuration is valid");
        return Ok(());
    }

    let shutdown = CancellationToken::new();

    if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        metrics::init(addr, shutdown.clone()).context(MetricsSnafu)?;
        debug!(
            "Metrics endpoint listening on http://{}/metrics",
            config.metrics.address
        );
    }

    cancel_on_signal(shutdown.clone());

    let stats = run_sync(config, shutdown.clone()).await?;
    shutdown.cancel();

    if stats.run.cancelled {
        warn!(envelope = ?stats.run.last_envelope, "Sync interrupted");
    } else {
        info!("Sync completed successfully");
    }
    info!("  Pages read: {}", stats.run.pages_read);
    info!("  Documents read: {}", stats.run.documents_read);
    info!("  Batches applied: {}", stats.writers.batches_applied);
    info!("  Records written: {}", stats.writers.records_written);
    info!("  Duplicate source matches: {}", stats.writers.duplicate_matches);
    info!("  Dead letters: {}", stats.failures.total());
    if let Some(report) = &stats.run.introspection {
        info!("  Schemas persisted: {}", report.persisted.len());
        for (facet, error) in &report.failed {
            warn!(facet = %facet, error = %error, "Schema not updated");
        }
    }

    Ok(())
}
