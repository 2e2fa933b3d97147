//! Refresh CLI
//!
//! Runs the data-source refresh jobs in-process against the configured
//! stores. Exit code 0 when every requested source succeeded, 1 otherwise.
//!
//! `--sync` runs sources one after another (the default fans them out
//! concurrently); `--force` bypasses the minimum-interval guard.

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use verdict_runtime::{RefreshSource, SourceOutcome};
use verdict_server::{services, ServerConfig};

/// Refresh the reference data feeds
#[derive(Parser, Debug)]
#[command(name = "refresh")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Source to refresh: all, tor, disposable_emails, asn, user_agents
    #[arg(long, default_value = "all")]
    source: String,

    /// Bypass the minimum-interval guard
    #[arg(long)]
    force: bool,

    /// Run sources sequentially instead of concurrently
    #[arg(long)]
    sync: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "refresh=info,verdict_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let config = ServerConfig::load()?;
    let services = services::build(&config).await?;
    let refresh = services.refresh;

    let sources: Vec<RefreshSource> = if cli.source == "all" {
        RefreshSource::ALL.to_vec()
    } else {
        vec![cli.source.parse().map_err(|e| {
            anyhow::anyhow!("{}: expected all, tor, disposable_emails, asn or user_agents", e)
        })?]
    };

    let outcomes: Vec<(RefreshSource, SourceOutcome)> = if cli.sync {
        let mut outcomes = Vec::with_capacity(sources.len());
        for source in sources {
            outcomes.push((source, refresh.refresh(source, cli.force).await));
        }
        outcomes
    } else {
        let handles: Vec<_> = sources
            .into_iter()
            .map(|source| {
                let refresh = Arc::clone(&refresh);
                let force = cli.force;
                tokio::spawn(async move { (source, refresh.refresh(source, force).await) })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(handle.await?);
        }
        outcomes
    };

    let mut failed = false;
    for (source, outcome) in &outcomes {
        if outcome.success {
            info!(
                source = %source,
                count = outcome.count,
                skipped = outcome.skipped,
                "Refresh source finished"
            );
        } else {
            failed = true;
            error!(
                source = %source,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "Refresh source failed"
            );
        }
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
