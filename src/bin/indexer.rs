use anyhow::Result;
use chain_mirror::classifier::ClassifierCache;
use chain_mirror::config::Config;
use chain_mirror::fees::FeeAccumulator;
use chain_mirror::repository::{AddressSubset, Database};
use chain_mirror::rpc::RpcClient;
use chain_mirror::stats::StatsSnapshotter;
use chain_mirror::syncer::{Backfill, ChainSyncer, HeadListener};
use chain_mirror::tokens::{TokenUpdater, UpdaterSettings};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting chain mirror");

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!(
        "RPC URLs: {} endpoint(s) configured",
        config.json_rpc_urls.len()
    );

    let db = Database::new(&config.database_url)?;
    info!("Database initialized");

    let client = Arc::new(RpcClient::new(
        &config.json_rpc_urls,
        config.rpc_max_retries,
    )?);
    info!("RPC client connected");

    let syncer = Arc::new(ChainSyncer::new(Arc::clone(&client), db.clone()));
    let updater = Arc::new(TokenUpdater::new(
        Arc::clone(&client),
        db.clone(),
        Arc::new(ClassifierCache::new()),
        UpdaterSettings::from(&config),
    ));

    let cancel = CancellationToken::new();
    let mut workers = JoinSet::new();

    let listener = HeadListener::new(Arc::clone(&syncer), &config);
    let token = cancel.clone();
    workers.spawn(async move { ("head listener", listener.run(token).await) });

    let backfill = Backfill::new(Arc::clone(&syncer), &config);
    let token = cancel.clone();
    workers.spawn(async move { ("backfill", backfill.run(token).await) });

    for (name, subset, interval) in [
        (
            "plain address updater",
            AddressSubset::Plain,
            config.plain_update_interval,
        ),
        (
            "contract updater",
            AddressSubset::Contracts,
            config.contract_update_interval,
        ),
    ] {
        let updater = Arc::clone(&updater);
        let token = cancel.clone();
        workers.spawn(async move { (name, updater.run(subset, interval, token).await) });
    }

    let fees = FeeAccumulator::new(Arc::clone(&syncer), &config);
    let token = cancel.clone();
    workers.spawn(async move { ("fee accumulator", fees.run(token).await) });

    let stats = StatsSnapshotter::new(db.clone(), config.stats_interval);
    let token = cancel.clone();
    workers.spawn(async move { ("stats snapshotter", stats.run(token).await) });

    info!("{} workers running", workers.len());

    let mut failure = None;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                if let Err(e) = signal {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Shutdown requested, stopping workers");
                cancel.cancel();
            }
            joined = workers.join_next() => match joined {
                None => break,
                Some(Ok((name, Ok(())))) => info!("{} exited", name),
                Some(Ok((name, Err(e)))) => {
                    error!("{} failed: {:#}", name, e);
                    failure.get_or_insert(e);
                    cancel.cancel();
                }
                Some(Err(e)) => {
                    error!("Worker task aborted: {}", e);
                    failure.get_or_insert(e.into());
                    cancel.cancel();
                }
            },
        }
    }

    match failure {
        Some(e) => Err(e),
        None => {
            info!("Chain mirror stopped");
            Ok(())
        }
    }
}
