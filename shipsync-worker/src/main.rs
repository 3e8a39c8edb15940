use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use shipsync_carrier::{CircuitBreaker, GuardedCarrier, HttpCarrierClient, HttpCarrierConfig};
use shipsync_order::{Reconciler, RunOptions, SchedulerConfig, SettlementLedger, SyncScheduler};
use shipsync_store::app_config::{Config, LogConfig};
use shipsync_store::{DbClient, PgOrderStore};
use shipsync_worker::cli::{Cli, Commands};
use shipsync_worker::server::{self, OpsState};
use shipsync_worker::SyncMetrics;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "shipsync_worker=info,shipsync_order=info,\
    shipsync_carrier=info,shipsync_store=info,tower_http=info";

fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER).into());

    let json = log.json.then(|| tracing_subscriber::fmt::layer().json());
    let plain = (!log.json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .init();
}

fn build_scheduler(config: &Config, db: &DbClient) -> anyhow::Result<SyncScheduler> {
    let store = Arc::new(PgOrderStore::new(db.pool.clone()));

    let http = HttpCarrierClient::new(HttpCarrierConfig {
        base_url: config.carrier.base_url.clone(),
        tracking_path: config.carrier.tracking_path.clone(),
        api_token: config.carrier.api_token.clone(),
        token_header: config.carrier.token_header.clone(),
        timeout: config.carrier.timeout(),
    })
    .context("Failed to build carrier client")?;
    let breaker = CircuitBreaker::new(
        "carrier",
        config.carrier.breaker_failure_threshold,
        config.carrier.breaker_reset(),
    );
    let carrier = Arc::new(GuardedCarrier::new(http, breaker));

    let ledger = SettlementLedger::new(store.clone());
    let reconciler = Arc::new(Reconciler::new(carrier, store.clone(), ledger.clone()));

    Ok(SyncScheduler::new(
        reconciler,
        store,
        ledger,
        SchedulerConfig {
            interval: config.sync.interval(),
            concurrency: config.sync.concurrency,
            order_timeout: config.sync.order_timeout(),
            batch_limit: config.sync.batch_limit,
        },
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("Failed to load config")?;
    init_tracing(&config.log);

    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;

    match cli.command {
        Commands::Migrate => {
            db.migrate().await.context("Failed to run migrations")?;
        }
        Commands::Sync { force, limit } => {
            let scheduler = build_scheduler(&config, &db)?;
            let report = scheduler.run_once(RunOptions { force, limit }).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Run => {
            db.ping().await.context("Database is not reachable")?;

            let metrics = Arc::new(SyncMetrics::new().context("Failed to register metrics")?);
            let scheduler = Arc::new(build_scheduler(&config, &db)?.with_observer(metrics.clone()));
            let (shutdown_tx, shutdown_rx) = watch::channel(false);

            let ops = OpsState {
                metrics,
                phase: scheduler.subscribe_phase(),
            };
            let server_task =
                tokio::spawn(server::serve(ops, config.server.port, shutdown_rx.clone()));
            let scheduler_task = {
                let scheduler = scheduler.clone();
                tokio::spawn(async move { scheduler.run_forever(shutdown_rx).await })
            };

            tracing::info!("Shipsync worker running, interval {}s", config.sync.interval_seconds);
            tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Shutdown requested, finishing current run");
            let _ = shutdown_tx.send(true);

            scheduler_task.await.context("Scheduler task panicked")?;
            server_task.await.context("Ops server task panicked")??;
        }
    }

    Ok(())
}
