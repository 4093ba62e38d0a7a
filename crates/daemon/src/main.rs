//! Smart Search - Pipeline Daemon
//!
//! Composition root: wires the NATS broker, the SQLite store and the web
//! collaborators into the stage consumers and the HTTP front door, then
//! supervises them until Ctrl+C.

mod config;
mod telemetry;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Config, Unit};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use smartsearch_api_http::{AppState, HttpServer, HttpServerConfig};
use smartsearch_core::application::worker::constants::GRACEFUL_SHUTDOWN_TIMEOUT;
use smartsearch_core::application::{
    classify, connect_with_retry, shutdown_channel, AiStage, ConnectPolicy, FailureClass,
    IntakeStage, ScrapeStage, StageConsumer, StageHandler, StageProducer, TopologyRegistrar,
    UrlCollector,
};
use smartsearch_core::domain::PipelineTopology;
use smartsearch_core::port::{
    BrokerConnector, ProfileRepository, SystemTimeProvider, TransactionalProfileRepository,
};
use smartsearch_infra_nats::{NatsConfig, NatsConnector};
use smartsearch_infra_sqlite::{create_pool, run_migrations, SqliteProfileRepository};
use smartsearch_infra_web::{
    MercadoLibreConfig, MercadoLibreSearch, OpenRouterClient, OpenRouterConfig,
};

type UnitResult = (&'static str, smartsearch_core::Result<()>);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration (.env first so clap sees it)
    dotenvy::dotenv().ok();
    let config = Config::parse();

    // 2. Logging
    let _log_guard = telemetry::init_logging(config.log_format, config.log_dir().as_deref())?;
    info!(
        version = smartsearch_core::VERSION,
        stages = ?config.stages,
        "Smart Search daemon starting..."
    );

    // 3. Database (the AI stage alone never touches it)
    let needs_db = config.runs(Unit::Intake) || config.runs(Unit::Scrape) || config.runs(Unit::Http);
    let pool = if needs_db {
        if let Some(dir) = config.database_dir() {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create database directory {}", dir))?;
        }
        let url = config.sqlite_url();
        info!(database = %url, "Initializing database...");
        let pool = create_pool(&url, config.db_min_connections, config.db_max_connections)
            .await
            .context("DB pool creation failed")?;
        run_migrations(&pool).await.context("Migration failed")?;
        Some(pool)
    } else {
        None
    };
    let repo = pool
        .clone()
        .map(|p| Arc::new(SqliteProfileRepository::new(p, Arc::new(SystemTimeProvider))));

    // 4. Broker + topology
    let connector: Arc<dyn BrokerConnector> = Arc::new(NatsConnector::new(
        NatsConfig::new(&config.nats_url)
            .with_connection_name("smartsearch")
            .with_ack_wait(config.ack_wait()),
    ));
    let topology = PipelineTopology::standard();
    register_topology(connector.as_ref(), &topology, config.connect_policy()).await?;

    // 5. Units
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let mut units: JoinSet<UnitResult> = JoinSet::new();

    if config.runs(Unit::Intake) {
        let repo = repo.clone().context("intake stage requires the database")?;
        let tx_repo: Arc<dyn TransactionalProfileRepository> = repo;
        let stage = IntakeStage::new(topology.clone(), tx_repo);
        spawn_stage(&mut units, "intake", stage, &connector, &config, shutdown_rx.clone());
    }

    // Shared by the AI stage and the chat proxy
    let completer = Arc::new(OpenRouterClient::new(OpenRouterConfig {
        api_key: config.openrouter_api_key.clone(),
        base_url: config.openrouter_base_url.clone(),
        model: config.openrouter_model.clone(),
        site_url: config.site_url.clone(),
        site_name: config.site_name.clone(),
        ..Default::default()
    })?);
    if config.openrouter_api_key.is_none() && (config.runs(Unit::Ai) || config.runs(Unit::Http)) {
        warn!("OPENROUTER_API_KEY not set: AI requests will be dropped until it is configured");
    }

    if config.runs(Unit::Ai) {
        let stage = AiStage::new(&topology, completer.clone());
        spawn_stage(&mut units, "ai", stage, &connector, &config, shutdown_rx.clone());
    }

    if config.runs(Unit::Scrape) {
        let repo = repo.clone().context("scrape stage requires the database")?;
        let profiles: Arc<dyn ProfileRepository> = repo;
        let search = MercadoLibreSearch::new(MercadoLibreConfig::default())?;
        let stage = ScrapeStage::new(
            &topology,
            UrlCollector::new(Arc::new(search)),
            profiles,
            config.max_products_per_search,
        );
        spawn_stage(&mut units, "scrape", stage, &connector, &config, shutdown_rx.clone());
    }

    if config.runs(Unit::Http) {
        let repo = repo.clone().context("HTTP front door requires the database")?;
        let profiles: Arc<dyn ProfileRepository> = repo;
        // One attempt per request: the caller gets a 503 instead of a hung request
        let producer = StageProducer::new(
            Arc::clone(&connector),
            ConnectPolicy {
                max_attempts: 1,
                ..config.connect_policy()
            },
        );
        let server = HttpServer::new(
            HttpServerConfig {
                host: config.http_host.clone(),
                port: config.http_port,
            },
            AppState::new(producer, topology.intake.clone(), profiles).with_chat(completer.clone()),
        );
        spawn_unit(&mut units, "http", server.serve(shutdown_rx.clone()));
    }

    info!(units = units.len(), "System ready. Press Ctrl+C to shutdown");

    // 6. Supervise until Ctrl+C or every unit is gone
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                signal?;
                info!("Shutdown signal received. Exiting gracefully...");
                break;
            }
            joined = units.join_next() => match joined {
                Some(Ok((unit, Ok(())))) => info!(unit, "Unit stopped"),
                Some(Ok((unit, Err(e)))) => {
                    error!(unit, severity = "critical", error = %e, "Unit stopped with a fatal error");
                }
                Some(Err(e)) => error!(error = %e, "Unit task aborted"),
                None => {
                    warn!("No units left running");
                    break;
                }
            }
        }
    }

    // 7. Graceful shutdown: in-flight messages finish, waiting consumers stop
    shutdown_tx.shutdown();
    let drained = tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, async {
        while let Some(joined) = units.join_next().await {
            if let Ok((unit, result)) = joined {
                if let Err(e) = result {
                    warn!(unit, error = %e, "Unit ended with error during shutdown");
                }
            }
        }
    })
    .await;
    if drained.is_err() {
        warn!(
            timeout_secs = GRACEFUL_SHUTDOWN_TIMEOUT.as_secs(),
            "Units still running after shutdown timeout, aborting"
        );
        units.abort_all();
    }

    if let Some(pool) = pool {
        pool.close().await;
    }
    telemetry::shutdown();
    info!("Shutdown complete.");
    Ok(())
}

/// Declare every queue once at startup
///
/// A conflicting declaration aborts startup. An unreachable broker does not:
/// each consumer declares its own queues when it connects.
async fn register_topology(
    connector: &dyn BrokerConnector,
    topology: &PipelineTopology,
    policy: ConnectPolicy,
) -> Result<()> {
    let registrar = TopologyRegistrar::new(topology.clone());
    let result = async {
        let conn = connect_with_retry(connector, policy).await?;
        let ensured = registrar.ensure(conn.as_ref()).await;
        if let Err(e) = conn.close().await {
            warn!(error = %e, "Closing registration connection failed");
        }
        ensured
    }
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(e) if classify(&e) == FailureClass::ConfigFatal => {
            Err(anyhow::Error::new(e).context("Queue topology registration failed"))
        }
        Err(e) => {
            warn!(error = %e, "Topology registration deferred to stage consumers");
            Ok(())
        }
    }
}

fn spawn_stage<H: StageHandler>(
    units: &mut JoinSet<UnitResult>,
    name: &'static str,
    handler: H,
    connector: &Arc<dyn BrokerConnector>,
    config: &Config,
    shutdown: smartsearch_core::application::ShutdownToken,
) {
    let consumer = StageConsumer::new(handler, Arc::clone(connector), config.connect_policy())
        .with_cooldown(config.reconnect_cooldown())
        .with_progress_interval(config.progress_interval());
    spawn_unit(units, name, async move { consumer.run(shutdown).await });
}

fn spawn_unit<F>(units: &mut JoinSet<UnitResult>, name: &'static str, unit: F)
where
    F: Future<Output = smartsearch_core::Result<()>> + Send + 'static,
{
    units.spawn(async move { (name, unit.await) });
    info!(unit = name, "Unit started");
}
