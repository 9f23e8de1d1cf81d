//! Service Bootstrap
//!
//! Wires the adapters into the engine: one shared connection pool, the
//! change subscription source, the two stage handlers, and the
//! supervised dispatcher on top of them.

use std::sync::Arc;
use std::time::Duration;

use sigex_adapters::config::AppConfig;
use sigex_adapters::{
    ArgoClusterClient, HpoClient, PostgresAlgorithmCatalog, PostgresRunRepository,
    RisingWaveSubscriptionSource,
};
use sigex_modules::cursor::{ChangeEventCursor, CursorConfig};
use sigex_modules::workflow::FinalizeTarget;
use sigex_modules::{
    DispatchError, Dispatcher, InitRunHandler, RetryPolicy, StartRunHandler, StartRunOptions,
};
use sigex_ports::SubscriptionSettings;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("configuration error: {0}")]
    Config(#[from] sigex_adapters::ConfigError),

    #[error("{0}")]
    General(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, BootstrapError>;

type InitHandler = InitRunHandler<PostgresRunRepository, PostgresAlgorithmCatalog, HpoClient>;
type StartHandler =
    StartRunHandler<PostgresRunRepository, PostgresAlgorithmCatalog, ArgoClusterClient>;
type ServiceDispatcher = Dispatcher<PostgresRunRepository, InitHandler, StartHandler>;

pub struct ServerComponents {
    pub config: AppConfig,
    dispatcher: ServiceDispatcher,
    subscription_source: Arc<RisingWaveSubscriptionSource>,
    cancel: CancellationToken,
}

pub async fn initialize(config: AppConfig, cancel: CancellationToken) -> Result<ServerComponents> {
    info!("initializing orchestrator");

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to connect to the orchestration store");
            anyhow::anyhow!("failed to connect to the orchestration store: {e}")
        })?;
    info!("connection pool ready");

    let subscription_source = Arc::new(RisingWaveSubscriptionSource::new(pool.clone()));
    subscription_source
        .init_schema()
        .await
        .map_err(|e| anyhow::anyhow!("failed to initialize checkpoint schema: {e}"))?;

    let repository = Arc::new(PostgresRunRepository::new(pool.clone()));
    let catalog = Arc::new(PostgresAlgorithmCatalog::new(pool));

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.hpo.request_timeout_secs))
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;
    let generator = Arc::new(HpoClient::new(http, config.hpo.base_url.clone()));

    let cluster = Arc::new(
        ArgoClusterClient::new(config.kubernetes.namespace.clone())
            .await
            .map_err(|e| anyhow::anyhow!("failed to build cluster client: {e}"))?,
    );
    info!(namespace = %config.kubernetes.namespace, "cluster client ready");

    let init_handler = Arc::new(InitRunHandler::new(
        Arc::clone(&repository),
        Arc::clone(&catalog),
        generator,
    ));
    let start_handler = Arc::new(StartRunHandler::new(
        Arc::clone(&repository),
        catalog,
        cluster,
        StartRunOptions {
            env_vars: config.workflow.parsed_env_vars()?,
            gc_delete_delay: config.workflow.gc_delete_delay.clone(),
            finalize: FinalizeTarget {
                host: config.workflow.finalize.host.clone(),
                port: config.workflow.finalize.port,
                database: config.workflow.finalize.database.clone(),
                user: config.workflow.finalize.user.clone(),
                password: config.workflow.finalize.password.clone(),
            },
        },
    ));

    let dispatcher = Dispatcher::new(
        repository,
        init_handler,
        start_handler,
        RetryPolicy::fixed(Duration::from_secs(config.dispatcher.retry_interval_secs)),
        cancel.clone(),
    );

    Ok(ServerComponents {
        config,
        dispatcher,
        subscription_source,
        cancel,
    })
}

impl ServerComponents {
    /// Drives the dispatch loop until cancellation.
    pub async fn run(&self) -> std::result::Result<(), DispatchError> {
        let settings = SubscriptionSettings::new(
            sigex_adapters::db::RUNS_SUBSCRIPTION,
            self.config.dispatcher.subscription_retention.clone(),
        );
        let cursor_config = CursorConfig {
            fetch_timeout: Duration::from_secs(self.config.dispatcher.fetch_timeout_secs),
            reconnect_backoff: Duration::from_secs(self.config.dispatcher.reconnect_backoff_secs),
            inserts_only: self.config.dispatcher.inserts_only,
        };

        self.dispatcher
            .run_supervised(|| {
                ChangeEventCursor::new(
                    Arc::clone(&self.subscription_source),
                    settings.clone(),
                    cursor_config.clone(),
                    self.cancel.clone(),
                )
            })
            .await
    }
}
