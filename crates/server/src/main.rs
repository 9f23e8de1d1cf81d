use sigex_adapters::config::AppConfig;
use sigex_server::bootstrap;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config);

    let cancel = CancellationToken::new();
    let components = bootstrap::initialize(config, cancel.clone()).await?;

    let dispatcher_task = tokio::spawn(async move {
        let result = components.run().await;
        if let Err(err) = &result {
            error!(error = %err, "dispatcher stopped with an error");
        }
        result
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    cancel.cancel();

    dispatcher_task.await??;
    info!("orchestrator stopped");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
