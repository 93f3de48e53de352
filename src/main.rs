mod routes;

use std::sync::Arc;

use agent::ChatService;
use config::ChatConfig;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("could not listen for shutdown signal: {err}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_logging();

    let conf = ChatConfig::get_or_default();
    tracing::info!(database = %conf.database.path.display(), "starting chat service");

    let service = Arc::new(ChatService::start(&conf).await?);
    if service.is_ready() {
        tracing::info!("agent ready");
    }

    let address = conf.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(%address, "listening");

    axum::serve(listener, routes::router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("chat service shutting down");
    Ok(())
}
