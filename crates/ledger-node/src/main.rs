use clap::Parser;
use ledger_node::{api, build_state, config::NodeConfig, spawn_periodic_resolution};
use std::net::SocketAddr;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = NodeConfig::parse();
    let state = build_state(&config)?;

    let resolver_task = config
        .resolve_interval()
        .map(|every| spawn_periodic_resolution(state.clone(), every));

    let store = state.ledger.store().clone();
    let app = api::router(state);

    let addr: SocketAddr = config.listen.parse()?;
    info!("ledger-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(task) = resolver_task {
        task.abort();
    }
    store.close()?;
    info!("ledger-node stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
