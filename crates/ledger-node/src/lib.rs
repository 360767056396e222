//! HTTP node around the ledger core: peer chain exchange, mining and the
//! reward endpoints.

pub mod api;
pub mod config;
pub mod peer;

use anyhow::{Context, Result};
use api::AppState;
use config::NodeConfig;
use ledger_core::consensus::ConsensusResolver;
use ledger_core::mine::Miner;
use ledger_core::{rewards, ChainStore, Ledger, MemoryStore};
use ledger_storage::SledStore;
use peer::HttpPeerClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Opens the store, loads the ledger and registers the configured peers.
pub fn build_state(config: &NodeConfig) -> Result<AppState> {
    let store: Arc<dyn ChainStore> = if config.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(SledStore::open(&config.data_dir)?)
    };
    let ledger = Arc::new(Ledger::open(store).context("loading ledger")?);
    for peer in &config.peers {
        let node = ledger
            .register_node(peer)
            .with_context(|| format!("registering peer {peer:?}"))?;
        info!(%node, "registered peer");
    }

    let http = reqwest::Client::builder()
        .timeout(config.peer_timeout())
        .build()
        .context("building http client")?;
    let resolver = ConsensusResolver::new(HttpPeerClient::new(http), config.peer_timeout());
    let miner = Miner::new(rewards::new_user_id()).parallel(config.parallel_mining);
    info!(node_id = miner.node_id(), height = ledger.len(), "node ready");

    Ok(AppState {
        ledger,
        resolver: Arc::new(resolver),
        miner,
        mine_timeout: config.mine_timeout(),
    })
}

/// Re-runs conflict resolution every `every`. Failures are logged and the
/// next tick tries again.
pub fn spawn_periodic_resolution(state: AppState, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match state.resolver.resolve(state.ledger.as_ref()).await {
                Ok(resolution) if resolution.replaced() => {
                    info!(length = resolution.length(), "periodic resolution replaced chain")
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "periodic resolution failed"),
            }
        }
    })
}
