use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for a ledger node.
#[derive(Parser, Debug, Clone)]
#[command(name = "ledger-node", about = "Proof-of-work ledger node")]
pub struct NodeConfig {
    /// Address to listen on, e.g. 127.0.0.1:5000
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub listen: String,

    /// Data directory for sled
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,

    /// Keep the chain in memory only
    #[arg(long)]
    pub ephemeral: bool,

    /// Peer to register at startup (URL or host:port); repeatable
    #[arg(long = "peer")]
    pub peers: Vec<String>,

    /// Per-peer timeout when resolving conflicts, in milliseconds
    #[arg(long, default_value_t = 3000)]
    pub peer_timeout_ms: u64,

    /// Give up a mining attempt after this many seconds
    #[arg(long)]
    pub mine_timeout_secs: Option<u64>,

    /// Search proofs on all cores
    #[arg(long)]
    pub parallel_mining: bool,

    /// Run conflict resolution on this interval, in seconds
    #[arg(long)]
    pub resolve_interval_secs: Option<u64>,
}

impl NodeConfig {
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }

    pub fn mine_timeout(&self) -> Option<Duration> {
        self.mine_timeout_secs.map(Duration::from_secs)
    }

    pub fn resolve_interval(&self) -> Option<Duration> {
        self.resolve_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
