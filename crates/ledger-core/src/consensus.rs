//! Longest-valid-chain conflict resolution.
//!
//! Every registered peer is asked for its chain concurrently, each under its
//! own timeout. Peers that fail, time out or send malformed data simply do
//! not vote. A candidate wins only if it is strictly longer than the best
//! seen so far (starting from the local length) and passes full validation.

use crate::chain::{ChainStore, Ledger};
use crate::error::{PeerError, Result};
use crate::{validate, Block};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Body of `GET /chain`, served and consumed by every node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainResponse {
    pub chain: Vec<Block>,
    pub length: usize,
}

impl ChainResponse {
    pub fn new(chain: Vec<Block>) -> Self {
        Self {
            length: chain.len(),
            chain,
        }
    }
}

/// Transport used to fetch a peer's chain.
pub trait PeerClient: Send + Sync {
    fn fetch_chain(
        &self,
        peer: &str,
    ) -> impl Future<Output = std::result::Result<ChainResponse, PeerError>> + Send;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Replaced { peer: String, length: usize },
    Authoritative { length: usize },
}

impl Resolution {
    pub fn replaced(&self) -> bool {
        matches!(self, Resolution::Replaced { .. })
    }

    pub fn length(&self) -> usize {
        match self {
            Resolution::Replaced { length, .. } | Resolution::Authoritative { length } => *length,
        }
    }
}

/// One peer's answer in a round.
pub type Vote = (String, std::result::Result<Vec<Block>, PeerError>);

pub struct ConsensusResolver<C> {
    client: C,
    peer_timeout: Duration,
}

impl<C: PeerClient> ConsensusResolver<C> {
    pub fn new(client: C, peer_timeout: Duration) -> Self {
        Self {
            client,
            peer_timeout,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn peer_timeout(&self) -> Duration {
        self.peer_timeout
    }

    /// Fetches every peer's chain concurrently. A slow or failing peer only
    /// affects its own entry.
    pub async fn poll_peers(&self, peers: &[String]) -> Vec<Vote> {
        let fetches = peers.iter().map(|peer| async move {
            let outcome =
                match tokio::time::timeout(self.peer_timeout, self.client.fetch_chain(peer)).await
                {
                    Ok(Ok(response)) if response.length != response.chain.len() => {
                        Err(PeerError::LengthMismatch {
                            peer: peer.clone(),
                            reported: response.length,
                            actual: response.chain.len(),
                        })
                    }
                    Ok(Ok(response)) => Ok(response.chain),
                    Ok(Err(err)) => Err(err),
                    Err(_) => Err(PeerError::Timeout { peer: peer.clone() }),
                };
            (peer.clone(), outcome)
        });
        join_all(fetches).await
    }

    /// Runs one round against the ledger's registered peers and adopts the
    /// winning chain, if any.
    pub async fn resolve<S: ChainStore + ?Sized>(&self, ledger: &Ledger<S>) -> Result<Resolution> {
        let peers = ledger.nodes();
        let local_length = ledger.len();
        let votes = self.poll_peers(&peers).await;

        let Some((peer, chain)) = elect(local_length, votes) else {
            info!(length = local_length, peers = peers.len(), "local chain is authoritative");
            return Ok(Resolution::Authoritative {
                length: local_length,
            });
        };

        let length = chain.len();
        if ledger.adopt(chain) {
            info!(%peer, length, "adopted peer chain");
            Ok(Resolution::Replaced { peer, length })
        } else {
            // The local chain grew past the winner while peers were polled.
            Ok(Resolution::Authoritative {
                length: ledger.len(),
            })
        }
    }
}

/// Picks the winning chain: strictly longer than everything seen so far and
/// valid. Returns `None` if the local chain stands.
pub fn elect(local_length: usize, votes: Vec<Vote>) -> Option<(String, Vec<Block>)> {
    let mut max_length = local_length;
    let mut winner = None;

    for (peer, outcome) in votes {
        let chain = match outcome {
            Ok(chain) => chain,
            Err(err) => {
                warn!(%peer, error = %err, "peer abstained");
                continue;
            }
        };
        if chain.len() <= max_length {
            debug!(%peer, length = chain.len(), max_length, "peer chain not longer");
            continue;
        }
        if let Err(fault) = validate::validate_chain(&chain) {
            warn!(%peer, length = chain.len(), %fault, "rejected invalid peer chain");
            continue;
        }
        max_length = chain.len();
        winner = Some((peer, chain));
    }
    winner
}
