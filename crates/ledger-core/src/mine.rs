use crate::chain::{ChainStore, Ledger, Tip};
use crate::constants::{ABORT_CHECK_INTERVAL, MINING_REWARD};
use crate::error::{LedgerError, Result};
use crate::pow::{self, Abort};
use crate::{Block, Transaction};
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info};

/// Searches proofs in parallel and returns the same smallest solution as
/// [`pow::solve`], or `None` once `abort` fires.
pub fn solve_parallel(last_proof: u64, last_hash: &str, abort: &Abort) -> Option<u64> {
    // Rayon splits the range across threads; `find_map_first` still yields
    // the lowest index that maps to `Some`.
    (0u64..u64::MAX)
        .into_par_iter()
        .find_map_first(|proof| {
            if proof % ABORT_CHECK_INTERVAL == 0 && abort.is_aborted() {
                Some(None)
            } else if pow::is_valid(last_proof, proof, last_hash) {
                Some(Some(proof))
            } else {
                None
            }
        })
        .flatten()
}

/// Produces blocks for a ledger. The puzzle is solved against a snapshot of
/// the tip without holding the ledger lock; the append then fails with
/// `StaleTip` if the chain moved in the meantime.
#[derive(Clone, Debug)]
pub struct Miner {
    node_id: String,
    parallel: bool,
}

impl Miner {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            parallel: false,
        }
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn solve(&self, tip: &Tip, abort: &Abort) -> Option<u64> {
        if self.parallel {
            solve_parallel(tip.proof, &tip.hash, abort)
        } else {
            pow::solve_with(tip.proof, &tip.hash, abort)
        }
    }

    /// Mines the next block and mints the standard reward to this node.
    pub fn mine_rewarded<S: ChainStore + ?Sized>(
        &self,
        ledger: &Ledger<S>,
        abort: &Abort,
    ) -> Result<Block> {
        let reward = Transaction::reward(self.node_id.clone(), MINING_REWARD);
        self.mine(ledger, Some(reward), abort)
    }

    pub fn mine<S: ChainStore + ?Sized>(
        &self,
        ledger: &Ledger<S>,
        reward: Option<Transaction>,
        abort: &Abort,
    ) -> Result<Block> {
        let tip = ledger.tip()?;
        let started = Instant::now();
        let proof = self
            .solve(&tip, abort)
            .ok_or(LedgerError::MiningAbandoned)?;
        debug!(
            index = tip.index + 1,
            proof,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "solved proof"
        );
        let block = ledger.append_rewarded(proof, &tip.hash, reward)?;
        info!("Mined block {} with proof {}", block.index, block.proof);
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{validate, MemoryStore};
    use std::sync::Arc;
    use std::time::Duration;

    const GENESIS_HASH: &str = "525afe96d81a5e16082be3818542c9dab09537ac6e961295c671877fcb12a431";

    #[test]
    fn parallel_search_finds_the_smallest_proof() {
        assert_eq!(solve_parallel(100, GENESIS_HASH, &Abort::never()), Some(4456));
        assert_eq!(solve_parallel(100, "abc", &Abort::never()), Some(24356));
    }

    #[test]
    fn parallel_search_honours_abort() {
        let abort = Abort::never();
        abort.cancel();
        assert_eq!(solve_parallel(100, GENESIS_HASH, &abort), None);
    }

    #[test]
    fn mining_builds_a_valid_chain() {
        let ledger = Ledger::open(Arc::new(MemoryStore::new())).unwrap();
        let miner = Miner::new("node-a");
        ledger
            .add_transaction(Transaction::new("alice", "bob", 2))
            .unwrap();
        let first = miner.mine_rewarded(&ledger, &Abort::never()).unwrap();
        assert_eq!(first.index, 2);
        assert_eq!(
            first.transactions,
            vec![
                Transaction::new("alice", "bob", 2),
                Transaction::reward("node-a", MINING_REWARD)
            ]
        );

        let second = miner
            .clone()
            .parallel(true)
            .mine(&ledger, None, &Abort::never())
            .unwrap();
        assert_eq!(second.index, 3);
        assert!(second.transactions.is_empty());
        assert!(validate::is_valid(&ledger.chain()));
        assert_eq!(ledger.balance_of("node-a"), 1);
    }

    #[test]
    fn abandoned_mining_leaves_ledger_untouched() {
        let ledger = Ledger::open(Arc::new(MemoryStore::new())).unwrap();
        ledger
            .add_transaction(Transaction::new("alice", "bob", 2))
            .unwrap();
        let err = Miner::new("node-a")
            .mine_rewarded(&ledger, &Abort::after(Duration::ZERO))
            .unwrap_err();
        assert!(matches!(err, LedgerError::MiningAbandoned));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.pending().len(), 1);
    }
}
