use crate::balance::{self, Balances};
use crate::constants::{GENESIS_INDEX, GENESIS_PREVIOUS_HASH, GENESIS_PROOF};
use crate::error::{LedgerError, Result};
use crate::pool::TransactionPool;
use crate::registry::NodeRegistry;
use crate::{pow, validate, Block, BlockId, Hash, Transaction};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info};

/// Trait the storage backends implement for the ledger to persist blocks.
/// This lives in `ledger-core` to avoid a circular dependency.
pub trait ChainStore: Send + Sync {
    /// Every stored block in index order. An empty vector means no prior
    /// state; any failure to read must be an error, never an empty vector.
    fn load_chain(&self) -> anyhow::Result<Vec<Block>>;
    fn save_block(&self, block: &Block) -> anyhow::Result<BlockId>;
    /// Atomically swaps the stored chain for `chain`.
    fn replace_chain(&self, chain: &[Block]) -> anyhow::Result<()>;
    fn close(&self) -> anyhow::Result<()>;
}

/// Volatile store for tests and throwaway nodes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: Mutex<Vec<Block>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chain(chain: Vec<Block>) -> Self {
        Self {
            next_id: AtomicU64::new(chain.len() as u64),
            blocks: Mutex::new(chain),
        }
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.blocks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ChainStore for MemoryStore {
    fn load_chain(&self) -> anyhow::Result<Vec<Block>> {
        Ok(self.blocks())
    }

    fn save_block(&self, block: &Block) -> anyhow::Result<BlockId> {
        self.blocks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(block.clone());
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn replace_chain(&self, chain: &[Block]) -> anyhow::Result<()> {
        *self.blocks.lock().unwrap_or_else(PoisonError::into_inner) = chain.to_vec();
        Ok(())
    }

    fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A zero-transaction genesis block with the sentinel previous hash.
pub fn genesis_block() -> Block {
    Block::new(GENESIS_INDEX, vec![], GENESIS_PROOF, GENESIS_PREVIOUS_HASH)
}

/// What a miner needs from the newest block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tip {
    pub index: u64,
    pub proof: u64,
    pub hash: Hash,
}

#[derive(Debug)]
struct State {
    chain: Arc<Vec<Block>>,
    pool: TransactionPool,
}

/// The node's ledger: chain, pending pool and peer registry behind one
/// owner. Chain and pool mutate together under a single write lock; readers
/// get an immutable snapshot of the chain.
pub struct Ledger<S: ChainStore + ?Sized = dyn ChainStore> {
    store: Arc<S>,
    state: RwLock<State>,
    nodes: RwLock<NodeRegistry>,
}

impl<S: ChainStore + ?Sized> Ledger<S> {
    /// Loads the stored chain, seeding a genesis block when the store is
    /// empty. A store that fails to load, or holds an invalid chain, is an
    /// error rather than a reason to start over.
    pub fn open(store: Arc<S>) -> Result<Self> {
        let loaded = store.load_chain().map_err(LedgerError::Persistence)?;
        let chain = if loaded.is_empty() {
            let genesis = genesis_block();
            store
                .save_block(&genesis)
                .map_err(LedgerError::Persistence)?;
            info!(hash = %genesis.hash(), "seeded genesis block");
            vec![genesis]
        } else {
            validate::validate_chain(&loaded)?;
            info!(height = loaded.len(), "loaded chain from store");
            loaded
        };

        Ok(Self {
            store,
            state: RwLock::new(State {
                chain: Arc::new(chain),
                pool: TransactionPool::new(),
            }),
            nodes: RwLock::new(NodeRegistry::new()),
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consistent snapshot of the whole chain.
    pub fn chain(&self) -> Arc<Vec<Block>> {
        Arc::clone(&self.read_state().chain)
    }

    pub fn len(&self) -> usize {
        self.read_state().chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_state().chain.is_empty()
    }

    pub fn last(&self) -> Result<Block> {
        self.read_state()
            .chain
            .last()
            .cloned()
            .ok_or(LedgerError::EmptyChain)
    }

    pub fn tip(&self) -> Result<Tip> {
        let state = self.read_state();
        let last = state.chain.last().ok_or(LedgerError::EmptyChain)?;
        Ok(Tip {
            index: last.index,
            proof: last.proof,
            hash: last.hash(),
        })
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.read_state().pool.as_slice().to_vec()
    }

    /// Queues a transaction and returns the index of the block it will land in.
    pub fn add_transaction(&self, tx: Transaction) -> Result<u64> {
        let mut state = self.write_state();
        let next = next_index(&state.chain)?;
        state.pool.add(tx);
        Ok(next)
    }

    /// Queues a transaction only if the sender can cover it, counting both
    /// confirmed balances and debits already waiting in the pool.
    pub fn add_funded_transaction(&self, tx: Transaction) -> Result<u64> {
        let mut state = self.write_state();
        let next = next_index(&state.chain)?;
        if !tx.is_minted() {
            let confirmed = state.chain.iter().flat_map(|b| b.transactions.iter());
            let projected = balance::replay(confirmed.chain(state.pool.iter()));
            let available = balance::balance_of(&projected, &tx.sender);
            let required = tx.value();
            if i128::from(available) < i128::from(required) {
                return Err(LedgerError::InsufficientFunds {
                    address: tx.sender,
                    balance: available,
                    required,
                });
            }
        }
        state.pool.add(tx);
        Ok(next)
    }

    /// Seals the pending pool into a new block. `previous_hash` defaults to
    /// the hash of the current last block; if given it must match it.
    pub fn append(&self, proof: u64, previous_hash: Option<&str>) -> Result<Block> {
        self.forge(proof, previous_hash, None)
    }

    /// Like [`append`](Self::append), with `reward` sealed after the pending
    /// transactions. A stale `previous_hash` leaves the pool untouched.
    pub fn append_rewarded(
        &self,
        proof: u64,
        previous_hash: &str,
        reward: Option<Transaction>,
    ) -> Result<Block> {
        self.forge(proof, Some(previous_hash), reward)
    }

    fn forge(
        &self,
        proof: u64,
        previous_hash: Option<&str>,
        reward: Option<Transaction>,
    ) -> Result<Block> {
        let mut state = self.write_state();
        let (last_index, last_proof, last_hash) = {
            let last = state.chain.last().ok_or(LedgerError::EmptyChain)?;
            (last.index, last.proof, last.hash())
        };
        if let Some(expected) = previous_hash {
            if expected != last_hash {
                return Err(LedgerError::StaleTip {
                    expected: expected.to_owned(),
                    current: last_hash,
                });
            }
        }
        let index = last_index
            .checked_add(1)
            .ok_or(LedgerError::IndexExhausted { last: last_index })?;
        if !pow::is_valid(last_proof, proof, &last_hash) {
            return Err(LedgerError::InvalidProof { index, proof });
        }

        let mut transactions = state.pool.drain();
        transactions.extend(reward);
        let block = Block::new(index, transactions, proof, last_hash);
        Arc::make_mut(&mut state.chain).push(block.clone());
        info!(
            index,
            proof,
            txs = block.transactions.len(),
            "appended block"
        );

        match self.store.save_block(&block) {
            Ok(id) => debug!(index, id, "persisted block"),
            Err(err) => error!(index, error = %format!("{err:#}"), "failed to persist block"),
        }
        Ok(block)
    }

    /// Swaps in `chain` unconditionally. Callers validate it first.
    pub fn replace(&self, chain: Vec<Block>) {
        let mut state = self.write_state();
        self.replace_locked(&mut state, chain);
    }

    /// Replaces the chain only if `chain` is still strictly longer than the
    /// local one at the moment the lock is taken. Callers validate it first.
    pub fn adopt(&self, chain: Vec<Block>) -> bool {
        let mut state = self.write_state();
        if chain.len() <= state.chain.len() {
            debug!(
                local = state.chain.len(),
                candidate = chain.len(),
                "candidate no longer longer than local chain"
            );
            return false;
        }
        self.replace_locked(&mut state, chain);
        true
    }

    fn replace_locked(&self, state: &mut State, chain: Vec<Block>) {
        let previous = state.chain.len();
        if let Err(err) = self.store.replace_chain(&chain) {
            error!(error = %format!("{err:#}"), "failed to persist replacement chain");
        }
        state.chain = Arc::new(chain);
        info!(previous, height = state.chain.len(), "replaced chain");
    }

    /// Registers a peer, returning the normalized `host:port`.
    pub fn register_node(&self, address: &str) -> Result<String> {
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(address)
    }

    pub fn nodes(&self) -> Vec<String> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .to_vec()
    }

    pub fn balances(&self) -> Balances {
        balance::balances(&self.chain())
    }

    pub fn balance_of(&self, address: &str) -> i64 {
        balance::balance_of(&self.balances(), address)
    }
}

fn next_index(chain: &[Block]) -> Result<u64> {
    let last = chain.last().ok_or(LedgerError::EmptyChain)?.index;
    last.checked_add(1).ok_or(LedgerError::IndexExhausted { last })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChainFault;
    use anyhow::anyhow;

    fn open_memory() -> Ledger<MemoryStore> {
        Ledger::open(Arc::new(MemoryStore::new())).unwrap()
    }

    fn mine_next<S: ChainStore + ?Sized>(ledger: &Ledger<S>) -> Block {
        let tip = ledger.tip().unwrap();
        let proof = pow::solve(tip.proof, &tip.hash);
        ledger.append(proof, Some(&tip.hash)).unwrap()
    }

    struct BrokenStore;

    impl ChainStore for BrokenStore {
        fn load_chain(&self) -> anyhow::Result<Vec<Block>> {
            Err(anyhow!("connection refused"))
        }
        fn save_block(&self, _block: &Block) -> anyhow::Result<BlockId> {
            Err(anyhow!("disk full"))
        }
        fn replace_chain(&self, _chain: &[Block]) -> anyhow::Result<()> {
            Err(anyhow!("disk full"))
        }
        fn close(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    /// Loads fine (empty) but cannot write.
    struct ReadOnlyStore(MemoryStore);

    impl ChainStore for ReadOnlyStore {
        fn load_chain(&self) -> anyhow::Result<Vec<Block>> {
            self.0.load_chain()
        }
        fn save_block(&self, _block: &Block) -> anyhow::Result<BlockId> {
            Err(anyhow!("read-only"))
        }
        fn replace_chain(&self, _chain: &[Block]) -> anyhow::Result<()> {
            Err(anyhow!("read-only"))
        }
        fn close(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn genesis_block_example() {
        let genesis = genesis_block();
        assert_eq!(genesis.index, 1);
        assert_eq!(genesis.previous_hash, "1");
        assert_eq!(genesis.proof, 100);
        assert!(genesis.transactions.is_empty());
    }

    #[test]
    fn open_seeds_and_persists_genesis() {
        let ledger = open_memory();
        assert_eq!(ledger.len(), 1);
        let last = ledger.last().unwrap();
        assert_eq!(last.index, 1);
        assert_eq!(ledger.store().blocks(), vec![last]);
    }

    #[test]
    fn open_reuses_stored_chain() {
        let first = open_memory();
        mine_next(&first);
        let stored = first.store().blocks();

        let reopened = Ledger::open(Arc::new(MemoryStore::with_chain(stored.clone()))).unwrap();
        assert_eq!(*reopened.chain(), stored);
    }

    #[test]
    fn load_failure_is_not_mistaken_for_empty() {
        let err = Ledger::open(Arc::new(BrokenStore)).err().unwrap();
        assert!(matches!(err, LedgerError::Persistence(_)));
    }

    #[test]
    fn corrupt_stored_chain_is_refused() {
        let ledger = open_memory();
        mine_next(&ledger);
        let mut stored = ledger.store().blocks();
        stored[1].previous_hash = "bogus".into();
        let err = Ledger::open(Arc::new(MemoryStore::with_chain(stored)))
            .err()
            .unwrap();
        assert!(matches!(err, LedgerError::InvalidChain(_)));
    }

    #[test]
    fn stored_chain_not_starting_at_genesis_is_refused() {
        let mut origin = genesis_block();
        origin.index = 5;
        let err = Ledger::open(Arc::new(MemoryStore::with_chain(vec![origin])))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            LedgerError::InvalidChain(ChainFault::BadGenesis { index: 5 })
        ));
    }

    #[test]
    fn exhausted_index_space_is_an_error() {
        let ledger = open_memory();
        let mut last = genesis_block();
        last.index = u64::MAX;
        ledger.replace(vec![last]);

        let err = ledger
            .add_transaction(Transaction::new("a", "b", 1))
            .unwrap_err();
        assert!(matches!(err, LedgerError::IndexExhausted { last: u64::MAX }));
        let err = ledger.append(0, None).unwrap_err();
        assert!(matches!(err, LedgerError::IndexExhausted { last: u64::MAX }));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn add_transaction_reports_next_index() {
        let ledger = open_memory();
        assert_eq!(
            ledger
                .add_transaction(Transaction::new("a", "b", 1))
                .unwrap(),
            2
        );
        assert_eq!(ledger.pending().len(), 1);
    }

    #[test]
    fn append_drains_pool_in_order() {
        let ledger = open_memory();
        ledger.add_transaction(Transaction::new("a", "b", 1)).unwrap();
        ledger.add_transaction(Transaction::new("b", "c", 2)).unwrap();
        let block = mine_next(&ledger);
        assert_eq!(block.index, 2);
        assert_eq!(
            block.transactions,
            vec![Transaction::new("a", "b", 1), Transaction::new("b", "c", 2)]
        );
        assert!(ledger.pending().is_empty());

        let empty = mine_next(&ledger);
        assert_eq!(empty.index, 3);
        assert!(empty.transactions.is_empty());
        assert!(validate::is_valid(&ledger.chain()));
    }

    #[test]
    fn append_without_previous_hash_links_to_last() {
        let ledger = open_memory();
        let tip = ledger.tip().unwrap();
        let proof = pow::solve(tip.proof, &tip.hash);
        let block = ledger.append(proof, None).unwrap();
        assert_eq!(block.previous_hash, tip.hash);
    }

    #[test]
    fn stale_previous_hash_is_rejected_and_pool_kept() {
        let ledger = open_memory();
        let stale = ledger.tip().unwrap();
        mine_next(&ledger);
        ledger.add_transaction(Transaction::new("a", "b", 1)).unwrap();

        let proof = pow::solve(stale.proof, &stale.hash);
        let err = ledger
            .append_rewarded(proof, &stale.hash, Some(Transaction::reward("m", 1)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::StaleTip { .. }));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.pending(), vec![Transaction::new("a", "b", 1)]);
    }

    #[test]
    fn wrong_proof_is_rejected() {
        let ledger = open_memory();
        let tip = ledger.tip().unwrap();
        let wrong = (0..)
            .find(|p| !pow::is_valid(tip.proof, *p, &tip.hash))
            .unwrap();
        let err = ledger.append(wrong, None).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidProof { index: 2, .. }));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn reward_is_sealed_after_pending() {
        let ledger = open_memory();
        ledger.add_transaction(Transaction::new("a", "b", 1)).unwrap();
        let tip = ledger.tip().unwrap();
        let proof = pow::solve(tip.proof, &tip.hash);
        let block = ledger
            .append_rewarded(proof, &tip.hash, Some(Transaction::reward("miner", 1)))
            .unwrap();
        assert_eq!(block.transactions.len(), 2);
        assert_eq!(block.transactions[1], Transaction::reward("miner", 1));
    }

    #[test]
    fn failed_save_keeps_block_in_memory() {
        let store = Arc::new(ReadOnlyStore(MemoryStore::with_chain(vec![genesis_block()])));
        let ledger = Ledger::open(store).unwrap();
        let block = mine_next(&ledger);
        assert_eq!(ledger.last().unwrap(), block);
    }

    #[test]
    fn snapshots_are_unaffected_by_later_appends() {
        let ledger = open_memory();
        let before = ledger.chain();
        mine_next(&ledger);
        assert_eq!(before.len(), 1);
        assert_eq!(ledger.chain().len(), 2);
    }

    #[test]
    fn adopt_requires_strictly_longer() {
        let donor = open_memory();
        mine_next(&donor);
        mine_next(&donor);
        let longer = donor.chain().to_vec();

        let ledger = open_memory();
        mine_next(&ledger);
        assert!(!ledger.adopt(longer[..2].to_vec()));
        assert_eq!(ledger.len(), 2);
        assert!(ledger.adopt(longer.clone()));
        assert_eq!(*ledger.chain(), longer);
        assert_eq!(ledger.store().blocks(), longer);
    }

    #[test]
    fn replace_is_unconditional() {
        let ledger = open_memory();
        mine_next(&ledger);
        ledger.replace(vec![genesis_block()]);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn funded_transactions_count_pending_debits() {
        let ledger = open_memory();
        ledger.add_transaction(Transaction::reward("alice", 5)).unwrap();
        mine_next(&ledger);

        ledger
            .add_funded_transaction(Transaction::new("alice", "bob", 3))
            .unwrap();
        let err = ledger
            .add_funded_transaction(Transaction::new("alice", "bob", 3))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientFunds {
                balance: 2,
                required: 3,
                ..
            }
        ));
        assert_eq!(ledger.pending().len(), 1);
        assert_eq!(ledger.balance_of("alice"), 5);
    }

    #[test]
    fn register_node_normalizes() {
        let ledger = open_memory();
        ledger.register_node("http://10.0.0.1:5000").unwrap();
        ledger.register_node("10.0.0.1:5000").unwrap();
        assert!(matches!(
            ledger.register_node("not a url"),
            Err(LedgerError::InvalidAddress(_))
        ));
        assert_eq!(ledger.nodes(), vec!["10.0.0.1:5000"]);
    }
}
