use anyhow::{bail, Context, Result};
use ledger_core::constants::GENESIS_INDEX;
use ledger_core::{Block, BlockId, ChainStore, Hash};
use serde::{Deserialize, Serialize};
use sled::{Batch, Db, Tree};
use std::path::Path;
use tracing::{debug, info};

const TREE_BLOCKS: &str = "blocks";

/// What is written per block. The hash is a convenience copy for readers of
/// the raw database; the ledger always recomputes it.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoredBlock {
    pub id: BlockId,
    pub hash: Hash,
    pub block: Block,
}

/// `ChainStore` on sled. Blocks are keyed by big-endian index so iteration
/// yields them in chain order.
#[derive(Clone)]
pub struct SledStore {
    db: Db,
    blocks: Tree,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path).with_context(|| format!("opening sled at {}", path.display()))?;
        let blocks = db.open_tree(TREE_BLOCKS).context("opening blocks tree")?;
        info!(path = %path.display(), "sled store opened");
        Ok(Self { db, blocks })
    }

    pub fn get_block(&self, index: u64) -> Result<Option<StoredBlock>> {
        self.blocks
            .get(index.to_be_bytes())?
            .map(|bytes| decode(&bytes, index))
            .transpose()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Drops every stored block.
    pub fn clear(&self) -> Result<()> {
        self.blocks.clear()?;
        self.db.flush()?;
        Ok(())
    }

    fn record(&self, block: &Block) -> Result<(BlockId, Vec<u8>)> {
        let stored = StoredBlock {
            id: self.db.generate_id()?,
            hash: block.hash(),
            block: block.clone(),
        };
        Ok((stored.id, bincode::serialize(&stored)?))
    }
}

fn decode(bytes: &[u8], index: u64) -> Result<StoredBlock> {
    bincode::deserialize(bytes).with_context(|| format!("decoding stored block {index}"))
}

impl ChainStore for SledStore {
    fn load_chain(&self) -> Result<Vec<Block>> {
        let mut chain: Vec<Block> = Vec::with_capacity(self.blocks.len());
        for entry in self.blocks.iter() {
            let (key, value) = entry.context("reading blocks tree")?;
            let key: [u8; 8] = key
                .as_ref()
                .try_into()
                .with_context(|| format!("malformed block key {:?}", key.as_ref()))?;
            let index = u64::from_be_bytes(key);
            let stored = decode(&value, index)?;
            if stored.block.index != index {
                bail!(
                    "block stored under index {index} claims index {}",
                    stored.block.index
                );
            }
            match chain.last() {
                None if index != GENESIS_INDEX => {
                    bail!("stored chain starts at index {index}, not {GENESIS_INDEX}")
                }
                Some(prev) if prev.index.checked_add(1) != Some(index) => {
                    bail!("stored chain has a gap between {} and {index}", prev.index)
                }
                _ => {}
            }
            chain.push(stored.block);
        }
        debug!(height = chain.len(), "loaded chain from sled");
        Ok(chain)
    }

    fn save_block(&self, block: &Block) -> Result<BlockId> {
        let (id, bytes) = self.record(block)?;
        self.blocks.insert(block.index.to_be_bytes(), bytes)?;
        self.db.flush()?;
        Ok(id)
    }

    fn replace_chain(&self, chain: &[Block]) -> Result<()> {
        let mut batch = Batch::default();
        for key in self.blocks.iter().keys() {
            batch.remove(key?);
        }
        for block in chain {
            let (_, bytes) = self.record(block)?;
            batch.insert(block.index.to_be_bytes().to_vec(), bytes);
        }
        self.blocks.apply_batch(batch)?;
        self.db.flush()?;
        info!(height = chain.len(), "replaced stored chain");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
