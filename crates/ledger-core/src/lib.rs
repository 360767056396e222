use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod balance;
pub mod chain;
pub mod consensus;
pub mod constants;
pub mod error;
pub mod hasher;
pub mod mine;
pub mod pool;
pub mod pow;
pub mod registry;
pub mod rewards;
pub mod validate;

pub use chain::{ChainStore, Ledger, MemoryStore};
pub use error::{ChainFault, LedgerError, PeerError};

/// Hex-encoded SHA-256 digest.
pub type Hash = String;
/// Identifier a `ChainStore` hands back for a persisted block.
pub type BlockId = u64;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    /// Absent or null amounts count as zero.
    #[serde(default)]
    pub amount: Option<u64>,
}

impl Transaction {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: u64) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount: Some(amount),
        }
    }

    /// A minted transfer from the system sender.
    pub fn reward(recipient: impl Into<String>, amount: u64) -> Self {
        Self::new(constants::SYSTEM_SENDER, recipient, amount)
    }

    pub fn value(&self) -> u64 {
        self.amount.unwrap_or(0)
    }

    pub fn is_minted(&self) -> bool {
        self.sender == constants::SYSTEM_SENDER
    }
}

/// A block as exchanged between nodes. Its hash is never stored here; it is
/// always recomputed from these fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: f64,
    pub transactions: Vec<Transaction>,
    pub proof: u64,
    pub previous_hash: Hash,
}

impl Block {
    pub fn new(
        index: u64,
        transactions: Vec<Transaction>,
        proof: u64,
        previous_hash: impl Into<Hash>,
    ) -> Self {
        Self {
            index,
            timestamp: unix_now(),
            transactions,
            proof,
            previous_hash: previous_hash.into(),
        }
    }

    pub fn hash(&self) -> Hash {
        hasher::hash_block(self)
    }
}

/// Seconds since the epoch with sub-second precision.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
