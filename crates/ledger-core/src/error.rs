use thiserror::Error;

/// Why a candidate chain was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainFault {
    #[error("chain has no blocks")]
    Empty,
    #[error("chain starts at index {index}, not at genesis")]
    BadGenesis { index: u64 },
    #[error("block {index} does not follow index {previous}")]
    BadIndex { index: u64, previous: u64 },
    #[error("block {index} previous_hash {found} does not match {expected}")]
    BrokenLink {
        index: u64,
        expected: String,
        found: String,
    },
    #[error("block {index} carries proof {proof} which does not solve its predecessor")]
    BadProof { index: u64, proof: u64 },
}

/// A peer that did not vote in a consensus round.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("peer {peer} unreachable: {reason}")]
    Unreachable { peer: String, reason: String },
    #[error("peer {peer} timed out")]
    Timeout { peer: String },
    #[error("peer {peer} answered with status {status}")]
    Status { peer: String, status: u16 },
    #[error("peer {peer} sent a malformed body: {reason}")]
    Malformed { peer: String, reason: String },
    #[error("peer {peer} reported length {reported} for a chain of {actual} blocks")]
    LengthMismatch {
        peer: String,
        reported: usize,
        actual: usize,
    },
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid node address: {0:?}")]
    InvalidAddress(String),
    #[error("chain is empty")]
    EmptyChain,
    #[error("invalid chain: {0}")]
    InvalidChain(#[from] ChainFault),
    #[error("tip moved while mining: expected {expected}, chain is at {current}")]
    StaleTip { expected: String, current: String },
    #[error("proof {proof} does not solve block {index}")]
    InvalidProof { index: u64, proof: u64 },
    #[error("mining abandoned before a proof was found")]
    MiningAbandoned,
    #[error("no block index left after {last}")]
    IndexExhausted { last: u64 },
    #[error("insufficient funds for {address}: balance {balance}, needs {required}")]
    InsufficientFunds {
        address: String,
        balance: i64,
        required: u64,
    },
    #[error("persistence failure: {0:#}")]
    Persistence(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
