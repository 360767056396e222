/// Leading zero hex digits a proof digest must carry.
pub const POW_DIFFICULTY_HEX_DIGITS: u32 = 4;
pub const POW_TARGET_ZERO_BITS: u32 = POW_DIFFICULTY_HEX_DIGITS * 4;

pub const GENESIS_INDEX: u64 = 1;
pub const GENESIS_PREVIOUS_HASH: &str = "1";
pub const GENESIS_PROOF: u64 = 100;

/// Sender used for minted value; never debited.
pub const SYSTEM_SENDER: &str = "0";
pub const MINING_REWARD: u64 = 1;
pub const STORE_RECIPIENT: &str = "store";

/// How many candidate proofs a sequential search tries between abort checks.
pub const ABORT_CHECK_INTERVAL: u64 = 4096;
