//! Account-style helpers layered on the ledger: minting to a user, spending
//! with a funds check, and reading a balance. Each mutation mines its own
//! block so the result is visible immediately.

use crate::chain::{ChainStore, Ledger};
use crate::constants::STORE_RECIPIENT;
use crate::error::Result;
use crate::mine::Miner;
use crate::pow::Abort;
use crate::Transaction;
use tracing::info;

/// Fresh random 128-bit identifier, hex-encoded.
pub fn new_user_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

/// Mints `amount` to `user` and returns the resulting balance.
pub fn earn<S: ChainStore + ?Sized>(
    ledger: &Ledger<S>,
    miner: &Miner,
    user: &str,
    amount: u64,
    abort: &Abort,
) -> Result<i64> {
    ledger.add_transaction(Transaction::reward(user, amount))?;
    miner.mine(ledger, None, abort)?;
    info!(user, amount, "rewarded user");
    Ok(ledger.balance_of(user))
}

/// Moves `cost` from `user` to the store for `item`, refusing when the user
/// cannot cover it. Returns the resulting balance.
pub fn spend<S: ChainStore + ?Sized>(
    ledger: &Ledger<S>,
    miner: &Miner,
    user: &str,
    item: &str,
    cost: u64,
    abort: &Abort,
) -> Result<i64> {
    ledger.add_funded_transaction(Transaction::new(user, STORE_RECIPIENT, cost))?;
    miner.mine(ledger, None, abort)?;
    info!(user, item, cost, "user spent tokens");
    Ok(ledger.balance_of(user))
}

pub fn balance<S: ChainStore + ?Sized>(ledger: &Ledger<S>, user: &str) -> i64 {
    ledger.balance_of(user)
}
