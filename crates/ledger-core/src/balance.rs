//! Balances derived by replaying transactions in chain order.

use crate::{Block, Transaction};
use std::collections::BTreeMap;

pub type Balances = BTreeMap<String, i64>;

/// Applies one transfer. Minted transfers credit the recipient only.
pub fn apply(balances: &mut Balances, tx: &Transaction) {
    let amount = tx.value();
    if !tx.is_minted() {
        let sender = balances.entry(tx.sender.clone()).or_default();
        *sender = sender.saturating_sub_unsigned(amount);
    }
    let recipient = balances.entry(tx.recipient.clone()).or_default();
    *recipient = recipient.saturating_add_unsigned(amount);
}

pub fn replay<'a>(transactions: impl IntoIterator<Item = &'a Transaction>) -> Balances {
    let mut balances = Balances::new();
    for tx in transactions {
        apply(&mut balances, tx);
    }
    balances
}

pub fn balances(chain: &[Block]) -> Balances {
    replay(chain.iter().flat_map(|block| block.transactions.iter()))
}

/// Unknown addresses hold zero.
pub fn balance_of(balances: &Balances, address: &str) -> i64 {
    balances.get(address).copied().unwrap_or(0)
}
