use crate::Transaction;

/// Transactions waiting for the next block, in submission order.
#[derive(Clone, Debug, Default)]
pub struct TransactionPool {
    pending: Vec<Transaction>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `tx` and returns its position within the next block.
    pub fn add(&mut self, tx: Transaction) -> usize {
        self.pending.push(tx);
        self.pending.len() - 1
    }

    /// Takes every pending transaction, leaving the pool empty.
    pub fn drain(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.pending)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.pending.iter()
    }

    pub fn as_slice(&self) -> &[Transaction] {
        &self.pending
    }
}
