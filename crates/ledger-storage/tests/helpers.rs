#![allow(dead_code)]

use std::fs;

use ledger_core::chain::genesis_block;
use ledger_core::{pow, Block, Transaction};
use ledger_storage::SledStore;
use tempfile::{tempdir, TempDir};

pub fn create_temp_store() -> (TempDir, SledStore) {
    // Create a temporary directory for the sled database
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().to_path_buf();
    (
        temp_dir,
        SledStore::open(&db_path).expect("Failed to open SledStore"),
    )
}

pub fn teardown_store(temp_dir: TempDir, store: SledStore) {
    let db_path = temp_dir.path().to_path_buf();
    store.clear().expect("Failed to clear the store");
    drop(store);
    temp_dir.close().expect("Failed to delete temp dir");
    let _ = fs::remove_dir_all(&db_path);
    assert!(!db_path.exists(), "Database directory should be removed");
}

/// A valid chain of `len` blocks, one transaction per mined block.
pub fn mined_chain(len: usize) -> Vec<Block> {
    let mut chain = vec![genesis_block()];
    while chain.len() < len {
        let last = chain.last().unwrap();
        let (index, hash) = (last.index + 1, last.hash());
        let proof = pow::solve(last.proof, &hash);
        let tx = Transaction::new(format!("user-{index}"), "store", index);
        chain.push(Block::new(index, vec![tx], proof, hash));
    }
    chain
}
