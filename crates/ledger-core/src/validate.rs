//! Structural and proof-of-work checks over whole chains.
//!
//! Pure: no storage or network access, so the same checks apply to the local
//! chain and to anything a peer sends.

use crate::constants::GENESIS_INDEX;
use crate::{pow, Block, ChainFault};

/// Checks that `cur` extends `prev`: consecutive index, hash link and a
/// proof that solves the puzzle posed by `prev`.
pub fn validate_link(prev: &Block, cur: &Block) -> Result<(), ChainFault> {
    if prev.index.checked_add(1) != Some(cur.index) {
        return Err(ChainFault::BadIndex {
            index: cur.index,
            previous: prev.index,
        });
    }
    let prev_hash = prev.hash();
    if cur.previous_hash != prev_hash {
        return Err(ChainFault::BrokenLink {
            index: cur.index,
            expected: prev_hash,
            found: cur.previous_hash.clone(),
        });
    }
    if !pow::is_valid(prev.proof, cur.proof, &prev_hash) {
        return Err(ChainFault::BadProof {
            index: cur.index,
            proof: cur.proof,
        });
    }
    Ok(())
}

/// Walks every adjacent pair. Apart from its index the first block is taken
/// as given, so a genesis-only chain always passes.
pub fn validate_chain(chain: &[Block]) -> Result<(), ChainFault> {
    let first = chain.first().ok_or(ChainFault::Empty)?;
    if first.index != GENESIS_INDEX {
        return Err(ChainFault::BadGenesis { index: first.index });
    }
    chain
        .windows(2)
        .try_for_each(|pair| validate_link(&pair[0], &pair[1]))
}

pub fn is_valid(chain: &[Block]) -> bool {
    validate_chain(chain).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chain::genesis_block, Transaction};

    fn extend(chain: &mut Vec<Block>, transactions: Vec<Transaction>) {
        let last = chain.last().unwrap();
        let (index, last_hash) = (last.index + 1, last.hash());
        let proof = pow::solve(last.proof, &last_hash);
        chain.push(Block::new(index, transactions, proof, last_hash));
    }

    /// A correctly linked chain whose first block carries `start`.
    fn chain_from(start: u64, len: usize) -> Vec<Block> {
        let mut origin = genesis_block();
        origin.index = start;
        let mut chain = vec![origin];
        while chain.len() < len {
            extend(&mut chain, vec![]);
        }
        chain
    }

    fn sample_chain() -> Vec<Block> {
        let mut chain = vec![genesis_block()];
        extend(&mut chain, vec![Transaction::reward("alice", 10)]);
        extend(&mut chain, vec![Transaction::new("alice", "bob", 4)]);
        chain
    }

    #[test]
    fn genesis_alone_is_valid() {
        assert!(is_valid(&[genesis_block()]));
    }

    #[test]
    fn empty_chain_is_rejected() {
        assert_eq!(validate_chain(&[]), Err(ChainFault::Empty));
    }

    #[test]
    fn honestly_built_chain_is_valid() {
        assert_eq!(validate_chain(&sample_chain()), Ok(()));
    }

    #[test]
    fn tampered_previous_hash_is_caught() {
        let mut chain = sample_chain();
        chain[2].previous_hash = "0".repeat(64);
        assert!(matches!(
            validate_chain(&chain),
            Err(ChainFault::BrokenLink { index: 3, .. })
        ));
    }

    #[test]
    fn tampered_proof_is_caught() {
        let mut chain = sample_chain();
        // Changing block 2's proof both alters its hash (breaking the link
        // from block 3) and invalidates its own puzzle.
        chain[1].proof += 1;
        assert!(!is_valid(&chain));

        let mut chain = sample_chain();
        chain[2].proof += 1;
        assert!(matches!(
            validate_chain(&chain),
            Err(ChainFault::BadProof { index: 3, .. })
        ));
    }

    #[test]
    fn tampered_transaction_is_caught() {
        let mut chain = sample_chain();
        chain[1].transactions[0].amount = Some(1_000);
        assert!(matches!(
            validate_chain(&chain),
            Err(ChainFault::BrokenLink { index: 3, .. })
        ));

        let mut chain = sample_chain();
        chain[1].transactions[0].recipient = "mallory".into();
        assert!(!is_valid(&chain));
    }

    #[test]
    fn index_gap_is_caught() {
        let mut chain = sample_chain();
        chain[2].index = 7;
        assert_eq!(
            validate_chain(&chain),
            Err(ChainFault::BadIndex {
                index: 7,
                previous: 2
            })
        );
    }

    #[test]
    fn chain_must_start_at_genesis_index() {
        assert_eq!(
            validate_chain(&chain_from(7, 3)),
            Err(ChainFault::BadGenesis { index: 7 })
        );
        assert_eq!(
            validate_chain(&chain_from(u64::MAX - 1, 2)),
            Err(ChainFault::BadGenesis {
                index: u64::MAX - 1
            })
        );
        assert_eq!(validate_chain(&chain_from(1, 3)), Ok(()));
    }
}
