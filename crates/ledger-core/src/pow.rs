//! The proof-of-work puzzle.
//!
//! A proof `p` solves the puzzle for a predecessor with proof `q` and hash
//! `h` when `sha256(format!("{q}{p}{h}"))` starts with
//! [`POW_DIFFICULTY_HEX_DIGITS`](crate::constants::POW_DIFFICULTY_HEX_DIGITS)
//! zero hex digits.

use crate::constants::{ABORT_CHECK_INTERVAL, POW_TARGET_ZERO_BITS};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub fn puzzle_digest(last_proof: u64, proof: u64, last_hash: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(format!("{last_proof}{proof}{last_hash}"));
    hasher.finalize().into()
}

pub fn is_valid(last_proof: u64, proof: u64, last_hash: &str) -> bool {
    count_leading_zero_bits(&puzzle_digest(last_proof, proof, last_hash)) >= POW_TARGET_ZERO_BITS
}

pub fn count_leading_zero_bits(hash: &[u8; 32]) -> u32 {
    let mut total = 0u32;
    for b in hash {
        if *b == 0 {
            total += 8;
        } else {
            total += b.leading_zeros();
            break;
        }
    }
    total
}

/// Smallest non-negative proof for the given predecessor. Unbounded; see
/// [`solve_with`] for a search that can be abandoned.
pub fn solve(last_proof: u64, last_hash: &str) -> u64 {
    let mut proof = 0u64;
    while !is_valid(last_proof, proof, last_hash) {
        proof += 1;
    }
    proof
}

/// Like [`solve`], but returns `None` once `abort` fires.
pub fn solve_with(last_proof: u64, last_hash: &str, abort: &Abort) -> Option<u64> {
    let mut proof = 0u64;
    loop {
        if proof % ABORT_CHECK_INTERVAL == 0 && abort.is_aborted() {
            return None;
        }
        if is_valid(last_proof, proof, last_hash) {
            return Some(proof);
        }
        proof = proof.checked_add(1)?;
    }
}

/// Cancellation handle for a proof search: an explicit flag shared between
/// clones plus an optional deadline.
#[derive(Clone, Debug, Default)]
pub struct Abort {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Abort {
    pub fn never() -> Self {
        Self::default()
    }

    pub fn after(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::default(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn with_optional_timeout(timeout: Option<Duration>) -> Self {
        timeout.map(Self::after).unwrap_or_default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}
