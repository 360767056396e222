//! Canonical block encoding and digest.
//!
//! Blocks are encoded as JSON with keys sorted at every level, `", "` and
//! `": "` separators and non-ASCII characters escaped as `\uXXXX`. Nodes
//! written in other languages produce the same bytes for the same block,
//! so block identity agrees across the network.

use crate::{Block, Hash};
use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use sha2::{Digest, Sha256};
use std::io;

/// JSON formatter producing the canonical separators and ASCII-only output.
#[derive(Clone, Copy, Debug, Default)]
pub struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        if fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

// Field declaration order is the sorted key order.
#[derive(Serialize)]
struct CanonicalBlock<'a> {
    index: u64,
    previous_hash: &'a str,
    proof: u64,
    timestamp: f64,
    transactions: Vec<CanonicalTx<'a>>,
}

#[derive(Serialize)]
struct CanonicalTx<'a> {
    amount: Option<u64>,
    recipient: &'a str,
    sender: &'a str,
}

impl<'a> From<&'a Block> for CanonicalBlock<'a> {
    fn from(block: &'a Block) -> Self {
        Self {
            index: block.index,
            previous_hash: &block.previous_hash,
            proof: block.proof,
            timestamp: block.timestamp,
            transactions: block
                .transactions
                .iter()
                .map(|tx| CanonicalTx {
                    amount: tx.amount,
                    recipient: &tx.recipient,
                    sender: &tx.sender,
                })
                .collect(),
        }
    }
}

/// Canonical bytes of a block.
pub fn canonical_bytes(block: &Block) -> Vec<u8> {
    let mut out = Vec::with_capacity(128 + block.transactions.len() * 64);
    let mut ser = Serializer::with_formatter(&mut out, CanonicalFormatter);
    // Strings, integers and floats into a Vec; serde_json writes non-finite
    // floats as null, so nothing here can fail.
    CanonicalBlock::from(block)
        .serialize(&mut ser)
        .expect("canonical block encoding is infallible");
    out
}

/// SHA-256 of the canonical encoding, lowercase hex.
pub fn hash_block(block: &Block) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(canonical_bytes(block));
    hex::encode(hasher.finalize())
}
