//! Durable chain storage for the ledger node.

pub mod sled_store;

pub use sled_store::SledStore;
