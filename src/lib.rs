//! Single-node UTXO ledger: ECDSA-signed transactions, proof-of-work blocks
//! and an unspent output index, with a thin REST layer on top.

pub mod api;
pub mod blockchain;
pub mod config;
