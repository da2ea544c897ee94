use std::time::Instant;

use chrono::Utc;
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::pow::ProofOfWork;
use super::transaction::Transaction;

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Unix timestamp (seconds) taken when mining started
    pub timestamp: i64,

    /// List of transactions included in this block
    pub transactions: Vec<Transaction>,

    /// Hash of the previous block (empty for genesis)
    pub previous_hash: Vec<u8>,

    /// Proof-of-work hash of this block
    pub hash: Vec<u8>,

    /// Nonce found by the proof-of-work search
    pub nonce: u64,
}

/// Lightweight view of a block used by listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub index: usize,
    pub timestamp: i64,
    pub hash: String,
    pub previous_hash: String,
    pub tx_count: usize,
}

impl Block {
    /// Mines a new block on top of `previous_hash`
    ///
    /// # Arguments
    ///
    /// * `transactions` - The transactions to include in the block
    /// * `previous_hash` - The hash of the previous block
    /// * `difficulty_bits` - Number of leading zero bits the hash needs
    ///
    /// # Returns
    ///
    /// The block with its nonce and hash populated
    pub fn mine(transactions: Vec<Transaction>, previous_hash: Vec<u8>, difficulty_bits: u32) -> Self {
        let mut block = Block {
            timestamp: Utc::now().timestamp(),
            transactions,
            previous_hash,
            hash: Vec::new(),
            nonce: 0,
        };

        let started = Instant::now();
        let (nonce, hash) = ProofOfWork::new(&block, difficulty_bits).run();
        debug!(
            "Mined block {} with nonce {} in {:?}",
            hex::encode(&hash),
            nonce,
            started.elapsed()
        );

        block.nonce = nonce;
        block.hash = hash;
        block
    }

    /// SHA-256 over the concatenated transaction ids, in block order
    pub fn hash_transactions(&self) -> Vec<u8> {
        let mut hasher = Sha256::new();
        for transaction in &self.transactions {
            hasher.update(transaction.id());
        }
        hasher.finalize().to_vec()
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(&self.hash)
    }

    /// Builds the listing view of this block at `index`
    pub fn summary(&self, index: usize) -> BlockSummary {
        BlockSummary {
            index,
            timestamp: self.timestamp,
            hash: self.hash_hex(),
            previous_hash: hex::encode(&self.previous_hash),
            tx_count: self.transactions.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::Wallet;

    #[test]
    fn test_mine_block() {
        let wallet = Wallet::new();
        let transactions = vec![
            Transaction::new_coinbase(wallet.address(), "one").unwrap(),
            Transaction::new_coinbase(wallet.address(), "two").unwrap(),
        ];

        let block = Block::mine(transactions, vec![1u8; 32], 8);

        assert_eq!(block.previous_hash, vec![1u8; 32]);
        assert_eq!(block.hash.len(), 32);
        assert_eq!(block.hash[0], 0);
        assert!(ProofOfWork::new(&block, 8).validate());
    }

    #[test]
    fn test_hash_transactions_binds_order() {
        let wallet = Wallet::new();
        let first = Transaction::new_coinbase(wallet.address(), "one").unwrap();
        let second = Transaction::new_coinbase(wallet.address(), "two").unwrap();

        let mut block = Block::mine(vec![first.clone(), second.clone()], Vec::new(), 4);
        let digest = block.hash_transactions();
        assert_eq!(digest.len(), 32);
        assert_eq!(digest, block.hash_transactions());

        block.transactions = vec![second, first];
        assert_ne!(digest, block.hash_transactions());
    }

    #[test]
    fn test_summary() {
        let wallet = Wallet::new();
        let block = Block::mine(
            vec![Transaction::new_coinbase(wallet.address(), "").unwrap()],
            vec![0xab; 32],
            4,
        );

        let summary = block.summary(3);
        assert_eq!(summary.index, 3);
        assert_eq!(summary.tx_count, 1);
        assert_eq!(summary.hash, block.hash_hex());
        assert_eq!(summary.previous_hash, "ab".repeat(32));
    }
}
