//! Proof-of-work over a block's header fields.
//!
//! The hashed data is `previous_hash || combined_tx_digest || timestamp ||
//! difficulty || nonce`, integers as 8-byte big-endian. A hash is accepted
//! when, read as a big-endian 256-bit integer, it is strictly below
//! `1 << (256 - difficulty_bits)`.

use sha2::{Digest, Sha256};

use super::block::Block;

/// Hard ceiling on configurable difficulty
pub const MAX_DIFFICULTY_BITS: u32 = 64;

/// Big-endian 256-bit threshold with the top `difficulty_bits` bits zero
pub fn target_for(difficulty_bits: u32) -> [u8; 32] {
    let bits = difficulty_bits.clamp(1, 255);
    let shift = 256 - bits;

    let mut target = [0u8; 32];
    target[31 - (shift / 8) as usize] = 1 << (shift % 8);
    target
}

/// Binds a block to its difficulty target
pub struct ProofOfWork<'a> {
    block: &'a Block,
    difficulty_bits: u32,
    target: [u8; 32],
}

impl<'a> ProofOfWork<'a> {
    pub fn new(block: &'a Block, difficulty_bits: u32) -> Self {
        ProofOfWork {
            block,
            difficulty_bits,
            target: target_for(difficulty_bits),
        }
    }

    fn prepare_data(&self, transactions_digest: &[u8], nonce: u64) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.block.previous_hash.len() + transactions_digest.len() + 24);
        data.extend_from_slice(&self.block.previous_hash);
        data.extend_from_slice(transactions_digest);
        data.extend_from_slice(&self.block.timestamp.to_be_bytes());
        data.extend_from_slice(&i64::from(self.difficulty_bits).to_be_bytes());
        data.extend_from_slice(&nonce.to_be_bytes());
        data
    }

    /// Hash of the block's header fields with the given nonce
    pub fn hash_with_nonce(&self, nonce: u64) -> Vec<u8> {
        let digest = self.block.hash_transactions();
        Sha256::digest(self.prepare_data(&digest, nonce)).to_vec()
    }

    fn meets_target(&self, hash: &[u8]) -> bool {
        hash < &self.target[..]
    }

    /// Searches nonces upward from zero until a hash falls below the target.
    ///
    /// Blocks the calling thread; there is no iteration cap.
    pub fn run(&self) -> (u64, Vec<u8>) {
        let digest = self.block.hash_transactions();
        let mut nonce = 0u64;

        loop {
            let hash = Sha256::digest(self.prepare_data(&digest, nonce)).to_vec();
            if self.meets_target(&hash) {
                return (nonce, hash);
            }
            nonce += 1;
        }
    }

    /// Recomputes the hash once with the block's stored nonce
    pub fn validate(&self) -> bool {
        let hash = self.hash_with_nonce(self.block.nonce);
        self.meets_target(&hash)
    }
}
