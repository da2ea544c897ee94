use std::collections::HashSet;

use log::info;
use secp256k1::SecretKey;
use thiserror::Error;

use super::block::{Block, BlockSummary};
use super::crypto::Address;
use super::pow::ProofOfWork;
use super::transaction::{ReferencedTransactions, Transaction, TransactionError};
use super::utxo::{UnspentOutput, UtxoMap};

/// Errors that can occur during blockchain operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Block rejected: {0}")]
    Rejected(String),
}

/// Append-only chain of mined blocks, genesis first.
///
/// The chain performs no validation of what it is asked to append; callers
/// verify signatures and spendability first.
#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
    difficulty_bits: u32,
}

impl Blockchain {
    /// Creates a new blockchain whose genesis block pays the subsidy to
    /// `genesis_address`
    pub fn new(
        genesis_address: &Address,
        genesis_memo: &str,
        difficulty_bits: u32,
    ) -> Result<Self, BlockchainError> {
        let coinbase = Transaction::new_coinbase(genesis_address, genesis_memo)?;
        let genesis = Block::mine(vec![coinbase], Vec::new(), difficulty_bits);

        info!(
            "Created genesis block {} paying {}",
            genesis.hash_hex(),
            genesis_address
        );

        Ok(Blockchain {
            blocks: vec![genesis],
            difficulty_bits,
        })
    }

    pub fn difficulty_bits(&self) -> u32 {
        self.difficulty_bits
    }

    /// Number of blocks, genesis included
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false: a chain starts with its genesis block
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Gets the last block in the chain
    pub fn tip(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    /// Mines a block with `transactions` on top of the tip and appends it
    pub fn append(&mut self, transactions: Vec<Transaction>) -> &Block {
        let previous_hash = self.tip().hash.clone();
        let block = Block::mine(transactions, previous_hash, self.difficulty_bits);
        self.link(block)
    }

    /// Appends a block mined elsewhere. It must extend the current tip and
    /// carry a valid proof-of-work at this chain's difficulty.
    pub fn push(&mut self, block: Block) -> Result<&Block, BlockchainError> {
        if block.previous_hash != self.tip().hash {
            return Err(BlockchainError::Rejected(format!(
                "block {} does not extend tip {}",
                block.hash_hex(),
                self.tip().hash_hex()
            )));
        }

        let pow = ProofOfWork::new(&block, self.difficulty_bits);
        if !pow.validate() || pow.hash_with_nonce(block.nonce) != block.hash {
            return Err(BlockchainError::Rejected(format!(
                "block {} fails proof-of-work",
                block.hash_hex()
            )));
        }

        Ok(self.link(block))
    }

    fn link(&mut self, block: Block) -> &Block {
        info!(
            "Appended block {} at height {} with {} transactions",
            block.hash_hex(),
            self.blocks.len(),
            block.transactions.len()
        );

        self.blocks.push(block);
        self.tip()
    }

    /// Gets the block at `index`
    pub fn get_block(&self, index: usize) -> Result<&Block, BlockchainError> {
        self.blocks
            .get(index)
            .ok_or_else(|| BlockchainError::NotFound(format!("block {}", index)))
    }

    /// Linear scan in chain order, returning the first transaction with `id`
    pub fn find_transaction(&self, id: &[u8]) -> Result<&Transaction, BlockchainError> {
        self.blocks
            .iter()
            .flat_map(|block| block.transactions.iter())
            .find(|tx| tx.id() == id)
            .ok_or_else(|| BlockchainError::NotFound(format!("transaction {}", hex::encode(id))))
    }

    /// Collects every transaction referenced by the inputs of `transaction`
    pub fn find_referenced(
        &self,
        transaction: &Transaction,
    ) -> Result<ReferencedTransactions, BlockchainError> {
        let mut referenced = ReferencedTransactions::new();
        if transaction.is_coinbase() {
            return Ok(referenced);
        }

        for input in transaction.inputs() {
            let previous = self.find_transaction(&input.txid).map_err(|_| {
                TransactionError::MissingReference(hex::encode(&input.txid))
            })?;
            referenced.insert(previous.id_hex(), previous.clone());
        }

        Ok(referenced)
    }

    /// Signs `transaction` against the outputs it spends on this chain
    pub fn sign_transaction(
        &self,
        transaction: &mut Transaction,
        secret_key: &SecretKey,
    ) -> Result<(), BlockchainError> {
        let referenced = self.find_referenced(transaction)?;
        transaction.sign(secret_key, &referenced)?;
        Ok(())
    }

    /// Verifies `transaction` against this chain; unresolved references fail
    pub fn verify_transaction(&self, transaction: &Transaction) -> bool {
        if transaction.is_coinbase() {
            return true;
        }

        match self.find_referenced(transaction) {
            Ok(referenced) => transaction.verify(&referenced),
            Err(_) => false,
        }
    }

    /// Lazy summary view, genesis first. Call again to restart.
    pub fn list_blocks(&self) -> impl Iterator<Item = BlockSummary> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .map(|(index, block)| block.summary(index))
    }

    /// Every output not consumed by an input anywhere on the chain, keyed by
    /// transaction id. With `owner`, only outputs locked to it are kept.
    pub fn find_all_utxo(&self, owner: Option<&[u8]>) -> UtxoMap {
        let mut spent: HashSet<(&[u8], usize)> = HashSet::new();
        for transaction in self.blocks.iter().flat_map(|block| block.transactions.iter()) {
            if transaction.is_coinbase() {
                continue;
            }
            for input in transaction.inputs() {
                if let Some(index) = input.output_index() {
                    spent.insert((input.txid.as_slice(), index));
                }
            }
        }

        let mut utxo = UtxoMap::new();
        for transaction in self.blocks.iter().flat_map(|block| block.transactions.iter()) {
            for (index, output) in transaction.outputs().iter().enumerate() {
                if spent.contains(&(transaction.id(), index)) {
                    continue;
                }
                if let Some(owner) = owner {
                    if !output.is_locked_with(owner) {
                        continue;
                    }
                }

                utxo.entry(transaction.id().to_vec())
                    .or_default()
                    .push(UnspentOutput {
                        index,
                        output: output.clone(),
                    });
            }
        }

        utxo
    }

    /// Transactions with at least one output locked to `owner`, chain order.
    /// Transactions where `owner` only spends are not included.
    pub fn transactions_for(&self, owner: &[u8]) -> Vec<&Transaction> {
        self.blocks
            .iter()
            .flat_map(|block| block.transactions.iter())
            .filter(|tx| tx.pays_to(owner))
            .collect()
    }

    /// Validates the blockchain
    ///
    /// # Returns
    ///
    /// true if every block carries a valid proof-of-work and links to its
    /// predecessor, false otherwise
    pub fn is_valid(&self) -> bool {
        for (index, block) in self.blocks.iter().enumerate() {
            let pow = ProofOfWork::new(block, self.difficulty_bits);

            if !pow.validate() || pow.hash_with_nonce(block.nonce) != block.hash {
                return false;
            }

            if index > 0 && block.previous_hash != self.blocks[index - 1].hash {
                return false;
            }
        }

        true
    }
}
