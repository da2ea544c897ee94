use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{info, warn};
use serde::Serialize;
use thiserror::Error;

use super::audit::{AuditEvent, AuditSink, LogAuditSink};
use super::block::{Block, BlockSummary};
use super::chain::{Blockchain, BlockchainError};
use super::crypto::{self, Address, CryptoError, Wallet};
use super::transaction::{Transaction, TransactionError};
use super::utxo::{UtxoError, UtxoIndex, UtxoSet};
use crate::config::LedgerConfig;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Blockchain error: {0}")]
    Blockchain(#[from] BlockchainError),

    #[error("UTXO error: {0}")]
    Utxo(#[from] UtxoError),

    #[error("Transaction failed verification: {0}")]
    VerificationFailed(String),

    #[error("Private key does not match sender address")]
    KeyMismatch,

    #[error("Ledger state lock poisoned")]
    Poisoned,
}

/// A freshly generated wallet as handed to its owner
#[derive(Debug, Clone, Serialize)]
pub struct WalletInfo {
    pub address: String,
    pub private_key: String,
}

/// Result of a full chain check, taken from a single view of the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChainStatus {
    pub valid: bool,
    pub length: usize,
}

/// Chain and UTXO index, always mutated together
#[derive(Debug)]
struct LedgerState {
    chain: Blockchain,
    index: UtxoIndex,
}

impl LedgerState {
    /// Appends a mined block and brings the index along in the same step
    fn commit(&mut self, block: Block) -> Result<usize, LedgerError> {
        let block = self.chain.push(block)?;

        if let Err(err) = self.index.apply_block(block) {
            warn!("UTXO index refused block {}: {}; rebuilding", block.hash_hex(), err);
            self.index.rebuild(&self.chain);
        }

        Ok(self.chain.len() - 1)
    }
}

/// Everything a block needs before its proof-of-work search
struct PendingBlock {
    transactions: Vec<Transaction>,
    previous_hash: Vec<u8>,
    difficulty_bits: u32,
}

impl PendingBlock {
    fn on_tip(chain: &Blockchain, transactions: Vec<Transaction>) -> Self {
        PendingBlock {
            transactions,
            previous_hash: chain.tip().hash.clone(),
            difficulty_bits: chain.difficulty_bits(),
        }
    }

    fn mine(self) -> Block {
        Block::mine(self.transactions, self.previous_hash, self.difficulty_bits)
    }
}

/// The ledger service: owns the chain and its UTXO index behind one lock.
///
/// Writers are serialized by the miner mutex, which they hold from output
/// selection until the block is committed. The state lock is only taken
/// briefly on either side of the proof-of-work search, so readers never
/// wait for mining.
#[derive(Clone)]
pub struct Ledger {
    state: Arc<RwLock<LedgerState>>,
    miner: Arc<Mutex<()>>,
    audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger").finish()
    }
}

impl Ledger {
    /// Mines the genesis block described by `config` and indexes it
    pub fn new(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let genesis_address: Address = config.genesis_address.parse()?;
        let chain = Blockchain::new(&genesis_address, &config.genesis_memo, config.difficulty_bits)?;

        let mut index = UtxoIndex::new();
        index.rebuild(&chain);

        info!(
            "Ledger ready: genesis {} at difficulty {} bits",
            chain.tip().hash_hex(),
            chain.difficulty_bits()
        );

        Ok(Ledger {
            state: Arc::new(RwLock::new(LedgerState { chain, index })),
            miner: Arc::new(Mutex::new(())),
            audit: Arc::new(LogAuditSink),
        })
    }

    /// Replaces the audit sink
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>, LedgerError> {
        self.state.read().map_err(|_| LedgerError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>, LedgerError> {
        self.state.write().map_err(|_| LedgerError::Poisoned)
    }

    fn lock_miner(&self) -> Result<MutexGuard<'_, ()>, LedgerError> {
        self.miner.lock().map_err(|_| LedgerError::Poisoned)
    }

    /// Runs `f` against a UTXO snapshot matching the chain, taking the write
    /// lock only when the index has to be rebuilt first
    fn with_utxo<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&Blockchain, &UtxoSet) -> T,
    {
        {
            let state = self.read()?;
            if let Some(set) = state.index.current(&state.chain) {
                return Ok(f(&state.chain, set));
            }
        }

        let mut state = self.write()?;
        let LedgerState { chain, index } = &mut *state;
        let set = index.ensure_current(chain);
        Ok(f(chain, set))
    }

    fn record(&self, height: usize, block: &Block, event: AuditEvent) {
        if let Err(err) = self.audit.record_block(height, block, &event) {
            warn!("Failed to audit {} block {}: {}", event.kind(), block.hash_hex(), err);
        }
    }

    /// Generates a new wallet
    pub fn create_wallet(&self) -> WalletInfo {
        let wallet = Wallet::new();
        info!("Created wallet {}", wallet.address());

        WalletInfo {
            address: wallet.address().to_string(),
            private_key: crypto::private_key_to_hex(wallet.secret_key()),
        }
    }

    /// Sum of the unspent outputs locked to `address`
    pub fn get_balance(&self, address: &str) -> Result<u64, LedgerError> {
        let owner = address.parse::<Address>()?.to_pub_key_hash()?;
        self.with_utxo(|_, set| set.balance(&owner))
    }

    /// Transactions with an output paying `address`, chain order
    pub fn get_transactions_for(&self, address: &str) -> Result<Vec<Transaction>, LedgerError> {
        let owner = address.parse::<Address>()?.to_pub_key_hash()?;
        let state = self.read()?;

        Ok(state
            .chain
            .transactions_for(&owner)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Moves `amount` from `from` to `to` and mines it into a new block.
    ///
    /// Everything that can be checked without the chain is checked before
    /// any lock is taken, so rejected requests leave no trace.
    pub fn send(&self, from: &str, to: &str, amount: u64, private_key: &str) -> Result<Block, LedgerError> {
        let from: Address = from.parse()?;
        let to: Address = to.parse()?;
        if amount == 0 {
            return Err(TransactionError::InvalidAmount("Amount must be positive".to_string()).into());
        }

        let wallet = Wallet::from_secret_key(crypto::private_key_from_hex(private_key)?);
        let owner = from.to_pub_key_hash()?;
        if wallet.pub_key_hash() != owner {
            return Err(LedgerError::KeyMismatch);
        }
        to.to_pub_key_hash()?;

        let _miner = self.lock_miner()?;

        let pending = self.with_utxo(|chain, set| -> Result<PendingBlock, LedgerError> {
            let spendable = set.find_spendable(&owner, amount);
            if spendable.accumulated < amount {
                warn!(
                    "Rejected send of {} from {}: only {} available",
                    amount, from, spendable.accumulated
                );
                return Err(TransactionError::InsufficientFunds {
                    required: amount,
                    available: spendable.accumulated,
                }
                .into());
            }

            let mut transaction = Transaction::new_transfer(&to, amount, &spendable, &owner)?;
            chain.sign_transaction(&mut transaction, wallet.secret_key())?;
            if !chain.verify_transaction(&transaction) {
                return Err(LedgerError::VerificationFailed(transaction.id_hex()));
            }

            Ok(PendingBlock::on_tip(chain, vec![transaction]))
        })??;

        let block = pending.mine();
        let height = self.write()?.commit(block.clone())?;

        info!("Mined transfer of {} from {} to {} in block {}", amount, from, to, block.hash_hex());
        self.record(height, &block, AuditEvent::Transfer { from, to, amount });
        Ok(block)
    }

    /// Mines a block holding a single coinbase paying `to`
    pub fn mine_reward(&self, to: &str) -> Result<Block, LedgerError> {
        let to: Address = to.parse()?;
        to.to_pub_key_hash()?;

        let _miner = self.lock_miner()?;

        let pending = {
            let state = self.read()?;
            // the height keeps coinbase ids unique for repeat recipients
            let memo = format!("Reward to {} at height {}", to, state.chain.len());
            let coinbase = Transaction::new_coinbase(&to, &memo)?;
            PendingBlock::on_tip(&state.chain, vec![coinbase])
        };

        let block = pending.mine();
        let height = self.write()?.commit(block.clone())?;

        info!("Mined reward for {} in block {}", to, block.hash_hex());
        self.record(height, &block, AuditEvent::Reward { to });
        Ok(block)
    }

    /// Summaries of every block, genesis first
    pub fn list_blocks(&self) -> Result<Vec<BlockSummary>, LedgerError> {
        Ok(self.read()?.chain.list_blocks().collect())
    }

    /// The block at `index`
    pub fn get_block(&self, index: usize) -> Result<Block, LedgerError> {
        Ok(self.read()?.chain.get_block(index)?.clone())
    }

    /// Number of blocks, genesis included
    pub fn height(&self) -> Result<usize, LedgerError> {
        Ok(self.read()?.chain.len())
    }

    /// Checks proof-of-work and links of every block
    pub fn validate_chain(&self) -> Result<ChainStatus, LedgerError> {
        let state = self.read()?;
        Ok(ChainStatus {
            valid: state.chain.is_valid(),
            length: state.chain.len(),
        })
    }
}
