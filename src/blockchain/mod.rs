// Blockchain module
//
// This module contains the ledger core:
// - Key management and addresses
// - UTXO transactions and their signing
// - Block structure and the append-only chain
// - Proof of work
// - The unspent output index
// - The ledger service tying them together

pub mod audit;
pub mod block;
pub mod chain;
pub mod crypto;
pub mod ledger;
pub mod pow;
pub mod transaction;
pub mod utxo;

// Re-export main components for easier access
pub use block::{Block, BlockSummary};
pub use chain::{Blockchain, BlockchainError};
pub use crypto::{Address, CryptoError, Wallet};
pub use ledger::{ChainStatus, Ledger, LedgerError, WalletInfo};
pub use transaction::{Transaction, TransactionError, TxInput, TxOutput, SUBSIDY};
pub use utxo::{UtxoIndex, UtxoSet};
