use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::{Address, Block, BlockSummary, Transaction, TxInput, TxOutput};

/// A transaction input with byte fields hex encoded
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TxInputResponse {
    /// Referenced transaction id (empty for coinbase)
    pub txid: String,

    /// Referenced output index (-1 for coinbase)
    pub vout: i64,

    /// Compact ECDSA signature
    pub signature: String,

    /// Spender public key, or the coinbase memo
    pub pub_key: String,
}

impl From<&TxInput> for TxInputResponse {
    fn from(input: &TxInput) -> Self {
        TxInputResponse {
            txid: hex::encode(&input.txid),
            vout: input.vout,
            signature: hex::encode(&input.signature),
            pub_key: hex::encode(&input.pub_key),
        }
    }
}

/// A transaction output
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TxOutputResponse {
    pub value: u64,

    /// Address the output is locked to
    pub address: String,
}

impl From<&TxOutput> for TxOutputResponse {
    fn from(output: &TxOutput) -> Self {
        TxOutputResponse {
            value: output.value,
            address: Address::from_pub_key_hash(&output.pub_key_hash).to_string(),
        }
    }
}

/// A transaction as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    pub id: String,
    pub coinbase: bool,
    pub inputs: Vec<TxInputResponse>,
    pub outputs: Vec<TxOutputResponse>,
}

impl From<&Transaction> for TransactionResponse {
    fn from(transaction: &Transaction) -> Self {
        TransactionResponse {
            id: transaction.id_hex(),
            coinbase: transaction.is_coinbase(),
            inputs: transaction.inputs().iter().map(TxInputResponse::from).collect(),
            outputs: transaction.outputs().iter().map(TxOutputResponse::from).collect(),
        }
    }
}

/// A full block as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BlockResponse {
    /// Unix timestamp in seconds
    pub timestamp: i64,
    pub hash: String,
    pub previous_hash: String,
    pub nonce: u64,
    pub transactions: Vec<TransactionResponse>,
}

impl From<&Block> for BlockResponse {
    fn from(block: &Block) -> Self {
        BlockResponse {
            timestamp: block.timestamp,
            hash: block.hash_hex(),
            previous_hash: hex::encode(&block.previous_hash),
            nonce: block.nonce,
            transactions: block.transactions.iter().map(TransactionResponse::from).collect(),
        }
    }
}

/// One row of the block listing
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BlockSummaryResponse {
    pub index: usize,
    pub timestamp: i64,
    pub hash: String,
    pub previous_hash: String,
    pub tx_count: usize,
}

impl From<BlockSummary> for BlockSummaryResponse {
    fn from(summary: BlockSummary) -> Self {
        BlockSummaryResponse {
            index: summary.index,
            timestamp: summary.timestamp,
            hash: summary.hash,
            previous_hash: summary.previous_hash,
            tx_count: summary.tx_count,
        }
    }
}

/// Error body returned by every failing endpoint
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
