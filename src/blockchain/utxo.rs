//! Cache of unspent transaction outputs.
//!
//! [`UtxoSet`] is a snapshot known to match a specific chain tip; it is the
//! only type that answers balance and spendable-output queries.
//! [`UtxoIndex`] wraps it in the stale/current state machine, so reads go
//! through [`UtxoIndex::ensure_current`] and a chain that moved on without
//! the matching [`UtxoIndex::apply_block`] is rebuilt instead of read.

use std::collections::BTreeMap;

use log::{debug, info};
use thiserror::Error;

use super::block::Block;
use super::chain::Blockchain;
use super::transaction::{SpendableOutputs, TxOutput};

/// Unspent outputs keyed by transaction id
pub type UtxoMap = BTreeMap<Vec<u8>, Vec<UnspentOutput>>;

/// An output together with its index in the transaction that created it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnspentOutput {
    pub index: usize,
    pub output: TxOutput,
}

/// Errors that can occur while maintaining the index
#[derive(Debug, Error)]
pub enum UtxoError {
    #[error("Block does not extend indexed tip: expected parent {expected}, got {got}")]
    OutOfOrder { expected: String, got: String },

    #[error("UTXO index is stale and must be rebuilt")]
    Stale,
}

/// UTXO snapshot matching one chain tip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoSet {
    utxo: UtxoMap,
    tip: Vec<u8>,
    height: usize,
}

impl UtxoSet {
    /// Recomputes the set from a full chain scan
    pub fn reindex(chain: &Blockchain) -> Self {
        let utxo = chain.find_all_utxo(None);
        info!(
            "Reindexed UTXO set: {} transactions with unspent outputs over {} blocks",
            utxo.len(),
            chain.len()
        );

        UtxoSet {
            utxo,
            tip: chain.tip().hash.clone(),
            height: chain.len(),
        }
    }

    /// Whether this snapshot reflects exactly the blocks of `chain`
    pub fn is_current_for(&self, chain: &Blockchain) -> bool {
        self.height == chain.len() && self.tip == chain.tip().hash
    }

    pub fn entries(&self) -> &UtxoMap {
        &self.utxo
    }

    /// Number of blocks reflected in the snapshot
    pub fn height(&self) -> usize {
        self.height
    }

    /// First-fit selection of outputs owned by `owner`.
    ///
    /// Walks the set in id order and stops as soon as `amount` is covered.
    /// When the owner cannot cover it, everything owned is returned and the
    /// caller must compare `accumulated` with `amount`.
    pub fn find_spendable(&self, owner: &[u8], amount: u64) -> SpendableOutputs {
        let mut spendable = SpendableOutputs::default();

        'scan: for (txid, outputs) in &self.utxo {
            for unspent in outputs {
                if spendable.accumulated >= amount {
                    break 'scan;
                }
                if !unspent.output.is_locked_with(owner) {
                    continue;
                }

                spendable.accumulated += unspent.output.value;
                spendable
                    .outputs
                    .entry(txid.clone())
                    .or_default()
                    .push(unspent.index);
            }
        }

        debug!(
            "Selected {} outputs worth {} for requested {}",
            spendable.outputs.values().map(Vec::len).sum::<usize>(),
            spendable.accumulated,
            amount
        );
        spendable
    }

    /// Unspent outputs locked to `owner`
    pub fn find_utxo(&self, owner: &[u8]) -> Vec<&TxOutput> {
        self.utxo
            .values()
            .flatten()
            .map(|unspent| &unspent.output)
            .filter(|output| output.is_locked_with(owner))
            .collect()
    }

    /// Sum of the unspent outputs locked to `owner`
    pub fn balance(&self, owner: &[u8]) -> u64 {
        self.find_utxo(owner).iter().map(|output| output.value).sum()
    }

    /// Applies the spends and new outputs of the block that follows the
    /// snapshot's tip.
    ///
    /// A block whose parent is not the indexed tip (including one already
    /// applied) is refused without touching the set.
    pub fn apply_block(&mut self, block: &Block) -> Result<(), UtxoError> {
        if block.previous_hash != self.tip {
            return Err(UtxoError::OutOfOrder {
                expected: hex::encode(&self.tip),
                got: hex::encode(&block.previous_hash),
            });
        }

        for transaction in &block.transactions {
            if !transaction.is_coinbase() {
                for input in transaction.inputs() {
                    let index = match input.output_index() {
                        Some(index) => index,
                        None => continue,
                    };

                    let emptied = match self.utxo.get_mut(&input.txid) {
                        Some(outputs) => {
                            outputs.retain(|unspent| unspent.index != index);
                            outputs.is_empty()
                        }
                        None => false,
                    };
                    if emptied {
                        self.utxo.remove(&input.txid);
                    }
                }
            }

            let outputs = transaction
                .outputs()
                .iter()
                .enumerate()
                .map(|(index, output)| UnspentOutput {
                    index,
                    output: output.clone(),
                })
                .collect();
            self.utxo.insert(transaction.id().to_vec(), outputs);
        }

        self.tip = block.hash.clone();
        self.height += 1;
        Ok(())
    }
}

/// Stale/current state machine around [`UtxoSet`].
///
/// `None` is the stale state: nothing can be read until a rebuild.
#[derive(Debug, Clone, Default)]
pub struct UtxoIndex {
    current: Option<UtxoSet>,
}

impl UtxoIndex {
    /// Creates a stale index
    pub fn new() -> Self {
        UtxoIndex { current: None }
    }

    /// True when a snapshot exists and matches the tip of `chain`
    pub fn is_current(&self, chain: &Blockchain) -> bool {
        self.current(chain).is_some()
    }

    /// The snapshot, only if it matches the tip of `chain`
    pub fn current(&self, chain: &Blockchain) -> Option<&UtxoSet> {
        self.current.as_ref().filter(|set| set.is_current_for(chain))
    }

    /// Marks the index stale
    pub fn invalidate(&mut self) {
        self.current = None;
    }

    /// Discards the cache and recomputes it from `chain`
    pub fn rebuild(&mut self, chain: &Blockchain) -> &UtxoSet {
        self.current.insert(UtxoSet::reindex(chain))
    }

    /// Returns a snapshot matching `chain`, rebuilding when stale or behind
    pub fn ensure_current(&mut self, chain: &Blockchain) -> &UtxoSet {
        if !self.is_current(chain) {
            self.invalidate();
        }

        self.current.get_or_insert_with(|| UtxoSet::reindex(chain))
    }

    /// Applies `block` to a current index. On failure the index turns stale.
    pub fn apply_block(&mut self, block: &Block) -> Result<(), UtxoError> {
        let result = match self.current.as_mut() {
            Some(set) => set.apply_block(block),
            None => Err(UtxoError::Stale),
        };

        if result.is_err() {
            self.invalidate();
        }
        result
    }
}
