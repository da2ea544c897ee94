use std::collections::{BTreeMap, HashMap};

use log::debug;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::crypto::{self, Address, CryptoError};

/// Fixed reward minted by every coinbase transaction
pub const SUBSIDY: u64 = 15_000;

/// Output index carried by a coinbase input
pub const COINBASE_VOUT: i64 = -1;

/// Referenced transactions keyed by hex encoded id
pub type ReferencedTransactions = HashMap<String, Transaction>;

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Referenced transaction not found: {0}")]
    MissingReference(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Transaction already signed")]
    AlreadySigned,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// References a previous output and carries the spender's proof of ownership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Id of the transaction holding the spent output (empty for coinbase)
    pub txid: Vec<u8>,

    /// Index of the spent output (`-1` for coinbase)
    pub vout: i64,

    /// Compact ECDSA signature
    pub signature: Vec<u8>,

    /// Raw public key of the spender, or the memo of a coinbase input
    pub pub_key: Vec<u8>,
}

impl TxInput {
    /// Index of the referenced output, if this input references one
    pub fn output_index(&self) -> Option<usize> {
        usize::try_from(self.vout).ok()
    }
}

/// A value locked to the hash of a public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: u64,
    pub pub_key_hash: Vec<u8>,
}

impl TxOutput {
    pub fn new(value: u64, pub_key_hash: Vec<u8>) -> Self {
        TxOutput { value, pub_key_hash }
    }

    pub fn is_locked_with(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash == pub_key_hash
    }
}

/// Outputs picked to fund a transfer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpendableOutputs {
    /// Total value of the selected outputs
    pub accumulated: u64,

    /// Selected output indexes keyed by transaction id
    pub outputs: BTreeMap<Vec<u8>, Vec<usize>>,
}

/// A UTXO-model transaction.
///
/// Fields are only readable from outside this module: once `id` is assigned
/// the content must not change, since nothing ever recomputes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    id: Vec<u8>,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Creates a coinbase transaction paying the fixed subsidy to `to`.
    ///
    /// The id depends only on `to` and `memo`; callers minting repeat rewards
    /// must vary the memo. An empty memo is replaced by a default one naming the recipient.
    pub fn new_coinbase(to: &Address, memo: &str) -> Result<Self, TransactionError> {
        let memo = if memo.is_empty() {
            format!("Reward to {}", to)
        } else {
            memo.to_string()
        };

        let input = TxInput {
            txid: Vec::new(),
            vout: COINBASE_VOUT,
            signature: Vec::new(),
            pub_key: memo.into_bytes(),
        };
        let output = TxOutput::new(SUBSIDY, to.to_pub_key_hash()?);

        let mut transaction = Transaction {
            id: Vec::new(),
            inputs: vec![input],
            outputs: vec![output],
        };
        transaction.id = transaction.content_hash()?;

        Ok(transaction)
    }

    /// Creates an unsigned transfer of `amount` to `to`, funded by `spendable`.
    ///
    /// Any value selected beyond `amount` goes back to `change_owner`. The
    /// transaction has no id until [`Transaction::sign`] assigns one.
    pub fn new_transfer(
        to: &Address,
        amount: u64,
        spendable: &SpendableOutputs,
        change_owner: &[u8],
    ) -> Result<Self, TransactionError> {
        if amount == 0 {
            return Err(TransactionError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }

        if spendable.accumulated < amount {
            return Err(TransactionError::InsufficientFunds {
                required: amount,
                available: spendable.accumulated,
            });
        }

        let mut inputs = Vec::new();
        for (txid, indexes) in &spendable.outputs {
            for &index in indexes {
                inputs.push(TxInput {
                    txid: txid.clone(),
                    vout: index as i64,
                    signature: Vec::new(),
                    pub_key: Vec::new(),
                });
            }
        }

        let mut outputs = vec![TxOutput::new(amount, to.to_pub_key_hash()?)];
        if spendable.accumulated > amount {
            outputs.push(TxOutput::new(
                spendable.accumulated - amount,
                change_owner.to_vec(),
            ));
        }

        Ok(Transaction {
            id: Vec::new(),
            inputs,
            outputs,
        })
    }

    pub fn id(&self) -> &[u8] {
        &self.id
    }

    pub fn id_hex(&self) -> String {
        hex::encode(&self.id)
    }

    pub fn inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    /// True for a single input with an empty reference and the `-1` index
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].txid.is_empty() && self.inputs[0].vout == COINBASE_VOUT
    }

    /// Whether any output is locked to `pub_key_hash`
    pub fn pays_to(&self, pub_key_hash: &[u8]) -> bool {
        self.outputs.iter().any(|out| out.is_locked_with(pub_key_hash))
    }

    /// Sum of all output values
    pub fn output_value(&self) -> u64 {
        self.outputs.iter().map(|out| out.value).sum()
    }

    /// Sum of the values of the outputs this transaction spends, or `None`
    /// when a reference cannot be resolved
    pub fn input_value(&self, referenced: &ReferencedTransactions) -> Option<u64> {
        if self.is_coinbase() {
            return Some(0);
        }

        self.inputs.iter().try_fold(0u64, |total, input| {
            referenced_output(referenced, input).map(|out| total + out.value)
        })
    }

    /// SHA-256 over the canonical encoding of the transaction, id blanked
    pub fn content_hash(&self) -> Result<Vec<u8>, TransactionError> {
        let mut copy = self.clone();
        copy.id = Vec::new();

        let encoded = bincode::serialize(&copy)
            .map_err(|e| TransactionError::Serialization(e.to_string()))?;

        Ok(Sha256::digest(&encoded).to_vec())
    }

    /// Signs every input with `secret_key`, then assigns the id.
    ///
    /// Each input gets its own digest: the trimmed copy carries the
    /// referenced output's owner in that input's key slot while it is
    /// hashed, and the slot is cleared again before the next input.
    pub fn sign(
        &mut self,
        secret_key: &SecretKey,
        referenced: &ReferencedTransactions,
    ) -> Result<(), TransactionError> {
        if self.is_coinbase() {
            return Ok(());
        }

        if !self.id.is_empty() {
            return Err(TransactionError::AlreadySigned);
        }

        let secp = Secp256k1::signing_only();
        let public_key = crypto::raw_public_key(&PublicKey::from_secret_key(&secp, secret_key));

        let mut trimmed = self.trimmed_copy();
        let mut signatures = Vec::with_capacity(self.inputs.len());

        for (index, input) in self.inputs.iter().enumerate() {
            let previous = referenced_output(referenced, input).ok_or_else(|| {
                TransactionError::MissingReference(format!(
                    "{}:{}",
                    hex::encode(&input.txid),
                    input.vout
                ))
            })?;

            let digest = trimmed.signing_hash(index, &previous.pub_key_hash)?;
            signatures.push(crypto::sign_digest(secret_key, &digest)?);
        }

        for (input, signature) in self.inputs.iter_mut().zip(signatures) {
            input.signature = signature;
            input.pub_key = public_key.clone();
        }
        self.id = self.content_hash()?;

        debug!("Signed transaction {} with {} inputs", self.id_hex(), self.inputs.len());
        Ok(())
    }

    /// Checks every input signature against the digest [`Transaction::sign`]
    /// would have produced. Coinbase transactions always verify.
    pub fn verify(&self, referenced: &ReferencedTransactions) -> bool {
        if self.is_coinbase() {
            return true;
        }

        let mut trimmed = self.trimmed_copy();

        for (index, input) in self.inputs.iter().enumerate() {
            let previous = match referenced_output(referenced, input) {
                Some(output) => output,
                None => return false,
            };

            let digest = match trimmed.signing_hash(index, &previous.pub_key_hash) {
                Ok(digest) => digest,
                Err(_) => return false,
            };

            if !crypto::verify_signature(&digest, &input.signature, &input.pub_key) {
                return false;
            }
        }

        true
    }

    /// Copy with every signature and public key cleared
    fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .inputs
            .iter()
            .map(|input| TxInput {
                txid: input.txid.clone(),
                vout: input.vout,
                signature: Vec::new(),
                pub_key: Vec::new(),
            })
            .collect();

        Transaction {
            id: self.id.clone(),
            inputs,
            outputs: self.outputs.clone(),
        }
    }

    fn signing_hash(&mut self, index: usize, owner: &[u8]) -> Result<Vec<u8>, TransactionError> {
        self.inputs[index].pub_key = owner.to_vec();
        let digest = self.content_hash();
        self.inputs[index].pub_key = Vec::new();
        digest
    }
}

fn referenced_output<'a>(
    referenced: &'a ReferencedTransactions,
    input: &TxInput,
) -> Option<&'a TxOutput> {
    let index = input.output_index()?;
    referenced
        .get(&hex::encode(&input.txid))
        .and_then(|tx| tx.outputs.get(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::Wallet;

    fn funded(wallet: &Wallet, coinbases: usize) -> (ReferencedTransactions, SpendableOutputs) {
        let mut referenced = ReferencedTransactions::new();
        let mut spendable = SpendableOutputs::default();

        for n in 0..coinbases {
            let coinbase = Transaction::new_coinbase(wallet.address(), &format!("reward {}", n)).unwrap();
            spendable.accumulated += coinbase.outputs()[0].value;
            spendable.outputs.insert(coinbase.id().to_vec(), vec![0]);
            referenced.insert(coinbase.id_hex(), coinbase);
        }

        (referenced, spendable)
    }

    fn signed_transfer(sender: &Wallet, amount: u64) -> (Transaction, ReferencedTransactions) {
        let recipient = Wallet::new();
        let (referenced, spendable) = funded(sender, 1);

        let mut transaction =
            Transaction::new_transfer(recipient.address(), amount, &spendable, &sender.pub_key_hash())
                .unwrap();
        transaction.sign(sender.secret_key(), &referenced).unwrap();

        (transaction, referenced)
    }

    #[test]
    fn test_coinbase_transaction() {
        let miner = Wallet::new();
        let transaction = Transaction::new_coinbase(miner.address(), "").unwrap();

        assert!(transaction.is_coinbase());
        assert_eq!(transaction.id().len(), 32);
        assert_eq!(transaction.outputs().len(), 1);
        assert_eq!(transaction.outputs()[0].value, SUBSIDY);
        assert!(transaction.pays_to(&miner.pub_key_hash()));
        assert_eq!(transaction.inputs()[0].pub_key, format!("Reward to {}", miner.address()).into_bytes());
        assert!(transaction.verify(&ReferencedTransactions::new()));
        assert_eq!(transaction.input_value(&ReferencedTransactions::new()), Some(0));
    }

    #[test]
    fn test_coinbase_id_depends_only_on_address_and_memo() {
        let miner = Wallet::new();
        let first = Transaction::new_coinbase(miner.address(), "one").unwrap();
        let second = Transaction::new_coinbase(miner.address(), "two").unwrap();
        assert_ne!(first.id(), second.id());

        let repeat = Transaction::new_coinbase(miner.address(), "one").unwrap();
        assert_eq!(first.id(), repeat.id());

        let other = Transaction::new_coinbase(Wallet::new().address(), "one").unwrap();
        assert_ne!(first.id(), other.id());
    }

    #[test]
    fn test_sign_coinbase_is_noop() {
        let miner = Wallet::new();
        let mut transaction = Transaction::new_coinbase(miner.address(), "memo").unwrap();
        let before = transaction.clone();

        transaction.sign(miner.secret_key(), &ReferencedTransactions::new()).unwrap();
        assert_eq!(transaction, before);
    }

    #[test]
    fn test_new_transfer_with_change() {
        let sender = Wallet::new();
        let recipient = Wallet::new();
        let (_, spendable) = funded(&sender, 1);

        let transaction =
            Transaction::new_transfer(recipient.address(), 4_000, &spendable, &sender.pub_key_hash())
                .unwrap();

        assert!(!transaction.is_coinbase());
        assert!(transaction.id().is_empty());
        assert_eq!(transaction.inputs().len(), 1);
        assert_eq!(transaction.outputs().len(), 2);
        assert_eq!(transaction.outputs()[0], TxOutput::new(4_000, recipient.pub_key_hash()));
        assert_eq!(transaction.outputs()[1], TxOutput::new(SUBSIDY - 4_000, sender.pub_key_hash()));
    }

    #[test]
    fn test_new_transfer_exact_amount_has_no_change() {
        let sender = Wallet::new();
        let recipient = Wallet::new();
        let (_, spendable) = funded(&sender, 1);

        let transaction =
            Transaction::new_transfer(recipient.address(), SUBSIDY, &spendable, &sender.pub_key_hash())
                .unwrap();
        assert_eq!(transaction.outputs().len(), 1);
    }

    #[test]
    fn test_new_transfer_rejects_bad_amounts() {
        let sender = Wallet::new();
        let recipient = Wallet::new();
        let (_, spendable) = funded(&sender, 1);

        let result =
            Transaction::new_transfer(recipient.address(), SUBSIDY + 1, &spendable, &sender.pub_key_hash());
        assert!(matches!(
            result,
            Err(TransactionError::InsufficientFunds { required, available })
                if required == SUBSIDY + 1 && available == SUBSIDY
        ));

        let result = Transaction::new_transfer(recipient.address(), 0, &spendable, &sender.pub_key_hash());
        assert!(matches!(result, Err(TransactionError::InvalidAmount(_))));
    }

    #[test]
    fn test_sign_and_verify() {
        let sender = Wallet::new();
        let (transaction, referenced) = signed_transfer(&sender, 1_000);

        assert_eq!(transaction.id().len(), 32);
        assert_eq!(transaction.inputs()[0].pub_key, sender.public_key_bytes());
        assert_eq!(transaction.inputs()[0].signature.len(), 64);
        assert!(transaction.verify(&referenced));
    }

    #[test]
    fn test_sign_twice_is_rejected() {
        let sender = Wallet::new();
        let (mut transaction, referenced) = signed_transfer(&sender, 1_000);

        let result = transaction.sign(sender.secret_key(), &referenced);
        assert!(matches!(result, Err(TransactionError::AlreadySigned)));
    }

    #[test]
    fn test_multi_input_signatures_are_per_input() {
        let sender = Wallet::new();
        let recipient = Wallet::new();
        let (referenced, spendable) = funded(&sender, 3);

        let mut transaction = Transaction::new_transfer(
            recipient.address(),
            SUBSIDY * 2 + 1,
            &spendable,
            &sender.pub_key_hash(),
        )
        .unwrap();
        transaction.sign(sender.secret_key(), &referenced).unwrap();

        assert_eq!(transaction.inputs().len(), 3);
        assert_ne!(transaction.inputs()[0].signature, transaction.inputs()[1].signature);
        assert!(transaction.verify(&referenced));

        // swapping signatures between inputs must not verify
        let mut swapped = transaction.clone();
        let first = swapped.inputs[0].signature.clone();
        swapped.inputs[0].signature = swapped.inputs[1].signature.clone();
        swapped.inputs[1].signature = first;
        assert!(!swapped.verify(&referenced));
    }

    #[test]
    fn test_tampering_breaks_verification() {
        let sender = Wallet::new();
        let (transaction, referenced) = signed_transfer(&sender, 1_000);

        let mut tampered = transaction.clone();
        tampered.outputs[0].value += 1;
        assert!(!tampered.verify(&referenced));

        let mut tampered = transaction.clone();
        tampered.outputs[0].pub_key_hash = Wallet::new().pub_key_hash();
        assert!(!tampered.verify(&referenced));

        let mut tampered = transaction.clone();
        tampered.inputs[0].signature[10] ^= 0x01;
        assert!(!tampered.verify(&referenced));

        let mut tampered = transaction;
        tampered.inputs[0].signature.pop();
        assert!(!tampered.verify(&referenced));
    }

    #[test]
    fn test_sign_missing_reference() {
        let sender = Wallet::new();
        let recipient = Wallet::new();
        let (_, spendable) = funded(&sender, 1);

        let mut transaction =
            Transaction::new_transfer(recipient.address(), 10, &spendable, &sender.pub_key_hash())
                .unwrap();
        let result = transaction.sign(sender.secret_key(), &ReferencedTransactions::new());

        assert!(matches!(result, Err(TransactionError::MissingReference(_))));
        assert!(transaction.id().is_empty());
        assert!(transaction.inputs()[0].signature.is_empty());
        assert!(!transaction.verify(&ReferencedTransactions::new()));
    }

    #[test]
    fn test_conservation() {
        let sender = Wallet::new();
        let (transaction, referenced) = signed_transfer(&sender, 2_500);

        assert_eq!(transaction.input_value(&referenced), Some(SUBSIDY));
        assert!(transaction.output_value() <= SUBSIDY);
        assert_eq!(transaction.output_value(), SUBSIDY);
    }
}
