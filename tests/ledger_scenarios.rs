//! End-to-end ledger scenarios driven through the public service API.

use std::collections::HashSet;
use std::thread;

use utxo_ledger::blockchain::transaction::TransactionError;
use utxo_ledger::blockchain::{Ledger, LedgerError, Wallet, SUBSIDY};
use utxo_ledger::config::LedgerConfig;

/// A ledger whose genesis reward belongs to a fresh wallet
fn setup() -> (Ledger, Wallet) {
    let owner = Wallet::new();
    let ledger = Ledger::new(&LedgerConfig {
        genesis_address: owner.address().to_string(),
        genesis_memo: "Genesis Block".to_string(),
        difficulty_bits: 8,
    })
    .unwrap();
    (ledger, owner)
}

fn key_of(wallet: &Wallet) -> String {
    hex::encode(wallet.export_secret_key())
}

/// Every (txid, vout) pair spent anywhere on the chain, asserting none repeats
fn assert_no_output_spent_twice(ledger: &Ledger) {
    let mut spent = HashSet::new();
    for index in 0..ledger.height().unwrap() {
        let block = ledger.get_block(index).unwrap();
        for tx in block.transactions.iter().filter(|tx| !tx.is_coinbase()) {
            for input in tx.inputs() {
                assert!(
                    spent.insert((input.txid.clone(), input.vout)),
                    "output {}:{} spent twice",
                    hex::encode(&input.txid),
                    input.vout
                );
            }
        }
    }
}

#[test]
fn test_transfer_splits_genesis_reward() {
    let (ledger, alice) = setup();
    let bob = Wallet::new();
    let half = SUBSIDY / 2;

    let block = ledger
        .send(alice.address().as_str(), bob.address().as_str(), half, &key_of(&alice))
        .unwrap();

    assert_eq!(block.transactions.len(), 1);
    assert_eq!(ledger.height().unwrap(), 2);
    assert_eq!(ledger.get_balance(bob.address().as_str()).unwrap(), half);
    assert_eq!(ledger.get_balance(alice.address().as_str()).unwrap(), SUBSIDY - half);

    let received = ledger.get_transactions_for(bob.address().as_str()).unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].id(), block.transactions[0].id());
    assert!(ledger.validate_chain().unwrap().valid);
}

#[test]
fn test_overspend_leaves_chain_untouched() {
    let (ledger, alice) = setup();
    let bob = Wallet::new();

    let result = ledger.send(
        alice.address().as_str(),
        bob.address().as_str(),
        SUBSIDY + 1,
        &key_of(&alice),
    );

    assert!(matches!(
        result,
        Err(LedgerError::Transaction(TransactionError::InsufficientFunds { required, available }))
            if required == SUBSIDY + 1 && available == SUBSIDY
    ));
    assert_eq!(ledger.height().unwrap(), 1);
    assert_eq!(ledger.get_balance(alice.address().as_str()).unwrap(), SUBSIDY);
    assert_eq!(ledger.get_balance(bob.address().as_str()).unwrap(), 0);
}

#[test]
fn test_funds_circulate_without_double_spend() {
    let (ledger, alice) = setup();
    let bob = Wallet::new();
    let carol = Wallet::new();

    ledger.mine_reward(bob.address().as_str()).unwrap();
    ledger
        .send(alice.address().as_str(), bob.address().as_str(), 4_000, &key_of(&alice))
        .unwrap();
    // spends bob's reward plus the output alice just sent
    ledger
        .send(bob.address().as_str(), carol.address().as_str(), 17_000, &key_of(&bob))
        .unwrap();
    ledger
        .send(carol.address().as_str(), alice.address().as_str(), 500, &key_of(&carol))
        .unwrap();

    let balances: Vec<u64> = [&alice, &bob, &carol]
        .iter()
        .map(|wallet| ledger.get_balance(wallet.address().as_str()).unwrap())
        .collect();
    assert_eq!(balances, vec![11_500, 2_000, 16_500]);
    assert_eq!(balances.iter().sum::<u64>(), 2 * SUBSIDY);

    assert_eq!(ledger.height().unwrap(), 5);
    assert!(ledger.validate_chain().unwrap().valid);
    assert_no_output_spent_twice(&ledger);

    let emptied = ledger.send(
        bob.address().as_str(),
        carol.address().as_str(),
        2_001,
        &key_of(&bob),
    );
    assert!(emptied.is_err());
    assert_eq!(ledger.height().unwrap(), 5);
}

#[test]
fn test_concurrent_sends_never_overdraw() {
    let (ledger, alice) = setup();
    let bob = Wallet::new();
    let key = key_of(&alice);

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let ledger = ledger.clone();
            let from = alice.address().to_string();
            let to = bob.address().to_string();
            let key = key.clone();
            thread::spawn(move || ledger.send(&from, &to, 4_000, &key).is_ok())
        })
        .collect();

    let succeeded = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(succeeded, 3);
    assert_eq!(ledger.get_balance(bob.address().as_str()).unwrap(), 12_000);
    assert_eq!(ledger.get_balance(alice.address().as_str()).unwrap(), 3_000);
    assert_eq!(ledger.height().unwrap(), 4);
    assert_no_output_spent_twice(&ledger);
}

#[test]
fn test_foreign_key_cannot_spend() {
    let (ledger, alice) = setup();
    let mallory = Wallet::new();

    let result = ledger.send(
        alice.address().as_str(),
        mallory.address().as_str(),
        100,
        &key_of(&mallory),
    );

    assert!(matches!(result, Err(LedgerError::KeyMismatch)));
    assert_eq!(ledger.get_balance(alice.address().as_str()).unwrap(), SUBSIDY);
    assert_eq!(ledger.height().unwrap(), 1);
}
