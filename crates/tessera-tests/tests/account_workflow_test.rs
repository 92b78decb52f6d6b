//! End-to-end workflow tests for Tessera accounts
//!
//! These tests drive the account façade the way a wallet would: derive a
//! family of accounts from one mnemonic, attach a nonce source, sign every
//! payload kind and check each signature recovers to the right account.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tessera_core::{
    address_of,
    crypto::recover_address,
    hash_typed_data, hd_key_to_account,
    message::recover_message_address,
    transaction::recover_signer,
    AccountSigner, Address, Authorization, DerivationOptions, Error, HdAccount, KeyTreeNode,
    NonceManager, SignableMessage, TransactionRequest, TransactionType, TypedData, U256,
};

const MNEMONIC: &str = "test test test test test test test test test test test junk";

/// Nonce source backed by an in-memory map
#[derive(Default)]
struct MemoryNonces {
    next: Mutex<HashMap<(Address, u64), u64>>,
}

impl NonceManager for MemoryNonces {
    fn consume(&self, address: &Address, chain_id: u64) -> tessera_core::Result<u64> {
        let mut next = self
            .next
            .lock()
            .map_err(|_| Error::Nonce("poisoned".to_string()))?;
        let slot = next.entry((*address, chain_id)).or_insert(0);
        let nonce = *slot;
        *slot += 1;
        Ok(nonce)
    }

    fn get(&self, address: &Address, chain_id: u64) -> tessera_core::Result<u64> {
        let next = self
            .next
            .lock()
            .map_err(|_| Error::Nonce("poisoned".to_string()))?;
        Ok(next.get(&(*address, chain_id)).copied().unwrap_or(0))
    }

    fn reset(&self, address: &Address, chain_id: u64) {
        if let Ok(mut next) = self.next.lock() {
            next.remove(&(*address, chain_id));
        }
    }
}

fn root() -> KeyTreeNode {
    let mnemonic = bip39::Mnemonic::parse(MNEMONIC).unwrap();
    KeyTreeNode::from_seed(&mnemonic.to_seed("")).unwrap()
}

fn permit(owner: Address, spender: Address) -> TypedData {
    serde_json::from_value(json!({
        "types": {
            "Permit": [
                { "name": "owner", "type": "address" },
                { "name": "spender", "type": "address" },
                { "name": "value", "type": "uint256" },
                { "name": "nonce", "type": "uint256" },
                { "name": "deadline", "type": "uint256" }
            ]
        },
        "primaryType": "Permit",
        "domain": {
            "name": "Tessera Token",
            "version": "1",
            "chainId": 1,
            "verifyingContract": "0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC"
        },
        "message": {
            "owner": owner,
            "spender": spender,
            "value": "1000000000000000000",
            "nonce": 0,
            "deadline": "0xffffffff"
        }
    }))
    .unwrap()
}

/// Derives several accounts and signs every payload kind with them
#[test]
fn test_full_account_workflow() {
    // ==========================================
    // STEP 1: Derive a family of accounts
    // ==========================================
    let root = root();
    let accounts: Vec<HdAccount> = (0..3)
        .map(|i| hd_key_to_account(&root, &DerivationOptions::with_address_index(i)).unwrap())
        .collect();

    assert_eq!(
        accounts[0].address().to_string(),
        "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
    );
    assert_ne!(accounts[0].address(), accounts[1].address());
    assert_ne!(accounts[1].address(), accounts[2].address());

    // Same derivation through the mnemonic constructor
    let again = HdAccount::from_mnemonic(MNEMONIC, "", &DerivationOptions::with_address_index(2))
        .unwrap();
    assert_eq!(again.address(), accounts[2].address());
    assert_eq!(again.hd_key(), accounts[2].hd_key());

    // ==========================================
    // STEP 2: Attach a nonce source
    // ==========================================
    let nonces = Arc::new(MemoryNonces::default());
    let sender = accounts[0].clone().with_nonce_manager(nonces.clone());
    let chain_id = 1u64;

    // ==========================================
    // STEP 3: Sign an EIP-1559 transfer
    // ==========================================
    let nonce = sender
        .nonce_manager()
        .unwrap()
        .consume(&sender.address(), chain_id)
        .unwrap();
    let transfer = TransactionRequest {
        chain_id: Some(chain_id),
        nonce: Some(nonce),
        gas: Some(21_000),
        max_fee_per_gas: Some(U256::from(30_000_000_000u64)),
        max_priority_fee_per_gas: Some(U256::from(1_500_000_000u64)),
        to: Some(accounts[1].address()),
        value: Some(U256::from(1_000_000_000_000_000u64)),
        ..Default::default()
    };
    let signed = sender.sign_transaction(&transfer).unwrap();
    assert_eq!(signed.transaction_type, TransactionType::Eip1559);
    assert!(signed.to_hex().starts_with("0x02"));
    assert_eq!(
        recover_signer(&transfer, &signed.signature).unwrap(),
        sender.address()
    );
    assert_eq!(nonces.get(&sender.address(), chain_id).unwrap(), 1);

    // ==========================================
    // STEP 4: Delegate code with EIP-7702
    // ==========================================
    let delegate: Address = "0x5FbDB2315678afecb367f032d93F642f64180aa3".parse().unwrap();
    let authorization = accounts[2]
        .sign_authorization(
            &Authorization {
                chain_id,
                address: delegate,
                nonce: 0,
            },
            true,
        )
        .unwrap();

    let delegation = TransactionRequest {
        chain_id: Some(chain_id),
        nonce: Some(
            sender
                .nonce_manager()
                .unwrap()
                .consume(&sender.address(), chain_id)
                .unwrap(),
        ),
        gas: Some(100_000),
        max_fee_per_gas: Some(U256::from(30_000_000_000u64)),
        max_priority_fee_per_gas: Some(U256::from(1_500_000_000u64)),
        to: Some(accounts[2].address()),
        authorization_list: Some(vec![authorization]),
        ..Default::default()
    };
    let signed = sender.sign_transaction(&delegation).unwrap();
    assert_eq!(signed.transaction_type, TransactionType::Eip7702);
    assert!(signed.to_hex().starts_with("0x04"));
    assert_eq!(
        tessera_core::recover_authorization_address(&authorization).unwrap(),
        accounts[2].address()
    );

    // ==========================================
    // STEP 5: Off-chain signatures
    // ==========================================
    let message = SignableMessage::from("Sign in to Tessera");
    let signature = accounts[1].sign_message(&message).unwrap();
    assert_eq!(
        recover_message_address(&message, &signature).unwrap(),
        accounts[1].address()
    );

    let data = permit(accounts[1].address(), accounts[2].address());
    let signature = accounts[1].sign_typed_data(&data).unwrap();
    assert_eq!(signature.v(), 27 + signature.recovery_id);
    assert_eq!(
        recover_address(&hash_typed_data(&data).unwrap(), &signature).unwrap(),
        accounts[1].address()
    );
}

/// A watch-only tree imported from an account-level xpub sees the same addresses
#[test]
fn test_watch_only_import() {
    let root = root();
    let branch = root
        .derive_path(&"m/44'/60'/0'/0".parse().unwrap())
        .unwrap();

    let watch_only = KeyTreeNode::from_extended_key(&branch.to_xpub()).unwrap();
    assert!(!watch_only.has_private_key());

    for i in 0..4u32 {
        let account =
            hd_key_to_account(&root, &DerivationOptions::with_address_index(i)).unwrap();
        let watched = watch_only.derive_child(i).unwrap();
        assert_eq!(address_of(&watched), account.address());
    }

    // Watch-only nodes cannot become accounts
    assert!(matches!(
        HdAccount::from_node(watch_only.derive_child(0).unwrap()),
        Err(Error::InvalidKey(_))
    ));
}

/// Input errors are reported with the right kind and never partially succeed
#[test]
fn test_error_taxonomy() {
    let root = root();

    let bad_path = hd_key_to_account(&root, &DerivationOptions::with_path("m/44'/60'/0'/0/x"));
    assert!(matches!(bad_path, Err(Error::InvalidPath(_))));

    let short_seed = HdAccount::from_seed(&[1u8; 8], &DerivationOptions::default());
    assert!(matches!(short_seed, Err(Error::InvalidSeed(_))));

    let account = hd_key_to_account(&root, &DerivationOptions::default()).unwrap();

    let untyped = TransactionRequest {
        chain_id: Some(1),
        to: Some(Address::ZERO),
        ..Default::default()
    };
    assert!(matches!(
        account.sign_transaction(&untyped),
        Err(Error::UnsupportedTransactionType(_))
    ));

    let mut data = permit(account.address(), Address::ZERO);
    data.message["value"] = json!("-1");
    let err = account.sign_typed_data(&data).unwrap_err();
    assert!(matches!(err, Error::InvalidTypedData(_)));
    assert!(err.is_input_error());
}

/// Deriving the same index twice gives equal, independent accounts
#[test]
fn test_derivation_idempotent() {
    let root = root();
    let opts = DerivationOptions {
        account_index: 1,
        change_index: 1,
        address_index: 5,
        path: None,
    };
    let a = hd_key_to_account(&root, &opts).unwrap();
    let b = hd_key_to_account(&root, &opts).unwrap();

    assert_eq!(a, b);
    assert_eq!(a.address(), b.address());
    assert_eq!(a.node(), b.node());
    assert_eq!(a.hd_key(), b.hd_key());

    let message = SignableMessage::from("same");
    assert_eq!(
        a.sign_message(&message).unwrap(),
        b.sign_message(&message).unwrap()
    );
}
