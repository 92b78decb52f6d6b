//! Tessera Core - HD account derivation and Ethereum signing engine
//!
//! This crate derives deterministic secp256k1 accounts from a master seed
//! (BIP-32 key trees, BIP-44 paths) and signs messages, transactions,
//! EIP-712 typed data and EIP-7702 authorizations with them.

pub mod account;
pub mod address;
pub mod authorization;
pub mod config;
pub mod crypto;
pub mod error;
pub mod hd;
pub mod message;
pub mod nonce;
pub mod transaction;
pub mod typed_data;
pub mod types;

pub use account::{hd_key_to_account, AccountSigner, HdAccount};
pub use address::{address_of, export_keys, public_key_to_address, HdKey};
pub use authorization::{
    recover_authorization_address, sign_authorization, Authorization, SignedAuthorization,
};
pub use config::DerivationOptions;
pub use crypto::{keccak256, recover_address, sign_hash, verify_hash};
pub use error::{Error, Result};
pub use hd::{derive, DerivationPath, KeyTreeNode, PathComponent, HARDENED_OFFSET};
pub use message::{hash_message, sign_message, verify_message, SignableMessage};
pub use nonce::NonceManager;
pub use transaction::{
    sign_transaction, AccessListItem, SignedTransaction, TransactionRequest, TransactionType,
};
pub use typed_data::{hash_typed_data, sign_typed_data, TypedData, TypedField};
pub use types::{Address, Bytes, Signature, B256, U256};

/// Default BIP-44 path of the first Ethereum account
pub const DEFAULT_PATH: &str = "m/44'/60'/0'/0/0";
