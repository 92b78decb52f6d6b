//! Account façade over a derived key-tree node
//!
//! An [`HdAccount`] binds one key-tree node to its address and extended-key
//! export, and exposes every signing capability of the engine through the
//! [`AccountSigner`] trait. Accounts are immutable: deriving a different
//! index produces a new, independent account.

use std::fmt;
use std::sync::Arc;

use k256::ecdsa::VerifyingKey;
use tracing::debug;

use crate::address::{address_of, export_keys, HdKey};
use crate::authorization::{self, Authorization, SignedAuthorization};
use crate::config::DerivationOptions;
use crate::crypto::sign_hash;
use crate::error::Result;
use crate::hd::{derive, DerivationPath, KeyTreeNode};
use crate::message::{self, SignableMessage};
use crate::nonce::NonceManager;
use crate::transaction::{self, SignedTransaction, TransactionRequest};
use crate::typed_data::{self, TypedData};
use crate::types::{Address, Signature, B256};

/// Signing capabilities of a local account
pub trait AccountSigner: Send + Sync {
    fn address(&self) -> Address;

    fn public_key(&self) -> &VerifyingKey;

    /// Sign a raw 32-byte digest
    fn sign(&self, hash: &B256) -> Result<Signature>;

    fn sign_message(&self, message: &SignableMessage) -> Result<Signature>;

    fn sign_transaction(&self, tx: &TransactionRequest) -> Result<SignedTransaction>;

    fn sign_typed_data(&self, data: &TypedData) -> Result<Signature>;

    /// Sign an EIP-7702 authorization; with `verify` the signer is recovered
    /// and checked against [`AccountSigner::address`].
    fn sign_authorization(&self, auth: &Authorization, verify: bool)
        -> Result<SignedAuthorization>;

    fn hd_key(&self) -> &HdKey;
}

/// Account derived from an HD key tree
#[derive(Clone)]
pub struct HdAccount {
    node: KeyTreeNode,
    path: Option<DerivationPath>,
    address: Address,
    hd_key: HdKey,
    nonce_manager: Option<Arc<dyn NonceManager>>,
}

impl HdAccount {
    /// Wrap an already-derived, private-bearing node
    pub fn from_node(node: KeyTreeNode) -> Result<Self> {
        Self::build(node, None)
    }

    pub fn from_seed(seed: &[u8], options: &DerivationOptions) -> Result<Self> {
        let path = options.derivation_path()?;
        let node = derive(seed, &path)?;
        Self::build(node, Some(path))
    }

    /// BIP-39 phrase plus optional passphrase
    #[cfg(feature = "mnemonic")]
    pub fn from_mnemonic(
        phrase: &str,
        passphrase: &str,
        options: &DerivationOptions,
    ) -> Result<Self> {
        let mnemonic = bip39::Mnemonic::parse(phrase)
            .map_err(|e| crate::error::Error::InvalidMnemonic(e.to_string()))?;
        let seed = zeroize::Zeroizing::new(mnemonic.to_seed(passphrase));
        Self::from_seed(seed.as_slice(), options)
    }

    fn build(node: KeyTreeNode, path: Option<DerivationPath>) -> Result<Self> {
        let hd_key = export_keys(&node)?;
        let address = address_of(&node);
        debug!(
            address = %address,
            path = %path.as_ref().map(ToString::to_string).unwrap_or_default(),
            "created hd account"
        );
        Ok(Self {
            node,
            path,
            address,
            hd_key,
            nonce_manager: None,
        })
    }

    pub fn with_nonce_manager(mut self, manager: Arc<dyn NonceManager>) -> Self {
        self.nonce_manager = Some(manager);
        self
    }

    pub fn nonce_manager(&self) -> Option<&Arc<dyn NonceManager>> {
        self.nonce_manager.as_ref()
    }

    pub fn node(&self) -> &KeyTreeNode {
        &self.node
    }

    /// Path from the master node, when the account was derived by path
    pub fn path(&self) -> Option<&DerivationPath> {
        self.path.as_ref()
    }
}

impl AccountSigner for HdAccount {
    fn address(&self) -> Address {
        self.address
    }

    fn public_key(&self) -> &VerifyingKey {
        self.node.public_key()
    }

    fn sign(&self, hash: &B256) -> Result<Signature> {
        sign_hash(self.node.signing_key()?, hash)
    }

    fn sign_message(&self, message: &SignableMessage) -> Result<Signature> {
        message::sign_message(self.node.signing_key()?, message)
    }

    fn sign_transaction(&self, tx: &TransactionRequest) -> Result<SignedTransaction> {
        transaction::sign_transaction(self.node.signing_key()?, tx)
    }

    fn sign_typed_data(&self, data: &TypedData) -> Result<Signature> {
        typed_data::sign_typed_data(self.node.signing_key()?, data)
    }

    fn sign_authorization(
        &self,
        auth: &Authorization,
        verify: bool,
    ) -> Result<SignedAuthorization> {
        let expected = verify.then_some(&self.address);
        authorization::sign_authorization(self.node.signing_key()?, auth, expected)
    }

    fn hd_key(&self) -> &HdKey {
        &self.hd_key
    }
}

/// Accounts are equal when they wrap the same node at the same path; the
/// attached nonce manager is not compared.
impl PartialEq for HdAccount {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node && self.path == other.path
    }
}

impl Eq for HdAccount {}

impl fmt::Debug for HdAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HdAccount")
            .field("address", &self.address)
            .field("path", &self.path.as_ref().map(ToString::to_string))
            .field("nonce_manager", &self.nonce_manager.is_some())
            .finish()
    }
}

/// Derive the account at `options` below `root`
pub fn hd_key_to_account(root: &KeyTreeNode, options: &DerivationOptions) -> Result<HdAccount> {
    let path = options.derivation_path()?;
    let node = root.derive_path(&path)?;
    HdAccount::build(node, Some(path))
}
