//! Hierarchical Deterministic (HD) key derivation
//!
//! This module implements BIP-32 key trees over secp256k1 and the BIP-44
//! path layout used for Ethereum accounts (`m/44'/60'/account'/change/index`).
//! Every derivation returns a new, independent [`KeyTreeNode`]; nodes hold no
//! reference to their parent.

use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use k256::{
    ecdsa::{SigningKey, VerifyingKey},
    elliptic_curve::PrimeField,
    ProjectivePoint, Scalar,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha512;
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::hash160;
use crate::error::{Error, Result};

type HmacSha512 = Hmac<Sha512>;

/// Offset added to an index to mark it hardened
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// Accepted seed length range in bytes (128 to 512 bits)
pub const MIN_SEED_LEN: usize = 16;
pub const MAX_SEED_LEN: usize = 64;

/// BIP-44 purpose and the registered Ethereum coin type
pub const BIP44_PURPOSE: u32 = 44;
pub const ETHEREUM_COIN_TYPE: u32 = 60;

const MASTER_HMAC_KEY: &[u8] = b"Bitcoin seed";
const XPRV_VERSION: u32 = 0x0488_ADE4;
const XPUB_VERSION: u32 = 0x0488_B21E;
const EXTENDED_KEY_LEN: usize = 78;

/// HD derivation path component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathComponent {
    /// Index value (always below 2^31)
    pub index: u32,
    /// Whether this is a hardened derivation
    pub hardened: bool,
}

impl PathComponent {
    pub fn new(index: u32, hardened: bool) -> Result<Self> {
        if index >= HARDENED_OFFSET {
            return Err(Error::InvalidPath(format!(
                "index {} is out of range (must be below 2^31)",
                index
            )));
        }
        Ok(Self { index, hardened })
    }

    /// Create a normal (non-hardened) component
    pub fn normal(index: u32) -> Result<Self> {
        Self::new(index, false)
    }

    /// Create a hardened component
    pub fn hardened(index: u32) -> Result<Self> {
        Self::new(index, true)
    }

    /// Decode a raw child number (hardened bit included)
    pub fn from_value(value: u32) -> Self {
        Self {
            index: value & !HARDENED_OFFSET,
            hardened: value & HARDENED_OFFSET != 0,
        }
    }

    /// Get the value to use in derivation (adds 2^31 for hardened)
    pub fn value(&self) -> u32 {
        if self.hardened {
            self.index | HARDENED_OFFSET
        } else {
            self.index
        }
    }
}

impl fmt::Display for PathComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hardened {
            write!(f, "{}'", self.index)
        } else {
            write!(f, "{}", self.index)
        }
    }
}

/// HD derivation path (e.g., m/44'/60'/0'/0/0)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DerivationPath {
    components: Vec<PathComponent>,
}

impl DerivationPath {
    pub fn new(components: Vec<PathComponent>) -> Self {
        Self { components }
    }

    /// The empty path `m`
    pub fn root() -> Self {
        Self::default()
    }

    /// Standard Ethereum path: m/44'/60'/account'/change/address
    pub fn bip44(account_index: u32, change_index: u32, address_index: u32) -> Result<Self> {
        Ok(Self {
            components: vec![
                PathComponent::hardened(BIP44_PURPOSE)?,
                PathComponent::hardened(ETHEREUM_COIN_TYPE)?,
                PathComponent::hardened(account_index)?,
                PathComponent::normal(change_index)?,
                PathComponent::normal(address_index)?,
            ],
        })
    }

    pub fn components(&self) -> &[PathComponent] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl FromStr for DerivationPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('/');
        match parts.next() {
            Some("m") | Some("M") => {}
            _ => {
                return Err(Error::InvalidPath(format!(
                    "path must start with \"m\": {}",
                    s
                )))
            }
        }

        let mut components = Vec::new();
        for part in parts {
            let (digits, hardened) = match part.strip_suffix(|c: char| matches!(c, '\'' | 'h' | 'H')) {
                Some(digits) => (digits, true),
                None => (part, false),
            };

            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::InvalidPath(format!(
                    "invalid segment {:?} in {}",
                    part, s
                )));
            }

            let index: u32 = digits
                .parse()
                .map_err(|_| Error::InvalidPath(format!("index {} is out of range", digits)))?;
            components.push(PathComponent::new(index, hardened)?);
        }

        Ok(Self { components })
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl Serialize for DerivationPath {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DerivationPath {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One node of a BIP-32 key tree.
///
/// Nodes derived from a seed carry a private key; nodes imported from an
/// `xpub` are public-only and can only derive non-hardened children.
#[derive(Clone)]
pub struct KeyTreeNode {
    depth: u8,
    child_number: u32,
    chain_code: [u8; 32],
    parent_fingerprint: [u8; 4],
    private_key: Option<SigningKey>,
    public_key: VerifyingKey,
}

impl KeyTreeNode {
    /// Compute the master node for `seed`
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        if !(MIN_SEED_LEN..=MAX_SEED_LEN).contains(&seed.len()) {
            return Err(Error::InvalidSeed(format!(
                "seed must be between {} and {} bytes, got {}",
                MIN_SEED_LEN,
                MAX_SEED_LEN,
                seed.len()
            )));
        }

        let mut mac = HmacSha512::new_from_slice(MASTER_HMAC_KEY)
            .map_err(|e| Error::Crypto(format!("HMAC initialization failed: {}", e)))?;
        mac.update(seed);
        let (secret, chain_code) = split_hmac(&mac.finalize().into_bytes());

        let private_key = SigningKey::from_bytes(&(*secret).into())
            .map_err(|_| Error::InvalidSeed("seed yields an invalid master key".to_string()))?;
        let public_key = VerifyingKey::from(&private_key);

        Ok(Self {
            depth: 0,
            child_number: 0,
            chain_code,
            parent_fingerprint: [0u8; 4],
            private_key: Some(private_key),
            public_key,
        })
    }

    /// Import an `xprv` or `xpub` string
    pub fn from_extended_key(encoded: &str) -> Result<Self> {
        let data = Zeroizing::new(
            bs58::decode(encoded)
                .with_check(None)
                .into_vec()
                .map_err(|e| Error::InvalidKey(format!("invalid base58check: {}", e)))?,
        );
        if data.len() != EXTENDED_KEY_LEN {
            return Err(Error::InvalidKey(format!(
                "extended key must be {} bytes, got {}",
                EXTENDED_KEY_LEN,
                data.len()
            )));
        }

        let version = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let depth = data[4];
        let mut parent_fingerprint = [0u8; 4];
        parent_fingerprint.copy_from_slice(&data[5..9]);
        let child_number = u32::from_be_bytes([data[9], data[10], data[11], data[12]]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&data[13..45]);

        if depth == 0 && (parent_fingerprint != [0u8; 4] || child_number != 0) {
            return Err(Error::InvalidKey(
                "root key with non-zero parent fingerprint or index".to_string(),
            ));
        }

        let (private_key, public_key) = match version {
            XPRV_VERSION => {
                if data[45] != 0 {
                    return Err(Error::InvalidKey(
                        "private key data must start with 0x00".to_string(),
                    ));
                }
                let key = SigningKey::from_slice(&data[46..78])
                    .map_err(|_| Error::InvalidKey("invalid private key".to_string()))?;
                let public = VerifyingKey::from(&key);
                (Some(key), public)
            }
            XPUB_VERSION => {
                let public = VerifyingKey::from_sec1_bytes(&data[45..78])
                    .map_err(|_| Error::InvalidKey("invalid public key".to_string()))?;
                (None, public)
            }
            other => {
                return Err(Error::InvalidKey(format!(
                    "unknown extended key version 0x{:08x}",
                    other
                )))
            }
        };

        Ok(Self {
            depth,
            child_number,
            chain_code,
            parent_fingerprint,
            private_key,
            public_key,
        })
    }

    /// Derive a single child (CKDpriv, or CKDpub for public-only nodes).
    /// `index` includes the hardened bit.
    pub fn derive_child(&self, index: u32) -> Result<Self> {
        let hardened = index & HARDENED_OFFSET != 0;
        let depth = self
            .depth
            .checked_add(1)
            .ok_or_else(|| Error::InvalidPath("maximum tree depth exceeded".to_string()))?;

        let mut mac = HmacSha512::new_from_slice(&self.chain_code)
            .map_err(|e| Error::Crypto(format!("HMAC initialization failed: {}", e)))?;
        if hardened {
            // 0x00 || ser256(k_par) || ser32(i)
            let parent = self.private_key.as_ref().ok_or_else(|| {
                Error::InvalidKey("cannot derive a hardened child from a public-only node".to_string())
            })?;
            let mut secret = Zeroizing::new([0u8; 32]);
            secret.copy_from_slice(&parent.to_bytes());
            mac.update(&[0u8]);
            mac.update(secret.as_slice());
        } else {
            // serP(K_par) || ser32(i)
            mac.update(&self.public_key_bytes());
        }
        mac.update(&index.to_be_bytes());
        let (tweak_bytes, chain_code) = split_hmac(&mac.finalize().into_bytes());

        let tweak = Option::<Scalar>::from(Scalar::from_repr((*tweak_bytes).into()))
            .ok_or_else(|| Error::Crypto(format!("invalid child at index {}", index)))?;

        let (private_key, public_key) = match &self.private_key {
            Some(parent) => {
                let child = tweak + parent.as_nonzero_scalar().as_ref();
                let key = SigningKey::from_bytes(&child.to_bytes())
                    .map_err(|_| Error::Crypto(format!("invalid child at index {}", index)))?;
                let public = VerifyingKey::from(&key);
                (Some(key), public)
            }
            None => {
                let point = ProjectivePoint::GENERATOR * tweak
                    + ProjectivePoint::from(*self.public_key.as_affine());
                let public = VerifyingKey::from_affine(point.to_affine())
                    .map_err(|_| Error::Crypto(format!("invalid child at index {}", index)))?;
                (None, public)
            }
        };

        Ok(Self {
            depth,
            child_number: index,
            chain_code,
            parent_fingerprint: self.fingerprint(),
            private_key,
            public_key,
        })
    }

    /// Walk every component of `path` starting from this node
    pub fn derive_path(&self, path: &DerivationPath) -> Result<Self> {
        path.components()
            .iter()
            .try_fold(self.clone(), |node, component| {
                node.derive_child(component.value())
            })
    }

    /// Copy of this node without the private key
    pub fn neuter(&self) -> Self {
        Self {
            private_key: None,
            ..self.clone()
        }
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Raw child number, hardened bit included
    pub fn child_number(&self) -> u32 {
        self.child_number
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    pub fn parent_fingerprint(&self) -> [u8; 4] {
        self.parent_fingerprint
    }

    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    pub fn public_key(&self) -> &VerifyingKey {
        &self.public_key
    }

    /// Compressed SEC1 public key (33 bytes)
    pub fn public_key_bytes(&self) -> [u8; 33] {
        let point = self.public_key.to_encoded_point(true);
        let mut out = [0u8; 33];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// Uncompressed SEC1 public key (65 bytes, 0x04 prefix)
    pub fn uncompressed_public_key(&self) -> [u8; 65] {
        let point = self.public_key.to_encoded_point(false);
        let mut out = [0u8; 65];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// First four bytes of HASH160 of the compressed public key
    pub fn fingerprint(&self) -> [u8; 4] {
        let hash = hash160(&self.public_key_bytes());
        [hash[0], hash[1], hash[2], hash[3]]
    }

    pub(crate) fn signing_key(&self) -> Result<&SigningKey> {
        self.private_key
            .as_ref()
            .ok_or_else(|| Error::InvalidKey("node has no private key".to_string()))
    }

    /// Base58Check `xprv` serialization
    pub fn to_xpriv(&self) -> Result<String> {
        let key = self.signing_key()?;
        let mut key_data = Zeroizing::new([0u8; 33]);
        key_data[1..].copy_from_slice(&key.to_bytes());
        Ok(self.encode_extended(XPRV_VERSION, &key_data))
    }

    /// Base58Check `xpub` serialization
    pub fn to_xpub(&self) -> String {
        self.encode_extended(XPUB_VERSION, &self.public_key_bytes())
    }

    fn encode_extended(&self, version: u32, key_data: &[u8; 33]) -> String {
        let mut payload = Zeroizing::new([0u8; EXTENDED_KEY_LEN]);
        payload[..4].copy_from_slice(&version.to_be_bytes());
        payload[4] = self.depth;
        payload[5..9].copy_from_slice(&self.parent_fingerprint);
        payload[9..13].copy_from_slice(&self.child_number.to_be_bytes());
        payload[13..45].copy_from_slice(&self.chain_code);
        payload[45..].copy_from_slice(key_data);
        bs58::encode(payload.as_slice()).with_check().into_string()
    }
}

impl PartialEq for KeyTreeNode {
    fn eq(&self, other: &Self) -> bool {
        let secret_eq = match (&self.private_key, &other.private_key) {
            (Some(a), Some(b)) => a.to_bytes() == b.to_bytes(),
            (None, None) => true,
            _ => false,
        };
        secret_eq
            && self.depth == other.depth
            && self.child_number == other.child_number
            && self.chain_code == other.chain_code
            && self.parent_fingerprint == other.parent_fingerprint
            && self.public_key == other.public_key
    }
}

impl Eq for KeyTreeNode {}

impl fmt::Debug for KeyTreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyTreeNode")
            .field("depth", &self.depth)
            .field("child_number", &PathComponent::from_value(self.child_number))
            .field("parent_fingerprint", &hex::encode(self.parent_fingerprint))
            .field("public_key", &hex::encode(self.public_key_bytes()))
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Derive the node at `path` from `seed`
pub fn derive(seed: &[u8], path: &DerivationPath) -> Result<KeyTreeNode> {
    let node = KeyTreeNode::from_seed(seed)?.derive_path(path)?;
    debug!(path = %path, depth = node.depth(), "derived key-tree node");
    Ok(node)
}

/// Split an HMAC-SHA512 output into (IL, IR)
fn split_hmac(output: &[u8]) -> (Zeroizing<[u8; 32]>, [u8; 32]) {
    let mut left = Zeroizing::new([0u8; 32]);
    let mut right = [0u8; 32];
    left.copy_from_slice(&output[..32]);
    right.copy_from_slice(&output[32..64]);
    (left, right)
}
