//! Core newtypes shared by the derivation and signing modules

use std::fmt;
use std::str::FromStr;

use alloy_rlp::{BufMut, Encodable};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::keccak256;
use crate::error::{Error, Result};

pub use alloy_primitives::U256;

/// secp256k1 group order / 2 (big-endian)
const HALF_ORDER: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D, 0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B, 0x20, 0xA0,
];

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// 20-byte account address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 20] = bytes.try_into().map_err(|_| {
            Error::InvalidAddress(format!("expected 20 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// EIP-55 mixed-case checksum encoding
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = keccak256(lower.as_bytes());

        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let nibble = if i % 2 == 0 {
                hash[i / 2] >> 4
            } else {
                hash[i / 2] & 0x0f
            };
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let body = s
            .strip_prefix("0x")
            .ok_or_else(|| Error::InvalidAddress(format!("missing 0x prefix: {}", s)))?;
        if body.len() != 40 {
            return Err(Error::InvalidAddress(format!(
                "expected 40 hex characters, got {}",
                body.len()
            )));
        }

        let mut bytes = [0u8; 20];
        hex::decode_to_slice(body, &mut bytes)
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", s, e)))?;
        let address = Self(bytes);

        let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
        if has_lower && has_upper && address.to_checksum() != s {
            return Err(Error::InvalidAddress(format!("bad checksum: {}", s)));
        }

        Ok(address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_checksum())
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Encodable for Address {
    fn encode(&self, out: &mut dyn BufMut) {
        self.0.encode(out)
    }

    fn length(&self) -> usize {
        self.0.length()
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_checksum())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// 32-byte hash or word
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct B256(pub [u8; 32]);

impl B256 {
    pub const ZERO: B256 = B256([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(strip_0x(s), &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for B256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for B256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B256({})", self.to_hex())
    }
}

impl AsRef<[u8]> for B256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for B256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Encodable for B256 {
    fn encode(&self, out: &mut dyn BufMut) {
        self.0.encode(out)
    }

    fn length(&self) -> usize {
        self.0.length()
    }
}

impl Serialize for B256 {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for B256 {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Arbitrary-length byte string, hex encoded with a 0x prefix
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Self(hex::decode(strip_0x(s))?))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bytes({})", self.to_hex())
    }
}

impl AsRef<[u8]> for Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Encodable for Bytes {
    fn encode(&self, out: &mut dyn BufMut) {
        self.0.as_slice().encode(out)
    }

    fn length(&self) -> usize {
        self.0.as_slice().length()
    }
}

impl Serialize for Bytes {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Recoverable ECDSA signature (r || s || recovery id)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    /// 0 or 1 (parity of the nonce point's y coordinate)
    pub recovery_id: u8,
}

impl Signature {
    pub fn new(r: [u8; 32], s: [u8; 32], recovery_id: u8) -> Self {
        Self { r, s, recovery_id }
    }

    pub fn y_parity(&self) -> u8 {
        self.recovery_id
    }

    /// `v` as used by message and typed-data signatures
    pub fn v(&self) -> u8 {
        27 + self.recovery_id
    }

    /// EIP-155 `v` for legacy transactions (`27 + rid` without a chain id).
    /// Widened so any `u64` chain id fits.
    pub fn legacy_v(&self, chain_id: Option<u64>) -> u128 {
        let rid = u128::from(self.recovery_id);
        match chain_id {
            Some(id) => u128::from(id) * 2 + 35 + rid,
            None => 27 + rid,
        }
    }

    pub fn r_word(&self) -> U256 {
        U256::from_be_bytes(self.r)
    }

    pub fn s_word(&self) -> U256 {
        U256::from_be_bytes(self.s)
    }

    /// 65 bytes: r || s || (27 + recovery id)
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v();
        out
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    /// Parse 65 bytes; the trailing byte may be a raw recovery id (0/1) or 27/28
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 65 {
            return Err(Error::Encoding(format!(
                "signature must be 65 bytes, got {}",
                bytes.len()
            )));
        }
        let recovery_id = match bytes[64] {
            0 | 27 => 0,
            1 | 28 => 1,
            v => return Err(Error::Encoding(format!("invalid recovery byte: {}", v))),
        };
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Self { r, s, recovery_id })
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(strip_0x(s))?;
        Self::from_bytes(&bytes)
    }

    /// Whether `s` is in the lower half of the curve order
    pub fn is_low_s(&self) -> bool {
        self.s.as_slice() <= HALF_ORDER.as_slice()
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Parse a JSON-RPC style quantity: decimal digits or 0x-prefixed hex, up to 2^256 - 1
pub fn parse_quantity(s: &str) -> Result<U256> {
    let s = s.trim();
    if let Some(hex_digits) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if hex_digits.is_empty() {
            return Ok(U256::ZERO);
        }
        U256::from_str_radix(hex_digits, 16)
            .map_err(|e| Error::Encoding(format!("invalid hex quantity {}: {}", s, e)))
    } else if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        Err(Error::Encoding(format!("invalid quantity {:?}", s)))
    } else {
        U256::from_str_radix(s, 10)
            .map_err(|e| Error::Encoding(format!("invalid quantity {}: {}", s, e)))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QuantityRepr {
    Num(u64),
    Str(String),
}

impl QuantityRepr {
    pub(crate) fn into_u256(self) -> Result<U256> {
        match self {
            QuantityRepr::Num(n) => Ok(U256::from(n)),
            QuantityRepr::Str(s) => parse_quantity(&s),
        }
    }
}

/// Serde helper for quantities encoded as numbers, decimal strings or 0x hex
pub mod quantity {
    use super::{QuantityRepr, U256};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Copy,
        U256: alloy_primitives::ruint::UintTryFrom<T>,
    {
        let v: U256 = U256::from(*value);
        serializer.serialize_str(&format!("0x{:x}", v))
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<U256>,
    {
        let v = QuantityRepr::deserialize(deserializer)?
            .into_u256()
            .map_err(serde::de::Error::custom)?;
        T::try_from(v).map_err(|_| serde::de::Error::custom("quantity out of range"))
    }
}

/// Serde helper for optional quantities
pub mod opt_quantity {
    use super::{QuantityRepr, U256};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Copy,
        U256: alloy_primitives::ruint::UintTryFrom<T>,
    {
        match value {
            Some(v) => super::quantity::serialize(v, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<U256>,
    {
        match Option::<QuantityRepr>::deserialize(deserializer)? {
            Some(repr) => {
                let v = repr.into_u256().map_err(serde::de::Error::custom)?;
                T::try_from(v)
                    .map(Some)
                    .map_err(|_| serde::de::Error::custom("quantity out of range"))
            }
            None => Ok(None),
        }
    }
}
