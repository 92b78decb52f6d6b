//! Transaction serialization and signing
//!
//! Supports legacy (with EIP-155 replay protection) and the typed envelopes
//! EIP-2930 (0x01), EIP-1559 (0x02), EIP-4844 (0x03) and EIP-7702 (0x04).
//! When a request carries no explicit `type`, the envelope is inferred from
//! the fields that are present.

use std::fmt;
use std::str::FromStr;

use alloy_rlp::{Encodable, Header, RlpEncodable};
use k256::ecdsa::SigningKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::authorization::SignedAuthorization;
use crate::crypto::{keccak256, recover_address, sign_hash};
use crate::error::{Error, Result};
use crate::types::{
    opt_quantity, parse_quantity, Address, Bytes, QuantityRepr, Signature, B256, U256,
};

/// Version byte every EIP-4844 versioned hash must start with
pub const BLOB_COMMITMENT_VERSION_KZG: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionType {
    Legacy,
    Eip2930,
    Eip1559,
    Eip4844,
    Eip7702,
}

impl TransactionType {
    pub fn type_byte(&self) -> u8 {
        match self {
            TransactionType::Legacy => 0x00,
            TransactionType::Eip2930 => 0x01,
            TransactionType::Eip1559 => 0x02,
            TransactionType::Eip4844 => 0x03,
            TransactionType::Eip7702 => 0x04,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Legacy => "legacy",
            TransactionType::Eip2930 => "eip2930",
            TransactionType::Eip1559 => "eip1559",
            TransactionType::Eip4844 => "eip4844",
            TransactionType::Eip7702 => "eip7702",
        }
    }

    fn from_type_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(TransactionType::Legacy),
            1 => Some(TransactionType::Eip2930),
            2 => Some(TransactionType::Eip1559),
            3 => Some(TransactionType::Eip4844),
            4 => Some(TransactionType::Eip7702),
            _ => None,
        }
    }
}

impl FromStr for TransactionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let unsupported = || Error::UnsupportedTransactionType(s.to_string());
        match s {
            "legacy" => Ok(TransactionType::Legacy),
            "eip2930" => Ok(TransactionType::Eip2930),
            "eip1559" => Ok(TransactionType::Eip1559),
            "eip4844" => Ok(TransactionType::Eip4844),
            "eip7702" => Ok(TransactionType::Eip7702),
            other if other.starts_with("0x") => parse_quantity(other)
                .ok()
                .and_then(|byte| u8::try_from(byte).ok())
                .and_then(TransactionType::from_type_byte)
                .ok_or_else(unsupported),
            _ => Err(unsupported()),
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TransactionType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TransactionType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// `type` may be given as a name, a hex string or a bare JSON number
fn deserialize_type_tag<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<QuantityRepr>::deserialize(deserializer)?.map(|tag| match tag {
            QuantityRepr::Num(n) => format!("0x{:x}", n),
            QuantityRepr::Str(s) => s,
        }),
    )
}

/// EIP-2930 access list entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, RlpEncodable)]
#[serde(rename_all = "camelCase")]
pub struct AccessListItem {
    pub address: Address,
    #[serde(default)]
    pub storage_keys: Vec<B256>,
}

/// An unsigned transaction as supplied by the caller.
///
/// Absent quantities encode as zero; an absent `to` is contract creation
/// (legacy, 2930 and 1559 only).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    #[serde(
        rename = "type",
        default,
        deserialize_with = "deserialize_type_tag",
        skip_serializing_if = "Option::is_none"
    )]
    pub tx_type: Option<String>,
    #[serde(default, with = "opt_quantity", skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(default, with = "opt_quantity", skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(default, with = "opt_quantity", skip_serializing_if = "Option::is_none")]
    pub gas: Option<u64>,
    #[serde(default, with = "opt_quantity", skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
    #[serde(default, with = "opt_quantity", skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<U256>,
    #[serde(default, with = "opt_quantity", skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<U256>,
    #[serde(default, with = "opt_quantity", skip_serializing_if = "Option::is_none")]
    pub max_fee_per_blob_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(default, with = "opt_quantity", skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(default, alias = "input", skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_list: Option<Vec<AccessListItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_versioned_hashes: Option<Vec<B256>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_list: Option<Vec<SignedAuthorization>>,
}

impl TransactionRequest {
    /// Explicit `type` if present, otherwise inferred from the populated fields
    pub fn transaction_type(&self) -> Result<TransactionType> {
        if let Some(explicit) = &self.tx_type {
            return explicit.parse();
        }

        if self.authorization_list.is_some() {
            Ok(TransactionType::Eip7702)
        } else if self.blob_versioned_hashes.is_some() || self.max_fee_per_blob_gas.is_some() {
            Ok(TransactionType::Eip4844)
        } else if self.max_fee_per_gas.is_some() || self.max_priority_fee_per_gas.is_some() {
            Ok(TransactionType::Eip1559)
        } else if self.gas_price.is_some() {
            if self.access_list.is_some() {
                Ok(TransactionType::Eip2930)
            } else {
                Ok(TransactionType::Legacy)
            }
        } else {
            Err(Error::UnsupportedTransactionType(
                "cannot infer transaction type from the provided fields".to_string(),
            ))
        }
    }

    /// Bytes whose Keccak-256 is signed
    pub fn signing_payload(&self) -> Result<Vec<u8>> {
        self.encode(None)
    }

    pub fn signature_hash(&self) -> Result<B256> {
        Ok(B256(keccak256(&self.signing_payload()?)))
    }

    /// Signed network encoding
    pub fn encode_signed(&self, signature: &Signature) -> Result<Vec<u8>> {
        self.encode(Some(signature))
    }

    fn encode(&self, signature: Option<&Signature>) -> Result<Vec<u8>> {
        let tx_type = self.transaction_type()?;
        if tx_type != TransactionType::Legacy {
            self.validate_typed(tx_type)?;
        }

        let chain_id = self.chain_id.unwrap_or_default();
        let nonce = self.nonce.unwrap_or_default();
        let gas = self.gas.unwrap_or_default();
        let gas_price = self.gas_price.unwrap_or_default();
        let max_fee_per_gas = self.max_fee_per_gas.unwrap_or_default();
        let max_priority_fee_per_gas = self.max_priority_fee_per_gas.unwrap_or_default();
        let max_fee_per_blob_gas = self.max_fee_per_blob_gas.unwrap_or_default();
        let value = self.value.unwrap_or_default();
        // Contract creation encodes an empty recipient
        let to: &[u8] = match &self.to {
            Some(to) => to.as_bytes(),
            None => &[],
        };
        let no_data = Bytes::default();
        let data = self.data.as_ref().unwrap_or(&no_data);
        let no_access = Vec::new();
        let access_list = self.access_list.as_ref().unwrap_or(&no_access);
        let no_blobs = Vec::new();
        let blob_hashes = self.blob_versioned_hashes.as_ref().unwrap_or(&no_blobs);
        let no_auths = Vec::new();
        let authorizations = self.authorization_list.as_ref().unwrap_or(&no_auths);

        let (y_parity, r, s) = match signature {
            Some(sig) => (sig.y_parity(), sig.r_word(), sig.s_word()),
            None => (0, U256::ZERO, U256::ZERO),
        };

        // EIP-155: a zero chain id means no replay protection
        let replay_chain_id = self.chain_id.filter(|id| *id > 0);
        let v = signature
            .map(|sig| sig.legacy_v(replay_chain_id))
            .unwrap_or_default();
        let zero = 0u8;

        let mut fields: Vec<&dyn Encodable> = Vec::with_capacity(14);

        if tx_type == TransactionType::Legacy {
            let call: [&dyn Encodable; 6] = [&nonce, &gas_price, &gas, &to, &value, data];
            fields.extend(call);
            if signature.is_some() {
                let tail: [&dyn Encodable; 3] = [&v, &r, &s];
                fields.extend(tail);
            } else if replay_chain_id.is_some() {
                let tail: [&dyn Encodable; 3] = [&chain_id, &zero, &zero];
                fields.extend(tail);
            }
            return Ok(encode_list(&fields));
        }

        fields.push(&chain_id);
        fields.push(&nonce);
        if tx_type == TransactionType::Eip2930 {
            fields.push(&gas_price);
        } else {
            fields.push(&max_priority_fee_per_gas);
            fields.push(&max_fee_per_gas);
        }
        let call: [&dyn Encodable; 5] = [&gas, &to, &value, data, access_list];
        fields.extend(call);

        match tx_type {
            TransactionType::Eip4844 => {
                fields.push(&max_fee_per_blob_gas);
                fields.push(blob_hashes);
            }
            TransactionType::Eip7702 => fields.push(authorizations),
            _ => {}
        }

        if signature.is_some() {
            let tail: [&dyn Encodable; 3] = [&y_parity, &r, &s];
            fields.extend(tail);
        }

        let mut out = vec![tx_type.type_byte()];
        out.extend_from_slice(&encode_list(&fields));
        Ok(out)
    }

    fn validate_typed(&self, tx_type: TransactionType) -> Result<()> {
        match self.chain_id {
            Some(id) if id > 0 => {}
            _ => {
                return Err(Error::InvalidTransaction(format!(
                    "{} transactions require a non-zero chainId",
                    tx_type
                )))
            }
        }

        if let (Some(max_fee), Some(tip)) = (self.max_fee_per_gas, self.max_priority_fee_per_gas) {
            if tip > max_fee {
                return Err(Error::InvalidTransaction(format!(
                    "maxPriorityFeePerGas ({}) exceeds maxFeePerGas ({})",
                    tip, max_fee
                )));
            }
        }

        match tx_type {
            TransactionType::Eip4844 => {
                if self.to.is_none() {
                    return Err(Error::InvalidTransaction(
                        "eip4844 transactions require a recipient".to_string(),
                    ));
                }
                let hashes = self.blob_versioned_hashes.as_deref().unwrap_or_default();
                if hashes.is_empty() {
                    return Err(Error::InvalidTransaction(
                        "eip4844 transactions require at least one blob versioned hash"
                            .to_string(),
                    ));
                }
                if let Some(bad) = hashes
                    .iter()
                    .find(|h| h.as_bytes()[0] != BLOB_COMMITMENT_VERSION_KZG)
                {
                    return Err(Error::InvalidTransaction(format!(
                        "unsupported blob versioned hash {}",
                        bad
                    )));
                }
            }
            TransactionType::Eip7702 => {
                if self.to.is_none() {
                    return Err(Error::InvalidTransaction(
                        "eip7702 transactions require a recipient".to_string(),
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// RLP list of heterogeneous fields
fn encode_list(fields: &[&dyn Encodable]) -> Vec<u8> {
    let payload_length: usize = fields.iter().map(|field| field.length()).sum();
    let mut out = Vec::with_capacity(payload_length + alloy_rlp::length_of_length(payload_length));
    Header {
        list: true,
        payload_length,
    }
    .encode(&mut out);
    for field in fields {
        field.encode(&mut out);
    }
    out
}

/// A signed transaction ready for submission by an external transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransaction {
    pub raw: Bytes,
    pub hash: B256,
    pub signature: Signature,
    pub transaction_type: TransactionType,
}

impl SignedTransaction {
    pub fn to_hex(&self) -> String {
        self.raw.to_hex()
    }
}

pub fn sign_transaction(key: &SigningKey, tx: &TransactionRequest) -> Result<SignedTransaction> {
    let transaction_type = tx.transaction_type()?;
    let digest = tx.signature_hash()?;
    let signature = sign_hash(key, &digest)?;
    let raw = tx.encode_signed(&signature)?;
    let hash = B256(keccak256(&raw));

    debug!(tx_type = %transaction_type, hash = %hash, "signed transaction");

    Ok(SignedTransaction {
        raw: Bytes(raw),
        hash,
        signature,
        transaction_type,
    })
}

/// Recover the sender of `tx` from its signature
pub fn recover_signer(tx: &TransactionRequest, signature: &Signature) -> Result<Address> {
    recover_address(&tx.signature_hash()?, signature)
}
