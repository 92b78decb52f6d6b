//! EIP-7702 authorization tuples

use alloy_rlp::{BufMut, Encodable, Header, RlpEncodable};
use k256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crypto::{keccak256, recover_address, sign_hash};
use crate::error::{Error, Result};
use crate::types::{quantity, Address, Signature, B256};

const AUTHORIZATION_MAGIC: u8 = 0x05;

/// Delegation of an account's code to `address` on `chain_id` (0 = any chain)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, RlpEncodable)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    #[serde(with = "quantity")]
    pub chain_id: u64,
    pub address: Address,
    #[serde(with = "quantity")]
    pub nonce: u64,
}

impl Authorization {
    /// keccak256(0x05 || rlp([chain_id, address, nonce]))
    pub fn signature_hash(&self) -> B256 {
        let mut payload = Vec::with_capacity(1 + self.length());
        payload.push(AUTHORIZATION_MAGIC);
        self.encode(&mut payload);
        B256(keccak256(&payload))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedAuthorization {
    #[serde(with = "quantity")]
    pub chain_id: u64,
    pub address: Address,
    #[serde(with = "quantity")]
    pub nonce: u64,
    pub r: B256,
    pub s: B256,
    #[serde(with = "quantity")]
    pub y_parity: u8,
}

impl SignedAuthorization {
    pub fn authorization(&self) -> Authorization {
        Authorization {
            chain_id: self.chain_id,
            address: self.address,
            nonce: self.nonce,
        }
    }

    pub fn signature(&self) -> Signature {
        Signature::new(self.r.0, self.s.0, self.y_parity)
    }

    fn payload_length(&self) -> usize {
        let signature = self.signature();
        self.chain_id.length()
            + self.address.length()
            + self.nonce.length()
            + self.y_parity.length()
            + signature.r_word().length()
            + signature.s_word().length()
    }
}

/// rlp([chain_id, address, nonce, y_parity, r, s]) as carried in a 7702 transaction
impl Encodable for SignedAuthorization {
    fn encode(&self, out: &mut dyn BufMut) {
        let signature = self.signature();
        Header {
            list: true,
            payload_length: self.payload_length(),
        }
        .encode(out);
        self.chain_id.encode(out);
        self.address.encode(out);
        self.nonce.encode(out);
        self.y_parity.encode(out);
        signature.r_word().encode(out);
        signature.s_word().encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.payload_length();
        payload_length + alloy_rlp::length_of_length(payload_length)
    }
}

/// Sign an authorization tuple.
///
/// When `expected_signer` is given, the signer is recovered from the new
/// signature and must match.
pub fn sign_authorization(
    key: &SigningKey,
    auth: &Authorization,
    expected_signer: Option<&Address>,
) -> Result<SignedAuthorization> {
    let digest = auth.signature_hash();
    let signature = sign_hash(key, &digest)?;
    debug!(chain_id = auth.chain_id, delegate = %auth.address, "signed authorization");

    if let Some(expected) = expected_signer {
        let recovered = recover_address(&digest, &signature)?;
        if &recovered != expected {
            return Err(Error::SignatureVerification(format!(
                "authorization recovered to {}, expected {}",
                recovered, expected
            )));
        }
    }

    Ok(SignedAuthorization {
        chain_id: auth.chain_id,
        address: auth.address,
        nonce: auth.nonce,
        r: B256(signature.r),
        s: B256(signature.s),
        y_parity: signature.y_parity(),
    })
}

pub fn recover_authorization_address(signed: &SignedAuthorization) -> Result<Address> {
    recover_address(&signed.authorization().signature_hash(), &signed.signature())
}
