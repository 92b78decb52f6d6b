//! EIP-191 personal message signing

use k256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crypto::{keccak256_multi, recover_address, sign_hash};
use crate::error::Result;
use crate::types::{Address, Bytes, Signature, B256};

const MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// A message to sign: UTF-8 text, or raw bytes given as `{ "raw": "0x.." }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignableMessage {
    Text(String),
    Raw { raw: Bytes },
}

impl SignableMessage {
    pub fn raw(bytes: impl Into<Vec<u8>>) -> Self {
        SignableMessage::Raw {
            raw: Bytes(bytes.into()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            SignableMessage::Text(text) => text.as_bytes(),
            SignableMessage::Raw { raw } => raw.as_ref(),
        }
    }
}

impl From<&str> for SignableMessage {
    fn from(text: &str) -> Self {
        SignableMessage::Text(text.to_string())
    }
}

impl From<String> for SignableMessage {
    fn from(text: String) -> Self {
        SignableMessage::Text(text)
    }
}

/// keccak256("\x19Ethereum Signed Message:\n" ++ len ++ message)
pub fn hash_message(message: &SignableMessage) -> B256 {
    let bytes = message.as_bytes();
    let len = bytes.len().to_string();
    B256(keccak256_multi(&[
        MESSAGE_PREFIX.as_bytes(),
        len.as_bytes(),
        bytes,
    ]))
}

pub fn sign_message(key: &SigningKey, message: &SignableMessage) -> Result<Signature> {
    let digest = hash_message(message);
    debug!(len = message.as_bytes().len(), "signing personal message");
    sign_hash(key, &digest)
}

pub fn recover_message_address(message: &SignableMessage, signature: &Signature) -> Result<Address> {
    recover_address(&hash_message(message), signature)
}

pub fn verify_message(address: &Address, message: &SignableMessage, signature: &Signature) -> bool {
    recover_message_address(message, signature)
        .map(|recovered| &recovered == address)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::public_key_to_address;

    #[test]
    fn test_hash_hello_world() {
        assert_eq!(
            hash_message(&"hello world".into()).to_hex(),
            "0xd9eba16ed0ecae432b71fe008c98cc872bb4cc214d3220a36f365326cf807d68"
        );
    }

    #[test]
    fn test_raw_and_text_agree() {
        let text = SignableMessage::from("hello world");
        let raw = SignableMessage::raw(b"hello world".to_vec());
        assert_eq!(hash_message(&text), hash_message(&raw));
    }

    #[test]
    fn test_deserialize_forms() {
        let text: SignableMessage = serde_json::from_str(r#""hi""#).unwrap();
        assert_eq!(text, SignableMessage::Text("hi".to_string()));

        let raw: SignableMessage = serde_json::from_str(r#"{"raw": "0x6869"}"#).unwrap();
        assert_eq!(raw, SignableMessage::raw(b"hi".to_vec()));
    }

    #[test]
    fn test_sign_and_verify() {
        let key = SigningKey::from_bytes(&[0x46u8; 32].into()).unwrap();
        let address = public_key_to_address(key.verifying_key());
        let message = SignableMessage::from("tessera");

        let sig = sign_message(&key, &message).unwrap();
        assert!(sig.v() == 27 || sig.v() == 28);
        assert!(verify_message(&address, &message, &sig));
        assert!(!verify_message(&address, &"other".into(), &sig));
    }
}
