//! Identity resolution: public key to address, extended-key export

use k256::ecdsa::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::crypto::keccak256;
use crate::error::Result;
use crate::hd::KeyTreeNode;
use crate::types::Address;

/// Extended key pair exported from a key-tree node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HdKey {
    pub xpriv: String,
    pub xpub: String,
}

/// Last 20 bytes of Keccak-256 over the 64-byte uncompressed coordinates
pub fn public_key_to_address(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 SEC1 tag
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    Address(out)
}

pub fn address_of(node: &KeyTreeNode) -> Address {
    public_key_to_address(node.public_key())
}

/// Export both extended keys; fails for public-only nodes
pub fn export_keys(node: &KeyTreeNode) -> Result<HdKey> {
    Ok(HdKey {
        xpriv: node.to_xpriv()?,
        xpub: node.to_xpub(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use k256::ecdsa::SigningKey;

    #[test]
    fn test_known_private_key_address() {
        let key = SigningKey::from_slice(
            &hex::decode("ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80")
                .unwrap(),
        )
        .unwrap();
        assert_eq!(
            public_key_to_address(key.verifying_key()).to_checksum(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
    }

    #[test]
    fn test_eip155_key_address() {
        let key = SigningKey::from_bytes(&[0x46u8; 32].into()).unwrap();
        assert_eq!(
            public_key_to_address(key.verifying_key()).to_string(),
            "0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F"
        );
    }

    #[test]
    fn test_export_requires_private_key() {
        let node = KeyTreeNode::from_seed(&[7u8; 32]).unwrap();
        let exported = export_keys(&node).unwrap();
        assert!(exported.xpriv.starts_with("xprv"));
        assert!(exported.xpub.starts_with("xpub"));

        assert!(matches!(
            export_keys(&node.neuter()),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_public_only_node_has_same_address() {
        let node = KeyTreeNode::from_seed(&[7u8; 32]).unwrap();
        assert_eq!(address_of(&node), address_of(&node.neuter()));
    }
}
