//! Hash functions and the shared recoverable ECDSA primitive

use k256::ecdsa::{RecoveryId, Signature as K256Signature, SigningKey, VerifyingKey};
use ripemd::Ripemd160;
use sha2::Sha256;
use sha3::{Digest, Keccak256};

use crate::address::public_key_to_address;
use crate::error::{Error, Result};
use crate::types::{Address, B256, Signature};

/// Keccak-256 (the pre-standard SHA-3 variant used by Ethereum)
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Keccak-256 over several concatenated parts
pub fn keccak256_multi(data: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for d in data {
        hasher.update(d);
    }
    hasher.finalize().into()
}

/// RIPEMD160(SHA256(data))
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    Ripemd160::digest(sha).into()
}

/// Sign a 32-byte digest, returning a low-s signature with its recovery id.
///
/// Signing is RFC 6979 deterministic, so the same key and digest always
/// produce the same signature.
pub fn sign_hash(key: &SigningKey, digest: &B256) -> Result<Signature> {
    let (sig, recid) = key.sign_prehash_recoverable(digest.as_bytes())?;

    // Normalize s to low-S form; negating s mirrors the nonce point
    let (sig, recid) = match sig.normalize_s() {
        Some(normalized) => (
            normalized,
            RecoveryId::new(!recid.is_y_odd(), recid.is_x_reduced()),
        ),
        None => (sig, recid),
    };

    if recid.is_x_reduced() {
        return Err(Error::Crypto(
            "nonce point x-coordinate exceeds the curve order".to_string(),
        ));
    }

    let bytes = sig.to_bytes();
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&bytes[..32]);
    s.copy_from_slice(&bytes[32..]);

    Ok(Signature::new(r, s, recid.is_y_odd() as u8))
}

/// Recover the verifying key that produced `signature` over `digest`
pub fn recover_public_key(digest: &B256, signature: &Signature) -> Result<VerifyingKey> {
    let mut rs = [0u8; 64];
    rs[..32].copy_from_slice(&signature.r);
    rs[32..].copy_from_slice(&signature.s);

    let sig = K256Signature::from_slice(&rs)
        .map_err(|e| Error::Crypto(format!("Invalid signature format: {}", e)))?;
    let recid = RecoveryId::from_byte(signature.recovery_id)
        .ok_or_else(|| Error::Crypto(format!("Invalid recovery id: {}", signature.recovery_id)))?;

    VerifyingKey::recover_from_prehash(digest.as_bytes(), &sig, recid)
        .map_err(|e| Error::Crypto(format!("Recovery failed: {}", e)))
}

/// Recover the signer address from a digest and signature
pub fn recover_address(digest: &B256, signature: &Signature) -> Result<Address> {
    let key = recover_public_key(digest, signature)?;
    Ok(public_key_to_address(&key))
}

/// Check that `signature` over `digest` was produced by `address`
pub fn verify_hash(address: &Address, digest: &B256, signature: &Signature) -> bool {
    recover_address(digest, signature)
        .map(|recovered| &recovered == address)
        .unwrap_or(false)
}
