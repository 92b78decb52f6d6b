//! Error types for tessera-core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid seed: {0}")]
    InvalidSeed(String),

    #[error("Invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Unsupported transaction type: {0}")]
    UnsupportedTransactionType(String),

    #[error("Invalid typed data: {0}")]
    InvalidTypedData(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Signature verification failed: {0}")]
    SignatureVerification(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Nonce manager error: {0}")]
    Nonce(String),
}

impl Error {
    /// True when the error was caused by caller-supplied input rather than
    /// a failure inside the signature primitive.
    pub fn is_input_error(&self) -> bool {
        !matches!(
            self,
            Error::Crypto(_) | Error::SignatureVerification(_) | Error::Nonce(_)
        )
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::Encoding(e.to_string())
    }
}

impl From<k256::ecdsa::Error> for Error {
    fn from(e: k256::ecdsa::Error) -> Self {
        Error::Crypto(e.to_string())
    }
}
