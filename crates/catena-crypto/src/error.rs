use std::{error, fmt};

/// Errors raised while hashing, signing, or encoding keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// A Base58Check string did not decode to valid base58.
    InvalidBase58,
    /// A Base58Check payload was shorter than version byte + checksum.
    PayloadTooShort,
    /// The trailing 4-byte checksum did not match the payload.
    ChecksumMismatch,
    /// The version byte did not match what the caller expected.
    WrongVersion { expected: u8, found: u8 },
    /// The decoded payload was not the expected length for the key type.
    WrongLength { expected: usize, found: usize },
    /// The Ed25519 library rejected the key or signature bytes.
    MalformedKey,
    /// Signature verification failed.
    SignatureInvalid,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CryptoError::InvalidBase58 => write!(f, "invalid base58 string"),
            CryptoError::PayloadTooShort => write!(f, "base58check payload too short"),
            CryptoError::ChecksumMismatch => write!(f, "base58check checksum mismatch"),
            CryptoError::WrongVersion { expected, found } => write!(
                f,
                "base58check version byte mismatch: expected {expected}, found {found}"
            ),
            CryptoError::WrongLength { expected, found } => write!(
                f,
                "wrong key length: expected {expected} bytes, found {found}"
            ),
            CryptoError::MalformedKey => write!(f, "malformed key bytes"),
            CryptoError::SignatureInvalid => write!(f, "signature verification failed"),
        }
    }
}

impl error::Error for CryptoError {}
