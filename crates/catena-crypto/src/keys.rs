use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use std::fmt;

use crate::base58check::{base58check_decode, base58check_encode};
use crate::error::CryptoError;
use crate::hash::{sha256, Hash};

/// Base58Check version byte for a public key.
pub const PUBLIC_KEY_VERSION: u8 = 88;
/// Base58Check version byte for a private key.
pub const PRIVATE_KEY_VERSION: u8 = 11;

/// An Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl std::hash::Hash for PublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw().hash(state);
    }
}

/// An Ed25519 signature over a message's canonical signing bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 64]);

/// An Ed25519 private (signing) key. Never serialized to logs or `Debug`.
pub struct PrivateKey(SigningKey);

impl PublicKey {
    pub fn from_raw(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        VerifyingKey::from_bytes(&bytes)
            .map(PublicKey)
            .map_err(|_| CryptoError::MalformedKey)
    }

    pub fn raw(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// SHA-256 of the raw public key bytes — the identity used to key
    /// `_users.counter` and `grants.user`.
    pub fn identity_hash(&self) -> Hash {
        sha256(&self.raw())
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        self.0.verify(message, &sig).is_ok()
    }

    pub fn to_base58check(&self) -> String {
        base58check_encode(PUBLIC_KEY_VERSION, &self.raw())
    }

    pub fn from_base58check(s: &str) -> Result<Self, CryptoError> {
        let payload = base58check_decode(PUBLIC_KEY_VERSION, s)?;
        let bytes: [u8; 32] = payload
            .try_into()
            .map_err(|v: Vec<u8>| CryptoError::WrongLength {
                expected: 32,
                found: v.len(),
            })?;
        Self::from_raw(bytes)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PublicKey({}…)", &hex::encode(self.raw())[..12])
    }
}

impl Signature {
    pub fn from_raw(bytes: [u8; 64]) -> Self {
        Signature(bytes)
    }

    pub fn raw(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    pub fn from_base64(s: &str) -> Result<Self, CryptoError> {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(|_| CryptoError::MalformedKey)?;
        let bytes: [u8; 64] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| CryptoError::WrongLength {
                expected: 64,
                found: v.len(),
            })?;
        Ok(Signature(bytes))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Signature({}…)", &hex::encode(self.0)[..12])
    }
}

impl PrivateKey {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        PrivateKey(SigningKey::generate(&mut csprng))
    }

    pub fn from_raw(bytes: [u8; 32]) -> Self {
        PrivateKey(SigningKey::from_bytes(&bytes))
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.0.sign(message).to_bytes())
    }

    pub fn to_base58check(&self) -> String {
        base58check_encode(PRIVATE_KEY_VERSION, &self.0.to_bytes())
    }

    pub fn from_base58check(s: &str) -> Result<Self, CryptoError> {
        let payload = base58check_decode(PRIVATE_KEY_VERSION, s)?;
        let bytes: [u8; 32] = payload
            .try_into()
            .map_err(|v: Vec<u8>| CryptoError::WrongLength {
                expected: 32,
                found: v.len(),
            })?;
        Ok(Self::from_raw(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let key = PrivateKey::generate();
        let sig = key.sign(b"hello catena");
        assert!(key.public().verify(b"hello catena", &sig));
        assert!(!key.public().verify(b"hello catena!", &sig));
    }

    #[test]
    fn identity_hash_stable() {
        let key = PrivateKey::generate();
        assert_eq!(key.public().identity_hash(), key.public().identity_hash());
    }

    #[test]
    fn public_key_base58check_roundtrip() {
        let key = PrivateKey::generate();
        let encoded = key.public().to_base58check();
        let decoded = PublicKey::from_base58check(&encoded).unwrap();
        assert_eq!(decoded, key.public());
    }
}
