// Copyright 2024-2026 Catena developers.
// This file is part of Catena.

// Catena is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Catena is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Catena.  If not, see <http://www.gnu.org/licenses/>.

//! Cryptographic primitives shared by every other Catena crate: the 32-byte
//! hash type used for block/transaction signatures and proof-of-work, the
//! Ed25519 keypair wrapper, and Base58Check encoding for key serialization.

mod base58check;
mod error;
mod hash;
mod keys;

pub use base58check::{base58check_decode, base58check_encode};
pub use error::CryptoError;
pub use hash::{sha256, Hash, HASH_LEN};
pub use keys::{PrivateKey, PublicKey, Signature, PRIVATE_KEY_VERSION, PUBLIC_KEY_VERSION};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_is_deterministic() {
        assert_eq!(sha256(b"catena"), sha256(b"catena"));
        assert_ne!(sha256(b"catena"), sha256(b"catena2"));
    }

    #[test]
    fn keypair_roundtrips_through_base58check() {
        let key = PrivateKey::generate();
        let encoded = key.to_base58check();
        let decoded = PrivateKey::from_base58check(&encoded).unwrap();
        assert_eq!(key.public().raw(), decoded.public().raw());
    }
}
