use crate::error::CryptoError;
use crate::hash::sha256;

/// Encode `payload` as Base58Check: `version || payload || checksum[0..4]`
/// where `checksum = SHA256(SHA256(version || payload))`, base58-alphabet
/// encoded.
pub fn base58check_encode(version: u8, payload: &[u8]) -> String {
    let mut body = Vec::with_capacity(1 + payload.len() + 4);
    body.push(version);
    body.extend_from_slice(payload);
    let checksum = double_sha256(&body);
    body.extend_from_slice(&checksum[..4]);
    bs58::encode(body).into_string()
}

/// Decode a Base58Check string, verifying the checksum and that the
/// version byte equals `expected_version`. Returns the payload (without
/// version byte or checksum).
pub fn base58check_decode(expected_version: u8, s: &str) -> Result<Vec<u8>, CryptoError> {
    let body = bs58::decode(s)
        .into_vec()
        .map_err(|_| CryptoError::InvalidBase58)?;
    if body.len() < 1 + 4 {
        return Err(CryptoError::PayloadTooShort);
    }
    let (head, checksum) = body.split_at(body.len() - 4);
    let expected_checksum = double_sha256(head);
    if &expected_checksum[..4] != checksum {
        return Err(CryptoError::ChecksumMismatch);
    }
    let version = head[0];
    if version != expected_version {
        return Err(CryptoError::WrongVersion {
            expected: expected_version,
            found: version,
        });
    }
    Ok(head[1..].to_vec())
}

fn double_sha256(data: &[u8]) -> [u8; 32] {
    *sha256(sha256(data).as_bytes()).as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips() {
        let payload = b"catena node identity";
        let encoded = base58check_encode(88, payload);
        let decoded = base58check_decode(88, &encoded).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn rejects_wrong_version() {
        let encoded = base58check_encode(88, b"x");
        assert_eq!(
            base58check_decode(11, &encoded),
            Err(CryptoError::WrongVersion {
                expected: 11,
                found: 88
            })
        );
    }

    #[test]
    fn rejects_corrupted_checksum() {
        let mut encoded = base58check_encode(88, b"payload-bytes").into_bytes();
        let last = encoded.len() - 1;
        encoded[last] = if encoded[last] == b'1' { b'2' } else { b'1' };
        let encoded = String::from_utf8(encoded).unwrap();
        assert!(base58check_decode(88, &encoded).is_err());
    }
}
