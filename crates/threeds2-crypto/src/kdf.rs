//! Concat KDF (NIST SP 800-56A §5.8.1) with SHA-256.
//!
//! ```text
//! K(i) = SHA-256(counter_i || Z || OtherInfo)
//! OtherInfo = AlgorithmID || PartyUInfo || PartyVInfo || SuppPubInfo
//! ```
//!
//! AlgorithmID, PartyUInfo and PartyVInfo are each prefixed with their
//! length as a 32-bit big-endian integer (RFC 7518 §4.6.2). SuppPubInfo is
//! the derived key length in bits, also 32-bit big-endian.

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::CryptoError;

const SHA256_OUTPUT_LENGTH: usize = 32;

/// The OtherInfo inputs to the KDF.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConcatKdfInfo {
    pub algorithm_id: Vec<u8>,
    pub party_u_info: Vec<u8>,
    pub party_v_info: Vec<u8>,
}

impl ConcatKdfInfo {
    pub fn new(
        algorithm_id: impl AsRef<[u8]>,
        party_u_info: impl AsRef<[u8]>,
        party_v_info: impl AsRef<[u8]>,
    ) -> Self {
        Self {
            algorithm_id: algorithm_id.as_ref().to_vec(),
            party_u_info: party_u_info.as_ref().to_vec(),
            party_v_info: party_v_info.as_ref().to_vec(),
        }
    }

    /// Info used to derive the challenge CEK: empty AlgorithmID, the SDK
    /// transaction ID as PartyUInfo and the ACS transaction ID as PartyVInfo.
    pub fn for_challenge(sdk_transaction_id: &str, acs_transaction_id: &str) -> Self {
        Self::new(b"", sdk_transaction_id, acs_transaction_id)
    }

    /// Info used for ECDH-ES device-data encryption towards an EC directory
    /// server key: `enc` as AlgorithmID, the DS identifier as PartyVInfo.
    pub fn for_directory_server(enc: &str, directory_server_id: &str) -> Self {
        Self::new(enc, b"", directory_server_id)
    }

    fn encode(&self, key_len_bits: u32) -> Result<Vec<u8>, CryptoError> {
        let mut other = Vec::with_capacity(
            16 + self.algorithm_id.len() + self.party_u_info.len() + self.party_v_info.len(),
        );
        for field in [&self.algorithm_id, &self.party_u_info, &self.party_v_info] {
            let len = u32::try_from(field.len()).map_err(|_| {
                CryptoError::KeyAgreementFailed("KDF info field too long".to_string())
            })?;
            other.extend_from_slice(&len.to_be_bytes());
            other.extend_from_slice(field);
        }
        other.extend_from_slice(&key_len_bits.to_be_bytes());
        Ok(other)
    }
}

/// Derive `key_len` bytes from the shared secret `z`.
///
/// Runs as many SHA-256 rounds as needed and truncates the final block.
pub fn concat_kdf(
    z: &[u8],
    key_len: usize,
    info: &ConcatKdfInfo,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if key_len == 0 {
        return Err(CryptoError::InvalidKeyLength {
            expected: SHA256_OUTPUT_LENGTH,
            got: 0,
        });
    }
    let key_len_bits = u32::try_from(key_len)
        .ok()
        .and_then(|len| len.checked_mul(8))
        .ok_or_else(|| CryptoError::KeyAgreementFailed("requested key too long".to_string()))?;
    let other_info = info.encode(key_len_bits)?;

    let rounds = key_len.div_ceil(SHA256_OUTPUT_LENGTH);
    let mut derived = Zeroizing::new(Vec::with_capacity(rounds * SHA256_OUTPUT_LENGTH));
    for counter in 1..=rounds as u32 {
        let mut hasher = Sha256::new();
        hasher.update(counter.to_be_bytes());
        hasher.update(z);
        hasher.update(&other_info);
        derived.extend_from_slice(&hasher.finalize());
    }
    derived.truncate(key_len);
    Ok(derived)
}
