//! JWE content encryption (RFC 7518 §5).
//!
//! - A128CBC-HS256: 32-byte key, MAC_KEY = first 16 bytes, ENC_KEY = last
//!   16 bytes. Tag = leftmost 16 bytes of HMAC-SHA256(AAD || IV || C || AL)
//!   where AL is the AAD length in bits as a 64-bit big-endian integer.
//! - A128GCM: 16-byte key, 12-byte IV, 16-byte tag.
//!
//! Every failure on the open path collapses into `CryptoError::DecryptionFailed`.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Nonce};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::CryptoError;
use crate::types::{AES_128_KEY_LENGTH, CBC_IV_LENGTH, CEK_LENGTH, GCM_IV_LENGTH, TAG_LENGTH};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// The `enc` header values this engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentEncryption {
    A128CbcHs256,
    A128Gcm,
}

impl ContentEncryption {
    pub fn header_value(self) -> &'static str {
        match self {
            Self::A128CbcHs256 => "A128CBC-HS256",
            Self::A128Gcm => "A128GCM",
        }
    }

    pub fn from_header(value: &str) -> Option<Self> {
        match value {
            "A128CBC-HS256" => Some(Self::A128CbcHs256),
            "A128GCM" => Some(Self::A128Gcm),
            _ => None,
        }
    }

    /// Key length the cipher itself consumes.
    pub fn key_length(self) -> usize {
        match self {
            Self::A128CbcHs256 => CEK_LENGTH,
            Self::A128Gcm => AES_128_KEY_LENGTH,
        }
    }

    pub fn iv_length(self) -> usize {
        match self {
            Self::A128CbcHs256 => CBC_IV_LENGTH,
            Self::A128Gcm => GCM_IV_LENGTH,
        }
    }
}

/// Output of a content encryption: the three variable JWE segments.
#[derive(Debug, Clone)]
pub(crate) struct Sealed {
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub tag: Vec<u8>,
}

pub(crate) fn random_bytes(len: usize) -> Result<Vec<u8>, CryptoError> {
    let mut bytes = vec![0u8; len];
    getrandom::getrandom(&mut bytes).map_err(|e| CryptoError::RngFailed(e.to_string()))?;
    Ok(bytes)
}

/// Encrypt with a fresh random IV.
pub(crate) fn seal(
    enc: ContentEncryption,
    key: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Sealed, CryptoError> {
    let iv = random_bytes(enc.iv_length())?;
    seal_with_iv(enc, key, &iv, aad, plaintext)
}

pub(crate) fn seal_with_iv(
    enc: ContentEncryption,
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Sealed, CryptoError> {
    if key.len() != enc.key_length() {
        return Err(CryptoError::InvalidKeyLength {
            expected: enc.key_length(),
            got: key.len(),
        });
    }
    match enc {
        ContentEncryption::A128CbcHs256 => {
            let (mac_key, enc_key) = key.split_at(AES_128_KEY_LENGTH);
            let ciphertext = Aes128CbcEnc::new_from_slices(enc_key, iv)
                .map_err(|e| CryptoError::EncryptionFailed(format!("AES-CBC init: {e}")))?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
            let tag = cbc_hs256_mac(mac_key, aad, iv, &ciphertext)
                .map_err(|e| CryptoError::EncryptionFailed(format!("HMAC init: {e}")))?
                .finalize()
                .into_bytes()[..TAG_LENGTH]
                .to_vec();
            Ok(Sealed {
                iv: iv.to_vec(),
                ciphertext,
                tag,
            })
        }
        ContentEncryption::A128Gcm => {
            let cipher = Aes128Gcm::new_from_slice(key)
                .map_err(|e| CryptoError::EncryptionFailed(format!("AES-GCM init: {e}")))?;
            if iv.len() != GCM_IV_LENGTH {
                return Err(CryptoError::EncryptionFailed("GCM IV must be 12 bytes".to_string()));
            }
            let mut ciphertext = cipher
                .encrypt(
                    Nonce::from_slice(iv),
                    Payload {
                        msg: plaintext,
                        aad,
                    },
                )
                .map_err(|e| CryptoError::EncryptionFailed(format!("AES-GCM encrypt: {e}")))?;
            let tag = ciphertext.split_off(ciphertext.len() - TAG_LENGTH);
            Ok(Sealed {
                iv: iv.to_vec(),
                ciphertext,
                tag,
            })
        }
    }
}

/// Authenticate and decrypt. The MAC is checked before any padding is
/// inspected.
pub(crate) fn open(
    enc: ContentEncryption,
    key: &[u8],
    aad: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if key.len() != enc.key_length() || iv.len() != enc.iv_length() || tag.len() != TAG_LENGTH {
        return Err(CryptoError::DecryptionFailed);
    }
    match enc {
        ContentEncryption::A128CbcHs256 => {
            let (mac_key, enc_key) = key.split_at(AES_128_KEY_LENGTH);
            cbc_hs256_mac(mac_key, aad, iv, ciphertext)
                .map_err(|_| CryptoError::DecryptionFailed)?
                .verify_truncated_left(tag)
                .map_err(|_| CryptoError::DecryptionFailed)?;
            Aes128CbcDec::new_from_slices(enc_key, iv)
                .map_err(|_| CryptoError::DecryptionFailed)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(|_| CryptoError::DecryptionFailed)
        }
        ContentEncryption::A128Gcm => {
            let cipher =
                Aes128Gcm::new_from_slice(key).map_err(|_| CryptoError::DecryptionFailed)?;
            let mut ct_with_tag = Vec::with_capacity(ciphertext.len() + tag.len());
            ct_with_tag.extend_from_slice(ciphertext);
            ct_with_tag.extend_from_slice(tag);
            cipher
                .decrypt(
                    Nonce::from_slice(iv),
                    Payload {
                        msg: &ct_with_tag,
                        aad,
                    },
                )
                .map_err(|_| CryptoError::DecryptionFailed)
        }
    }
}

fn cbc_hs256_mac(
    mac_key: &[u8],
    aad: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<HmacSha256, hmac::digest::InvalidLength> {
    let aad_bits = (aad.len() as u64) * 8;
    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key)?;
    mac.update(aad);
    mac.update(iv);
    mac.update(ciphertext);
    mac.update(&aad_bits.to_be_bytes());
    Ok(mac)
}
