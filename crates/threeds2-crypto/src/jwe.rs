//! Compact JWE (RFC 7516) for device data and challenge messages.
//!
//! Key management:
//! - `RSA-OAEP-256`: random CEK wrapped to an RSA DS certificate
//! - `ECDH-ES`: CEK agreed with an EC DS certificate through an ephemeral key
//!   (RFC 7518 §4.6), with the DS identifier as PartyVInfo
//! - `dir`: the challenge CEK derived from the ACS signed content
//!
//! Decryption never reports why it failed. Every error on that path is
//! [`CryptoError::DecryptionFailed`].

use p256::SecretKey;
use rsa::{Oaep, RsaPrivateKey};
use serde_json::Value;
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

use crate::base64url::{base64url_decode, base64url_encode};
use crate::certificate::{DirectoryServerCertificate, KeyType};
use crate::content::{self, random_bytes, ContentEncryption};
use crate::directory::{DirectoryServer, DirectoryServerRegistry};
use crate::ephemeral::{EllipticCurvePoint, EphemeralKeyPair};
use crate::error::CryptoError;
use crate::kdf::ConcatKdfInfo;
use crate::types::{AES_128_KEY_LENGTH, CEK_LENGTH};

const ALG_RSA_OAEP_256: &str = "RSA-OAEP-256";
const ALG_ECDH_ES: &str = "ECDH-ES";
const ALG_DIRECT: &str = "dir";

/// Content encryption used for device data.
const DEVICE_DATA_ENCRYPTION: ContentEncryption = ContentEncryption::A128CbcHs256;

/// Which party sealed a direct-mode message. Selects the A128GCM key half.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    SdkToAcs,
    AcsToSdk,
}

/// Encrypt `json` to the encryption certificate registered for `directory_server`.
pub fn encrypt_for_directory_server(
    json: &Value,
    registry: &DirectoryServerRegistry,
    directory_server: &DirectoryServer,
) -> Result<String, CryptoError> {
    let keys = registry.keys(directory_server)?;
    encrypt_with_certificate(
        json,
        &keys.certificate,
        directory_server.directory_server_id(),
        keys.key_id.as_deref(),
    )
}

/// Encrypt `json` to an explicit certificate.
///
/// # Arguments
/// * `directory_server_id` - PartyVInfo for ECDH-ES key agreement
/// * `server_key_id` - sent verbatim as `kid`; selects among several DS keys
pub fn encrypt_with_certificate(
    json: &Value,
    certificate: &DirectoryServerCertificate,
    directory_server_id: &str,
    server_key_id: Option<&str>,
) -> Result<String, CryptoError> {
    let plaintext = serde_json::to_vec(json)?;
    let enc = DEVICE_DATA_ENCRYPTION;

    let (mut header, encrypted_key, cek) = match certificate.key_type() {
        KeyType::Rsa => {
            let cek = Zeroizing::new(random_bytes(enc.key_length())?);
            let encrypted_key = certificate.encrypt_rsa_oaep_sha256(&cek)?;
            let header = serde_json::json!({ "alg": ALG_RSA_OAEP_256, "enc": enc.header_value() });
            (header, encrypted_key, cek)
        }
        KeyType::Ec => {
            let recipient = certificate
                .ec_public_key()
                .ok_or(CryptoError::UnsupportedKeyType {
                    expected: KeyType::Ec.name(),
                    actual: KeyType::Unknown.name(),
                })?;
            let ephemeral = EphemeralKeyPair::generate()?;
            let info = ConcatKdfInfo::for_directory_server(enc.header_value(), directory_server_id);
            let cek = ephemeral
                .derive_shared_secret(recipient)?
                .derive_key(enc.key_length(), &info)?;
            let header = serde_json::json!({
                "alg": ALG_ECDH_ES,
                "enc": enc.header_value(),
                "epk": ephemeral.public_key_jwk(),
            });
            (header, Vec::new(), Zeroizing::new(cek.as_bytes().to_vec()))
        }
        KeyType::Unknown => {
            return Err(CryptoError::UnsupportedKeyType {
                expected: "RSA or EC",
                actual: KeyType::Unknown.name(),
            })
        }
    };
    if let Some(kid) = server_key_id {
        header["kid"] = Value::String(kid.to_string());
    }
    debug!(
        alg = header["alg"].as_str().unwrap_or_default(),
        directory_server_id, "encrypting for directory server"
    );
    seal_compact(&header, &encrypted_key, enc, &cek, &plaintext)
}

/// Direct-mode A128CBC-HS256 with the challenge CEK, `kid` = ACS transaction ID.
///
/// The key must be exactly 32 bytes; it is never truncated or padded.
pub fn encrypt_direct(
    json: &Value,
    content_encryption_key: &[u8],
    acs_transaction_id: &str,
) -> Result<String, CryptoError> {
    encrypt_direct_with(
        json,
        content_encryption_key,
        acs_transaction_id,
        ContentEncryption::A128CbcHs256,
        Direction::SdkToAcs,
    )
}

/// Direct-mode encryption with an explicit content encryption and direction.
pub fn encrypt_direct_with(
    json: &Value,
    content_encryption_key: &[u8],
    key_id: &str,
    enc: ContentEncryption,
    direction: Direction,
) -> Result<String, CryptoError> {
    if content_encryption_key.len() != CEK_LENGTH {
        return Err(CryptoError::InvalidKeyLength {
            expected: CEK_LENGTH,
            got: content_encryption_key.len(),
        });
    }
    let plaintext = serde_json::to_vec(json)?;
    let header = serde_json::json!({
        "alg": ALG_DIRECT,
        "enc": enc.header_value(),
        "kid": key_id,
    });
    let key = direct_key(content_encryption_key, enc, direction);
    seal_compact(&header, &[], enc, key, &plaintext)
}

/// Decrypt a direct-mode message sent by the ACS.
pub fn decrypt(data: &str, content_encryption_key: &[u8]) -> Result<Value, CryptoError> {
    decrypt_with_direction(data, content_encryption_key, Direction::AcsToSdk)
}

pub fn decrypt_with_direction(
    data: &str,
    content_encryption_key: &[u8],
    direction: Direction,
) -> Result<Value, CryptoError> {
    if content_encryption_key.len() != CEK_LENGTH {
        return Err(CryptoError::DecryptionFailed);
    }
    let jwe = CompactJwe::parse(data)?;
    if jwe.alg != ALG_DIRECT || !jwe.encrypted_key.is_empty() {
        return Err(CryptoError::DecryptionFailed);
    }
    let key = direct_key(content_encryption_key, jwe.enc, direction);
    jwe.open(key)
}

/// Counterparty side of `RSA-OAEP-256`: what the DS does with its private key.
pub fn decrypt_with_rsa_key(data: &str, private_key: &RsaPrivateKey) -> Result<Value, CryptoError> {
    let jwe = CompactJwe::parse(data)?;
    if jwe.alg != ALG_RSA_OAEP_256 {
        return Err(CryptoError::DecryptionFailed);
    }
    let cek = Zeroizing::new(
        private_key
            .decrypt(Oaep::new::<Sha256>(), &jwe.encrypted_key)
            .map_err(|_| CryptoError::DecryptionFailed)?,
    );
    jwe.open(&cek)
}

/// Counterparty side of `ECDH-ES`.
pub fn decrypt_with_ec_key(
    data: &str,
    private_key: &SecretKey,
    directory_server_id: &str,
) -> Result<Value, CryptoError> {
    let jwe = CompactJwe::parse(data)?;
    if jwe.alg != ALG_ECDH_ES || !jwe.encrypted_key.is_empty() {
        return Err(CryptoError::DecryptionFailed);
    }
    let epk = jwe
        .header
        .get("epk")
        .ok_or(CryptoError::DecryptionFailed)
        .and_then(|jwk| {
            EllipticCurvePoint::from_jwk(jwk).map_err(|_| CryptoError::DecryptionFailed)
        })?;
    let info = ConcatKdfInfo::for_directory_server(jwe.enc.header_value(), directory_server_id);
    let cek = EphemeralKeyPair::from_secret(private_key.clone())
        .derive_shared_secret(&epk)
        .and_then(|secret| secret.derive_key(jwe.enc.key_length(), &info))
        .map_err(|_| CryptoError::DecryptionFailed)?;
    jwe.open(cek.as_bytes())
}

/// A128GCM consumes one half of the 32-byte CEK, chosen by direction.
fn direct_key(cek: &[u8], enc: ContentEncryption, direction: Direction) -> &[u8] {
    match (enc, direction) {
        (ContentEncryption::A128CbcHs256, _) => cek,
        (ContentEncryption::A128Gcm, Direction::SdkToAcs) => &cek[..AES_128_KEY_LENGTH],
        (ContentEncryption::A128Gcm, Direction::AcsToSdk) => &cek[AES_128_KEY_LENGTH..],
    }
}

fn seal_compact(
    header: &Value,
    encrypted_key: &[u8],
    enc: ContentEncryption,
    key: &[u8],
    plaintext: &[u8],
) -> Result<String, CryptoError> {
    let header_b64 = base64url_encode(&serde_json::to_vec(header)?);
    // AAD is the ASCII of the encoded protected header (RFC 7516 §5.1 step 14).
    let sealed = content::seal(enc, key, header_b64.as_bytes(), plaintext)?;
    Ok(format!(
        "{}.{}.{}.{}.{}",
        header_b64,
        base64url_encode(encrypted_key),
        base64url_encode(&sealed.iv),
        base64url_encode(&sealed.ciphertext),
        base64url_encode(&sealed.tag),
    ))
}

/// `header.encrypted_key.iv.ciphertext.tag`, decoded.
struct CompactJwe<'a> {
    header_b64: &'a str,
    header: Value,
    alg: String,
    enc: ContentEncryption,
    encrypted_key: Vec<u8>,
    iv: Vec<u8>,
    ciphertext: Vec<u8>,
    tag: Vec<u8>,
}

impl<'a> CompactJwe<'a> {
    fn parse(data: &'a str) -> Result<Self, CryptoError> {
        let parts: Vec<&str> = data.trim().split('.').collect();
        let &[header_b64, encrypted_key, iv, ciphertext, tag] = parts.as_slice() else {
            return Err(CryptoError::DecryptionFailed);
        };
        let decode =
            |segment: &str| base64url_decode(segment).map_err(|_| CryptoError::DecryptionFailed);

        let header: Value = serde_json::from_slice(&decode(header_b64)?)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        let alg = header
            .get("alg")
            .and_then(Value::as_str)
            .ok_or(CryptoError::DecryptionFailed)?
            .to_string();
        let enc = header
            .get("enc")
            .and_then(Value::as_str)
            .and_then(ContentEncryption::from_header)
            .ok_or(CryptoError::DecryptionFailed)?;

        Ok(Self {
            header_b64,
            header,
            alg,
            enc,
            encrypted_key: decode(encrypted_key)?,
            iv: decode(iv)?,
            ciphertext: decode(ciphertext)?,
            tag: decode(tag)?,
        })
    }

    fn open(&self, key: &[u8]) -> Result<Value, CryptoError> {
        let plaintext = content::open(
            self.enc,
            key,
            self.header_b64.as_bytes(),
            &self.iv,
            &self.ciphertext,
            &self.tag,
        )?;
        serde_json::from_slice(&plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use p256::pkcs8::DecodePrivateKey;

    const ACS_TRANS_ID: &str = "d7c1ee99-9478-44a6-b1f2-391e29c6b340";

    fn device_data() -> Value {
        serde_json::json!({"DV": "1.0", "DD": {"C001": "iOS", "C002": "iPhone15,2"}})
    }

    fn cek() -> Vec<u8> {
        (0u8..32).collect()
    }

    fn header_of(compact: &str) -> Value {
        let header_b64 = compact.split('.').next().unwrap();
        serde_json::from_slice(&base64url_decode(header_b64).unwrap()).unwrap()
    }

    #[test]
    fn rsa_oaep_round_trip() {
        let cert = DirectoryServerCertificate::from_custom_string(testing::DS_RSA_CERT_PEM).unwrap();
        let compact =
            encrypt_with_certificate(&device_data(), &cert, "F000000000", Some("key-2")).unwrap();
        assert_eq!(compact.split('.').count(), 5);

        let header = header_of(&compact);
        assert_eq!(header["alg"], "RSA-OAEP-256");
        assert_eq!(header["enc"], "A128CBC-HS256");
        assert_eq!(header["kid"], "key-2");

        let key = RsaPrivateKey::from_pkcs8_pem(testing::DS_RSA_KEY_PEM).unwrap();
        assert_eq!(decrypt_with_rsa_key(&compact, &key).unwrap(), device_data());
    }

    #[test]
    fn ecdh_es_round_trip() {
        let cert = DirectoryServerCertificate::from_custom_string(testing::DS_EC_CERT_PEM).unwrap();
        let compact = encrypt_with_certificate(&device_data(), &cert, "F000000001", None).unwrap();

        let header = header_of(&compact);
        assert_eq!(header["alg"], "ECDH-ES");
        assert!(header.get("epk").is_some());
        assert!(header.get("kid").is_none());
        assert_eq!(compact.split('.').nth(1), Some(""));

        let key = SecretKey::from_pkcs8_pem(testing::DS_EC_KEY_PEM).unwrap();
        assert_eq!(
            decrypt_with_ec_key(&compact, &key, "F000000001").unwrap(),
            device_data()
        );
        // PartyVInfo binds the DS identifier.
        assert!(matches!(
            decrypt_with_ec_key(&compact, &key, "F000000000"),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn encrypt_for_directory_server_uses_registry() {
        let registry = testing::directory_server_registry();
        let compact =
            encrypt_for_directory_server(&device_data(), &registry, &DirectoryServer::UlTestRsa)
                .unwrap();
        assert_eq!(header_of(&compact)["kid"], testing::DS_RSA_KEY_ID);

        let err = encrypt_for_directory_server(&device_data(), &registry, &DirectoryServer::Amex)
            .unwrap_err();
        assert!(matches!(err, CryptoError::UnknownDirectoryServer(_)));
    }

    #[test]
    fn direct_round_trip_both_content_encryptions() {
        let json = serde_json::json!({"messageType": "CRes", "acsCounterAtoS": "000"});
        for enc in [ContentEncryption::A128CbcHs256, ContentEncryption::A128Gcm] {
            let compact =
                encrypt_direct_with(&json, &cek(), ACS_TRANS_ID, enc, Direction::AcsToSdk).unwrap();
            let header = header_of(&compact);
            assert_eq!(header["alg"], "dir");
            assert_eq!(header["kid"], ACS_TRANS_ID);
            assert_eq!(decrypt(&compact, &cek()).unwrap(), json);
        }
    }

    #[test]
    fn gcm_direction_selects_key_half() {
        let json = serde_json::json!({"messageType": "CReq"});
        let compact = encrypt_direct_with(
            &json,
            &cek(),
            ACS_TRANS_ID,
            ContentEncryption::A128Gcm,
            Direction::SdkToAcs,
        )
        .unwrap();
        assert!(decrypt_with_direction(&compact, &cek(), Direction::SdkToAcs).is_ok());
        assert!(matches!(
            decrypt_with_direction(&compact, &cek(), Direction::AcsToSdk),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn encrypt_direct_rejects_wrong_key_length() {
        for len in [0usize, 16, 31, 33, 64] {
            let err = encrypt_direct(&device_data(), &vec![1u8; len], ACS_TRANS_ID).unwrap_err();
            assert!(matches!(
                err,
                CryptoError::InvalidKeyLength { expected: 32, got } if got == len
            ));
        }
    }

    #[test]
    fn all_decrypt_failures_are_undifferentiated() {
        let json = serde_json::json!({"messageType": "CRes"});
        let compact = encrypt_direct_with(
            &json,
            &cek(),
            ACS_TRANS_ID,
            ContentEncryption::A128CbcHs256,
            Direction::AcsToSdk,
        )
        .unwrap();
        let parts: Vec<&str> = compact.split('.').collect();

        let mut tampered_tag = base64url_decode(parts[4]).unwrap();
        tampered_tag[0] ^= 1;
        let bad_tag = format!(
            "{}.{}.{}.{}.{}",
            parts[0],
            parts[1],
            parts[2],
            parts[3],
            base64url_encode(&tampered_tag)
        );

        let cases = [
            decrypt(&compact, &[9u8; 32]),
            decrypt(&compact, &[0u8; 16]),
            decrypt(&bad_tag, &cek()),
            decrypt("a.b.c", &cek()),
            decrypt("***.***.***.***.***", &cek()),
            decrypt(&format!("{}.AAAA.{}.{}.{}", parts[0], parts[2], parts[3], parts[4]), &cek()),
        ];
        for result in cases {
            assert!(matches!(result, Err(CryptoError::DecryptionFailed)));
        }
    }

    #[test]
    fn rsa_ciphertext_is_not_accepted_as_direct() {
        let cert = DirectoryServerCertificate::from_custom_string(testing::DS_RSA_CERT_PEM).unwrap();
        let compact = encrypt_with_certificate(&device_data(), &cert, "F000000000", None).unwrap();
        assert!(matches!(
            decrypt(&compact, &cek()),
            Err(CryptoError::DecryptionFailed)
        ));
    }
}
