//! Fixtures and an ACS-side counterpart for tests.
//!
//! Compiled for this crate's unit tests and, behind the `testing` feature,
//! for downstream crates. Helpers panic on failure.

use p256::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use serde_json::Value;

use crate::base64url::{base64url_decode, base64url_encode};
use crate::certificate::DirectoryServerCertificate;
use crate::content::ContentEncryption;
use crate::directory::{DirectoryServer, DirectoryServerKeys, DirectoryServerRegistry};
use crate::ephemeral::{ContentEncryptionKey, EllipticCurvePoint, EphemeralKeyPair};
use crate::error::CryptoError;
use crate::jwe::{self, Direction};
use crate::jws::JsonWebSignature;
use crate::kdf::ConcatKdfInfo;

pub const ROOT_CA_PEM: &str = include_str!("../testdata/root_ca.pem");
pub const EC_ROOT_CA_PEM: &str = include_str!("../testdata/ec_root_ca.pem");
pub const UNTRUSTED_ROOT_CA_PEM: &str = include_str!("../testdata/untrusted_root_ca.pem");

pub const ACS_SIGNER_CERT_PEM: &str = include_str!("../testdata/acs_signer.pem");
pub const ACS_SIGNER_KEY_PEM: &str = include_str!("../testdata/acs_signer_key.pem");
/// RSA leaf whose certificate is signed by the EC root.
pub const ACS_SIGNER_EC_ISSUED_CERT_PEM: &str = include_str!("../testdata/acs_signer_ec_issued.pem");
pub const ACS_SIGNER_EC_ISSUED_KEY_PEM: &str =
    include_str!("../testdata/acs_signer_ec_issued_key.pem");

pub const DS_RSA_CERT_PEM: &str = include_str!("../testdata/ds_rsa.pem");
pub const DS_RSA_KEY_PEM: &str = include_str!("../testdata/ds_rsa_key.pem");
pub const DS_EC_CERT_PEM: &str = include_str!("../testdata/ds_ec.pem");
pub const DS_EC_KEY_PEM: &str = include_str!("../testdata/ds_ec_key.pem");

pub const DS_RSA_KEY_ID: &str = "ul-test-rsa-1";

fn certificate(pem: &str) -> DirectoryServerCertificate {
    DirectoryServerCertificate::from_custom_string(pem).expect("fixture certificate parses")
}

/// Both test directory servers, trusting both fixture roots.
pub fn directory_server_registry() -> DirectoryServerRegistry {
    let roots = vec![certificate(ROOT_CA_PEM), certificate(EC_ROOT_CA_PEM)];
    let mut registry = DirectoryServerRegistry::new();
    registry.insert(
        &DirectoryServer::UlTestRsa,
        DirectoryServerKeys::new(
            certificate(DS_RSA_CERT_PEM),
            roots.clone(),
            Some(DS_RSA_KEY_ID.to_string()),
        ),
    );
    registry.insert(
        &DirectoryServer::UlTestEc,
        DirectoryServerKeys::new(certificate(DS_EC_CERT_PEM), roots, None),
    );
    registry
}

/// Parse and verify in one step; any error counts as rejection.
pub fn accepts(compact: &str, roots: &[DirectoryServerCertificate]) -> bool {
    JsonWebSignature::parse(compact, false)
        .and_then(|jws| DirectoryServerCertificate::verify_signature(&jws, roots))
        .unwrap_or(false)
}

/// Flip one bit inside the decoded bytes of a compact-serialization segment.
pub fn flip_bit(compact: &str, segment: usize, bit: usize) -> String {
    let mut parts: Vec<String> = compact.split('.').map(str::to_string).collect();
    let mut bytes = base64url_decode(&parts[segment]).expect("segment is base64url");
    let len = bytes.len();
    bytes[(bit / 8) % len] ^= 1 << (bit % 8);
    parts[segment] = base64url_encode(&bytes);
    parts.join(".")
}

/// The ACS end of a challenge: signs the key exchange and seals CRes
/// messages with the derived CEK.
pub struct TestAcs {
    acs_transaction_id: String,
    ephemeral: EphemeralKeyPair,
}

impl TestAcs {
    pub fn new(acs_transaction_id: &str) -> Self {
        Self {
            acs_transaction_id: acs_transaction_id.to_string(),
            ephemeral: EphemeralKeyPair::generate().expect("ACS key pair"),
        }
    }

    pub fn acs_transaction_id(&self) -> &str {
        &self.acs_transaction_id
    }

    fn signed_content_payload(&self, acs_url: &str, sdk_public_key: &Value) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "acsEphemPubKey": self.ephemeral.public_key_jwk(),
            "sdkEphemPubKey": sdk_public_key,
            "acsURL": acs_url,
        }))
        .expect("signed content serializes")
    }

    /// `acsSignedContent` as PS256 over the fixture ACS signer chain.
    pub fn signed_content(&self, acs_url: &str, sdk_public_key: &Value) -> String {
        self.signed_content_with_chain(
            acs_url,
            sdk_public_key,
            ACS_SIGNER_KEY_PEM,
            &[ACS_SIGNER_CERT_PEM],
        )
    }

    pub fn signed_content_with_chain(
        &self,
        acs_url: &str,
        sdk_public_key: &Value,
        key_pem: &str,
        chain_pems: &[&str],
    ) -> String {
        let key = RsaPrivateKey::from_pkcs8_pem(key_pem).expect("fixture RSA key parses");
        let chain: Vec<String> = chain_pems
            .iter()
            .map(|pem| certificate(pem).certificate_string())
            .collect();
        JsonWebSignature::sign_ps256(
            &self.signed_content_payload(acs_url, sdk_public_key),
            &key,
            &chain,
        )
        .expect("PS256 signing")
    }

    /// `acsSignedContent` as ES256 with a throwaway key in `jwk`.
    pub fn signed_content_es256(&self, acs_url: &str, sdk_public_key: &Value) -> String {
        let key = p256::ecdsa::SigningKey::random(&mut p256::elliptic_curve::rand_core::OsRng);
        JsonWebSignature::sign_es256(&self.signed_content_payload(acs_url, sdk_public_key), &key)
            .expect("ES256 signing")
    }

    /// The challenge CEK, derived the same way the SDK derives it.
    pub fn content_encryption_key(
        &self,
        sdk_public_key: &Value,
        sdk_transaction_id: &str,
    ) -> ContentEncryptionKey {
        let sdk_point = EllipticCurvePoint::from_jwk(sdk_public_key).expect("SDK JWK parses");
        self.ephemeral
            .derive_shared_secret(&sdk_point)
            .and_then(|secret| {
                secret.derive_content_encryption_key(&ConcatKdfInfo::for_challenge(
                    sdk_transaction_id,
                    &self.acs_transaction_id,
                ))
            })
            .expect("ACS key agreement")
    }

    /// Seal an ACS → SDK message.
    pub fn seal(&self, json: &Value, cek: &ContentEncryptionKey) -> String {
        jwe::encrypt_direct_with(
            json,
            cek.as_bytes(),
            &self.acs_transaction_id,
            ContentEncryption::A128CbcHs256,
            Direction::AcsToSdk,
        )
        .expect("ACS encryption")
    }

    /// Open an SDK → ACS message.
    pub fn open(&self, data: &str, cek: &ContentEncryptionKey) -> Result<Value, CryptoError> {
        jwe::decrypt_with_direction(data, cek.as_bytes(), Direction::SdkToAcs)
    }
}
