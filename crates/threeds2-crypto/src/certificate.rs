//! Directory server and ACS certificates.
//!
//! Certificates arrive as PEM, raw DER, or bare base64 DER (`x5c` entries and
//! most DS configuration). Instances are immutable and cheap to share behind
//! an `Arc`.

use std::fmt;
use std::time::SystemTime;

use ecdsa::signature::Verifier;
use p256::elliptic_curve::rand_core::OsRng;
use p256::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use sha2::Sha256;
use tracing::debug;
use x509_cert::der::asn1::ObjectIdentifier;
use x509_cert::der::{Decode, DecodePem, Encode};
use x509_cert::Certificate;

use crate::base64url::{base64_decode, base64_encode};
use crate::ephemeral::EllipticCurvePoint;
use crate::error::CryptoError;
use crate::jws::{JsonWebSignature, JwsAlgorithm};

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const SHA256_WITH_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");

const PEM_MARKER: &str = "-----BEGIN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    Rsa,
    Ec,
    Unknown,
}

impl KeyType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Rsa => "RSA",
            Self::Ec => "EC",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Clone)]
enum PublicKey {
    Rsa(RsaPublicKey),
    Ec(EllipticCurvePoint),
    Unknown,
}

/// An X.509 certificate and its extracted public key.
#[derive(Clone)]
pub struct DirectoryServerCertificate {
    certificate: Certificate,
    der: Vec<u8>,
    public_key: PublicKey,
}

impl DirectoryServerCertificate {
    /// Parse PEM or DER bytes.
    pub fn from_custom_data(data: &[u8]) -> Result<Self, CryptoError> {
        let certificate = if data.trim_ascii_start().starts_with(PEM_MARKER.as_bytes()) {
            Certificate::from_pem(data)
        } else {
            Certificate::from_der(data)
        }
        .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;
        Self::from_certificate(certificate)
    }

    /// Parse a PEM block or a bare base64 DER string.
    pub fn from_custom_string(certificate: &str) -> Result<Self, CryptoError> {
        if certificate.contains(PEM_MARKER) {
            return Self::from_custom_data(certificate.as_bytes());
        }
        let der = base64_decode(certificate)
            .map_err(|e| CryptoError::InvalidCertificate(format!("base64: {e}")))?;
        Self::from_custom_data(&der)
    }

    fn from_certificate(certificate: Certificate) -> Result<Self, CryptoError> {
        let der = certificate
            .to_der()
            .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;
        let public_key = extract_public_key(&certificate);
        Ok(Self {
            certificate,
            der,
            public_key,
        })
    }

    pub fn key_type(&self) -> KeyType {
        match self.public_key {
            PublicKey::Rsa(_) => KeyType::Rsa,
            PublicKey::Ec(_) => KeyType::Ec,
            PublicKey::Unknown => KeyType::Unknown,
        }
    }

    /// The certificate as base64 DER, the form used in `x5c` headers.
    pub fn certificate_string(&self) -> String {
        base64_encode(&self.der)
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn subject(&self) -> String {
        self.certificate.tbs_certificate.subject.to_string()
    }

    pub fn rsa_public_key(&self) -> Option<&RsaPublicKey> {
        match &self.public_key {
            PublicKey::Rsa(key) => Some(key),
            _ => None,
        }
    }

    pub fn ec_public_key(&self) -> Option<&EllipticCurvePoint> {
        match &self.public_key {
            PublicKey::Ec(point) => Some(point),
            _ => None,
        }
    }

    /// RSAES-OAEP with SHA-256 and MGF1-SHA-256.
    pub fn encrypt_rsa_oaep_sha256(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let key = self
            .rsa_public_key()
            .ok_or(CryptoError::UnsupportedKeyType {
                expected: KeyType::Rsa.name(),
                actual: self.key_type().name(),
            })?;
        key.encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(format!("RSA-OAEP: {e}")))
    }

    /// Verify a JWS against an explicit set of trust anchors.
    ///
    /// Returns `Ok(false)` for any signature or chain mismatch. Only
    /// unparseable `x5c` entries produce an error.
    pub fn verify_signature(
        jws: &JsonWebSignature,
        root_certificates: &[DirectoryServerCertificate],
    ) -> Result<bool, CryptoError> {
        Self::verify_signature_at(jws, root_certificates, SystemTime::now())
    }

    pub fn verify_signature_at(
        jws: &JsonWebSignature,
        root_certificates: &[DirectoryServerCertificate],
        now: SystemTime,
    ) -> Result<bool, CryptoError> {
        let chain = jws
            .certificate_chain()
            .iter()
            .map(|entry| Self::from_custom_string(entry))
            .collect::<Result<Vec<_>, _>>()?;

        match jws.algorithm() {
            JwsAlgorithm::Ps256 => {
                let Some(leaf) = chain.first() else {
                    debug!("PS256 signature without x5c chain");
                    return Ok(false);
                };
                if !chain_is_trusted(&chain, root_certificates, now) {
                    debug!(leaf = %leaf.subject(), "x5c chain does not anchor in pinned roots");
                    return Ok(false);
                }
                Ok(leaf
                    .rsa_public_key()
                    .is_some_and(|key| jws.verify_ps256(key)))
            }
            JwsAlgorithm::Es256 => {
                let Some(point) = jws.ec_public_key() else {
                    debug!("ES256 signature without embedded jwk");
                    return Ok(false);
                };
                if let Some(leaf) = chain.first() {
                    if leaf.ec_public_key() != Some(point)
                        || !chain_is_trusted(&chain, root_certificates, now)
                    {
                        debug!("ES256 x5c chain does not match jwk or pinned roots");
                        return Ok(false);
                    }
                }
                Ok(jws.verify_es256(point))
            }
        }
    }

    fn is_valid_at(&self, now: SystemTime) -> bool {
        let validity = &self.certificate.tbs_certificate.validity;
        validity.not_before.to_system_time() <= now && now <= validity.not_after.to_system_time()
    }

    /// True when `issuer`'s subject names this certificate's issuer and its
    /// key verifies this certificate's signature.
    fn is_issued_by(&self, issuer: &DirectoryServerCertificate) -> bool {
        if self.certificate.tbs_certificate.issuer != issuer.certificate.tbs_certificate.subject {
            return false;
        }
        let Ok(tbs) = self.certificate.tbs_certificate.to_der() else {
            return false;
        };
        let Some(signature) = self.certificate.signature.as_bytes() else {
            return false;
        };
        let algorithm = self.certificate.signature_algorithm.oid;

        match &issuer.public_key {
            PublicKey::Rsa(key) if algorithm == SHA256_WITH_RSA_ENCRYPTION => {
                let Ok(signature) = rsa::pkcs1v15::Signature::try_from(signature) else {
                    return false;
                };
                rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key.clone())
                    .verify(&tbs, &signature)
                    .is_ok()
            }
            PublicKey::Ec(point) if algorithm == ECDSA_WITH_SHA256 => {
                let Ok(signature) = p256::ecdsa::Signature::from_der(signature) else {
                    return false;
                };
                let Ok(key) = p256::ecdsa::VerifyingKey::from_affine(*point.public_key().as_affine())
                else {
                    return false;
                };
                key.verify(&tbs, &signature).is_ok()
            }
            _ => false,
        }
    }
}

impl PartialEq for DirectoryServerCertificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for DirectoryServerCertificate {}

impl fmt::Debug for DirectoryServerCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryServerCertificate")
            .field("subject", &self.subject())
            .field("key_type", &self.key_type())
            .finish()
    }
}

fn extract_public_key(certificate: &Certificate) -> PublicKey {
    let spki = &certificate.tbs_certificate.subject_public_key_info;
    let Ok(der) = spki.to_der() else {
        return PublicKey::Unknown;
    };
    if spki.algorithm.oid == RSA_ENCRYPTION {
        RsaPublicKey::from_public_key_der(&der)
            .map(PublicKey::Rsa)
            .unwrap_or(PublicKey::Unknown)
    } else if spki.algorithm.oid == EC_PUBLIC_KEY {
        // Only P-256 keys are usable; other curves fail to decode here.
        p256::PublicKey::from_public_key_der(&der)
            .map(|key| PublicKey::Ec(EllipticCurvePoint::from_public_key(key)))
            .unwrap_or(PublicKey::Unknown)
    } else {
        PublicKey::Unknown
    }
}

/// Every certificate is inside its validity window, each is issued by the
/// next, and the last one either is a root or is issued by one.
fn chain_is_trusted(
    chain: &[DirectoryServerCertificate],
    roots: &[DirectoryServerCertificate],
    now: SystemTime,
) -> bool {
    let Some(last) = chain.last() else {
        return false;
    };
    if !chain.iter().all(|certificate| certificate.is_valid_at(now)) {
        return false;
    }
    if !chain.windows(2).all(|pair| pair[0].is_issued_by(&pair[1])) {
        return false;
    }
    roots
        .iter()
        .any(|root| root == last || (root.is_valid_at(now) && last.is_issued_by(root)))
}
