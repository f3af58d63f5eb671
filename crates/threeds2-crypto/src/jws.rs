//! Compact JWS (RFC 7515) as used for the ACS signed content.
//!
//! Two algorithms are supported:
//! - ES256, with the signer's P-256 key embedded as a `jwk` header
//! - PS256, with the signer's certificate chain embedded as an `x5c` header
//!
//! Parsing only checks structure. Trust decisions live in
//! [`DirectoryServerCertificate::verify_signature`](crate::DirectoryServerCertificate::verify_signature).

use ecdsa::signature::{RandomizedSigner, SignatureEncoding, Signer, Verifier};
use p256::ecdsa::{Signature as EcdsaSignature, SigningKey, VerifyingKey as EcdsaVerifyingKey};
use p256::elliptic_curve::rand_core::OsRng;
use rsa::pss::{BlindedSigningKey, Signature as PssSignature, VerifyingKey as PssVerifyingKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::Value;
use sha2::Sha256;

use crate::base64url::{base64url_decode, base64url_encode};
use crate::ephemeral::EllipticCurvePoint;
use crate::error::CryptoError;
use crate::types::ES256_SIGNATURE_LENGTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JwsAlgorithm {
    Es256,
    Ps256,
}

impl JwsAlgorithm {
    pub fn header_value(self) -> &'static str {
        match self {
            Self::Es256 => "ES256",
            Self::Ps256 => "PS256",
        }
    }

    pub fn from_header(value: &str) -> Option<Self> {
        match value {
            "ES256" => Some(Self::Es256),
            "PS256" => Some(Self::Ps256),
            _ => None,
        }
    }
}

/// A parsed compact JWS.
#[derive(Debug, Clone)]
pub struct JsonWebSignature {
    algorithm: JwsAlgorithm,
    header: Value,
    signing_input: String,
    payload: Vec<u8>,
    signature: Vec<u8>,
    ec_public_key: Option<EllipticCurvePoint>,
    certificate_chain: Vec<String>,
}

impl JsonWebSignature {
    /// Parse a compact serialization `header.payload.signature`.
    ///
    /// With `allow_missing_key` false, a JWS that carries neither a `jwk`
    /// (ES256) nor an `x5c` chain (PS256) is rejected.
    pub fn parse(compact: &str, allow_missing_key: bool) -> Result<Self, CryptoError> {
        let parts: Vec<&str> = compact.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(CryptoError::InvalidJws(format!(
                "expected 3 parts, got {}",
                parts.len()
            )));
        }
        let (header_b64, payload_b64, signature_b64) = (parts[0], parts[1], parts[2]);

        let header_bytes = base64url_decode(header_b64)
            .map_err(|e| CryptoError::InvalidJws(format!("header: {e}")))?;
        let payload = base64url_decode(payload_b64)
            .map_err(|e| CryptoError::InvalidJws(format!("payload: {e}")))?;
        let signature = base64url_decode(signature_b64)
            .map_err(|e| CryptoError::InvalidJws(format!("signature: {e}")))?;
        if signature.is_empty() {
            return Err(CryptoError::InvalidJws("empty signature".to_string()));
        }

        let header: Value = serde_json::from_slice(&header_bytes)
            .map_err(|e| CryptoError::InvalidJws(format!("header: {e}")))?;
        let alg = header
            .get("alg")
            .and_then(Value::as_str)
            .ok_or_else(|| CryptoError::InvalidJws("missing alg in header".to_string()))?;
        let algorithm = JwsAlgorithm::from_header(alg)
            .ok_or_else(|| CryptoError::UnsupportedAlgorithm(format!("JWS alg {alg}")))?;

        let certificate_chain = match header.get("x5c") {
            None => Vec::new(),
            Some(Value::Array(entries)) => entries
                .iter()
                .map(|entry| {
                    entry.as_str().map(str::to_string).ok_or_else(|| {
                        CryptoError::InvalidJws("x5c entries must be strings".to_string())
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(CryptoError::InvalidJws("x5c must be an array".to_string())),
        };
        let ec_public_key = match header.get("jwk") {
            Some(jwk) if algorithm == JwsAlgorithm::Es256 => {
                Some(EllipticCurvePoint::from_jwk(jwk)?)
            }
            _ => None,
        };

        let has_key = match algorithm {
            JwsAlgorithm::Es256 => ec_public_key.is_some(),
            JwsAlgorithm::Ps256 => !certificate_chain.is_empty(),
        };
        if !has_key && !allow_missing_key {
            return Err(CryptoError::InvalidJws(format!(
                "{} JWS carries no key material",
                algorithm.header_value()
            )));
        }

        Ok(Self {
            algorithm,
            header,
            signing_input: format!("{header_b64}.{payload_b64}"),
            payload,
            signature,
            ec_public_key,
            certificate_chain,
        })
    }

    /// Serialize `payload` as an ES256 JWS with the signer's public key in `jwk`.
    pub fn sign_es256(payload: &[u8], key: &SigningKey) -> Result<String, CryptoError> {
        let point = EllipticCurvePoint::from_public_key(p256::PublicKey::from(key.verifying_key()));
        let header = serde_json::json!({
            "alg": JwsAlgorithm::Es256.header_value(),
            "jwk": point.to_jwk(),
        });
        let signing_input = signing_input(&header, payload)?;
        let signature: EcdsaSignature = key
            .try_sign(signing_input.as_bytes())
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        Ok(format!(
            "{signing_input}.{}",
            base64url_encode(&signature.to_bytes())
        ))
    }

    /// Serialize `payload` as a PS256 JWS. `chain` holds base64 DER
    /// certificates, leaf first.
    pub fn sign_ps256(
        payload: &[u8],
        key: &RsaPrivateKey,
        chain: &[String],
    ) -> Result<String, CryptoError> {
        let header = serde_json::json!({
            "alg": JwsAlgorithm::Ps256.header_value(),
            "x5c": chain,
        });
        let signing_input = signing_input(&header, payload)?;
        let signing_key = BlindedSigningKey::<Sha256>::new(key.clone());
        let signature = signing_key
            .try_sign_with_rng(&mut OsRng, signing_input.as_bytes())
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        Ok(format!(
            "{signing_input}.{}",
            base64url_encode(&signature.to_bytes())
        ))
    }

    pub fn algorithm(&self) -> JwsAlgorithm {
        self.algorithm
    }

    pub fn header(&self) -> &Value {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Decode the payload as JSON.
    pub fn payload_json(&self) -> Result<Value, CryptoError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// `base64url(header) || '.' || base64url(payload)`, exactly as received.
    pub fn signing_input(&self) -> &str {
        &self.signing_input
    }

    pub fn ec_public_key(&self) -> Option<&EllipticCurvePoint> {
        self.ec_public_key.as_ref()
    }

    /// `x5c` entries, leaf first.
    pub fn certificate_chain(&self) -> &[String] {
        &self.certificate_chain
    }

    pub(crate) fn verify_es256(&self, key: &EllipticCurvePoint) -> bool {
        if self.algorithm != JwsAlgorithm::Es256 || self.signature.len() != ES256_SIGNATURE_LENGTH
        {
            return false;
        }
        let Ok(verifying_key) = EcdsaVerifyingKey::from_affine(*key.public_key().as_affine())
        else {
            return false;
        };
        let Ok(signature) = EcdsaSignature::from_slice(&self.signature) else {
            return false;
        };
        verifying_key
            .verify(self.signing_input.as_bytes(), &signature)
            .is_ok()
    }

    pub(crate) fn verify_ps256(&self, key: &RsaPublicKey) -> bool {
        if self.algorithm != JwsAlgorithm::Ps256 {
            return false;
        }
        let Ok(signature) = PssSignature::try_from(self.signature.as_slice()) else {
            return false;
        };
        PssVerifyingKey::<Sha256>::new(key.clone())
            .verify(self.signing_input.as_bytes(), &signature)
            .is_ok()
    }
}

fn signing_input(header: &Value, payload: &[u8]) -> Result<String, CryptoError> {
    let header_json = serde_json::to_vec(header)?;
    Ok(format!(
        "{}.{}",
        base64url_encode(&header_json),
        base64url_encode(payload)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn es256_key() -> SigningKey {
        SigningKey::random(&mut OsRng)
    }

    #[test]
    fn parse_exposes_es256_parts() {
        let key = es256_key();
        let payload = br#"{"acsURL":"https://acs.example.com/challenge"}"#;
        let compact = JsonWebSignature::sign_es256(payload, &key).unwrap();

        let jws = JsonWebSignature::parse(&compact, false).unwrap();
        assert_eq!(jws.algorithm(), JwsAlgorithm::Es256);
        assert_eq!(jws.payload(), payload);
        assert_eq!(jws.signature().len(), ES256_SIGNATURE_LENGTH);
        assert!(jws.certificate_chain().is_empty());
        let expected = EllipticCurvePoint::from_public_key(p256::PublicKey::from(key.verifying_key()));
        assert_eq!(jws.ec_public_key(), Some(&expected));
        assert!(jws.verify_es256(&expected));
    }

    #[test]
    fn payload_json_decodes() {
        let compact = JsonWebSignature::sign_es256(br#"{"a":1}"#, &es256_key()).unwrap();
        let jws = JsonWebSignature::parse(&compact, false).unwrap();
        assert_eq!(jws.payload_json().unwrap()["a"], 1);
    }

    #[test]
    fn rejects_wrong_segment_count() {
        for input in ["abc", "a.b", "a.b.c.d", "a.b.c.d.e"] {
            assert!(matches!(
                JsonWebSignature::parse(input, true),
                Err(CryptoError::InvalidJws(_))
            ));
        }
    }

    #[test]
    fn rejects_invalid_base64() {
        let header = base64url_encode(br#"{"alg":"ES256"}"#);
        let compact = format!("{header}.***.AAAA");
        assert!(JsonWebSignature::parse(&compact, true).is_err());
    }

    #[test]
    fn rejects_unsupported_algorithm() {
        let header = base64url_encode(br#"{"alg":"HS256"}"#);
        let compact = format!("{header}.{}.AAAA", base64url_encode(b"{}"));
        assert!(matches!(
            JsonWebSignature::parse(&compact, true),
            Err(CryptoError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn missing_key_respects_flag() {
        let header = base64url_encode(br#"{"alg":"PS256"}"#);
        let compact = format!("{header}.{}.AAAA", base64url_encode(b"{}"));
        assert!(JsonWebSignature::parse(&compact, false).is_err());

        let jws = JsonWebSignature::parse(&compact, true).unwrap();
        assert_eq!(jws.algorithm(), JwsAlgorithm::Ps256);
        assert!(jws.certificate_chain().is_empty());
    }

    #[test]
    fn wrong_key_does_not_verify() {
        let compact = JsonWebSignature::sign_es256(b"payload", &es256_key()).unwrap();
        let jws = JsonWebSignature::parse(&compact, false).unwrap();
        let other = EllipticCurvePoint::from_public_key(p256::PublicKey::from(
            es256_key().verifying_key(),
        ));
        assert!(!jws.verify_es256(&other));
    }
}
