//! Per-transaction P-256 key pair and ECDH key agreement.
//!
//! The raw ECDH output is wrapped in [`SharedSecret`], which only yields key
//! material through the Concat KDF.

use std::fmt;

use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::{EncodedPoint, FieldBytes, PublicKey, SecretKey};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::base64url::{base64url_decode, base64url_encode};
use crate::error::CryptoError;
use crate::kdf::{concat_kdf, ConcatKdfInfo};
use crate::types::{CEK_LENGTH, P256_COORDINATE_LENGTH};

const KEY_GENERATION_ATTEMPTS: usize = 8;

/// A validated point on P-256.
#[derive(Clone, PartialEq, Eq)]
pub struct EllipticCurvePoint {
    key: PublicKey,
}

impl EllipticCurvePoint {
    pub fn from_public_key(key: PublicKey) -> Self {
        Self { key }
    }

    /// Build a point from big-endian affine coordinates.
    ///
    /// Coordinates shorter than 32 bytes are left-padded; JWKs may omit
    /// leading zeros.
    pub fn from_coordinates(x: &[u8], y: &[u8]) -> Result<Self, CryptoError> {
        if x.len() > P256_COORDINATE_LENGTH || y.len() > P256_COORDINATE_LENGTH {
            return Err(CryptoError::InvalidJwk(
                "coordinate longer than 32 bytes".to_string(),
            ));
        }
        let mut uncompressed = Vec::with_capacity(1 + 2 * P256_COORDINATE_LENGTH);
        uncompressed.push(0x04);
        uncompressed.extend(std::iter::repeat_n(0u8, P256_COORDINATE_LENGTH - x.len()));
        uncompressed.extend_from_slice(x);
        uncompressed.extend(std::iter::repeat_n(0u8, P256_COORDINATE_LENGTH - y.len()));
        uncompressed.extend_from_slice(y);

        let point = EncodedPoint::from_bytes(&uncompressed)
            .map_err(|e| CryptoError::InvalidJwk(format!("invalid EC point: {e}")))?;
        let key = PublicKey::from_encoded_point(&point)
            .into_option()
            .ok_or_else(|| CryptoError::InvalidJwk("EC point not on P-256 curve".to_string()))?;
        Ok(Self { key })
    }

    /// Import from an EC public JWK (`kty` = EC, `crv` = P-256).
    pub fn from_jwk(jwk: &Value) -> Result<Self, CryptoError> {
        let kty = jwk.get("kty").and_then(Value::as_str);
        if kty != Some("EC") {
            return Err(CryptoError::InvalidJwk(format!(
                "expected kty EC, got {}",
                kty.unwrap_or("nothing")
            )));
        }
        let crv = jwk.get("crv").and_then(Value::as_str);
        if crv != Some("P-256") {
            return Err(CryptoError::InvalidJwk(format!(
                "expected crv P-256, got {}",
                crv.unwrap_or("nothing")
            )));
        }
        let x_b64 = jwk
            .get("x")
            .and_then(Value::as_str)
            .ok_or_else(|| CryptoError::InvalidJwk("missing x coordinate".to_string()))?;
        let y_b64 = jwk
            .get("y")
            .and_then(Value::as_str)
            .ok_or_else(|| CryptoError::InvalidJwk("missing y coordinate".to_string()))?;
        let x = base64url_decode(x_b64).map_err(|e| CryptoError::InvalidJwk(format!("x: {e}")))?;
        let y = base64url_decode(y_b64).map_err(|e| CryptoError::InvalidJwk(format!("y: {e}")))?;
        Self::from_coordinates(&x, &y)
    }

    pub fn to_jwk(&self) -> Value {
        let (x, y) = self.coordinates();
        serde_json::json!({
            "kty": "EC",
            "crv": "P-256",
            "x": base64url_encode(&x),
            "y": base64url_encode(&y),
        })
    }

    pub fn x(&self) -> Vec<u8> {
        self.coordinates().0.to_vec()
    }

    pub fn y(&self) -> Vec<u8> {
        self.coordinates().1.to_vec()
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.key
    }

    fn coordinates(&self) -> (FieldBytes, FieldBytes) {
        // Uncompressed SEC1 encoding: 0x04 || x || y.
        let point = self.key.to_encoded_point(false);
        let bytes = point.as_bytes();
        let x = &bytes[1..1 + P256_COORDINATE_LENGTH];
        let y = &bytes[1 + P256_COORDINATE_LENGTH..];
        (*FieldBytes::from_slice(x), *FieldBytes::from_slice(y))
    }
}

impl fmt::Debug for EllipticCurvePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EllipticCurvePoint")
            .field("x", &base64url_encode(&self.x()))
            .field("y", &base64url_encode(&self.y()))
            .finish()
    }
}

/// Raw ECDH output. Zeroized on drop.
pub struct SharedSecret {
    z: Zeroizing<[u8; P256_COORDINATE_LENGTH]>,
}

impl SharedSecret {
    /// The raw secret `Z`. Never use this directly as a key.
    pub fn as_bytes(&self) -> &[u8] {
        self.z.as_slice()
    }

    /// Run the Concat KDF over `Z` and return a 256-bit content-encryption key.
    pub fn derive_content_encryption_key(
        &self,
        info: &ConcatKdfInfo,
    ) -> Result<ContentEncryptionKey, CryptoError> {
        self.derive_key(CEK_LENGTH, info)
    }

    pub fn derive_key(
        &self,
        key_len: usize,
        info: &ConcatKdfInfo,
    ) -> Result<ContentEncryptionKey, CryptoError> {
        Ok(ContentEncryptionKey {
            bytes: concat_kdf(self.as_bytes(), key_len, info)?,
        })
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

/// Symmetric key derived from a [`SharedSecret`]. Zeroized on drop.
#[derive(Clone)]
pub struct ContentEncryptionKey {
    bytes: Zeroizing<Vec<u8>>,
}

impl ContentEncryptionKey {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: Zeroizing::new(bytes.to_vec()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ContentEncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentEncryptionKey({} bytes)", self.bytes.len())
    }
}

/// Ephemeral P-256 key pair. One per transaction.
pub struct EphemeralKeyPair {
    secret: SecretKey,
    public: EllipticCurvePoint,
}

impl EphemeralKeyPair {
    /// Generate a fresh key pair from the OS random source.
    pub fn generate() -> Result<Self, CryptoError> {
        for _ in 0..KEY_GENERATION_ATTEMPTS {
            let mut candidate = Zeroizing::new([0u8; P256_COORDINATE_LENGTH]);
            getrandom::getrandom(candidate.as_mut_slice())
                .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))?;
            // Out-of-range scalars are rejected by from_slice; draw again.
            if let Ok(secret) = SecretKey::from_slice(candidate.as_slice()) {
                return Ok(Self::from_secret(secret));
            }
        }
        Err(CryptoError::KeyGenerationFailed(
            "no valid P-256 scalar drawn".to_string(),
        ))
    }

    /// Rebuild a key pair from a 32-byte private scalar.
    pub fn from_secret_bytes(scalar: &[u8]) -> Result<Self, CryptoError> {
        let secret = SecretKey::from_slice(scalar)
            .map_err(|e| CryptoError::KeyGenerationFailed(format!("invalid scalar: {e}")))?;
        Ok(Self::from_secret(secret))
    }

    pub fn from_secret(secret: SecretKey) -> Self {
        let public = EllipticCurvePoint::from_public_key(secret.public_key());
        Self { secret, public }
    }

    pub fn public_key_jwk(&self) -> Value {
        self.public.to_jwk()
    }

    pub fn public_key_point(&self) -> &EllipticCurvePoint {
        &self.public
    }

    /// ECDH with the peer's public point.
    pub fn derive_shared_secret(
        &self,
        peer: &EllipticCurvePoint,
    ) -> Result<SharedSecret, CryptoError> {
        let shared =
            p256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), peer.key.as_affine());
        let raw = shared.raw_secret_bytes();
        if raw.iter().all(|b| *b == 0) {
            return Err(CryptoError::KeyAgreementFailed(
                "degenerate shared secret".to_string(),
            ));
        }
        let mut z = Zeroizing::new([0u8; P256_COORDINATE_LENGTH]);
        z.copy_from_slice(raw.as_slice());
        Ok(SharedSecret { z })
    }
}

impl fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVATE_SCALAR: &str = "c9afa9d845ba75166b5c215767b1d6934e50c3db36e89b127b8a622b120f6721";
    const PEER_X: &str = "f77f4c3c67be0834c8ba25d24157c68da61cb9aa1c4b634ceef8af33bf5063ad";
    const PEER_Y: &str = "9923b66992f3f1aeb020dfe4376c9b0573779ed6caa2fc627d73c955fed2a7bb";
    const SHARED_Z: &str = "ad934b5bf2df606c2804f08eb0ef3555b39bc4b7a5e0a0867d446070f5b09441";
    const DERIVED_CEK: &str = "911b8fdb5c673a4b09bfe2151742158a4ad34fc0e9c3a5b1b7576bc4e1862c6f";
    const SDK_TRANS_ID: &str = "8a880dc0-d2d2-4067-bcb1-b08d1690b26e";
    const ACS_TRANS_ID: &str = "d7c1ee99-9478-44a6-b1f2-391e29c6b340";

    fn reference_peer() -> EllipticCurvePoint {
        EllipticCurvePoint::from_coordinates(
            &hex::decode(PEER_X).unwrap(),
            &hex::decode(PEER_Y).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn shared_secret_and_kdf_match_reference_vector() {
        let pair = EphemeralKeyPair::from_secret_bytes(&hex::decode(PRIVATE_SCALAR).unwrap())
            .unwrap();
        let secret = pair.derive_shared_secret(&reference_peer()).unwrap();
        assert_eq!(hex::encode(secret.as_bytes()), SHARED_Z);

        let cek = secret
            .derive_content_encryption_key(&ConcatKdfInfo::for_challenge(
                SDK_TRANS_ID,
                ACS_TRANS_ID,
            ))
            .unwrap();
        assert_eq!(hex::encode(cek.as_bytes()), DERIVED_CEK);
    }

    #[test]
    fn both_sides_derive_same_key() {
        let sdk = EphemeralKeyPair::generate().unwrap();
        let acs = EphemeralKeyPair::generate().unwrap();
        let info = ConcatKdfInfo::for_challenge("sdk", "acs");

        let a = sdk
            .derive_shared_secret(acs.public_key_point())
            .unwrap()
            .derive_content_encryption_key(&info)
            .unwrap();
        let b = acs
            .derive_shared_secret(sdk.public_key_point())
            .unwrap()
            .derive_content_encryption_key(&info)
            .unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_eq!(a.len(), CEK_LENGTH);
    }

    #[test]
    fn derived_key_differs_from_raw_secret() {
        let sdk = EphemeralKeyPair::generate().unwrap();
        let acs = EphemeralKeyPair::generate().unwrap();
        let secret = sdk.derive_shared_secret(acs.public_key_point()).unwrap();
        let cek = secret
            .derive_content_encryption_key(&ConcatKdfInfo::for_challenge("s", "a"))
            .unwrap();
        assert_ne!(cek.as_bytes(), secret.as_bytes());
    }

    #[test]
    fn jwk_round_trip() {
        let pair = EphemeralKeyPair::generate().unwrap();
        let jwk = pair.public_key_jwk();
        assert_eq!(jwk["kty"], "EC");
        assert_eq!(jwk["crv"], "P-256");
        let point = EllipticCurvePoint::from_jwk(&jwk).unwrap();
        assert_eq!(&point, pair.public_key_point());
    }

    #[test]
    fn coordinates_come_back_as_given() {
        let peer = reference_peer();
        assert_eq!(hex::encode(peer.x()), PEER_X);
        assert_eq!(hex::encode(peer.y()), PEER_Y);
        assert_eq!(peer.to_jwk()["x"], base64url_encode(&hex::decode(PEER_X).unwrap()));
    }

    #[test]
    fn rejects_wrong_curve_and_off_curve_points() {
        let mut jwk = EphemeralKeyPair::generate().unwrap().public_key_jwk();
        jwk["crv"] = "P-384".into();
        assert!(EllipticCurvePoint::from_jwk(&jwk).is_err());

        assert!(EllipticCurvePoint::from_coordinates(&[1u8; 32], &[2u8; 32]).is_err());
    }

    #[test]
    fn rejects_missing_coordinates() {
        let jwk = serde_json::json!({"kty": "EC", "crv": "P-256", "x": "AAAA"});
        assert!(matches!(
            EllipticCurvePoint::from_jwk(&jwk),
            Err(CryptoError::InvalidJwk(_))
        ));
    }

    #[test]
    fn rejects_zero_scalar() {
        assert!(EphemeralKeyPair::from_secret_bytes(&[0u8; 32]).is_err());
    }

    #[test]
    fn debug_output_redacts_private_key() {
        let pair = EphemeralKeyPair::generate().unwrap();
        let rendered = format!("{pair:?}");
        assert!(rendered.contains("EphemeralKeyPair"));
        assert!(!rendered.contains("secret"));
    }
}
