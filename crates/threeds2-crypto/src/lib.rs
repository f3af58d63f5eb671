//! Cryptographic primitives for EMV 3-D Secure 2.
//!
//! - Directory server certificates and the DS key table
//! - Per-transaction P-256 key pairs and the Concat KDF
//! - Compact JWE for device data and challenge messages
//! - Compact JWS for the ACS signed content

pub mod base64url;
pub mod certificate;
mod content;
pub mod directory;
pub mod ephemeral;
pub mod error;
pub mod jwe;
pub mod jws;
pub mod kdf;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use base64url::{base64_decode, base64_encode, base64url_decode, base64url_encode};
pub use certificate::{DirectoryServerCertificate, KeyType};
pub use content::ContentEncryption;
pub use directory::{DirectoryServer, DirectoryServerKeys, DirectoryServerRegistry};
pub use ephemeral::{ContentEncryptionKey, EllipticCurvePoint, EphemeralKeyPair, SharedSecret};
pub use error::CryptoError;
pub use jwe::{
    decrypt, decrypt_with_direction, decrypt_with_ec_key, decrypt_with_rsa_key, encrypt_direct,
    encrypt_direct_with, encrypt_for_directory_server, encrypt_with_certificate, Direction,
};
pub use jws::{JsonWebSignature, JwsAlgorithm};
pub use kdf::{concat_kdf, ConcatKdfInfo};
pub use types::CEK_LENGTH;
