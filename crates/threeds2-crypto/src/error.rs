use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Operation requires an {expected} key, certificate holds {actual}")]
    UnsupportedKeyType {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("Unknown directory server: {0}")]
    UnknownDirectoryServer(String),

    #[error("Invalid JWK: {0}")]
    InvalidJwk(String),

    #[error("Invalid JWS: {0}")]
    InvalidJws(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Deliberately carries no detail. Every JWE decryption failure maps here.
    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    #[error("Key agreement failed: {0}")]
    KeyAgreementFailed(String),

    #[error("Random number generation failed: {0}")]
    RngFailed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
