/// Content-encryption key length for A128CBC-HS256 and for the derived
/// challenge CEK (256 bits).
pub const CEK_LENGTH: usize = 32;

/// AES-128 key length in bytes.
pub const AES_128_KEY_LENGTH: usize = 16;

/// AES-CBC IV length in bytes.
pub const CBC_IV_LENGTH: usize = 16;

/// AES-GCM IV length in bytes (96 bits per NIST recommendation).
pub const GCM_IV_LENGTH: usize = 12;

/// Authentication tag length for both supported content encryptions.
pub const TAG_LENGTH: usize = 16;

/// P-256 field element length in bytes.
pub const P256_COORDINATE_LENGTH: usize = 32;

/// ES256 signature length (IEEE P1363 r||s).
pub const ES256_SIGNATURE_LENGTH: usize = 64;
