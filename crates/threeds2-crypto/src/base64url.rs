use base64ct::{Base64, Base64UrlUnpadded, Encoding};

/// Base64url encode bytes without padding.
pub fn base64url_encode(data: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(data)
}

/// Base64url decode a string to bytes.
///
/// Trailing `=` padding is tolerated; some ACS implementations emit it.
pub fn base64url_decode(s: &str) -> Result<Vec<u8>, base64ct::Error> {
    Base64UrlUnpadded::decode_vec(s.trim_end_matches('='))
}

/// Standard (padded) base64 decode, ignoring embedded whitespace.
///
/// Used for `x5c` entries and certificate strings in configuration.
pub fn base64_decode(s: &str) -> Result<Vec<u8>, base64ct::Error> {
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    Base64::decode_vec(&compact)
}

/// Standard (padded) base64 encode.
pub fn base64_encode(data: &[u8]) -> String {
    Base64::encode_string(data)
}
