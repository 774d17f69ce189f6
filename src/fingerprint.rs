//! Request fingerprinting for diagnostics and tape file integrity

use sha2::{Digest, Sha256};

use crate::message::Request;

/// Compute SHA-256 fingerprint of a request
///
/// The fingerprint includes:
/// 1. Method (uppercase normalized)
/// 2. URI (trimmed)
/// 3. Headers (sorted, names lowercased, values trimmed)
/// 4. Body
///
/// Every field is length-prefixed so adjacent fields cannot alias.
#[must_use]
pub fn fingerprint_request(request: &Request) -> [u8; 32] {
    let mut hasher = Sha256::new();

    // 1. Method
    let method = request.method.to_uppercase();
    hasher.update((method.len() as u32).to_le_bytes());
    hasher.update(method.as_bytes());

    // 2. URI
    let uri = request.uri.trim();
    hasher.update((uri.len() as u32).to_le_bytes());
    hasher.update(uri.as_bytes());

    // 3. Headers
    let mut headers: Vec<_> = request
        .headers
        .iter()
        .map(|(name, value)| (name.to_lowercase(), value.trim()))
        .collect();
    headers.sort_unstable();
    hasher.update((headers.len() as u32).to_le_bytes());
    for (name, value) in &headers {
        hasher.update((name.len() as u32).to_le_bytes());
        hasher.update(name.as_bytes());
        hasher.update((value.len() as u32).to_le_bytes());
        hasher.update(value.as_bytes());
    }

    // 4. Body
    hasher.update((request.body.len() as u32).to_le_bytes());
    hasher.update(&request.body);

    hasher.finalize().into()
}

/// Short hex form of a fingerprint for log lines
#[must_use]
pub fn short_hex(fingerprint: &[u8; 32]) -> String {
    hex::encode(&fingerprint[..8])
}

/// SHA-256 digest of a tape name, stored in tape file headers
#[must_use]
pub fn name_digest(name: &str) -> [u8; 32] {
    Sha256::digest(name.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_request() -> Request {
        Request::new("GET", "http://example.com/api/test")
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let request = test_request();
        assert_eq!(
            fingerprint_request(&request),
            fingerprint_request(&request),
            "Fingerprint must be deterministic"
        );
    }

    #[test]
    fn test_fingerprint_different_methods() {
        let mut other = test_request();
        other.method = "POST".to_string();

        assert_ne!(
            fingerprint_request(&test_request()),
            fingerprint_request(&other),
            "Different methods should produce different hashes"
        );
    }

    #[test]
    fn test_fingerprint_different_bodies() {
        let with_body = test_request().with_body("payload");

        assert_ne!(
            fingerprint_request(&test_request()),
            fingerprint_request(&with_body)
        );
    }

    #[test]
    fn test_header_order_independence() {
        let req1 = test_request()
            .with_header("Content-Type", "application/json")
            .with_header("Accept", "application/json");
        let req2 = test_request()
            .with_header("Accept", "application/json")
            .with_header("Content-Type", "application/json");

        assert_eq!(
            fingerprint_request(&req1),
            fingerprint_request(&req2),
            "Header order should not affect fingerprint"
        );
    }

    #[test]
    fn test_header_case_insensitivity() {
        let req1 = test_request().with_header("Content-Type", "application/json");
        let req2 = test_request().with_header("content-type", "application/json");

        assert_eq!(
            fingerprint_request(&req1),
            fingerprint_request(&req2),
            "Header names should be case-insensitive"
        );
    }

    #[test]
    fn test_short_hex() {
        let fingerprint = [0xab; 32];
        assert_eq!(short_hex(&fingerprint), "abababababababab");
    }

    #[test]
    fn test_name_digest_differs_per_name() {
        assert_ne!(name_digest("episode1"), name_digest("episode2"));
    }
}
