use sha2::{Digest, Sha256};

/// Computes the hex-encoded SHA-256 digest of a byte slice.
///
/// # Example
///
/// ```
/// use bazaar_utils::hash::sha256_hex;
///
/// assert_eq!(
///     sha256_hex(b"hello world\n"),
///     "a948904f2f0f479b8f8197694b30184b0d2ed1c1cd2a1ec0fb85d299a192a447"
/// );
/// ```
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compares the SHA-256 digest of `data` against `expected`, ignoring hex case.
pub fn verify_checksum(data: &[u8], expected: &str) -> bool {
    sha256_hex(data).eq_ignore_ascii_case(expected.trim())
}
