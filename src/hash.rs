//! SHA-1 hex digests used for line codes and discussion identities.

use sha1::{Digest, Sha1};

/// Compute the SHA-1 digest of arbitrary bytes as lowercase hex.
pub fn sha1_hex(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Compute the SHA-1 digest of a string.
pub fn sha1_str(s: &str) -> String {
    sha1_hex(s.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(sha1_str("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_hash_length_and_case() {
        let h = sha1_str("files/ruby/popen.rb");
        assert_eq!(h.len(), 40);
        assert!(h.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }
}
