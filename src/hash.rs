use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `bytes`, the form carried in `sha256=` lines.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hex digests from other producers may be uppercase.
pub fn digest_matches(expected: &str, actual: &str) -> bool {
    expected.eq_ignore_ascii_case(actual)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanity_check() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            sha256_hex(&[]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn comparison_ignores_case() {
        let digest = sha256_hex(b"abc");
        assert!(digest_matches(&digest.to_uppercase(), &digest));
        assert!(!digest_matches(&sha256_hex(b"abd"), &digest));
    }
}
