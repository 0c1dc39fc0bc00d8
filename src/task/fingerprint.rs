use sha2::{Digest, Sha256};

/// Content fingerprint of a chunk: lowercase hex SHA-256 of its exact text.
///
/// Whitespace-sensitive: any change to the extracted text, formatting
/// included, yields a new identity.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_text_identical_fingerprint() {
        assert_eq!(fingerprint("foo bar. Baz qux."), fingerprint("foo bar. Baz qux."));
    }

    #[test]
    fn test_whitespace_changes_identity() {
        assert_ne!(fingerprint("foo bar"), fingerprint("foo  bar"));
        assert_ne!(fingerprint("foo bar"), fingerprint("foo bar\n"));
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            fingerprint(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(fingerprint("abc").len(), 64);
    }
}
