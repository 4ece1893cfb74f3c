use base64::Engine;
use sha2::{Digest, Sha256};

/// SHA-256 content digest, standard base64. Stored on the history row.
pub fn content_hash(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    base64::engine::general_purpose::STANDARD.encode(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_deterministic() {
        let body = b"KEM\t4152500182618\tLaptop";
        assert_eq!(content_hash(body), content_hash(body));
        assert_eq!(content_hash(body).len(), 44);
    }

    #[test]
    fn different_content_different_hash() {
        assert_ne!(content_hash(b"KEM 123456789"), content_hash(b"KEM 123456780"));
    }
}
