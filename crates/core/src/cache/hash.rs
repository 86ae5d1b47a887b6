//! Request identity keys.

use sha2::{Digest, Sha256};

/// Compute the partition key for a request: SHA-256 over method and URL.
pub fn compute_cache_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_stability() {
        let a = compute_cache_key("GET", "http://localhost:3000/");
        let b = compute_cache_key("GET", "http://localhost:3000/");
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_distinguishes_paths() {
        let root = compute_cache_key("GET", "http://localhost:3000/");
        let index = compute_cache_key("GET", "http://localhost:3000/index.html");
        assert_ne!(root, index);
    }

    #[test]
    fn test_key_no_separator_collision() {
        let a = compute_cache_key("GET", "x");
        let b = compute_cache_key("GETx", "");
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_format() {
        let key = compute_cache_key("GET", "http://localhost:3000/");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
