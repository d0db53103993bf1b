use std::fmt;

use http::Method;
use sha2::{Digest, Sha256};

use crate::policy::CachePolicy;

/// Identity of a request in the cache.
///
/// `METHOD|PATH` or `METHOD|PATH|hex(sha256(body))`. The path includes the
/// query string. The body digest is always computed over the whole,
/// already-buffered body.
#[derive(Clone, Hash, Eq, PartialEq, Debug)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(method: &Method, path: &str, body: Option<&[u8]>) -> Self {
        let mut key = format!("{}|{}", method.as_str(), path);

        if let Some(body) = body {
            let digest = Sha256::digest(body);
            key.push('|');
            key.push_str(&hex::encode(digest));
        }

        Self(key)
    }

    /// Derives the key for an inbound request, applying
    /// [`CachePolicy::carries_body`] to decide whether the digest is part of it.
    pub fn for_request(method: &Method, path: &str, body: &[u8]) -> Self {
        let body = CachePolicy::carries_body(method, body.len()).then_some(body);
        Self::derive(method, path, body)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::CacheKey;
    use http::Method;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn derive_without_body_is_method_and_path() {
        let key = CacheKey::derive(&Method::GET, "/a?b=1", None);
        assert_eq!(key.as_str(), "GET|/a?b=1");
    }

    #[test]
    fn derive_appends_body_digest() {
        let key = CacheKey::derive(&Method::POST, "/submit", Some(b""));
        assert_eq!(key.as_str(), format!("POST|/submit|{EMPTY_SHA256}"));
    }

    #[test]
    fn derive_is_deterministic() {
        let a = CacheKey::derive(&Method::POST, "/submit", Some(b"payload"));
        let b = CacheKey::derive(&Method::POST, "/submit", Some(b"payload"));
        assert_eq!(a, b);
    }

    #[test]
    fn derive_distinguishes_bodies() {
        let a = CacheKey::derive(&Method::POST, "/submit", Some(b"one"));
        let b = CacheKey::derive(&Method::POST, "/submit", Some(b"two"));
        assert_ne!(a, b);
    }

    #[test]
    fn for_request_hashes_empty_post_body() {
        let key = CacheKey::for_request(&Method::POST, "/submit", b"");
        assert!(key.as_str().ends_with(EMPTY_SHA256));
    }

    #[test]
    fn for_request_skips_digest_for_bodyless_get() {
        let key = CacheKey::for_request(&Method::GET, "/a", b"");
        assert_eq!(key.as_str(), "GET|/a");
    }

    #[test]
    fn for_request_hashes_unexpected_get_body() {
        let with_body = CacheKey::for_request(&Method::GET, "/a", b"q");
        let without = CacheKey::for_request(&Method::GET, "/a", b"");
        assert_ne!(with_body, without);
    }
}
