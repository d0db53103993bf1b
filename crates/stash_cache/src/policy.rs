use http::{Method, StatusCode};

pub struct CachePolicy;

impl CachePolicy {
    /// Only terminal 2xx responses are stored.
    pub fn is_cacheable(status: StatusCode) -> bool {
        status.is_success()
    }

    /// POST/PUT/PATCH always carry a body (possibly empty); any other method
    /// only when it actually arrived with one.
    pub fn carries_body(method: &Method, body_len: usize) -> bool {
        matches!(*method, Method::POST | Method::PUT | Method::PATCH) || body_len > 0
    }
}

#[cfg(test)]
mod tests {
    use super::CachePolicy;
    use http::{Method, StatusCode};

    #[test]
    fn only_2xx_is_cacheable() {
        assert!(CachePolicy::is_cacheable(StatusCode::OK));
        assert!(CachePolicy::is_cacheable(StatusCode::NO_CONTENT));
        assert!(!CachePolicy::is_cacheable(StatusCode::FOUND));
        assert!(!CachePolicy::is_cacheable(StatusCode::NOT_FOUND));
        assert!(!CachePolicy::is_cacheable(StatusCode::BAD_GATEWAY));
    }

    #[test]
    fn body_methods() {
        assert!(CachePolicy::carries_body(&Method::POST, 0));
        assert!(CachePolicy::carries_body(&Method::PUT, 3));
        assert!(!CachePolicy::carries_body(&Method::GET, 0));
        assert!(CachePolicy::carries_body(&Method::DELETE, 1));
    }
}
