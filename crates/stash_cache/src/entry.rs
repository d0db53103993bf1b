use bytes::Bytes;
use http::HeaderMap;

/// Snapshot of a successful (2xx) origin response.
///
/// Never mutated once stored; a new fetch for the same key replaces it.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CacheEntry {
    pub fn new(headers: HeaderMap, body: Bytes) -> Self {
        Self { headers, body }
    }

    pub fn body_len(&self) -> usize {
        self.body.len()
    }
}
