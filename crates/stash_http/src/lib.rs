pub mod headers;
pub mod responses;

pub use responses::{CacheStatus, ProxyBody, X_CACHE};
