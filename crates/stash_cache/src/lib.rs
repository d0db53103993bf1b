//! In-memory response cache for the proxy.
//!
//! - [`CacheKey`]: request identity (`METHOD|PATH[|sha256]`)
//! - [`CacheEntry`]: immutable snapshot of a 2xx origin response
//! - [`CachePolicy`]: what gets stored and which requests carry a body
//! - [`CacheStore`]: concurrent map shared by every connection

pub mod entry;
pub mod key;
pub mod policy;
pub mod store;

pub use entry::CacheEntry;
pub use key::CacheKey;
pub use policy::CachePolicy;
pub use store::{CacheStats, CacheStore};
