//! Origin side of the proxy.
//!
//! [`OriginFetcher`] resolves a client path against the configured
//! [`Origin`], sends the request over plain TCP or TLS, buffers the whole
//! response and chases redirects (at most [`MAX_REDIRECTS`] of them).

mod error;
mod fetch;
mod origin;

pub use error::FetchError;
pub use fetch::{FetchSettings, FetchedResponse, ForwardRequest, OriginFetcher, MAX_REDIRECTS};
pub use origin::Origin;
