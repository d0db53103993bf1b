use std::net::IpAddr;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, header::LOCATION};
use stash_config::StashConfig;
use stash_http::headers::strip_hop_by_hop;
use tokio::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::{FetchError, Origin};

mod outbound;
mod pool;
mod transport;

use transport::Transport;

/// Redirects followed after the first request. The 6th redirect response
/// aborts the fetch.
pub const MAX_REDIRECTS: u8 = 5;

/// Client request as forwarded to the origin on every hop. The body is
/// already fully buffered.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    /// Path + query, as received from the client.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub client_ip: Option<IpAddr>,
}

/// Terminal (non-redirect) origin response.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    /// Hop-by-hop headers already removed.
    pub headers: HeaderMap,
    pub body: Bytes,
    /// URL that produced this response (after redirects).
    pub url: Url,
    pub redirects: u8,
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
    pub max_response_body: usize,
    /// Idle keep-alive connections kept per `scheme://host:port`.
    pub pool_max_per_addr: usize,
    pub pool_idle_timeout: Duration,
}

impl FetchSettings {
    pub fn from_config(cfg: &StashConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(cfg.origin.connect_timeout_secs),
            response_timeout: Duration::from_secs(cfg.origin.response_timeout_secs),
            max_response_body: usize::try_from(cfg.limits.max_response_body_bytes)
                .unwrap_or(usize::MAX),
            pool_max_per_addr: cfg.origin.pool_max_per_addr,
            pool_idle_timeout: Duration::from_secs(cfg.origin.pool_idle_timeout_secs),
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(30),
            max_response_body: 64 * 1024 * 1024,
            pool_max_per_addr: 32,
            pool_idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Estado transitorio de una peticion: URL actual + contador de redirects.
struct RedirectChain {
    target: Url,
    redirects: u8,
}

impl RedirectChain {
    fn new(target: Url) -> Self {
        Self {
            target,
            redirects: 0,
        }
    }

    /// Moves to the next hop. Fails once more than [`MAX_REDIRECTS`]
    /// redirects have been seen.
    fn follow(&mut self, origin: &Origin, location: &str) -> Result<(), FetchError> {
        let next = self
            .target
            .join(location)
            .map_err(|e| FetchError::invalid_url(location, e))?;

        self.redirects += 1;
        if self.redirects > MAX_REDIRECTS {
            return Err(FetchError::TooManyRedirects);
        }

        // Same origin: re-resolve the stripped path against it.
        // Anything else is followed as an absolute URL.
        self.target = match origin.relative_path(&next) {
            Some(path) => origin.resolve(&path)?,
            None => next,
        };

        Ok(())
    }
}

pub struct OriginFetcher {
    origin: Origin,
    transport: Transport,
}

impl OriginFetcher {
    pub fn new(origin: Origin, settings: FetchSettings) -> Self {
        Self {
            origin,
            transport: Transport::new(&settings),
        }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Fetches `req.path` from the origin, chasing 3xx + `Location` until a
    /// terminal response arrives. Hops are strictly sequential and all reuse
    /// the same method, headers and body. Never retries.
    #[instrument(
        skip(self, req),
        fields(method = %req.method, path = %req.path, origin = %self.origin)
    )]
    pub async fn fetch(&self, req: &ForwardRequest) -> Result<FetchedResponse, FetchError> {
        let mut chain = RedirectChain::new(self.origin.resolve(&req.path)?);

        loop {
            let request = outbound::build_request(&chain.target, req)?;

            info!(
                target: "stash::proxy",
                method = %req.method,
                url = %chain.target,
                hop = chain.redirects,
                "Forwarding request to origin"
            );

            let (parts, body) = self.transport.send(&chain.target, request).await?;

            let status = parts.status;
            if !(100..=599).contains(&status.as_u16()) {
                warn!(
                    target: "stash::proxy",
                    status = status.as_u16(),
                    url = %chain.target,
                    "Origin returned a status outside 100..=599"
                );
                return Err(FetchError::InvalidStatus(status.as_u16()));
            }

            if status.is_redirection()
                && let Some(location) = parts.headers.get(LOCATION)
            {
                let location = location
                    .to_str()
                    .map_err(|e| FetchError::invalid_url(String::from_utf8_lossy(location.as_bytes()), e))?;

                debug!(
                    target: "stash::proxy",
                    status = status.as_u16(),
                    %location,
                    redirects = chain.redirects,
                    "Origin redirected"
                );

                if let Err(e) = chain.follow(&self.origin, location) {
                    warn!(
                        target: "stash::proxy",
                        url = %chain.target,
                        redirects = chain.redirects,
                        error = %e,
                        "Giving up on redirect chain"
                    );
                    return Err(e);
                }
                continue;
            }

            let mut headers = parts.headers;
            strip_hop_by_hop(&mut headers);

            debug!(
                target: "stash::proxy",
                status = status.as_u16(),
                body_len = body.len(),
                redirects = chain.redirects,
                "Received terminal origin response"
            );

            return Ok(FetchedResponse {
                status,
                headers,
                body,
                url: chain.target,
                redirects: chain.redirects,
            });
        }
    }
}
