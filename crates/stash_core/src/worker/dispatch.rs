use std::{net::SocketAddr, sync::Arc, time::Instant};

use bytes::Bytes;
use http::{Request, Response};
use hyper::body::Body;
use stash_cache::{CacheEntry, CacheKey, CachePolicy, CacheStore};
use stash_http::{
    responses::{build_response, cache_hit, send_400, send_413, send_500},
    CacheStatus, ProxyBody,
};
use stash_proxy::{FetchError, ForwardRequest, Origin, OriginFetcher};
use tracing::{debug, error, info, warn};

use super::body::{read_limited, BodyError};

/// What happened to a request. Exactly one per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Served from the cache, origin not contacted.
    Hit,
    /// Fetched, 2xx, written to the cache.
    Miss,
    /// Fetched, non-2xx, relayed as-is.
    PassThrough,
    /// Fetch failed, 500 sent.
    Failed,
    /// Request body refused before lookup (400 / 413).
    Rejected,
}

impl DispatchOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchOutcome::Hit => "hit",
            DispatchOutcome::Miss => "miss",
            DispatchOutcome::PassThrough => "pass",
            DispatchOutcome::Failed => "error",
            DispatchOutcome::Rejected => "rejected",
        }
    }
}

/// Per-request pipeline shared by every connection.
pub struct Dispatcher {
    cache: Arc<CacheStore>,
    fetcher: Arc<OriginFetcher>,
    max_request_body: usize,
}

impl Dispatcher {
    pub fn new(
        cache: Arc<CacheStore>,
        fetcher: Arc<OriginFetcher>,
        max_request_body: usize,
    ) -> Self {
        Self {
            cache,
            fetcher,
            max_request_body,
        }
    }

    pub fn origin(&self) -> &Origin {
        self.fetcher.origin()
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Entry point for one client request: buffers the body, dispatches and
    /// emits the access-log event.
    pub async fn handle<B>(&self, req: Request<B>, client_addr: SocketAddr) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let started = Instant::now();
        let (parts, body) = req.into_parts();

        let path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let (response, outcome) = match read_limited(body, self.max_request_body).await {
            Ok(body) => {
                let forward = ForwardRequest {
                    method: parts.method.clone(),
                    path: path.clone(),
                    headers: parts.headers,
                    body,
                    client_ip: Some(client_addr.ip()),
                };
                self.dispatch(&forward).await
            }
            Err(BodyError::TooLarge) => {
                warn!(
                    target: "stash::worker",
                    client_addr = %client_addr,
                    limit = self.max_request_body,
                    "Request body too large"
                );
                (send_413(), DispatchOutcome::Rejected)
            }
            Err(BodyError::Read(reason)) => {
                warn!(
                    target: "stash::worker",
                    client_addr = %client_addr,
                    error = %reason,
                    "Failed to read request body"
                );
                (send_400(), DispatchOutcome::Rejected)
            }
        };

        info!(
            target: "stash::worker",
            client_addr = %client_addr,
            method = %parts.method,
            path = %path,
            status = response.status().as_u16(),
            cache = outcome.as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request served"
        );

        response
    }

    /// key -> lookup -> (hit | fetch -> store or pass through | 500).
    ///
    /// The store is written at most once, and only for 2xx origin responses.
    pub async fn dispatch(&self, req: &ForwardRequest) -> (Response<ProxyBody>, DispatchOutcome) {
        let key = CacheKey::for_request(&req.method, &req.path, &req.body);

        if let Some(entry) = self.cache.lookup(&key) {
            debug!(
                target: "stash::cache",
                key = %key,
                body_len = entry.body_len(),
                "Cache HIT"
            );
            return (
                cache_hit(&entry.headers, entry.body.clone()),
                DispatchOutcome::Hit,
            );
        }

        debug!(target: "stash::cache", key = %key, "Cache MISS, fetching from origin");

        match self.fetcher.fetch(req).await {
            Ok(fetched) if CachePolicy::is_cacheable(fetched.status) => {
                let response = build_response(
                    fetched.status,
                    &fetched.headers,
                    fetched.body.clone(),
                    Some(CacheStatus::Miss),
                );

                self.cache
                    .store(key, CacheEntry::new(fetched.headers, fetched.body));

                let stats = self.cache.stats();
                debug!(
                    target: "stash::cache",
                    entries = stats.entries,
                    hits = stats.hits,
                    misses = stats.misses,
                    stores = stats.stores,
                    "Cache stats"
                );

                (response, DispatchOutcome::Miss)
            }
            Ok(fetched) => {
                debug!(
                    target: "stash::cache",
                    key = %key,
                    status = fetched.status.as_u16(),
                    "Non-2xx response, not cached"
                );
                (
                    build_response(fetched.status, &fetched.headers, fetched.body, None),
                    DispatchOutcome::PassThrough,
                )
            }
            Err(e) => {
                log_fetch_error(&key, &e);
                (send_500(e.client_message()), DispatchOutcome::Failed)
            }
        }
    }
}

fn log_fetch_error(key: &CacheKey, e: &FetchError) {
    match e {
        FetchError::TooManyRedirects => warn!(
            target: "stash::proxy",
            key = %key,
            "Redirect limit exceeded"
        ),
        other => error!(
            target: "stash::proxy",
            key = %key,
            error = %other,
            "Error fetching from origin"
        ),
    }
}
