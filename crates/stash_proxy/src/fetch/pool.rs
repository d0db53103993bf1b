use std::time::Instant;

use bytes::Bytes;
use dashmap::DashMap;
use http_body_util::Full;
use hyper::client::conn::http1::SendRequest;
use tokio::time::Duration;
use tracing::debug;

pub(super) type OriginSender = SendRequest<Full<Bytes>>;

struct IdleSender {
    sender: OriginSender,
    last_used: Instant,
}

/// =======================================================
/// ORIGIN CONNECTION POOL
/// =======================================================
///
/// Idle keep-alive connections, keyed by `scheme://host:port` so a redirect
/// to another host (or from http to https) never picks up the wrong socket.
///
/// - LIFO per key: the most recently used connection is the least likely
///   to have been closed by the origin
/// - Entries older than `idle_ttl` are dropped at checkout
/// - At most `max_per_addr` idle connections per key; 0 disables reuse
pub(super) struct ConnectionPool {
    idle: DashMap<String, Vec<IdleSender>>,
    max_per_addr: usize,
    idle_ttl: Duration,
}

impl ConnectionPool {
    pub(super) fn new(max_per_addr: usize, idle_ttl: Duration) -> Self {
        Self {
            idle: DashMap::new(),
            max_per_addr,
            idle_ttl,
        }
    }

    /// Takes a live idle connection for `key`, if any.
    pub(super) async fn checkout(&self, key: &str) -> Option<OriginSender> {
        loop {
            let pooled = self.idle.get_mut(key)?.pop()?;

            if !self.idle_ttl.is_zero() && pooled.last_used.elapsed() > self.idle_ttl {
                debug!(target: "stash::proxy", origin = %key, "Dropping expired pooled connection");
                continue;
            }

            let mut sender = pooled.sender;
            match sender.ready().await {
                Ok(()) => {
                    debug!(target: "stash::proxy", origin = %key, "Reusing pooled origin connection");
                    return Some(sender);
                }
                Err(e) => {
                    debug!(
                        target: "stash::proxy",
                        origin = %key,
                        error = ?e,
                        "Pooled connection closed by origin"
                    );
                }
            }
        }
    }

    /// Returns a connection after a fully read response.
    pub(super) fn checkin(&self, key: &str, sender: OriginSender) {
        if self.max_per_addr == 0 || sender.is_closed() {
            return;
        }

        let mut entry = self.idle.entry(key.to_string()).or_default();
        if entry.len() >= self.max_per_addr {
            debug!(target: "stash::proxy", origin = %key, "Pool full; dropping connection");
            return;
        }
        entry.push(IdleSender {
            sender,
            last_used: Instant::now(),
        });

        debug!(target: "stash::proxy", origin = %key, "Returned origin connection to pool");
    }
}
