use std::sync::Arc;

use stash_proxy::{FetchSettings, Origin, OriginFetcher};
use tokio::sync::Semaphore;
use tracing::info;

use super::Master;
use crate::worker::Dispatcher;

impl Master {
    pub(super) fn log_startup(&self) {
        info!(target: "stash::master", "Starting STASH MASTER");
        self.cfg.log_summary();
    }

    pub(super) fn init_semaphore(&self) -> Arc<Semaphore> {
        let max_conns = self.cfg.server.max_connections as usize;
        let semaphore = Arc::new(Semaphore::new(max_conns));
        info!(
            target: "stash::master",
            max_conns,
            "Global connection semaphore initialized"
        );
        semaphore
    }

    pub(super) fn build_dispatcher(&self) -> anyhow::Result<Dispatcher> {
        let origin = Origin::parse(self.cfg.origin_url()?)?;
        let fetcher = OriginFetcher::new(origin, FetchSettings::from_config(&self.cfg));
        let max_request_body =
            usize::try_from(self.cfg.limits.max_request_body_bytes).unwrap_or(usize::MAX);

        info!(
            target: "stash::master",
            origin = %fetcher.origin(),
            cached_entries = self.cache.len(),
            "Dispatcher ready"
        );

        Ok(Dispatcher::new(
            self.cache.clone(),
            Arc::new(fetcher),
            max_request_body,
        ))
    }
}
