use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use stash_cache::CacheStore;
use stash_config::{CliOverrides, StashConfig, DEFAULT_CONFIG_FILE};
use stash_core::Master;
use tracing::{error, info};
use utils::init_tracing;

/// Caching forward HTTP proxy.
#[derive(Debug, Parser)]
#[command(name = "stash", version, about)]
struct Cli {
    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Origin server URL (http:// or https://)
    #[arg(long)]
    origin: Option<String>,

    /// Address to bind (default 0.0.0.0)
    #[arg(long)]
    host: Option<String>,

    /// Optional TOML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: String,

    /// Clear the cache and exit
    #[arg(long)]
    clear_cache: bool,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            host: self.host.clone(),
            port: self.port,
            origin: self.origin.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let cache = Arc::new(CacheStore::new());

    if cli.clear_cache {
        cache.clear();
        info!(target: "stash::master", "--clear-cache done, exiting");
        return Ok(());
    }

    let cfg = StashConfig::load(&cli.config, &cli.overrides())
        .and_then(StashConfig::validated)
        .inspect_err(|e| error!(target: "stash::config", error = %e, "Invalid configuration"))
        .with_context(|| format!("loading configuration ({})", cli.config))?;

    let master = Master::new(cfg, cache);

    tokio::select! {
        res = master.run() => res,
        _ = tokio::signal::ctrl_c() => {
            info!(target: "stash::master", "Shutdown signal received");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_to_overrides() {
        let cli = Cli::try_parse_from([
            "stash",
            "--port",
            "3000",
            "--origin",
            "http://dummyjson.com",
        ])
        .unwrap();

        let overrides = cli.overrides();
        assert_eq!(overrides.port, Some(3000));
        assert_eq!(overrides.origin.as_deref(), Some("http://dummyjson.com"));
        assert_eq!(overrides.host, None);
        assert_eq!(cli.config, DEFAULT_CONFIG_FILE);
        assert!(!cli.clear_cache);
    }

    #[test]
    fn clear_cache_needs_no_other_flag() {
        let cli = Cli::try_parse_from(["stash", "--clear-cache"]).unwrap();
        assert!(cli.clear_cache);
        assert_eq!(cli.port, None);
    }

    #[test]
    fn port_must_be_a_number() {
        assert!(Cli::try_parse_from(["stash", "--port", "http"]).is_err());
    }
}
