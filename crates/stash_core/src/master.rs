use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use stash_cache::CacheStore;
use stash_config::StashConfig;
use tokio::{net::TcpListener, sync::Semaphore};
use tracing::{info, instrument};

use crate::worker::Dispatcher;

mod accept;
mod startup;

use accept::{accept_loop, bind_listener};

/// Composition root: config + cache store in, running listener out.
///
/// The store is created by the caller and handed in, so whoever builds the
/// master decides its lifetime (and can inspect it afterwards).
pub struct Master {
    cfg: Arc<StashConfig>,
    cache: Arc<CacheStore>,
}

/// A bound listener, ready to accept connections.
pub struct Listening {
    listener: TcpListener,
    local_addr: SocketAddr,
    semaphore: Arc<Semaphore>,
    dispatcher: Arc<Dispatcher>,
}

impl Master {
    pub fn new(cfg: StashConfig, cache: Arc<CacheStore>) -> Self {
        Self {
            cfg: Arc::new(cfg),
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Builds the dispatcher and binds the listen socket. Nothing is
    /// accepted until [`Listening::serve`].
    pub async fn bind(&self) -> anyhow::Result<Listening> {
        self.log_startup();

        let listen_addr = self.cfg.listen_addr()?;
        let dispatcher = Arc::new(self.build_dispatcher()?);
        let semaphore = self.init_semaphore();

        let listener = bind_listener(&listen_addr).await?;
        let local_addr = listener
            .local_addr()
            .context("reading local address of listener")?;

        Ok(Listening {
            listener,
            local_addr,
            semaphore,
            dispatcher,
        })
    }

    /// Starts the proxy: bind + accept loop. Only returns on accept errors.
    #[instrument(skip(self), fields(
        max_connections = %self.cfg.server.max_connections,
    ))]
    pub async fn run(self) -> anyhow::Result<()> {
        let listening = self.bind().await?;
        listening.serve().await
    }
}

impl Listening {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub async fn serve(self) -> anyhow::Result<()> {
        info!(
            target: "stash::master",
            listen = %self.local_addr,
            origin = %self.dispatcher.origin(),
            "Proxy listening"
        );

        accept_loop(
            self.listener,
            self.local_addr.to_string(),
            self.semaphore,
            self.dispatcher,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use bytes::Bytes;
    use http::{Request, Response, StatusCode};
    use http_body_util::{BodyExt, Empty, Full};
    use hyper::{body::Incoming, server::conn::http1, service::service_fn};
    use hyper_util::rt::TokioIo;
    use stash_config::CliOverrides;
    use tokio::net::TcpStream;

    use super::*;

    async fn spawn_origin() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let service = service_fn(|_req: Request<Incoming>| async {
                        Ok::<_, Infallible>(Response::new(Full::new(Bytes::from_static(b"x"))))
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });
        addr
    }

    fn config_for(origin: SocketAddr) -> StashConfig {
        let overrides = CliOverrides {
            host: Some("127.0.0.1".into()),
            port: Some(0),
            origin: Some(format!("http://{origin}")),
        };
        StashConfig::from_toml_str("", &overrides).unwrap()
    }

    #[tokio::test]
    async fn proxy_serves_miss_then_hit_over_one_connection() {
        let origin = spawn_origin().await;
        let cache = Arc::new(CacheStore::new());
        let master = Master::new(config_for(origin), cache.clone());

        let listening = master.bind().await.unwrap();
        let proxy_addr = listening.local_addr();
        tokio::spawn(listening.serve());

        let stream = TcpStream::connect(proxy_addr).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        tokio::spawn(conn);

        for expected in ["MISS", "HIT"] {
            let req = Request::builder()
                .uri("/a")
                .header("host", proxy_addr.to_string())
                .body(Empty::<Bytes>::new())
                .unwrap();
            let response = sender.send_request(req).await.unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()["x-cache"], expected);
            let body = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(body, Bytes::from_static(b"x"));
        }

        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn bind_requires_port_and_origin() {
        let cfg = StashConfig::from_toml_str("", &CliOverrides::default()).unwrap();
        let master = Master::new(cfg, Arc::new(CacheStore::new()));

        assert!(master.bind().await.is_err());
    }
}
