use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use anyhow::Context;
use hyper::{body::Incoming, server::conn::http1, service::service_fn, Request};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tracing::debug;

mod body;
mod dispatch;

pub use dispatch::{DispatchOutcome, Dispatcher};

/// Serves one client connection (HTTP/1.1 keep-alive) until it closes.
///
/// Every request goes through [`Dispatcher::handle`]. When the client goes
/// away hyper drops the in-flight service future, which cancels any origin
/// fetch still running for it.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    client_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
) -> anyhow::Result<()> {
    let io = TokioIo::new(stream);

    let service = service_fn(move |req: Request<Incoming>| {
        let dispatcher = dispatcher.clone();
        async move { Ok::<_, Infallible>(dispatcher.handle(req, client_addr).await) }
    });

    http1::Builder::new()
        .keep_alive(true)
        .serve_connection(io, service)
        .await
        .context("serving HTTP/1 connection")?;

    debug!(
        target: "stash::worker",
        client_addr = %client_addr,
        "Connection closed by client"
    );
    Ok(())
}
