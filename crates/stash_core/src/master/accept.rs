use std::{future::Future, io, net::SocketAddr, sync::Arc};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, instrument, warn, Instrument};

use crate::worker::{handle_connection, Dispatcher};

pub(crate) async fn bind_listener(listen_addr: &str) -> anyhow::Result<TcpListener> {
    info!(
        target: "stash::master",
        listen = %listen_addr,
        "Binding listener"
    );

    match TcpListener::bind(listen_addr).await {
        Ok(listener) => {
            info!(
                target: "stash::master",
                listen = %listen_addr,
                "Bind() successful"
            );
            Ok(listener)
        }
        Err(e) => {
            error!(
                target: "stash::master",
                listen = %listen_addr,
                error = ?e,
                "Failed to bind listener"
            );
            Err(anyhow::Error::new(e).context(format!("binding {listen_addr}")))
        }
    }
}

/// Pause after running out of file descriptors, so the loop does not spin
/// while connections drain.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

// errno values, identical on Linux and macOS
const ENFILE: i32 = 23;
const EMFILE: i32 = 24;

/// Source of client connections. `TcpListener` in production.
pub(crate) trait Acceptor: Send + Sync + 'static {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send;
}

impl Acceptor for TcpListener {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }
}

struct AcceptedConn {
    stream: TcpStream,
    addr: SocketAddr,
    permit: OwnedSemaphorePermit,
}

/// Waits for a permit first, then accepts. With every permit taken the
/// listener backlog absorbs new clients instead of spawning unbounded tasks.
///
/// `Ok(None)`: `accept()` failed. The error only concerns that one pending
/// connection; the permit is released and the caller keeps accepting.
async fn accept_with_permit<A: Acceptor>(
    listener: &A,
    listen_addr: &str,
    semaphore: &Arc<Semaphore>,
) -> anyhow::Result<Option<AcceptedConn>> {
    let permit = match semaphore.clone().acquire_owned().await {
        Ok(p) => p,
        Err(e) => {
            error!(
                target: "stash::master",
                listen = %listen_addr,
                error = ?e,
                "Failed to acquire connection permit"
            );
            return Err(e.into());
        }
    };

    let (stream, addr) = match listener.accept().await {
        Ok(pair) => pair,
        Err(e) => {
            drop(permit);
            let backoff = accept_backoff(&e);
            warn!(
                target: "stash::master",
                listen = %listen_addr,
                error = ?e,
                backoff_ms = backoff.map(|d| d.as_millis() as u64),
                "Failed to accept connection, listener stays up"
            );
            if let Some(backoff) = backoff {
                sleep(backoff).await;
            }
            return Ok(None);
        }
    };

    debug!(
        target: "stash::master",
        listen = %listen_addr,
        client_addr = %addr,
        available_permits = semaphore.available_permits(),
        "Connection accepted"
    );

    Ok(Some(AcceptedConn {
        stream,
        addr,
        permit,
    }))
}

/// Descriptor exhaustion clears up only as other connections close.
/// Anything else (ECONNABORTED, ...) is retried right away.
fn accept_backoff(e: &io::Error) -> Option<Duration> {
    match e.raw_os_error() {
        Some(ENFILE | EMFILE) => Some(ACCEPT_BACKOFF),
        _ => None,
    }
}

#[instrument(
    skip(listener, semaphore, dispatcher),
    fields(
        listen = %listen_addr,
        available_permits = semaphore.available_permits(),
    )
)]
pub(crate) async fn accept_loop<A: Acceptor>(
    listener: A,
    listen_addr: String,
    semaphore: Arc<Semaphore>,
    dispatcher: Arc<Dispatcher>,
) -> anyhow::Result<()> {
    info!(
        target: "stash::master",
        listen = %listen_addr,
        "accept_loop started for listening socket"
    );

    loop {
        let Some(AcceptedConn {
            stream,
            addr,
            permit,
        }) = accept_with_permit(&listener, &listen_addr, &semaphore).await?
        else {
            continue;
        };

        let dispatcher = dispatcher.clone();
        let span = tracing::info_span!(
            "worker_connection",
            client_addr = %addr,
            listen = %listen_addr,
        );

        tokio::spawn(
            async move {
                let _permit = permit;

                debug!(
                    target: "stash::worker",
                    "Worker spawned for incoming connection"
                );

                if let Err(e) = handle_connection(stream, addr, dispatcher).await {
                    error!(
                        target: "stash::worker",
                        client_addr = %addr,
                        error = ?e,
                        "Error while handling connection"
                    );
                } else {
                    debug!(
                        target: "stash::worker",
                        client_addr = %addr,
                        "Connection handled successfully"
                    );
                }

                debug!(
                    target: "stash::master",
                    client_addr = %addr,
                    "Permit released after connection closed"
                );
            }
            .instrument(span),
        );
    }
}
