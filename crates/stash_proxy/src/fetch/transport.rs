use std::sync::Arc;

use bytes::Bytes;
use http::{Request, response::Parts};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper_util::rt::TokioIo;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    time::{Duration, timeout},
};
use tokio_rustls::{
    TlsConnector,
    rustls::{self, OwnedTrustAnchor, RootCertStore, ServerName},
};
use tracing::{debug, instrument};
use url::Url;

use super::{
    FetchSettings,
    pool::{ConnectionPool, OriginSender},
};
use crate::FetchError;

/// Plaintext vs TLS is decided per hop from the target URL scheme, so a
/// redirect from http:// to https:// (or the other way) just works.
pub(super) struct Transport {
    tls: TlsConnector,
    pool: ConnectionPool,
    connect_timeout: Duration,
    response_timeout: Duration,
    max_body: usize,
}

/// Result of one attempt on a connection.
enum Exchange {
    Done(Parts, Bytes),
    /// The connection died before the request left; safe to send elsewhere.
    Unsent(Request<Full<Bytes>>),
}

impl Transport {
    pub(super) fn new(settings: &FetchSettings) -> Self {
        Self {
            tls: webpki_tls_connector(),
            pool: ConnectionPool::new(settings.pool_max_per_addr, settings.pool_idle_timeout),
            connect_timeout: settings.connect_timeout,
            response_timeout: settings.response_timeout,
            max_body: settings.max_response_body,
        }
    }

    /// One request/response exchange, on an idle pooled connection when there
    /// is one. The response body is fully buffered before returning.
    #[instrument(skip(self, target, request), fields(url = %target))]
    pub(super) async fn send(
        &self,
        target: &Url,
        request: Request<Full<Bytes>>,
    ) -> Result<(Parts, Bytes), FetchError> {
        let host = target
            .host_str()
            .ok_or_else(|| FetchError::invalid_url(target.as_str(), "missing host"))?;
        let port = target
            .port_or_known_default()
            .ok_or_else(|| FetchError::invalid_url(target.as_str(), "missing port"))?;
        let scheme = target.scheme();
        if !matches!(scheme, "http" | "https") {
            return Err(FetchError::UnsupportedScheme(scheme.to_string()));
        }

        let addr = format!("{host}:{port}");
        let pool_key = format!("{scheme}://{addr}");

        let request = match self.pool.checkout(&pool_key).await {
            Some(mut sender) => match self.exchange(&mut sender, request).await? {
                Exchange::Done(parts, body) => {
                    self.pool.checkin(&pool_key, sender);
                    return Ok((parts, body));
                }
                Exchange::Unsent(request) => {
                    debug!(
                        target: "stash::proxy",
                        origin = %pool_key,
                        "Pooled connection closed before sending, reconnecting"
                    );
                    request
                }
            },
            None => request,
        };

        let mut sender = self.connect(scheme, host, &addr).await?;
        match self.exchange(&mut sender, request).await? {
            Exchange::Done(parts, body) => {
                self.pool.checkin(&pool_key, sender);
                Ok((parts, body))
            }
            Exchange::Unsent(_) => Err(FetchError::Unreachable(format!(
                "connection to {addr} closed before the request was sent"
            ))),
        }
    }

    async fn connect(
        &self,
        scheme: &str,
        host: &str,
        addr: &str,
    ) -> Result<OriginSender, FetchError> {
        let tcp = self.connect_tcp(addr).await?;
        if scheme == "https" {
            let tls = self.handshake_tls(host, tcp).await?;
            handshake_http1(tls).await
        } else {
            handshake_http1(tcp).await
        }
    }

    async fn connect_tcp(&self, addr: &str) -> Result<TcpStream, FetchError> {
        debug!(target: "stash::proxy", origin_addr = %addr, "Connecting to origin");

        match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(FetchError::Unreachable(format!("connect {addr}: {e}"))),
            Err(_) => Err(FetchError::Timeout {
                stage: "connect",
                after: self.connect_timeout,
            }),
        }
    }

    async fn handshake_tls(
        &self,
        host: &str,
        tcp: TcpStream,
    ) -> Result<tokio_rustls::client::TlsStream<TcpStream>, FetchError> {
        // IPv6 literals come bracketed from the URL
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let server_name = ServerName::try_from(host)
            .map_err(|e| FetchError::Unreachable(format!("invalid TLS server name '{host}': {e}")))?;

        match timeout(self.connect_timeout, self.tls.connect(server_name, tcp)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(FetchError::Unreachable(format!("TLS handshake with {host}: {e}"))),
            Err(_) => Err(FetchError::Timeout {
                stage: "TLS handshake",
                after: self.connect_timeout,
            }),
        }
    }

    async fn exchange(
        &self,
        sender: &mut OriginSender,
        request: Request<Full<Bytes>>,
    ) -> Result<Exchange, FetchError> {
        match timeout(self.response_timeout, round_trip(sender, request, self.max_body)).await {
            Ok(res) => res,
            Err(_) => Err(FetchError::Timeout {
                stage: "origin response",
                after: self.response_timeout,
            }),
        }
    }
}

async fn handshake_http1<S>(io: S) -> Result<OriginSender, FetchError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(io))
        .await
        .map_err(|e| FetchError::Unreachable(format!("HTTP handshake: {e}")))?;

    // El driver de la conexion vive en su propia task; se cierra al soltar `sender`.
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            debug!(target: "stash::proxy", error = ?e, "Origin connection closed with error");
        }
    });

    Ok(sender)
}

async fn round_trip(
    sender: &mut OriginSender,
    request: Request<Full<Bytes>>,
    max_body: usize,
) -> Result<Exchange, FetchError> {
    let response = match sender.try_send_request(request).await {
        Ok(response) => response,
        Err(mut e) => {
            if let Some(request) = e.take_message() {
                return Ok(Exchange::Unsent(request));
            }
            return Err(FetchError::Unreachable(e.into_error().to_string()));
        }
    };

    let (parts, body) = response.into_parts();
    let body = match Limited::new(body, max_body).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return Err(FetchError::BodyTooLarge(max_body));
        }
        Err(e) => {
            return Err(FetchError::Unreachable(format!("reading response body: {e}")));
        }
    };

    Ok(Exchange::Done(parts, body))
}

fn webpki_tls_connector() -> TlsConnector {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));

    let config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}
