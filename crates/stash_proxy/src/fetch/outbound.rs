use http::{
    HeaderMap, HeaderName, HeaderValue, Method, Request, Uri,
    header::{CONTENT_LENGTH, HOST},
};
use bytes::Bytes;
use http_body_util::Full;
use stash_http::headers::strip_hop_by_hop;
use url::{Position, Url};

use super::ForwardRequest;
use crate::FetchError;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

/// =======================================================
/// OUTBOUND REQUEST (one per redirect hop)
/// =======================================================
///
/// - start line en origin-form: `METHOD /path?query HTTP/1.1`
/// - quita hop-by-hop y X-Forwarded-* previos
/// - Host = authority del target (cambia si el redirect sale del origin)
/// - anade X-Forwarded-For / X-Real-IP / X-Forwarded-Proto / X-Forwarded-Host
/// - Content-Length del body ya bufferizado
pub(super) fn build_request(
    target: &Url,
    req: &ForwardRequest,
) -> Result<Request<Full<Bytes>>, FetchError> {
    let path_and_query = &target[Position::BeforePath..Position::AfterQuery];
    let uri: Uri = path_and_query
        .parse()
        .map_err(|e| FetchError::invalid_url(target.as_str(), e))?;

    let authority = &target[Position::BeforeHost..Position::AfterPort];
    let host = HeaderValue::from_str(authority)
        .map_err(|e| FetchError::invalid_url(target.as_str(), e))?;

    let headers = rewrite_headers(host, req);

    let mut request = Request::new(Full::new(req.body.clone()));
    *request.method_mut() = req.method.clone();
    *request.uri_mut() = uri;
    *request.headers_mut() = headers;

    Ok(request)
}

fn rewrite_headers(host: HeaderValue, req: &ForwardRequest) -> HeaderMap {
    let mut headers = req.headers.clone();
    let original_host = headers.remove(HOST);

    strip_hop_by_hop(&mut headers);
    headers.remove(CONTENT_LENGTH);

    // Drop previous forwarded headers
    for name in [X_FORWARDED_FOR, X_FORWARDED_PROTO, X_FORWARDED_HOST, X_REAL_IP] {
        headers.remove(name);
    }

    headers.insert(HOST, host);

    if let Some(ip) = req.client_ip
        && let Ok(value) = HeaderValue::from_str(&ip.to_string())
    {
        headers.insert(X_FORWARDED_FOR, value.clone());
        headers.insert(X_REAL_IP, value);
    }
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
    if let Some(original_host) = original_host {
        headers.insert(X_FORWARDED_HOST, original_host);
    }

    if !req.body.is_empty() || matches!(req.method, Method::POST | Method::PUT | Method::PATCH) {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(req.body.len()));
    }

    headers
}
