use bytes::Bytes;
use http::{
    HeaderMap, HeaderName, HeaderValue, Response, StatusCode,
    header::{CONTENT_TYPE, SERVER},
};
use http_body_util::Full;
use tracing::error;

/// Every response leaves the proxy fully buffered.
pub type ProxyBody = Full<Bytes>;

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

const SERVER_NAME: &str = concat!("stash/", env!("CARGO_PKG_VERSION"));

/// Value of the `X-Cache` response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }

    fn header_value(self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }
}

/// Builds a response from origin (or cached) parts.
///
/// `cache` = None means pass-through: no `X-Cache` header at all, even if
/// the origin sent one.
pub fn build_response(
    status: StatusCode,
    headers: &HeaderMap,
    body: Bytes,
    cache: Option<CacheStatus>,
) -> Response<ProxyBody> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers.clone();

    match cache {
        Some(cache) => {
            response.headers_mut().insert(X_CACHE, cache.header_value());
        }
        None => {
            response.headers_mut().remove(X_CACHE);
        }
    }

    response
}

/// Response served from the cache: always 200 + `X-Cache: HIT`.
pub fn cache_hit(headers: &HeaderMap, body: Bytes) -> Response<ProxyBody> {
    build_response(StatusCode::OK, headers, body, Some(CacheStatus::Hit))
}

/// Helper para respuestas de texto plano generadas por el propio proxy.
pub fn text_response(status: StatusCode, body: impl Into<String>) -> Response<ProxyBody> {
    let body: String = body.into();
    Response::builder()
        .status(status)
        .header(SERVER, SERVER_NAME)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|e| {
            error!(target: "stash::http", error = ?e, "Failed to build text response");
            let mut fallback = Response::new(Full::new(Bytes::new()));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}

pub fn send_400() -> Response<ProxyBody> {
    text_response(StatusCode::BAD_REQUEST, "400 Bad Request\n")
}

pub fn send_413() -> Response<ProxyBody> {
    text_response(StatusCode::PAYLOAD_TOO_LARGE, "413 Payload Too Large\n")
}

pub fn send_500(message: impl Into<String>) -> Response<ProxyBody> {
    text_response(StatusCode::INTERNAL_SERVER_ERROR, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_of(response: Response<ProxyBody>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn cache_hit_forces_200_and_header() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));

        let response = cache_hit(&headers, Bytes::from_static(b"<p>x</p>"));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[X_CACHE], "HIT");
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html");
        assert_eq!(body_of(response).await, Bytes::from_static(b"<p>x</p>"));
    }

    #[test]
    fn pass_through_has_no_cache_header() {
        let response = build_response(
            StatusCode::NOT_FOUND,
            &HeaderMap::new(),
            Bytes::from_static(b"nope"),
            None,
        );
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(X_CACHE).is_none());
    }

    #[test]
    fn origin_cache_header_never_leaks() {
        let mut headers = HeaderMap::new();
        headers.append(X_CACHE, HeaderValue::from_static("HIT from upstream"));
        headers.append(X_CACHE, HeaderValue::from_static("MISS from cdn"));

        let passed = build_response(StatusCode::NOT_FOUND, &headers, Bytes::new(), None);
        assert!(passed.headers().get(X_CACHE).is_none());

        let fetched = build_response(StatusCode::OK, &headers, Bytes::new(), Some(CacheStatus::Miss));
        let values: Vec<_> = fetched.headers().get_all(X_CACHE).iter().collect();
        assert_eq!(values, vec!["MISS"]);
    }

    #[test]
    fn repeated_headers_are_kept_in_order() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));

        let response = build_response(StatusCode::OK, &headers, Bytes::new(), None);
        let cookies: Vec<_> = response.headers().get_all("set-cookie").iter().collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
    }

    #[tokio::test]
    async fn send_500_is_plain_text() {
        let response = send_500("Too many redirects");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(
            response.headers()[CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
        assert_eq!(body_of(response).await, Bytes::from_static(b"Too many redirects"));
    }
}
