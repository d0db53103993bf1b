use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;

#[derive(Debug)]
pub(crate) enum BodyError {
    TooLarge,
    Read(String),
}

/// Buffers a whole request body, refusing anything above `limit` bytes.
pub(crate) async fn read_limited<B>(body: B, limit: usize) -> Result<Bytes, BodyError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(BodyError::TooLarge),
        Err(e) => Err(BodyError::Read(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    #[tokio::test]
    async fn body_within_limit_is_buffered() {
        let body = Full::new(Bytes::from_static(b"hello"));
        let read = read_limited(body, 5).await.unwrap();
        assert_eq!(read, Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn body_over_limit_is_refused() {
        let body = Full::new(Bytes::from_static(b"hello world"));
        assert!(matches!(read_limited(body, 4).await, Err(BodyError::TooLarge)));
    }
}
