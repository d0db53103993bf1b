use std::time::Duration;

/// Why a fetch did not produce a terminal origin response.
///
/// None of these are retried; the dispatcher turns every one of them into a
/// `500` for the client.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported URL scheme '{0}'")]
    UnsupportedScheme(String),

    /// Connection refused, DNS failure, TLS failure, protocol error...
    #[error("{0}")]
    Unreachable(String),

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },

    #[error("origin returned invalid status code {0}")]
    InvalidStatus(u16),

    #[error("origin response body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("Too many redirects")]
    TooManyRedirects,
}

impl FetchError {
    pub(crate) fn invalid_url(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Plain-text body sent to the client along with the `500`.
    pub fn client_message(&self) -> String {
        match self {
            FetchError::TooManyRedirects => "Too many redirects".to_string(),
            other => format!("Error fetching from origin: {other}"),
        }
    }
}
