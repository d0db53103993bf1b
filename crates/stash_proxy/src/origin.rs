use std::fmt;

use url::Url;

use crate::FetchError;

/// The single upstream every request is forwarded to.
///
/// The origin's own path acts as a prefix (nginx `proxy_pass` style):
/// origin `http://o/api` + `/users?x=1` -> `http://o/api/users?x=1`.
#[derive(Debug, Clone)]
pub struct Origin {
    base: Url,
    /// `base` serialized without the trailing '/'.
    prefix: String,
}

impl Origin {
    pub fn parse(raw: &str) -> Result<Self, FetchError> {
        let mut base = Url::parse(raw).map_err(|e| FetchError::invalid_url(raw, e))?;

        match base.scheme() {
            "http" | "https" => {}
            other => return Err(FetchError::UnsupportedScheme(other.to_string())),
        }
        if base.host_str().is_none() {
            return Err(FetchError::invalid_url(raw, "missing host"));
        }

        base.set_query(None);
        base.set_fragment(None);

        let prefix = base.as_str().trim_end_matches('/').to_string();
        Ok(Self { base, prefix })
    }

    pub fn url(&self) -> &Url {
        &self.base
    }

    /// Absolute URL for a client path (path + query).
    pub fn resolve(&self, path: &str) -> Result<Url, FetchError> {
        let raw = if path.starts_with('/') || path.starts_with('?') {
            format!("{}{}", self.prefix, path)
        } else {
            format!("{}/{}", self.prefix, path)
        };

        Url::parse(&raw).map_err(|e| FetchError::invalid_url(raw.clone(), e))
    }

    /// Path of `url` relative to the origin prefix, if `url` lives under it.
    pub fn relative_path(&self, url: &Url) -> Option<String> {
        let rest = url.as_str().strip_prefix(&self.prefix)?;
        let rest = match rest.find('#') {
            Some(idx) => &rest[..idx],
            None => rest,
        };

        if rest.is_empty() {
            Some("/".to_string())
        } else if rest.starts_with('/') || rest.starts_with('?') {
            Some(rest.to_string())
        } else {
            // "http://o/api" vs "http://o/apix": not the same prefix
            None
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix)
    }
}
