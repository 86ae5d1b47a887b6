//! Resolution of host-supplied request targets into absolute URLs.

use url::Url;

/// Error type for URL resolution failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<UrlError> for swcache_core::Error {
    fn from(err: UrlError) -> Self {
        match err {
            UrlError::Empty => swcache_core::Error::InvalidInput("url must not be empty".into()),
            other => swcache_core::Error::InvalidUrl(other.to_string()),
        }
    }
}

/// Resolve a request target against the served origin.
///
/// Accepted forms:
/// 1. Root-relative path (`/app.css`), joined onto `origin`
/// 2. Absolute http(s) URL, kept as is
/// 3. Bare host and path (`cdn.example.com/x.js`), given `https://`
///
/// The host is lowercased and the fragment dropped; the query is kept
/// verbatim.
pub fn resolve(origin: &Url, input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = if trimmed.starts_with('/') && !trimmed.starts_with("//") {
        origin.join(trimmed)
    } else if trimmed.contains("://") {
        Url::parse(trimmed)
    } else {
        Url::parse(&format!("https://{trimmed}"))
    }
    .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str().map(str::to_lowercase) {
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);
    Ok(parsed)
}
