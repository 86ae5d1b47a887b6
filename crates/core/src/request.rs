//! Intercepted request model.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::Error;
use crate::cache::hash::compute_cache_key;

/// Destination hint supplied by the host for an intercepted request.
///
/// Unknown hints (fonts, manifests, the empty string browsers use for
/// `fetch()` calls) all collapse into [`Destination::Other`], whether they
/// arrive as a string or through serde.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Image,
    Script,
    Style,
    Video,
    #[default]
    Other,
}

impl Destination {
    pub fn as_str(self) -> &'static str {
        match self {
            Destination::Document => "document",
            Destination::Image => "image",
            Destination::Script => "script",
            Destination::Style => "style",
            Destination::Video => "video",
            Destination::Other => "other",
        }
    }

    fn from_hint(hint: &str) -> Self {
        match hint.trim().to_ascii_lowercase().as_str() {
            "document" => Destination::Document,
            "image" => Destination::Image,
            "script" => Destination::Script,
            "style" => Destination::Style,
            "video" => Destination::Video,
            _ => Destination::Other,
        }
    }
}

impl FromStr for Destination {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_hint(s))
    }
}

impl<'de> Deserialize<'de> for Destination {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hint = String::deserialize(deserializer)?;
        Ok(Self::from_hint(&hint))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request observed at the interception point.
///
/// The method is stored upper-cased and the URL without its fragment, so two
/// requests that differ only in those respects share a cache identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedRequest {
    pub method: String,
    pub url: Url,
    pub destination: Destination,
}

impl InterceptedRequest {
    pub fn new(method: &str, mut url: Url, destination: Destination) -> Self {
        url.set_fragment(None);
        Self { method: method.trim().to_ascii_uppercase(), url, destination }
    }

    /// Shorthand for a GET request.
    pub fn get(url: Url, destination: Destination) -> Self {
        Self::new("GET", url, destination)
    }

    /// Parse an absolute URL string into a request.
    pub fn parse(method: &str, url: &str, destination: Destination) -> Result<Self, Error> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::InvalidInput("url cannot be empty".into()));
        }
        let parsed = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self::new(method, parsed, destination))
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    /// Content-addressed identity used as the partition key.
    pub fn cache_key(&self) -> String {
        compute_cache_key(&self.method, self.url.as_str())
    }
}
