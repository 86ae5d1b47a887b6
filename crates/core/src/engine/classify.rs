//! Request classification and strategy selection.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::partitions::PartitionKind;
use crate::request::{Destination, InterceptedRequest};

const IMAGE_SUFFIXES: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg", "ico"];
const STATIC_SUFFIXES: &[&str] = &["css", "js", "json", "woff", "woff2", "ttf"];
const VIDEO_SUFFIXES: &[&str] = &["mp4", "webm", "ogg", "avi", "mov"];

/// Content class of an in-scope request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    Document,
    Image,
    StaticAsset,
    Video,
    Other,
}

/// Caching algorithm applied to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    NetworkFirst,
    CacheFirst,
    StaleWhileRevalidate,
    NetworkOnly,
}

impl RequestClass {
    pub fn strategy(self) -> Strategy {
        match self {
            RequestClass::Document | RequestClass::Other => Strategy::NetworkFirst,
            RequestClass::Image => Strategy::CacheFirst,
            RequestClass::StaticAsset => Strategy::StaleWhileRevalidate,
            RequestClass::Video => Strategy::NetworkOnly,
        }
    }

    /// Partition the strategy reads and writes; videos are never cached.
    pub fn partition(self) -> Option<PartitionKind> {
        match self {
            RequestClass::Document | RequestClass::StaticAsset => Some(PartitionKind::Static),
            RequestClass::Image => Some(PartitionKind::Images),
            RequestClass::Other => Some(PartitionKind::Dynamic),
            RequestClass::Video => None,
        }
    }
}

/// Classify by destination hint or path suffix. First match wins, in the
/// order document, image, static asset, video.
pub fn classify(request: &InterceptedRequest) -> RequestClass {
    let path = request.url.path();
    let dest = request.destination;

    if dest == Destination::Document || has_suffix(path, &["html"]) {
        RequestClass::Document
    } else if dest == Destination::Image || has_suffix(path, IMAGE_SUFFIXES) {
        RequestClass::Image
    } else if matches!(dest, Destination::Script | Destination::Style) || has_suffix(path, STATIC_SUFFIXES) {
        RequestClass::StaticAsset
    } else if dest == Destination::Video || has_suffix(path, VIDEO_SUFFIXES) {
        RequestClass::Video
    } else {
        RequestClass::Other
    }
}

/// Case-insensitive extension check on the last path segment.
fn has_suffix(path: &str, suffixes: &[&str]) -> bool {
    let segment = path.rsplit('/').next().unwrap_or(path);
    match segment.rsplit_once('.') {
        Some((_, ext)) => suffixes.iter().any(|s| s.eq_ignore_ascii_case(ext)),
        None => false,
    }
}
