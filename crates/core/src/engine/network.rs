//! The seam between the engine and whatever performs real network I/O.

use async_trait::async_trait;

use crate::Error;
use crate::request::InterceptedRequest;
use crate::response::Response;

/// Performs a request against the network.
///
/// Any HTTP status is a response, not an error: implementations return
/// `Err` only when no response could be obtained at all, using
/// [`Error::Network`] or [`Error::FetchTimeout`].
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<Response, Error>;
}
