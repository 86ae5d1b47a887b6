//! Caching strategies and the terminal fallback.
//!
//! Strategies return `Err` only when they could not produce any response;
//! the caller then asks [`Engine::fallback`], which never fails. Cache reads
//! that error are treated as misses, cache writes are detached into the
//! event's [`LifetimeTasks`].

use std::sync::Arc;
use std::time::Duration;

use super::Engine;
use super::network::Network;
use super::tasks::LifetimeTasks;
use crate::Error;
use crate::cache::CacheDb;
use crate::request::{Destination, InterceptedRequest};
use crate::response::Response;

/// Fetch with an optional upper bound; an elapsed limit is a network failure.
pub(crate) async fn fetch_with_timeout(
    network: &dyn Network, limit: Option<Duration>, request: &InterceptedRequest,
) -> Result<Response, Error> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, network.fetch(request))
            .await
            .map_err(|_| Error::FetchTimeout(format!("{} after {}ms", request.url, limit.as_millis())))?,
        None => network.fetch(request).await,
    }
}

/// Best-effort write; failures are logged and swallowed.
async fn store(cache: &CacheDb, partition: &str, request: &InterceptedRequest, response: &Response) {
    if let Err(e) = cache.put(partition, request, response).await {
        tracing::warn!(partition, url = %request.url, "cache write failed: {}", e);
    }
}

impl Engine {
    pub(crate) async fn fetch_network(&self, request: &InterceptedRequest) -> Result<Response, Error> {
        fetch_with_timeout(self.network.as_ref(), self.options.fetch_timeout, request).await
    }

    /// Cache lookup where a read error counts as a miss.
    async fn lookup(&self, partition: &str, request: &InterceptedRequest) -> Option<Response> {
        match self.cache.match_request(partition, request).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(partition, url = %request.url, "cache read failed: {}", e);
                None
            }
        }
    }

    /// Fire-and-forget copy of a response into a partition.
    fn spawn_store(
        &self, tasks: &mut LifetimeTasks, partition: &str, request: &InterceptedRequest, response: &Response,
    ) {
        let cache = self.cache.clone();
        let partition = partition.to_string();
        let request = request.clone();
        let response = response.clone();
        tasks.spawn(async move {
            store(&cache, &partition, &request, &response).await;
        });
    }

    /// Network, then the partition on network failure.
    pub(crate) async fn network_first(
        &self, request: &InterceptedRequest, partition: &str, tasks: &mut LifetimeTasks,
    ) -> Result<Response, Error> {
        match self.fetch_network(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.spawn_store(tasks, partition, request, &response);
                }
                Ok(response)
            }
            Err(e) => match self.lookup(partition, request).await {
                Some(cached) => {
                    tracing::debug!(url = %request.url, "serving from cache after network failure");
                    Ok(cached)
                }
                None => Err(e),
            },
        }
    }

    /// The partition, then the network on a miss.
    pub(crate) async fn cache_first(
        &self, request: &InterceptedRequest, partition: &str, tasks: &mut LifetimeTasks,
    ) -> Result<Response, Error> {
        if let Some(cached) = self.lookup(partition, request).await {
            tracing::debug!(url = %request.url, "cache hit");
            return Ok(cached);
        }

        let response = self.fetch_network(request).await?;
        if response.is_success() {
            self.spawn_store(tasks, partition, request, &response);
        }
        Ok(response)
    }

    /// Cached copy immediately with a detached refresh; on a miss, wait for
    /// the network and keep the result.
    pub(crate) async fn stale_while_revalidate(
        &self, request: &InterceptedRequest, partition: &str, tasks: &mut LifetimeTasks,
    ) -> Result<Response, Error> {
        if let Some(cached) = self.lookup(partition, request).await {
            tracing::debug!(url = %request.url, "cache hit, revalidating in background");
            let network: Arc<dyn Network> = self.network.clone();
            let cache = self.cache.clone();
            let limit = self.options.fetch_timeout;
            let partition = partition.to_string();
            let request = request.clone();
            tasks.spawn(async move {
                match fetch_with_timeout(network.as_ref(), limit, &request).await {
                    Ok(fresh) if fresh.is_success() => store(&cache, &partition, &request, &fresh).await,
                    Ok(fresh) => {
                        tracing::debug!(url = %request.url, status = fresh.status, "revalidation not stored")
                    }
                    Err(e) => tracing::warn!(url = %request.url, "background update failed: {}", e),
                }
            });
            return Ok(cached);
        }

        let response = self.fetch_network(request).await?;
        if response.is_success() {
            self.spawn_store(tasks, partition, request, &response);
        }
        Ok(response)
    }

    /// Terminal response when no strategy produced one: the page shell for
    /// documents if it is cached anywhere, otherwise a 503.
    pub(crate) async fn fallback(&self, request: &InterceptedRequest) -> Response {
        if request.destination == Destination::Document {
            match self.resolve(&self.options.shell_path, Destination::Document) {
                Ok(shell) => match self.cache.match_any(&shell).await {
                    Ok(Some(response)) => return response,
                    Ok(None) => {}
                    Err(e) => tracing::warn!("page shell lookup failed: {}", e),
                },
                Err(e) => tracing::warn!("page shell path unusable: {}", e),
            }
        }
        Response::unavailable()
    }
}
