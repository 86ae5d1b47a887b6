//! Offline cache policy engine.
//!
//! The engine owns one deployed version of the caching policy:
//!
//! - `on_install` precaches the static and image manifests
//! - `on_activate` evicts partitions that belong to other versions
//! - `on_request` classifies same-origin GETs and applies a strategy
//! - `on_message` answers the control channel
//!
//! Hosting shims drive these hooks, usually through a [`Registration`],
//! which also decides when a waiting version takes control.

pub mod classify;
pub mod control;
pub mod lifecycle;
pub mod network;
pub mod partitions;
pub mod registration;
pub mod strategy;
pub mod tasks;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use url::Url;

use crate::Error;
use crate::cache::CacheDb;
use crate::config::{AppConfig, ConfigError};
use crate::request::{Destination, InterceptedRequest};
use crate::response::Response;

pub use classify::{RequestClass, Strategy, classify};
pub use control::{ControlCommand, ControlMessage, ControlReply};
pub use lifecycle::LifecycleState;
pub use network::Network;
pub use partitions::{PartitionKind, PartitionSpec, PartitionTable, PrecachePolicy};
pub use registration::{Registration, WorkerSlot};
pub use tasks::LifetimeTasks;

/// Everything an engine version is constructed with.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub origin: Url,
    /// Semantic version reported by `GET_VERSION`.
    pub version: String,
    pub partitions: PartitionTable,
    pub shell_path: String,
    pub static_assets: Vec<String>,
    pub image_assets: Vec<String>,
    pub fetch_timeout: Option<Duration>,
    pub skip_waiting_on_install: bool,
}

impl EngineOptions {
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let origin = Url::parse(&config.origin).map_err(|e| ConfigError::Invalid {
            field: "origin".into(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            origin,
            version: config.engine_version.clone(),
            partitions: PartitionTable::versioned(&config.cache_version),
            shell_path: config.shell_path.clone(),
            static_assets: config.static_assets.clone(),
            image_assets: config.image_assets.clone(),
            fetch_timeout: config.fetch_timeout(),
            skip_waiting_on_install: config.skip_waiting_on_install,
        })
    }

    fn manifest(&self, kind: PartitionKind) -> &[String] {
        match kind {
            PartitionKind::Static => &self.static_assets,
            PartitionKind::Images => &self.image_assets,
            PartitionKind::Dynamic => &[],
        }
    }
}

/// Outcome of a successful install.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReport {
    pub static_cached: usize,
    pub images_cached: usize,
    pub images_failed: usize,
}

/// Outcome of activation cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateReport {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

/// A request the engine answered.
#[derive(Debug)]
pub struct Handled {
    pub response: Response,
    pub class: RequestClass,
    /// Detached writes and revalidations; the host drains these before
    /// treating the event as complete.
    pub tasks: LifetimeTasks,
}

/// One deployed version of the cache policy.
pub struct Engine {
    options: EngineOptions,
    cache: CacheDb,
    network: Arc<dyn Network>,
    state: RwLock<LifecycleState>,
    skip_waiting: AtomicBool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("version", &self.options.version)
            .field("partitions", &self.options.partitions.names())
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(options: EngineOptions, cache: CacheDb, network: Arc<dyn Network>) -> Self {
        Self {
            options,
            cache,
            network,
            state: RwLock::new(LifecycleState::Unregistered),
            skip_waiting: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn version(&self) -> &str {
        &self.options.version
    }

    pub fn cache(&self) -> &CacheDb {
        &self.cache
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Ask to be promoted as soon as installation has finished.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    async fn transition(&self, next: LifecycleState) -> Result<(), Error> {
        let mut state = self.state.write().await;
        if !state.can_transition_to(next) {
            return Err(Error::InvalidTransition { from: *state, to: next });
        }
        tracing::info!(version = %self.options.version, from = %*state, to = %next, "lifecycle transition");
        *state = next;
        Ok(())
    }

    /// Move to REDUNDANT from whichever state allows it.
    pub async fn mark_redundant(&self) {
        if let Err(e) = self.transition(LifecycleState::Redundant).await {
            tracing::debug!(version = %self.options.version, "not marked redundant: {}", e);
        }
    }

    /// Whether the request is a same-origin GET.
    pub fn in_scope(&self, request: &InterceptedRequest) -> bool {
        request.is_get() && request.url.origin() == self.options.origin.origin()
    }

    /// Resolve a root-relative manifest path against the origin.
    fn resolve(&self, path: &str, destination: Destination) -> Result<InterceptedRequest, Error> {
        let url = self
            .options
            .origin
            .join(path)
            .map_err(|e| Error::InvalidUrl(format!("{path}: {e}")))?;
        Ok(InterceptedRequest::get(url, destination))
    }

    /// Precache every manifest and move to WAITING.
    ///
    /// An all-or-nothing batch that fails leaves the engine REDUNDANT and
    /// returns the failure; best-effort batches never fail the install.
    pub async fn on_install(&self) -> Result<InstallReport, Error> {
        self.transition(LifecycleState::Installing).await?;

        let mut report = InstallReport::default();
        let mut fatal = None;

        for spec in self.options.partitions.iter() {
            let paths = self.options.manifest(spec.kind);
            match spec.precache {
                PrecachePolicy::AllOrNothing => match self.precache_all(spec, paths).await {
                    Ok(count) => {
                        tracing::info!(partition = %spec.name, count, "precached static assets");
                        report.static_cached += count;
                    }
                    Err(e) => {
                        tracing::error!(partition = %spec.name, "precache failed: {}", e);
                        fatal.get_or_insert(e);
                    }
                },
                PrecachePolicy::BestEffort => {
                    let (cached, failed) = self.precache_best_effort(spec, paths).await;
                    tracing::info!(partition = %spec.name, cached, failed, "precached images");
                    report.images_cached += cached;
                    report.images_failed += failed;
                }
                PrecachePolicy::Lazy => {}
            }
        }

        if let Some(e) = fatal {
            self.transition(LifecycleState::Redundant).await?;
            return Err(e);
        }

        self.transition(LifecycleState::Waiting).await?;
        if self.options.skip_waiting_on_install {
            self.skip_waiting();
        }
        Ok(report)
    }

    /// `addAll`: fetch everything first, then write the batch in one go.
    async fn precache_all(&self, spec: &PartitionSpec, paths: &[String]) -> Result<usize, Error> {
        self.cache.open_partition(&spec.name).await?;

        let mut batch = Vec::with_capacity(paths.len());
        for path in paths {
            let request = self.resolve(path, Destination::Other)?;
            let response = self.fetch_network(&request).await.map_err(|e| Error::PrecacheFailed {
                url: request.url.to_string(),
                reason: e.to_string(),
            })?;
            if !response.is_success() {
                return Err(Error::PrecacheFailed {
                    url: request.url.to_string(),
                    reason: format!("status {}", response.status),
                });
            }
            batch.push((request, response));
        }

        self.cache.put_all(&spec.name, &batch).await?;
        Ok(batch.len())
    }

    /// `add` per entry; returns (cached, failed).
    async fn precache_best_effort(&self, spec: &PartitionSpec, paths: &[String]) -> (usize, usize) {
        if let Err(e) = self.cache.open_partition(&spec.name).await {
            tracing::warn!(partition = %spec.name, "could not open partition: {}", e);
            return (0, paths.len());
        }

        let mut cached = 0;
        let mut failed = 0;
        for path in paths {
            match self.precache_one(&spec.name, path).await {
                Ok(()) => cached += 1,
                Err(e) => {
                    tracing::warn!(partition = %spec.name, path = %path, "failed to cache: {}", e);
                    failed += 1;
                }
            }
        }
        (cached, failed)
    }

    async fn precache_one(&self, partition: &str, path: &str) -> Result<(), Error> {
        let request = self.resolve(path, Destination::Image)?;
        let response = self.fetch_network(&request).await?;
        if !response.is_success() {
            return Err(Error::Network(format!("status {}", response.status)));
        }
        self.cache.put(partition, &request, &response).await
    }

    /// Evict partitions of other versions and move to ACTIVE.
    ///
    /// Deletion failures are logged and reported but do not block activation.
    pub async fn on_activate(&self) -> Result<ActivateReport, Error> {
        self.transition(LifecycleState::Activating).await?;

        let mut report = ActivateReport::default();
        let names = match self.cache.partition_names().await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!("could not enumerate partitions: {}", e);
                Vec::new()
            }
        };

        for name in names.into_iter().filter(|n| !self.options.partitions.contains(n)) {
            match self.cache.delete_partition(&name).await {
                Ok(_) => {
                    tracing::info!(partition = %name, "deleted old partition");
                    report.deleted.push(name);
                }
                Err(e) => {
                    tracing::warn!(partition = %name, "failed to delete old partition: {}", e);
                    report.failed.push(name);
                }
            }
        }

        self.transition(LifecycleState::Active).await?;
        Ok(report)
    }

    /// Answer an intercepted request.
    ///
    /// Returns `None` when the request must pass through untouched: the
    /// engine is not active, or the request is not a same-origin GET. An
    /// in-scope request always gets a response.
    pub async fn on_request(&self, request: &InterceptedRequest) -> Option<Handled> {
        if !self.state().await.is_controlling() || !self.in_scope(request) {
            return None;
        }

        let class = classify(request);
        let mut tasks = LifetimeTasks::new();
        tracing::debug!(url = %request.url, ?class, strategy = ?class.strategy(), "dispatching request");

        let result = match (class.strategy(), class.partition()) {
            (Strategy::NetworkFirst, Some(kind)) => {
                self.network_first(request, self.options.partitions.name(kind), &mut tasks).await
            }
            (Strategy::CacheFirst, Some(kind)) => {
                self.cache_first(request, self.options.partitions.name(kind), &mut tasks).await
            }
            (Strategy::StaleWhileRevalidate, Some(kind)) => {
                self.stale_while_revalidate(request, self.options.partitions.name(kind), &mut tasks)
                    .await
            }
            (Strategy::NetworkOnly, _) | (_, None) => self.fetch_network(request).await,
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url = %request.url, "request failed: {}", e);
                self.fallback(request).await
            }
        };

        Some(Handled { response, class, tasks })
    }

    /// Handle a control message. Messages from another origin, and payloads
    /// that are not a known command, are dropped without a reply.
    pub async fn on_message(&self, message: &ControlMessage) -> Option<ControlReply> {
        let trusted = Url::parse(&message.origin)
            .map(|o| o.origin() == self.options.origin.origin())
            .unwrap_or(false);
        if !trusted {
            tracing::warn!(origin = %message.origin, "ignoring message from untrusted origin");
            return None;
        }

        let Some(command) = message.command() else {
            tracing::debug!(data = %message.data, "ignoring unrecognised control message");
            return None;
        };

        match command {
            ControlCommand::SkipWaiting => {
                self.skip_waiting();
                None
            }
            ControlCommand::GetVersion => Some(ControlReply::Version {
                version: self.options.version.clone(),
                partitions: self.options.partitions.names(),
            }),
            ControlCommand::ClearCache => match self.cache.clear_all().await {
                Ok(count) => {
                    tracing::info!(count, "all partitions cleared");
                    Some(ControlReply::Cleared { success: true, error: None })
                }
                Err(e) => {
                    tracing::warn!("clearing partitions failed: {}", e);
                    Some(ControlReply::Cleared { success: false, error: Some(e.to_string()) })
                }
            },
        }
    }

    /// Remove entries older than their partition's max age.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_expired(&self, kind: Option<PartitionKind>) -> Result<u64, Error> {
        let mut deleted = 0;
        for spec in self.options.partitions.iter().filter(|s| kind.is_none_or(|k| k == s.kind)) {
            let max_age = chrono::Duration::from_std(spec.max_age)
                .map_err(|e| Error::InvalidInput(format!("max_age for {}: {e}", spec.name)))?;
            let count = self.cache.purge_older_than(&spec.name, max_age).await?;
            if count > 0 {
                tracing::info!(partition = %spec.name, count, "purged expired entries");
            }
            deleted += count;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests;
