//! Host-side registration: which engine version controls pages and which
//! one is waiting to take over.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{ActivateReport, ControlMessage, ControlReply, Engine, Handled, InstallReport};
use crate::Error;
use crate::request::InterceptedRequest;

/// Which registered engine a control message is addressed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum WorkerSlot {
    #[default]
    Active,
    Waiting,
}

/// Result of registering a new engine version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterReport {
    pub install: InstallReport,
    /// Present when the new version was promoted right away.
    pub activation: Option<ActivateReport>,
}

/// The active/waiting slot pair for one origin.
///
/// Two versions can coexist: the old one keeps controlling requests while
/// the new one waits. Promotion activates the waiting version, hands it
/// control and retires the previous one.
#[derive(Debug, Default)]
pub struct Registration {
    active: RwLock<Option<Arc<Engine>>>,
    waiting: RwLock<Option<Arc<Engine>>>,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn active(&self) -> Option<Arc<Engine>> {
        self.active.read().await.clone()
    }

    pub async fn waiting(&self) -> Option<Arc<Engine>> {
        self.waiting.read().await.clone()
    }

    /// Install a new engine version.
    ///
    /// If installation fails the registration is unchanged and the current
    /// active version keeps serving.
    pub async fn register(&self, engine: Engine) -> Result<RegisterReport, Error> {
        let engine = Arc::new(engine);
        let install = engine.on_install().await.inspect_err(|e| {
            tracing::error!(version = %engine.version(), "install failed, keeping current version: {}", e);
        })?;

        let superseded = self.waiting.write().await.replace(engine);
        if let Some(superseded) = superseded {
            superseded.mark_redundant().await;
        }

        let activation = self.try_promote().await?;
        Ok(RegisterReport { install, activation })
    }

    /// Promote the waiting engine if nothing is active or it asked to skip
    /// waiting.
    pub async fn try_promote(&self) -> Result<Option<ActivateReport>, Error> {
        let candidate = {
            let mut waiting = self.waiting.write().await;
            let ready = match waiting.as_ref() {
                Some(engine) => engine.skip_waiting_requested() || self.active.read().await.is_none(),
                None => false,
            };
            if !ready {
                return Ok(None);
            }
            waiting.take()
        };
        let Some(engine) = candidate else {
            return Ok(None);
        };

        let report = engine.on_activate().await?;
        let previous = self.active.write().await.replace(engine.clone());
        tracing::info!(version = %engine.version(), "engine claimed control");
        if let Some(previous) = previous {
            previous.mark_redundant().await;
        }
        Ok(Some(report))
    }

    /// Route an intercepted request to the controlling engine.
    ///
    /// `None` means the host performs the request itself.
    pub async fn handle_fetch(&self, request: &InterceptedRequest) -> Option<Handled> {
        let engine = self.active().await?;
        engine.on_request(request).await
    }

    /// Deliver a control message to one slot, then promote if the message
    /// released a waiting version.
    pub async fn post_message(&self, slot: WorkerSlot, message: &ControlMessage) -> Option<ControlReply> {
        let target = match slot {
            WorkerSlot::Active => self.active().await,
            WorkerSlot::Waiting => self.waiting().await,
        };
        let Some(engine) = target else {
            tracing::debug!(?slot, "no engine in slot, message dropped");
            return None;
        };

        let reply = engine.on_message(message).await;

        if slot == WorkerSlot::Waiting
            && let Err(e) = self.try_promote().await
        {
            tracing::warn!("promotion after message failed: {}", e);
        }
        reply
    }
}
