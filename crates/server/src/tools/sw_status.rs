//! sw_status tool implementation.
//!
//! Reports the registered engine versions and the partitions on disk.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_core::engine::{LifecycleState, Registration};
use swcache_core::{CacheDb, Engine, PartitionInfo};

use super::json_result;

/// One registered engine version.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EngineStatus {
    pub version: String,
    pub state: LifecycleState,
    /// Partition names this version owns.
    pub partitions: Vec<String>,
    pub skip_waiting: bool,
}

impl EngineStatus {
    async fn of(engine: &Engine) -> Self {
        Self {
            version: engine.version().to_string(),
            state: engine.state().await,
            partitions: engine.options().partitions.names(),
            skip_waiting: engine.skip_waiting_requested(),
        }
    }
}

/// Output structure for sw_status tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwStatusOutput {
    pub active: Option<EngineStatus>,
    pub waiting: Option<EngineStatus>,
    /// Every partition in the store, oldest first.
    pub partitions: Vec<PartitionInfo>,
}

/// Implementation of the sw_status tool.
pub async fn status_impl(registration: &Registration, cache: &CacheDb) -> Result<CallToolResult, McpError> {
    let active = match registration.active().await {
        Some(engine) => Some(EngineStatus::of(&engine).await),
        None => None,
    };
    let waiting = match registration.waiting().await {
        Some(engine) => Some(EngineStatus::of(&engine).await),
        None => None,
    };
    let partitions = cache.partitions().await?;

    json_result(&SwStatusOutput { active, waiting, partitions })
}
