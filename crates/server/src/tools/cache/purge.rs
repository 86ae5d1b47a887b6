//! cache_purge tool implementation.
//!
//! Removes entries older than their partition's max age.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_core::engine::{PartitionKind, Registration};

use crate::error::ShimError;
use crate::tools::json_result;

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Only purge this partition kind: static, images or dynamic (default: all).
    #[serde(default)]
    pub partition: Option<PartitionKind>,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of entries deleted.
    pub deleted: u64,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(registration: &Registration, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    let engine = registration.active().await.ok_or(ShimError::NoActiveEngine)?;
    let deleted = engine.purge_expired(params.partition).await?;
    json_result(&CachePurgeOutput { deleted })
}
