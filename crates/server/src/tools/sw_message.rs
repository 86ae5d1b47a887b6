//! sw_message tool implementation.
//!
//! Posts a control message to the active or waiting engine.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_core::engine::{ControlMessage, ControlReply, Registration, WorkerSlot};
use swcache_core::Error;

use super::json_result;

/// Input parameters for sw_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwMessageParams {
    /// Origin of the sending page, e.g. `http://localhost:3000`.
    pub origin: String,

    /// Message payload, e.g. `{"type": "GET_VERSION"}`.
    pub data: serde_json::Value,

    /// Which engine receives the message (default: active).
    #[serde(default)]
    pub target: WorkerSlot,
}

/// Output structure for sw_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwMessageOutput {
    /// Reply on the message port; `null` when the engine sent none.
    pub reply: Option<ControlReply>,
}

/// Implementation of the sw_message tool.
pub async fn message_impl(registration: &Registration, params: SwMessageParams) -> Result<CallToolResult, McpError> {
    if params.origin.trim().is_empty() {
        return Err(Error::InvalidInput("origin cannot be empty".into()).into());
    }

    let message = ControlMessage::new(params.origin, params.data);
    let reply = registration.post_message(params.target, &message).await;
    json_result(&SwMessageOutput { reply })
}
