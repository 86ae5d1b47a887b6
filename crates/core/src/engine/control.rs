//! Control channel messages exchanged with page contexts.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A message posted to an engine by a page.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ControlMessage {
    /// Origin of the sending page, e.g. `https://example.com`.
    pub origin: String,
    /// Message payload; recognised payloads carry a `type` field.
    pub data: serde_json::Value,
}

impl ControlMessage {
    pub fn new(origin: impl Into<String>, data: serde_json::Value) -> Self {
        Self { origin: origin.into(), data }
    }

    /// Decode the payload. Unknown or malformed payloads yield `None`.
    pub fn command(&self) -> Option<ControlCommand> {
        serde_json::from_value(self.data.clone()).ok()
    }
}

/// Commands understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlCommand {
    SkipWaiting,
    GetVersion,
    ClearCache,
}

/// Reply sent back on the message's reply channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ControlReply {
    Version {
        version: String,
        partitions: Vec<String>,
    },
    Cleared {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}
