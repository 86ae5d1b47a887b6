//! Structured errors for the swcache server.
//!
//! Engine failures already convert into MCP errors; these cover what only
//! the hosting shim can get wrong.

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Structured errors for the swcache server.
#[derive(Debug, thiserror::Error)]
pub enum ShimError {
    /// No engine version currently controls the origin.
    #[error("INVALID_STATE: no active engine")]
    NoActiveEngine,

    /// A tool reply could not be encoded.
    #[error("INTERNAL: failed to serialize output: {0}")]
    Serialize(String),
}

impl From<ShimError> for McpError {
    fn from(err: ShimError) -> Self {
        let code = match &err {
            ShimError::NoActiveEngine => -32014,
            ShimError::Serialize(_) => -32603,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}

impl From<serde_json::Error> for ShimError {
    fn from(err: serde_json::Error) -> Self {
        ShimError::Serialize(err.to_string())
    }
}
