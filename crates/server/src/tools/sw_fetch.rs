//! sw_fetch tool implementation.
//!
//! Feeds one request through the controlling engine the way a page's fetch
//! would be intercepted. Requests the engine does not take (cross-origin,
//! non-GET, no active version) go straight to the network.

use std::collections::BTreeMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_client::resolve;
use swcache_core::engine::{Registration, RequestClass, Strategy};
use swcache_core::{Destination, Error, InterceptedRequest, Network, Response, ResponseSource};
use url::Url;

use super::json_result;

/// Input parameters for sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwFetchParams {
    /// Root-relative path (resolved against the origin) or absolute URL.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Request destination hint: document, image, script, style, video or other.
    #[serde(default)]
    pub destination: Destination,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwFetchOutput {
    /// The resolved request URL.
    pub url: String,
    /// Whether the engine answered the request.
    pub handled: bool,
    /// Content class assigned by the engine.
    pub class: Option<RequestClass>,
    /// Strategy the engine applied.
    pub strategy: Option<Strategy>,
    pub status: u16,
    /// Where the response came from: network, cache or fallback.
    pub source: ResponseSource,
    pub headers: BTreeMap<String, String>,
    /// Body as text, for textual content types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Body as standard base64, for binary content (images, video, fonts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_base64: Option<String>,
    /// Detached cache writes still running after the reply.
    pub pending_tasks: usize,
}

/// Whether a content type carries text. Without one, valid UTF-8 counts.
fn is_textual(content_type: Option<&str>, body: &[u8]) -> bool {
    match content_type {
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.starts_with("text/")
                || ["json", "javascript", "xml", "svg", "x-www-form-urlencoded"]
                    .iter()
                    .any(|t| ct.contains(t))
        }
        None => std::str::from_utf8(body).is_ok(),
    }
}

impl SwFetchOutput {
    fn new(request: &InterceptedRequest, class: Option<RequestClass>, response: Response, pending_tasks: usize) -> Self {
        let (body, body_base64) = if is_textual(response.content_type(), &response.body) {
            (Some(response.text().into_owned()), None)
        } else {
            (None, Some(BASE64.encode(&response.body)))
        };
        Self {
            url: request.url.to_string(),
            handled: class.is_some(),
            class,
            strategy: class.map(RequestClass::strategy),
            status: response.status,
            source: response.source,
            headers: response.headers,
            body,
            body_base64,
            pending_tasks,
        }
    }
}

/// Implementation of the sw_fetch tool.
pub async fn fetch_impl(
    registration: &Registration, network: &dyn Network, origin: &Url, params: SwFetchParams,
) -> Result<CallToolResult, McpError> {
    if params.method.trim().is_empty() {
        return Err(Error::InvalidInput("method cannot be empty".into()).into());
    }
    let url = resolve(origin, &params.url).map_err(Error::from)?;
    let request = InterceptedRequest::new(params.method.trim(), url, params.destination);

    let output = match registration.handle_fetch(&request).await {
        Some(handled) => {
            let pending_tasks = handled.tasks.len();
            if pending_tasks > 0 {
                let tasks = handled.tasks;
                tokio::spawn(async move {
                    let finished = tasks.drain().await;
                    tracing::debug!(finished, "lifetime tasks drained");
                });
            }
            SwFetchOutput::new(&request, Some(handled.class), handled.response, pending_tasks)
        }
        None => {
            tracing::debug!(url = %request.url, method = %request.method, "passing request through");
            let response = network.fetch(&request).await?;
            SwFetchOutput::new(&request, None, response, 0)
        }
    };

    json_result(&output)
}
