//! Test fixtures shared by the tool modules.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rmcp::model::CallToolResult;
use serde::de::DeserializeOwned;
use swcache_core::engine::{EngineOptions, PartitionTable, Registration};
use swcache_core::{CacheDb, Engine, Error, InterceptedRequest, Network, Response};
use url::Url;

pub const ORIGIN: &str = "http://localhost:3000";

/// Path-keyed canned responses; anything else is unreachable.
#[derive(Default)]
pub struct StubNetwork {
    routes: Mutex<HashMap<String, (u16, String)>>,
    calls: Mutex<usize>,
}

impl StubNetwork {
    pub fn with(routes: &[(&str, u16, &str)]) -> Arc<Self> {
        let stub = Self::default();
        {
            let mut map = stub.routes.lock().unwrap();
            for (path, status, body) in routes {
                map.insert(path.to_string(), (*status, body.to_string()));
            }
        }
        Arc::new(stub)
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Network for StubNetwork {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<Response, Error> {
        *self.calls.lock().unwrap() += 1;
        let key = if request.url.origin() == Url::parse(ORIGIN).unwrap().origin() {
            request.url.path().to_string()
        } else {
            request.url.to_string()
        };
        match self.routes.lock().unwrap().get(&key) {
            Some((status, body)) => Ok(Response::new(*status, body.clone())),
            None => Err(Error::Network(format!("unreachable: {key}"))),
        }
    }
}

pub fn engine(cache_version: &str, cache: &CacheDb, network: &Arc<StubNetwork>, skip_waiting: bool) -> Engine {
    let options = EngineOptions {
        origin: Url::parse(ORIGIN).unwrap(),
        version: format!("{cache_version}.0.0"),
        partitions: PartitionTable::versioned(cache_version),
        shell_path: "/index.html".into(),
        static_assets: vec!["/index.html".into()],
        image_assets: vec![],
        fetch_timeout: None,
        skip_waiting_on_install: skip_waiting,
    };
    Engine::new(options, cache.clone(), network.clone())
}

/// A registration whose `v1` engine precached `/index.html` and is active.
pub async fn registered(network: &Arc<StubNetwork>) -> (Arc<Registration>, CacheDb) {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let registration = Arc::new(Registration::new());
    registration.register(engine("v1", &cache, network, true)).await.unwrap();
    (registration, cache)
}

/// Decode the JSON text content of a tool result.
pub fn output<T: DeserializeOwned>(result: &CallToolResult) -> T {
    let content_val = serde_json::to_value(&result.content[0]).unwrap();
    let text = content_val
        .get("text")
        .and_then(|v| v.as_str())
        .expect("Expected text field in content");
    serde_json::from_str(text).unwrap()
}
