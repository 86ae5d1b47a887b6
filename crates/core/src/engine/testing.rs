//! Scripted network and engine builders for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::{Engine, EngineOptions, Network, PartitionTable};
use crate::Error;
use crate::cache::CacheDb;
use crate::request::{Destination, InterceptedRequest};
use crate::response::Response;

pub const ORIGIN: &str = "http://localhost:3000";

#[derive(Clone)]
enum Route {
    Respond(Response),
    Fail,
    Hang,
}

/// In-process network keyed by path. Unscripted paths fail like an
/// unreachable host. Every call is counted.
#[derive(Default)]
pub struct ScriptedNetwork {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn set(&self, path: &str, route: Route) {
        self.routes.lock().unwrap().insert(path.to_string(), route);
    }

    pub fn respond(&self, path: &str, status: u16, body: &str) {
        self.set(path, Route::Respond(Response::new(status, body.to_string())));
    }

    pub fn fail(&self, path: &str) {
        self.set(path, Route::Fail);
    }

    /// Never resolves.
    pub fn hang(&self, path: &str) {
        self.set(path, Route::Hang);
    }

    pub fn calls(&self, path: &str) -> usize {
        self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<Response, Error> {
        let path = request.url.path().to_string();
        *self.calls.lock().unwrap().entry(path.clone()).or_default() += 1;
        let route = self.routes.lock().unwrap().get(&path).cloned();
        match route {
            Some(Route::Respond(response)) => Ok(response),
            Some(Route::Hang) => std::future::pending().await,
            Some(Route::Fail) | None => Err(Error::Network(format!("unreachable: {path}"))),
        }
    }
}

pub fn options(cache_version: &str, static_assets: &[&str], image_assets: &[&str]) -> EngineOptions {
    EngineOptions {
        origin: Url::parse(ORIGIN).unwrap(),
        version: format!("{cache_version}.0.0"),
        partitions: PartitionTable::versioned(cache_version),
        shell_path: "/index.html".into(),
        static_assets: static_assets.iter().map(|s| s.to_string()).collect(),
        image_assets: image_assets.iter().map(|s| s.to_string()).collect(),
        fetch_timeout: None,
        skip_waiting_on_install: true,
    }
}

pub fn engine(options: EngineOptions, cache: &CacheDb, network: &Arc<ScriptedNetwork>) -> Engine {
    Engine::new(options, cache.clone(), network.clone())
}

/// Engine with empty manifests, installed and activated.
pub async fn active_engine(cache: &CacheDb, network: &Arc<ScriptedNetwork>) -> Engine {
    let engine = engine(options("v1", &[], &[]), cache, network);
    engine.on_install().await.unwrap();
    engine.on_activate().await.unwrap();
    engine
}

pub fn request(path: &str, destination: Destination) -> InterceptedRequest {
    InterceptedRequest::parse("GET", &format!("{ORIGIN}{path}"), destination).unwrap()
}

pub fn short() -> Duration {
    Duration::from_millis(200)
}
