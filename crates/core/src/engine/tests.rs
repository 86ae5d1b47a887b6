use serde_json::json;

use super::testing::{ORIGIN, ScriptedNetwork, active_engine, engine, options, request, short};
use super::*;
use crate::response::{OFFLINE_BODY, ResponseSource};

async fn fetch(engine: &Engine, req: &InterceptedRequest) -> Response {
    let handled = engine.on_request(req).await.expect("request should be handled");
    handled.tasks.drain().await;
    handled.response
}

/// Run raw SQL against the store to simulate a damaged database.
async fn exec(cache: &CacheDb, sql: &'static str) {
    cache
        .conn
        .call(move |conn| -> Result<(), Error> {
            conn.execute_batch(sql)?;
            Ok(())
        })
        .await
        .map_err(Error::from)
        .unwrap();
}

#[tokio::test]
async fn test_inactive_engine_passes_through() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    let engine = engine(options("v1", &[], &[]), &cache, &network);

    assert!(engine.on_request(&request("/", Destination::Document)).await.is_none());
    engine.on_install().await.unwrap();
    assert!(engine.on_request(&request("/", Destination::Document)).await.is_none());
    assert_eq!(network.total_calls(), 0);
}

#[tokio::test]
async fn test_out_of_scope_requests_never_touch_partitions() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    network.respond("/logo.png", 200, "png");
    let engine = active_engine(&cache, &network).await;
    let before = cache.partitions().await.unwrap();

    let post = InterceptedRequest::parse("POST", &format!("{ORIGIN}/logo.png"), Destination::Image).unwrap();
    assert!(engine.on_request(&post).await.is_none());

    let foreign = InterceptedRequest::parse("GET", "https://cdn.example.com/logo.png", Destination::Image).unwrap();
    assert!(engine.on_request(&foreign).await.is_none());

    let other_port = InterceptedRequest::parse("GET", "http://localhost:4000/logo.png", Destination::Image).unwrap();
    assert!(engine.on_request(&other_port).await.is_none());

    assert_eq!(network.total_calls(), 0);
    assert_eq!(cache.partitions().await.unwrap(), before);
}

#[tokio::test]
async fn test_image_cache_hit_skips_network() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    let engine = active_engine(&cache, &network).await;
    let req = request("/assets/a.jpg", Destination::Image);
    cache
        .put("images-v1", &req, &Response::new(200, "cached-image"))
        .await
        .unwrap();

    for _ in 0..3 {
        let response = fetch(&engine, &req).await;
        assert_eq!(response.text(), "cached-image");
        assert_eq!(response.source, ResponseSource::Cache);
    }
    assert_eq!(network.calls("/assets/a.jpg"), 0);
}

#[tokio::test]
async fn test_image_miss_fetches_and_stores() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    network.respond("/assets/b.png", 200, "fresh-image");
    let engine = active_engine(&cache, &network).await;
    let req = request("/assets/b.png", Destination::Other);

    let handled = engine.on_request(&req).await.unwrap();
    assert_eq!(handled.class, RequestClass::Image);
    assert_eq!(handled.response.source, ResponseSource::Network);
    assert_eq!(handled.tasks.len(), 1);
    handled.tasks.drain().await;

    let second = fetch(&engine, &req).await;
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(network.calls("/assets/b.png"), 1);
}

#[tokio::test]
async fn test_image_error_status_not_stored() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    network.respond("/missing.png", 404, "nope");
    let engine = active_engine(&cache, &network).await;
    let req = request("/missing.png", Destination::Image);

    let handled = engine.on_request(&req).await.unwrap();
    assert_eq!(handled.response.status, 404);
    assert!(handled.tasks.is_empty());
    assert!(cache.match_request("images-v1", &req).await.unwrap().is_none());
}

#[tokio::test]
async fn test_document_network_first_stores_copy() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    network.respond("/about.html", 200, "about v2");
    let engine = active_engine(&cache, &network).await;
    let req = request("/about.html", Destination::Document);
    cache.put("static-v1", &req, &Response::new(200, "about v1")).await.unwrap();

    let response = fetch(&engine, &req).await;
    assert_eq!(response.text(), "about v2");
    assert_eq!(response.source, ResponseSource::Network);
    let stored = cache.match_request("static-v1", &req).await.unwrap().unwrap();
    assert_eq!(stored.text(), "about v2");
}

#[tokio::test]
async fn test_document_offline_uses_cached_entry() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    network.fail("/about.html");
    let engine = active_engine(&cache, &network).await;
    let req = request("/about.html", Destination::Document);
    cache.put("static-v1", &req, &Response::new(200, "about cached")).await.unwrap();
    cache
        .put("static-v1", &request("/index.html", Destination::Document), &Response::new(200, "shell"))
        .await
        .unwrap();

    let response = fetch(&engine, &req).await;
    assert_eq!(response.text(), "about cached");
    assert_eq!(response.source, ResponseSource::Cache);
}

#[tokio::test]
async fn test_document_offline_falls_back_to_shell() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    let engine = active_engine(&cache, &network).await;
    cache
        .put("static-v1", &request("/index.html", Destination::Document), &Response::new(200, "shell"))
        .await
        .unwrap();

    let response = fetch(&engine, &request("/contact", Destination::Document)).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.text(), "shell");
}

#[tokio::test]
async fn test_document_offline_without_shell_is_503() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    let engine = active_engine(&cache, &network).await;

    let response = fetch(&engine, &request("/contact", Destination::Document)).await;
    assert_eq!(response.status, 503);
    assert_eq!(response.text(), OFFLINE_BODY);
    assert_eq!(response.source, ResponseSource::Fallback);
}

#[tokio::test]
async fn test_non_document_offline_never_gets_shell() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    let engine = active_engine(&cache, &network).await;
    cache
        .put("static-v1", &request("/index.html", Destination::Document), &Response::new(200, "shell"))
        .await
        .unwrap();

    let response = fetch(&engine, &request("/api/items", Destination::Other)).await;
    assert_eq!(response.status, 503);
}

#[tokio::test]
async fn test_network_first_returns_error_status_uncached() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    network.respond("/api/items", 500, "boom");
    let engine = active_engine(&cache, &network).await;
    let req = request("/api/items", Destination::Other);
    cache.put("dynamic-v1", &req, &Response::new(200, "old items")).await.unwrap();

    let response = fetch(&engine, &req).await;
    assert_eq!(response.status, 500);
    let stored = cache.match_request("dynamic-v1", &req).await.unwrap().unwrap();
    assert_eq!(stored.text(), "old items");
}

#[tokio::test]
async fn test_other_requests_use_dynamic_partition() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    network.respond("/api/items", 200, "items");
    let engine = active_engine(&cache, &network).await;
    let req = request("/api/items", Destination::Other);

    fetch(&engine, &req).await;
    assert!(cache.match_request("dynamic-v1", &req).await.unwrap().is_some());
    assert!(cache.match_request("static-v1", &req).await.unwrap().is_none());
}

#[tokio::test]
async fn test_stale_while_revalidate_serves_stale_then_fresh() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    network.respond("/style.css", 200, "body { color: new }");
    let engine = active_engine(&cache, &network).await;
    let req = request("/style.css", Destination::Style);
    cache
        .put("static-v1", &req, &Response::new(200, "body { color: old }"))
        .await
        .unwrap();

    let first = engine.on_request(&req).await.unwrap();
    assert_eq!(first.class, RequestClass::StaticAsset);
    assert_eq!(first.response.text(), "body { color: old }");
    first.tasks.drain().await;

    let second = fetch(&engine, &req).await;
    assert_eq!(second.text(), "body { color: new }");
    assert_eq!(second.source, ResponseSource::Cache);
}

#[tokio::test]
async fn test_stale_while_revalidate_hit_does_not_wait_for_network() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    network.hang("/main.js");
    let engine = active_engine(&cache, &network).await;
    let req = request("/main.js", Destination::Script);
    cache.put("static-v1", &req, &Response::new(200, "js v1")).await.unwrap();

    for _ in 0..2 {
        let handled = tokio::time::timeout(short(), engine.on_request(&req))
            .await
            .expect("a cache hit must not block on the network")
            .unwrap();
        assert_eq!(handled.response.text(), "js v1");
        assert_eq!(handled.tasks.len(), 1);
    }
}

#[tokio::test]
async fn test_stale_while_revalidate_background_failure_keeps_entry() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    network.fail("/app.css");
    let engine = active_engine(&cache, &network).await;
    let req = request("/app.css", Destination::Style);
    cache.put("static-v1", &req, &Response::new(200, "css v1")).await.unwrap();

    let response = fetch(&engine, &req).await;
    assert_eq!(response.text(), "css v1");
    let stored = cache.match_request("static-v1", &req).await.unwrap().unwrap();
    assert_eq!(stored.text(), "css v1");
}

#[tokio::test]
async fn test_stale_while_revalidate_miss_waits_and_stores() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    network.respond("/config.json", 200, "{}");
    let engine = active_engine(&cache, &network).await;
    let req = request("/config.json", Destination::Other);

    let response = fetch(&engine, &req).await;
    assert_eq!(response.source, ResponseSource::Network);
    assert!(cache.match_request("static-v1", &req).await.unwrap().is_some());
}

#[tokio::test]
async fn test_stale_while_revalidate_miss_offline_is_503() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    let engine = active_engine(&cache, &network).await;

    let response = fetch(&engine, &request("/app.js", Destination::Script)).await;
    assert_eq!(response.status, 503);
}

#[tokio::test]
async fn test_video_is_network_only() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    network.respond("/video.mp4", 200, "frames");
    let engine = active_engine(&cache, &network).await;
    let req = request("/video.mp4", Destination::Other);
    cache.put("dynamic-v1", &req, &Response::new(200, "stale frames")).await.unwrap();
    let before = cache.partitions().await.unwrap();

    for _ in 0..2 {
        let handled = engine.on_request(&req).await.unwrap();
        assert_eq!(handled.class, RequestClass::Video);
        assert!(handled.tasks.is_empty());
        assert_eq!(handled.response.text(), "frames");
        assert_eq!(handled.response.source, ResponseSource::Network);
    }
    assert_eq!(network.calls("/video.mp4"), 2);
    assert_eq!(cache.partitions().await.unwrap(), before);
}

#[tokio::test]
async fn test_fetch_timeout_routes_to_cache() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    network.hang("/about.html");
    let mut opts = options("v1", &[], &[]);
    opts.fetch_timeout = Some(std::time::Duration::from_millis(50));
    let engine = engine(opts, &cache, &network);
    engine.on_install().await.unwrap();
    engine.on_activate().await.unwrap();
    let req = request("/about.html", Destination::Document);
    cache.put("static-v1", &req, &Response::new(200, "about cached")).await.unwrap();

    let response = tokio::time::timeout(short(), fetch(&engine, &req)).await.unwrap();
    assert_eq!(response.text(), "about cached");
}

#[tokio::test]
async fn test_install_precaches_static_and_images() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    network.respond("/", 200, "root");
    network.respond("/index.html", 200, "shell");
    network.respond("/app.css", 200, "css");
    network.respond("/a.jpg", 200, "a");
    let engine = engine(options("v1", &["/", "/index.html", "/app.css"], &["/a.jpg"]), &cache, &network);

    let report = engine.on_install().await.unwrap();
    assert_eq!(report, InstallReport { static_cached: 3, images_cached: 1, images_failed: 0 });
    assert_eq!(engine.state().await, LifecycleState::Waiting);
    assert!(engine.skip_waiting_requested());
    assert_eq!(cache.entry_count("static-v1").await.unwrap(), 3);
    assert_eq!(cache.entry_count("images-v1").await.unwrap(), 1);
    assert!(!cache.has_partition("dynamic-v1").await.unwrap());
}

#[tokio::test]
async fn test_install_static_failure_is_all_or_nothing() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    network.respond("/", 200, "root");
    network.respond("/index.html", 200, "shell");
    network.respond("/app.css", 404, "not found");
    let engine = engine(options("v1", &["/", "/index.html", "/app.css"], &[]), &cache, &network);

    let err = engine.on_install().await.unwrap_err();
    assert!(matches!(err, Error::PrecacheFailed { ref url, .. } if url.ends_with("/app.css")));
    assert_eq!(engine.state().await, LifecycleState::Redundant);
    assert_eq!(cache.entry_count("static-v1").await.unwrap(), 0);
    assert!(engine.on_activate().await.is_err());
}

#[tokio::test]
async fn test_install_static_network_failure_aborts() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    network.respond("/", 200, "root");
    let engine = engine(options("v1", &["/", "/main.js"], &[]), &cache, &network);

    assert!(engine.on_install().await.is_err());
    assert_eq!(cache.entry_count("static-v1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_install_images_are_best_effort() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    network.respond("/a.jpg", 200, "a");
    network.respond("/b.jpg", 404, "missing");
    network.respond("/c.webp", 200, "c");
    let engine = engine(options("v1", &[], &["/a.jpg", "/b.jpg", "/c.webp"]), &cache, &network);

    let report = engine.on_install().await.unwrap();
    assert_eq!(report.images_cached, 2);
    assert_eq!(report.images_failed, 1);
    assert_eq!(engine.state().await, LifecycleState::Waiting);
    assert!(cache.match_request("images-v1", &request("/a.jpg", Destination::Image)).await.unwrap().is_some());
    assert!(cache.match_request("images-v1", &request("/b.jpg", Destination::Image)).await.unwrap().is_none());
    assert!(cache.match_request("images-v1", &request("/c.webp", Destination::Image)).await.unwrap().is_some());
}

#[tokio::test]
async fn test_install_without_skip_waiting() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    let mut opts = options("v1", &[], &[]);
    opts.skip_waiting_on_install = false;
    let engine = engine(opts, &cache, &network);

    engine.on_install().await.unwrap();
    assert!(!engine.skip_waiting_requested());
}

#[tokio::test]
async fn test_install_twice_is_rejected() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    let engine = engine(options("v1", &[], &[]), &cache, &network);

    engine.on_install().await.unwrap();
    assert!(matches!(engine.on_install().await, Err(Error::InvalidTransition { .. })));
}

#[tokio::test]
async fn test_activate_evicts_only_foreign_partitions() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    let keep = request("/keep.css", Destination::Style);
    for name in ["dynamic-v2", "static-v1", "elizaveta-portfolio-v3.0", "images-v2", "images-v1", "static-v2"] {
        cache.put(name, &keep, &Response::new(200, name.to_string())).await.unwrap();
    }
    let engine = engine(options("v2", &[], &[]), &cache, &network);
    engine.on_install().await.unwrap();

    let mut report = engine.on_activate().await.unwrap();
    report.deleted.sort();
    assert_eq!(report.deleted, vec!["elizaveta-portfolio-v3.0", "images-v1", "static-v1"]);
    assert!(report.failed.is_empty());
    assert_eq!(engine.state().await, LifecycleState::Active);

    let mut remaining = cache.partition_names().await.unwrap();
    remaining.sort();
    assert_eq!(remaining, vec!["dynamic-v2", "images-v2", "static-v2"]);
    assert_eq!(cache.match_request("static-v2", &keep).await.unwrap().unwrap().text(), "static-v2");
}

#[tokio::test]
async fn test_message_from_foreign_origin_is_dropped() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    let engine = active_engine(&cache, &network).await;
    cache
        .put("static-v1", &request("/a.css", Destination::Style), &Response::new(200, "a"))
        .await
        .unwrap();

    for origin in ["https://evil.example", "http://localhost:3001", "not an origin"] {
        let msg = ControlMessage::new(origin, json!({"type": "CLEAR_CACHE"}));
        assert!(engine.on_message(&msg).await.is_none());
    }
    assert_eq!(cache.entry_count("static-v1").await.unwrap(), 1);
}

#[tokio::test]
async fn test_get_version() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    let engine = active_engine(&cache, &network).await;

    let reply = engine
        .on_message(&ControlMessage::new(ORIGIN, json!({"type": "GET_VERSION"})))
        .await
        .unwrap();
    assert_eq!(
        reply,
        ControlReply::Version {
            version: "v1.0.0".into(),
            partitions: vec!["static-v1".into(), "images-v1".into(), "dynamic-v1".into()],
        }
    );
}

#[tokio::test]
async fn test_clear_cache_then_every_read_misses() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    let engine = active_engine(&cache, &network).await;
    let keys = [
        ("static-v1", request("/app.css", Destination::Style)),
        ("images-v1", request("/a.png", Destination::Image)),
        ("dynamic-v1", request("/api", Destination::Other)),
        ("static-v0", request("/old.js", Destination::Script)),
    ];
    for (partition, req) in &keys {
        cache.put(partition, req, &Response::new(200, "x")).await.unwrap();
    }

    let reply = engine
        .on_message(&ControlMessage::new(ORIGIN, json!({"type": "CLEAR_CACHE"})))
        .await;
    assert_eq!(reply, Some(ControlReply::Cleared { success: true, error: None }));

    for (partition, req) in &keys {
        assert!(cache.match_request(partition, req).await.unwrap().is_none());
        assert!(cache.match_any(req).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn test_skip_waiting_and_unknown_messages() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    let mut opts = options("v1", &[], &[]);
    opts.skip_waiting_on_install = false;
    let engine = engine(opts, &cache, &network);
    engine.on_install().await.unwrap();

    assert!(engine.on_message(&ControlMessage::new(ORIGIN, json!({"type": "PING"}))).await.is_none());
    assert!(!engine.skip_waiting_requested());

    assert!(engine.on_message(&ControlMessage::new(ORIGIN, json!({"type": "SKIP_WAITING"}))).await.is_none());
    assert!(engine.skip_waiting_requested());
}

#[tokio::test]
async fn test_purge_expired_respects_max_age() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    let engine = engine(options("v1", &[], &[]), &cache, &network);
    cache
        .put("dynamic-v1", &request("/api", Destination::Other), &Response::new(200, "x"))
        .await
        .unwrap();

    assert_eq!(engine.purge_expired(None).await.unwrap(), 0);
    assert_eq!(engine.purge_expired(Some(PartitionKind::Dynamic)).await.unwrap(), 0);
    assert_eq!(cache.entry_count("dynamic-v1").await.unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_handlers_are_independent() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    network.respond("/a.png", 200, "a");
    network.respond("/b.png", 200, "b");
    let engine = active_engine(&cache, &network).await;

    let req_a = request("/a.png", Destination::Image);
    let req_b = request("/b.png", Destination::Image);
    let (a, b) = tokio::join!(engine.on_request(&req_a), engine.on_request(&req_b));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.response.text(), "a");
    assert_eq!(b.response.text(), "b");
    a.tasks.drain().await;
    b.tasks.drain().await;
    assert_eq!(cache.entry_count("images-v1").await.unwrap(), 2);
}

#[tokio::test]
async fn test_registration_first_install_takes_control() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    let mut opts = options("v1", &[], &[]);
    opts.skip_waiting_on_install = false;
    let registration = Registration::new();

    let report = registration.register(engine(opts, &cache, &network)).await.unwrap();
    assert!(report.activation.is_some());
    assert_eq!(registration.active().await.unwrap().state().await, LifecycleState::Active);
    assert!(registration.waiting().await.is_none());
}

#[tokio::test]
async fn test_registration_failed_upgrade_keeps_previous_version() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    network.respond("/", 200, "root");
    network.respond("/index.html", 200, "shell v1");
    let registration = Registration::new();
    registration
        .register(engine(options("v1", &["/", "/index.html"], &[]), &cache, &network))
        .await
        .unwrap();

    network.respond("/index.html", 200, "shell v2");
    network.respond("/app.css", 404, "not found");
    let result = registration
        .register(engine(options("v2", &["/", "/index.html", "/app.css"], &[]), &cache, &network))
        .await;
    assert!(matches!(result, Err(Error::PrecacheFailed { .. })));

    let active = registration.active().await.unwrap();
    assert_eq!(active.version(), "v1.0.0");
    assert_eq!(active.state().await, LifecycleState::Active);
    assert!(registration.waiting().await.is_none());
    assert_eq!(cache.entry_count("static-v2").await.unwrap(), 0);
    assert_eq!(cache.entry_count("static-v1").await.unwrap(), 2);

    network.fail("/index.html");
    let handled = registration
        .handle_fetch(&request("/index.html", Destination::Document))
        .await
        .unwrap();
    assert_eq!(handled.response.text(), "shell v1");
}

#[tokio::test]
async fn test_registration_waits_until_skip_waiting() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    let registration = Registration::new();
    registration
        .register(engine(options("v1", &[], &[]), &cache, &network))
        .await
        .unwrap();
    cache
        .put("static-v1", &request("/old.css", Destination::Style), &Response::new(200, "old"))
        .await
        .unwrap();

    let mut opts = options("v2", &[], &[]);
    opts.skip_waiting_on_install = false;
    let report = registration.register(engine(opts, &cache, &network)).await.unwrap();
    assert!(report.activation.is_none());
    assert_eq!(registration.active().await.unwrap().version(), "v1.0.0");
    assert_eq!(registration.waiting().await.unwrap().state().await, LifecycleState::Waiting);

    let untrusted = ControlMessage::new("https://evil.example", json!({"type": "SKIP_WAITING"}));
    registration.post_message(WorkerSlot::Waiting, &untrusted).await;
    assert_eq!(registration.active().await.unwrap().version(), "v1.0.0");

    let old = registration.active().await.unwrap();
    let skip = ControlMessage::new(ORIGIN, json!({"type": "SKIP_WAITING"}));
    assert!(registration.post_message(WorkerSlot::Waiting, &skip).await.is_none());

    assert_eq!(registration.active().await.unwrap().version(), "v2.0.0");
    assert!(registration.waiting().await.is_none());
    assert_eq!(old.state().await, LifecycleState::Redundant);
    assert!(!cache.has_partition("static-v1").await.unwrap());
}

#[tokio::test]
async fn test_registration_without_active_passes_through() {
    let registration = Registration::new();
    assert!(registration.handle_fetch(&request("/", Destination::Document)).await.is_none());
    let msg = ControlMessage::new(ORIGIN, json!({"type": "GET_VERSION"}));
    assert!(registration.post_message(WorkerSlot::Active, &msg).await.is_none());
}

#[tokio::test]
async fn test_corrupt_entry_is_a_miss() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    network.respond("/a.jpg", 200, "fresh");
    let engine = active_engine(&cache, &network).await;
    let req = request("/a.jpg", Destination::Image);
    cache.put("images-v1", &req, &Response::new(200, "old")).await.unwrap();
    exec(&cache, "UPDATE entries SET headers_json = 'nope'").await;
    assert!(matches!(cache.match_request("images-v1", &req).await, Err(Error::CorruptEntry(_))));

    let response = fetch(&engine, &req).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.source, ResponseSource::Network);
    assert_eq!(response.text(), "fresh");

    let repaired = cache.match_request("images-v1", &req).await.unwrap().unwrap();
    assert_eq!(repaired.text(), "fresh");
    assert_eq!(network.calls("/a.jpg"), 1);
}

#[tokio::test]
async fn test_corrupt_entry_offline_goes_to_fallback() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    let engine = active_engine(&cache, &network).await;
    let req = request("/api/items", Destination::Other);
    cache.put("dynamic-v1", &req, &Response::new(200, "items")).await.unwrap();
    exec(&cache, "UPDATE entries SET headers_json = 'nope'").await;

    let response = fetch(&engine, &req).await;
    assert_eq!(response.status, 503);
    assert_eq!(response.source, ResponseSource::Fallback);
}

#[tokio::test]
async fn test_cache_write_failure_is_swallowed() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    network.respond("/b.png", 200, "image");
    let engine = active_engine(&cache, &network).await;
    exec(&cache, "DROP TABLE entries").await;

    let handled = engine.on_request(&request("/b.png", Destination::Image)).await.unwrap();
    assert_eq!(handled.response.status, 200);
    assert_eq!(handled.response.source, ResponseSource::Network);
    assert_eq!(handled.response.text(), "image");
    assert_eq!(handled.tasks.len(), 1);
    assert_eq!(handled.tasks.drain().await, 1);
}

#[tokio::test]
async fn test_shell_lookup_failure_falls_back_to_503() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let network = ScriptedNetwork::new();
    let engine = active_engine(&cache, &network).await;
    cache
        .put("static-v1", &request("/index.html", Destination::Document), &Response::new(200, "shell"))
        .await
        .unwrap();
    exec(&cache, "DROP TABLE entries").await;
    assert!(cache.match_any(&request("/index.html", Destination::Document)).await.is_err());

    let response = fetch(&engine, &request("/contact", Destination::Document)).await;
    assert_eq!(response.status, 503);
    assert_eq!(response.text(), OFFLINE_BODY);
}
