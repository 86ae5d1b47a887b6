//! Client code for swcache.
//!
//! This crate provides the HTTP side of the cache engine: a `reqwest`
//! client that implements the engine's [`Network`](swcache_core::Network)
//! seam, and URL resolution for requests entering from a host.

pub mod fetch;

pub use fetch::{FetchClient, FetchConfig, UrlError, resolve};
