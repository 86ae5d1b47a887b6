//! Core types and shared functionality for swcache.
//!
//! This crate provides:
//! - Partitioned response cache with SQLite backend
//! - The offline cache policy engine and its registration lifecycle
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod request;
pub mod response;

pub use cache::{CacheDb, PartitionInfo};
pub use config::{AppConfig, ConfigError};
pub use engine::{Engine, EngineOptions, Network, Registration};
pub use error::Error;
pub use request::{Destination, InterceptedRequest};
pub use response::{Response, ResponseSource};
