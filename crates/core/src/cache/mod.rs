//! SQLite-backed cache partitions.
//!
//! A partition is a named key/value store from request identity to a full
//! stored response. All partitions of an origin share one database:
//!
//! - Lazy creation on first write, idempotent open
//! - Atomic per-key UPSERT (last write wins)
//! - Whole-partition deletion with cascading entry removal
//! - WAL mode for concurrent readers during background writes

pub mod connection;
pub mod hash;
pub mod migrations;
pub mod partitions;

pub use crate::Error;

pub use connection::CacheDb;
pub use partitions::PartitionInfo;
