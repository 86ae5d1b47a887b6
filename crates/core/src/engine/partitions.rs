//! The table of named partitions an engine version owns.

use std::fmt;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const DAY: u64 = 24 * 60 * 60;

/// Logical role of a partition, independent of its versioned name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PartitionKind {
    Static,
    Images,
    Dynamic,
}

impl PartitionKind {
    pub const ALL: [PartitionKind; 3] = [PartitionKind::Static, PartitionKind::Images, PartitionKind::Dynamic];

    pub fn as_str(self) -> &'static str {
        match self {
            PartitionKind::Static => "static",
            PartitionKind::Images => "images",
            PartitionKind::Dynamic => "dynamic",
        }
    }

    fn index(self) -> usize {
        match self {
            PartitionKind::Static => 0,
            PartitionKind::Images => 1,
            PartitionKind::Dynamic => 2,
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a partition is filled at install time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecachePolicy {
    /// Every listed entry must fetch successfully or nothing is written.
    AllOrNothing,
    /// Each entry is attempted on its own; failures are logged and skipped.
    BestEffort,
    /// Nothing is precached; the partition fills as requests arrive.
    Lazy,
}

/// One row of the partition table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpec {
    pub kind: PartitionKind,
    pub name: String,
    pub precache: PrecachePolicy,
    /// Entries older than this are removed by an explicit purge.
    pub max_age: Duration,
}

/// The three partitions of one engine version, in `PartitionKind::ALL` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionTable {
    specs: [PartitionSpec; 3],
}

impl PartitionTable {
    /// Standard table with names `static-<version>`, `images-<version>`,
    /// `dynamic-<version>`.
    pub fn versioned(version: &str) -> Self {
        let spec = |kind: PartitionKind, precache: PrecachePolicy, days: u64| PartitionSpec {
            kind,
            name: format!("{kind}-{version}"),
            precache,
            max_age: Duration::from_secs(days * DAY),
        };
        Self {
            specs: [
                spec(PartitionKind::Static, PrecachePolicy::AllOrNothing, 7),
                spec(PartitionKind::Images, PrecachePolicy::BestEffort, 30),
                spec(PartitionKind::Dynamic, PrecachePolicy::Lazy, 1),
            ],
        }
    }

    pub fn spec(&self, kind: PartitionKind) -> &PartitionSpec {
        &self.specs[kind.index()]
    }

    pub fn name(&self, kind: PartitionKind) -> &str {
        &self.spec(kind).name
    }

    /// Whether `name` belongs to this version.
    pub fn contains(&self, name: &str) -> bool {
        self.specs.iter().any(|s| s.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PartitionSpec> {
        self.specs.iter()
    }
}
