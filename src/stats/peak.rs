//! All-time peak tracking
//!
//! Keeps, per operation, the highest cluster-wide total ever observed and the
//! single job that produced the highest per-job value. The database survives
//! restarts as a versioned JSON document:
//!
//! ```text
//! {
//!   "version": 1,
//!   "top_ops": { "ops": { "rate": 5120, "timestamp": 1697018723 }, ... },
//!   "top_job_per_op": {
//!     "read": { "job": { "job_id": "dd.0", "counts": { "ops": 900, "read": 880 } },
//!               "timestamp": 1697018723 },
//!     ...
//!   }
//! }
//! ```
//!
//! A missing file is bootstrapped to an empty database and written right
//! away. A file that exists but cannot be read back is fatal; silently
//! starting over would throw away the history.

use crate::stats::{AggregatedJob, OpCounts, Operation};
use crate::util::fs::atomic_write;
use crate::Result;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Current on-disk schema version
///
/// Bump when the document layout changes incompatibly.
pub const PEAK_SCHEMA_VERSION: u32 = 1;

/// Fatal peak database load failures
#[derive(Debug, Error)]
pub enum PeakError {
    #[error("failed to read peak database {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("peak database {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("peak database {path} has no schema version")]
    MissingVersion { path: PathBuf },

    #[error("peak database {path} has schema version {found}, expected {expected}")]
    UnsupportedVersion {
        path: PathBuf,
        found: u64,
        expected: u32,
    },

    #[error("failed to create peak database {path}: {source}")]
    Bootstrap {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Highest total seen for one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakRate {
    pub rate: i64,
    pub timestamp: i64,
}

/// Job record that set the per-job high for one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakJob {
    pub job: AggregatedJob,
    pub timestamp: i64,
}

/// Operations whose records changed in one update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeakUpdate {
    pub new_totals: Vec<Operation>,
    pub new_jobs: Vec<Operation>,
}

impl PeakUpdate {
    pub fn is_empty(&self) -> bool {
        self.new_totals.is_empty() && self.new_jobs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakDatabase {
    pub version: u32,
    #[serde(default)]
    pub top_ops: BTreeMap<Operation, PeakRate>,
    #[serde(default)]
    pub top_job_per_op: BTreeMap<Operation, PeakJob>,
}

impl Default for PeakDatabase {
    fn default() -> Self {
        Self {
            version: PEAK_SCHEMA_VERSION,
            top_ops: BTreeMap::new(),
            top_job_per_op: BTreeMap::new(),
        }
    }
}

impl PeakDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.top_ops.is_empty() && self.top_job_per_op.is_empty()
    }

    /// Fold one poll's totals and jobs into the records
    ///
    /// Per operation, the whole poll is scanned for its best job first (ties
    /// go to the smallest job_id); only that contender is compared against the
    /// stored record. Records are replaced on a strictly greater value or when
    /// none exists yet.
    pub fn update(
        &mut self,
        totals: &OpCounts,
        jobs: &BTreeMap<String, AggregatedJob>,
        now: i64,
    ) -> PeakUpdate {
        let mut changes = PeakUpdate::default();

        for (op, total) in totals.iter() {
            let replace = self.top_ops.get(&op).map_or(true, |peak| total > peak.rate);
            if replace {
                self.top_ops.insert(op, PeakRate { rate: total, timestamp: now });
                changes.new_totals.push(op);
            }
        }

        for op in Operation::ALL {
            let Some((contender, value)) = best_job(jobs, op) else {
                continue;
            };
            let replace = self
                .top_job_per_op
                .get(&op)
                .map_or(true, |peak| value > peak.job.counts.value(op));
            if replace {
                self.top_job_per_op.insert(
                    op,
                    PeakJob {
                        job: contender.clone(),
                        timestamp: now,
                    },
                );
                changes.new_jobs.push(op);
            }
        }

        changes
    }
}

/// Job with the highest present value for `op`, first job_id on ties
fn best_job(jobs: &BTreeMap<String, AggregatedJob>, op: Operation) -> Option<(&AggregatedJob, i64)> {
    let mut best: Option<(&AggregatedJob, i64)> = None;
    for job in jobs.values() {
        let Some(value) = job.get(op) else {
            continue;
        };
        if best.map_or(true, |(_, top)| value > top) {
            best = Some((job, value));
        }
    }
    best
}

/// Outcome of opening the database at the start of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeakLoad {
    /// Existing records were read back
    Loaded(PeakDatabase),
    /// No file existed; an empty database was created and persisted, there is
    /// nothing to compare against this cycle
    Bootstrapped(PeakDatabase),
}

impl PeakLoad {
    pub fn into_database(self) -> PeakDatabase {
        match self {
            PeakLoad::Loaded(db) | PeakLoad::Bootstrapped(db) => db,
        }
    }
}

/// File-backed home of the peak database
#[derive(Debug, Clone)]
pub struct PeakStore {
    path: PathBuf,
}

impl PeakStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the database, bootstrapping an empty one if the file is absent
    pub fn load(&self) -> std::result::Result<PeakLoad, PeakError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let db = PeakDatabase::new();
                self.write(&db).map_err(|source| PeakError::Bootstrap {
                    path: self.path.clone(),
                    source,
                })?;
                info!(path = %self.path.display(), "Created empty peak database");
                return Ok(PeakLoad::Bootstrapped(db));
            }
            Err(source) => {
                return Err(PeakError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        self.decode(&content).map(PeakLoad::Loaded)
    }

    /// Persist the database, replacing the file atomically
    pub fn save(&self, db: &PeakDatabase) -> Result<()> {
        self.write(db)
            .with_context(|| format!("Failed to write peak database: {}", self.path.display()))
    }

    fn write(&self, db: &PeakDatabase) -> io::Result<()> {
        let content = serde_json::to_vec_pretty(db)?;
        atomic_write(&self.path, &content)
    }

    fn decode(&self, content: &str) -> std::result::Result<PeakDatabase, PeakError> {
        let corrupt = |source| PeakError::Corrupt {
            path: self.path.clone(),
            source,
        };

        let value: serde_json::Value = serde_json::from_str(content).map_err(corrupt)?;
        let found = value
            .get("version")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| PeakError::MissingVersion {
                path: self.path.clone(),
            })?;
        if found != u64::from(PEAK_SCHEMA_VERSION) {
            return Err(PeakError::UnsupportedVersion {
                path: self.path.clone(),
                found,
                expected: PEAK_SCHEMA_VERSION,
            });
        }

        serde_json::from_value(value).map_err(corrupt)
    }
}
