//! gljobstat - cluster-wide Lustre job_stats top
//!
//! gljobstat polls many OSS/MDS servers for their per-job I/O counters,
//! merges the dumps into cluster-wide job statistics and reports the busiest
//! jobs, optionally as rates, differences or shares of the total, together
//! with all-time peaks.
//!
//! # Architecture
//!
//! - **fetch**: concurrent `lctl` over ssh, one raw dump per target
//! - **stats**: parser, merge, rate/difference, totals, top-K and peak tracking
//! - **runner**: the poll loop with whole-cycle retry
//! - **output**: YAML stream and JSON lines reports
//! - **config**: CLI flags layered over a TOML file

pub mod config;
pub mod fetch;
pub mod logging;
pub mod output;
pub mod runner;
pub mod stats;
pub mod util;

// Re-export commonly used types
pub use config::Config;
pub use runner::Runner;

/// Result type used throughout gljobstat
pub type Result<T> = anyhow::Result<T>;
