//! Raw job_stats retrieval from storage servers
//!
//! The aggregation engine only ever sees complete, per-target text blobs. How
//! they are obtained is behind [`Fetcher`]; [`ssh::SshFetcher`] is the
//! production implementation.
//!
//! A failed fetch is reported as an explicit [`FetchError`] for that target.
//! It is never turned into an empty blob, because an empty blob means the
//! target answered and had no active jobs.

pub mod ssh;

use std::future::Future;
use thiserror::Error;

/// Errors fetching from one host
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to run remote command on {host}: {source}")]
    Spawn {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command on {host} timed out after {timeout_secs}s")]
    Timeout { host: String, timeout_secs: u64 },

    #[error("command on {host} failed with exit code {exit_code:?}: {stderr}")]
    CommandFailed {
        host: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("output from {host} is not valid UTF-8")]
    InvalidUtf8 { host: String },
}

/// One job_stats parameter on one host
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchTarget {
    pub host: String,
    pub param: String,
}

impl FetchTarget {
    pub fn new(host: impl Into<String>, param: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            param: param.into(),
        }
    }
}

/// What one target returned
#[derive(Debug)]
pub struct HostBlob {
    pub target: FetchTarget,
    pub outcome: Result<String, FetchError>,
}

/// Parameter discovery result for one host
#[derive(Debug)]
pub struct HostParams {
    pub host: String,
    pub outcome: Result<Vec<String>, FetchError>,
}

/// Source of raw job_stats dumps
///
/// Both calls complete only when every host has answered or failed, so the
/// caller always gets one result per requested host or target.
pub trait Fetcher {
    /// List the job_stats parameters matching `pattern` on each host
    fn discover(
        &self,
        hosts: &[String],
        pattern: &str,
    ) -> impl Future<Output = Vec<HostParams>> + Send;

    /// Read every target's current dump
    fn fetch(&self, targets: &[FetchTarget]) -> impl Future<Output = Vec<HostBlob>> + Send;
}
