//! Per-poll report model and renderers
//!
//! The runner turns every completed poll into one [`PollReport`] and hands it
//! to a [`Reporter`]. Two renderers exist:
//!
//! - [`text::YamlReporter`]: a YAML document stream (`---` ... `...`) for
//!   people and for tools that read YAML streams
//! - [`json::JsonReporter`]: one JSON object per line
//!
//! Reports are written to stdout; all diagnostics go through `tracing` to
//! stderr so the stream stays machine readable.

pub mod json;
pub mod text;

use crate::config::{OutputFormat, ReportConfig};
use crate::stats::peak::PeakDatabase;
use crate::stats::rate::DeltaMode;
use crate::stats::{AggregatedJob, OpCounts, Operation};
use crate::util::time::format_epoch;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// What the numbers in a report mean
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Cumulative counters as read from the targets
    Count,
    /// Operations per second since the previous poll
    Rate,
    /// Operations since the previous poll
    Difference,
    /// Share of the operation's grand total, in percent
    Percent,
}

impl ValueKind {
    pub fn for_mode(delta: Option<DeltaMode>, percent: bool) -> Self {
        match (percent, delta) {
            (true, _) => ValueKind::Percent,
            (false, Some(DeltaMode::Rate)) => ValueKind::Rate,
            (false, Some(DeltaMode::Difference)) => ValueKind::Difference,
            (false, None) => ValueKind::Count,
        }
    }
}

/// Epoch seconds with their RFC 3339 rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTime {
    pub epoch: i64,
    pub rfc3339: String,
}

impl ReportTime {
    pub fn new(epoch: i64) -> Self {
        Self {
            epoch,
            rfc3339: format_epoch(epoch),
        }
    }
}

/// One row of the top jobs list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportJob {
    pub job_id: String,
    pub counts: OpCounts,
    /// Sampling window in seconds, when requested and known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<i64>,
}

impl ReportJob {
    pub fn new(job: AggregatedJob) -> Self {
        Self {
            job_id: job.job_id,
            counts: job.counts,
            window: None,
        }
    }
}

/// One grand total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTotal {
    pub operation: Operation,
    pub value: i64,
}

/// All-time record for one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeak {
    pub operation: Operation,
    /// Highest grand total ever seen
    pub rate: i64,
    pub time: ReportTime,
    /// Job holding the per-job record, if one was ever seen
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_time: Option<ReportTime>,
}

impl ReportPeak {
    /// Peak block for a database, in report order
    pub fn from_database(db: &PeakDatabase) -> Vec<ReportPeak> {
        Operation::ALL
            .iter()
            .filter_map(|op| {
                let total = db.top_ops.get(op);
                let job = db.top_job_per_op.get(op);
                if total.is_none() && job.is_none() {
                    return None;
                }
                Some(ReportPeak {
                    operation: *op,
                    rate: total.map_or(0, |t| t.rate),
                    time: ReportTime::new(total.map_or(0, |t| t.timestamp)),
                    job_id: job.map(|j| j.job.job_id.clone()),
                    job_value: job.map(|j| j.job.counts.value(*op)),
                    job_time: job.map(|j| ReportTime::new(j.timestamp)),
                })
            })
            .collect()
    }
}

/// Everything one poll reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollReport {
    pub timestamp: i64,
    /// Seconds since the previous poll (rate/difference modes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_duration: Option<i64>,
    pub servers_queried: usize,
    pub servers_failed: usize,
    /// Distinct job_ids seen this poll
    pub total_jobs: usize,
    pub values: ValueKind,
    /// Requested number of top jobs
    pub count: usize,
    pub top_jobs: Vec<ReportJob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totals: Option<Vec<ReportTotal>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peaks: Option<Vec<ReportPeak>>,
}

/// Sink for poll reports
pub trait Reporter {
    fn emit(&mut self, report: &PollReport) -> Result<()>;
}

/// Reporter writing the configured format to `out`
pub fn reporter_for<W: Write + Send + 'static>(
    report: &ReportConfig,
    jobid_length: usize,
    out: W,
) -> Box<dyn Reporter + Send> {
    match report.format {
        OutputFormat::Yaml => Box::new(text::YamlReporter::new(out, report.fullname, jobid_length)),
        OutputFormat::Json => Box::new(json::JsonReporter::new(out)),
    }
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn emit(&mut self, report: &PollReport) -> Result<()> {
        (**self).emit(report)
    }
}
