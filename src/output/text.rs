//! YAML document stream output
//!
//! Each poll is one YAML document. Job rows keep the compact one-line layout
//! with a padded job_id column:
//!
//! ```text
//! ---
//! timestamp: 1697018723
//! servers_queried: 3
//! servers_failed: 0
//! total_jobs: 42
//! top_5_jobs:
//! - dd.0:            {ops: 120, rd: 100, wr: 20}
//! - cp.1:            {ops: 4, op: 4}
//! ...
//! ```

use super::{PollReport, ReportJob, ReportPeak, ReportTotal, Reporter, ValueKind};
use crate::Result;
use anyhow::Context;
use std::io::Write;

/// Writes reports as a YAML document stream
pub struct YamlReporter<W: Write> {
    out: W,
    fullname: bool,
    jobid_length: usize,
}

impl<W: Write> YamlReporter<W> {
    pub fn new(out: W, fullname: bool, jobid_length: usize) -> Self {
        Self {
            out,
            fullname,
            jobid_length,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for YamlReporter<W> {
    fn emit(&mut self, report: &PollReport) -> Result<()> {
        let doc = render(report, self.fullname, self.jobid_length);
        self.out
            .write_all(doc.as_bytes())
            .and_then(|_| self.out.flush())
            .context("Failed to write report")
    }
}

/// Render one report as a complete YAML document
pub fn render(report: &PollReport, fullname: bool, jobid_length: usize) -> String {
    let mut doc = String::new();

    doc.push_str("---\n");
    doc.push_str(&format!("timestamp: {}\n", report.timestamp));
    if let Some(duration) = report.query_duration {
        doc.push_str(&format!("query_duration: {}\n", duration));
    }
    doc.push_str(&format!("servers_queried: {}\n", report.servers_queried));
    doc.push_str(&format!("servers_failed: {}\n", report.servers_failed));
    doc.push_str(&format!("total_jobs: {}\n", report.total_jobs));
    if report.values != ValueKind::Count {
        doc.push_str(&format!("values: {}\n", value_kind_name(report.values)));
    }

    doc.push_str(&format!("top_{}_jobs:\n", report.count));
    for job in &report.top_jobs {
        doc.push_str(&job_line(job, fullname, jobid_length));
        doc.push('\n');
    }

    if let Some(totals) = &report.totals {
        doc.push_str(&totals_block(totals, fullname));
    }
    if let Some(peaks) = &report.peaks {
        doc.push_str(&peaks_block(peaks, fullname));
    }

    doc.push_str("...\n");
    doc
}

fn value_kind_name(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Count => "count",
        ValueKind::Rate => "rate",
        ValueKind::Difference => "difference",
        ValueKind::Percent => "percent",
    }
}

/// `- <job_id>:<padding>{op: n, ...}`
fn job_line(job: &ReportJob, fullname: bool, jobid_length: usize) -> String {
    let label = format!("{}:", job.job_id);
    let mut fields: Vec<String> = job
        .counts
        .iter()
        .map(|(op, value)| format!("{}: {}", op.display_name(fullname), value))
        .collect();
    if let Some(window) = job.window {
        fields.push(format!("window: {}", window));
    }

    format!("- {:<width$}{{{}}}", label, fields.join(", "), width = jobid_length)
}

fn totals_block(totals: &[ReportTotal], fullname: bool) -> String {
    let mut block = String::from("totals:\n");
    for total in totals {
        block.push_str(&format!(
            "  {}: {}\n",
            total.operation.display_name(fullname),
            total.value
        ));
    }
    block
}

fn peaks_block(peaks: &[ReportPeak], fullname: bool) -> String {
    let mut block = String::from("peaks:\n");
    for peak in peaks {
        let mut fields = vec![
            format!("rate: {}", peak.rate),
            format!("timestamp: {}", peak.time.epoch),
            format!("time: \"{}\"", peak.time.rfc3339),
        ];
        if let (Some(job_id), Some(value)) = (&peak.job_id, peak.job_value) {
            fields.push(format!("job_id: {}", job_id));
            fields.push(format!("job_value: {}", value));
        }
        if let Some(job_time) = &peak.job_time {
            fields.push(format!("job_timestamp: {}", job_time.epoch));
            fields.push(format!("job_time: \"{}\"", job_time.rfc3339));
        }
        block.push_str(&format!(
            "  {}: {{{}}}\n",
            peak.operation.display_name(fullname),
            fields.join(", ")
        ));
    }
    block
}
