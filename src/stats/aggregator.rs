//! Per-poll job aggregation
//!
//! Merges the entries every storage target reported for one poll into a
//! single cluster-wide record per job. Counters are added, so the result does
//! not depend on the order in which hosts answered. Timestamp fields are kept
//! in a side index and overwritten, last writer wins; the rate engine uses
//! them to find each job's own sampling window.

use crate::stats::{AggregatedJob, JobEntry, JobTimes, Operation};
use std::collections::BTreeMap;

/// Everything one poll learned about the cluster's jobs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSnapshot {
    /// Poll time in epoch seconds
    pub timestamp: i64,
    /// job_id → merged counters
    jobs: BTreeMap<String, AggregatedJob>,
    /// job_id → last-seen timestamp fields
    times: BTreeMap<String, JobTimes>,
}

impl PollSnapshot {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            jobs: BTreeMap::new(),
            times: BTreeMap::new(),
        }
    }

    /// Merge one host's entry for a job into the snapshot
    ///
    /// Only recognized operations with a present, non-zero `samples` counter
    /// contribute. The job is registered even if nothing contributes, so it
    /// still counts towards the poll's distinct job total.
    pub fn merge(&mut self, entry: &JobEntry) {
        let job = self
            .jobs
            .entry(entry.job_id.clone())
            .or_insert_with(|| AggregatedJob::new(entry.job_id.clone()));

        for name in entry.metrics.keys() {
            let Some(op) = Operation::from_metric_name(name) else {
                continue;
            };
            match entry.samples(name) {
                Some(samples) if samples != 0 => {
                    job.counts.add(op, samples);
                    job.counts.add(Operation::Ops, samples);
                }
                _ => {}
            }
        }

        self.times
            .entry(entry.job_id.clone())
            .or_default()
            .overwrite_with(&entry.times);
    }

    /// Merge a batch of entries
    pub fn merge_all<'a>(&mut self, entries: impl IntoIterator<Item = &'a JobEntry>) {
        for entry in entries {
            self.merge(entry);
        }
    }

    pub fn job(&self, job_id: &str) -> Option<&AggregatedJob> {
        self.jobs.get(job_id)
    }

    pub fn times(&self, job_id: &str) -> Option<&JobTimes> {
        self.times.get(job_id)
    }

    /// Jobs in ascending job_id order
    pub fn jobs(&self) -> &BTreeMap<String, AggregatedJob> {
        &self.jobs
    }

    pub fn times_index(&self) -> &BTreeMap<String, JobTimes> {
        &self.times
    }

    /// Number of distinct job ids seen this poll
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Consume the snapshot, keeping only the merged jobs
    pub fn into_jobs(self) -> BTreeMap<String, AggregatedJob> {
        self.jobs
    }
}
