//! Bounded leaderboard of the busiest jobs
//!
//! Candidates are inserted one at a time into a list kept in descending
//! `ops` order: append, bubble left past every strictly smaller neighbour,
//! drop the tail once over capacity. Capacity is small (default 5), so one
//! insertion step per candidate beats sorting the whole job set.
//!
//! Ties keep arrival order. [`select`] offers candidates in ascending job_id
//! order, so equal `ops` end up ordered by job_id.

use crate::stats::AggregatedJob;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a job_id filter match means
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Drop jobs whose id contains any pattern
    #[default]
    Exclude,
    /// Keep only jobs whose id contains a pattern
    Include,
}

/// Substring filter over job ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    patterns: Vec<String>,
    mode: FilterMode,
}

impl JobFilter {
    pub fn new(patterns: impl IntoIterator<Item = String>, mode: FilterMode) -> Self {
        Self {
            patterns: patterns.into_iter().filter(|p| !p.is_empty()).collect(),
            mode,
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    /// Whether a job id passes the filter
    pub fn accepts(&self, job_id: &str) -> bool {
        let matched = self.patterns.iter().any(|p| job_id.contains(p.as_str()));
        match self.mode {
            FilterMode::Exclude => !matched,
            FilterMode::Include => matched,
        }
    }
}

/// Descending-by-ops list that never grows past its capacity
#[derive(Debug, Clone)]
pub struct TopJobs {
    capacity: usize,
    jobs: Vec<AggregatedJob>,
}

impl TopJobs {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            jobs: Vec::with_capacity(capacity + 1),
        }
    }

    /// Insert one candidate
    pub fn insert(&mut self, job: AggregatedJob) {
        self.jobs.push(job);

        let mut i = self.jobs.len() - 1;
        while i > 0 && self.jobs[i].ops() > self.jobs[i - 1].ops() {
            self.jobs.swap(i, i - 1);
            i -= 1;
        }

        if self.jobs.len() > self.capacity {
            self.jobs.pop();
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn as_slice(&self) -> &[AggregatedJob] {
        &self.jobs
    }

    pub fn into_vec(self) -> Vec<AggregatedJob> {
        self.jobs
    }
}

/// Pick at most `capacity` jobs, busiest first
///
/// Jobs without a single non-zero column are never candidates.
pub fn select(
    jobs: &BTreeMap<String, AggregatedJob>,
    capacity: usize,
    filter: &JobFilter,
) -> Vec<AggregatedJob> {
    let mut top = TopJobs::new(capacity);

    for (job_id, job) in jobs {
        if !job.counts.has_nonzero() || !filter.accepts(job_id) {
            continue;
        }
        top.insert(job.clone());
    }

    top.into_vec()
}
