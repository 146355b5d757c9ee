//! Grand totals and per-job percentages

use crate::stats::{round_ratio, AggregatedJob, OpCounts, Operation};
use std::collections::BTreeMap;

/// Sum every present operation column across all jobs
///
/// Works on cumulative counts as well as on rate/difference records; the
/// result has a column for each operation at least one job carried.
pub fn total<'a>(jobs: impl IntoIterator<Item = &'a AggregatedJob>) -> OpCounts {
    let mut totals = OpCounts::new();
    for job in jobs {
        for (op, value) in job.counts.iter() {
            totals.add(op, value);
        }
    }
    totals
}

/// Totals as (operation, value) pairs, largest first
///
/// Equal values keep report order so output is stable between polls.
pub fn sorted_desc(totals: &OpCounts) -> Vec<(Operation, i64)> {
    let mut pairs: Vec<_> = totals.iter().collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1));
    pairs
}

/// Express one job's columns as a share of the totals
///
/// A zero total yields zero rather than dividing.
pub fn percent_of(job: &AggregatedJob, totals: &OpCounts) -> AggregatedJob {
    let mut shares = AggregatedJob::new(job.job_id.clone());
    for (op, value) in job.counts.iter() {
        let share = round_ratio(value as i128 * 100, totals.value(op) as i128);
        shares.counts.set(op, share);
    }
    shares
}

/// [`percent_of`] for every job
pub fn percent(
    jobs: &BTreeMap<String, AggregatedJob>,
    totals: &OpCounts,
) -> BTreeMap<String, AggregatedJob> {
    jobs.iter()
        .map(|(job_id, job)| (job_id.clone(), percent_of(job, totals)))
        .collect()
}
