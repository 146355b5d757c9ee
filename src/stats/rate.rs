//! Rate and difference computation between consecutive polls
//!
//! [`RateState`] is owned by the poll loop and carries exactly one reference
//! snapshot from the previous poll. The first call only stores a baseline and
//! returns [`RateOutcome::Baseline`]; there is nothing comparable to report
//! until a second poll arrives.
//!
//! Each job is normalized by its own sampling window, the difference between
//! the `snapshot_time` its targets reported in the two polls, not by the wall
//! clock time between queries. A job whose window cannot be determined, that
//! vanished since the reference poll, or that lost a metric gets a zero for
//! the affected values.

use crate::stats::aggregator::PollSnapshot;
use crate::stats::{round_ratio, AggregatedJob};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// How consecutive cumulative counters are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaMode {
    /// `round(delta / window)`, operations per second
    Rate,
    /// Raw `delta`, operations since the previous poll
    Difference,
}

/// Result of comparing a poll against the reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateOutcome {
    /// First poll: the snapshot became the reference, nothing to report
    Baseline,
    Computed(RateReport),
}

/// Per-job deltas or rates for one poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateReport {
    /// job_id → rate/difference record
    pub jobs: BTreeMap<String, AggregatedJob>,
    /// job_id → sampling window in seconds, `None` when it could not be determined
    pub windows: BTreeMap<String, Option<i64>>,
    /// Seconds between the reference poll and this one
    pub query_duration: i64,
}

/// Retained reference for rate/difference mode
#[derive(Debug, Clone)]
pub struct RateState {
    mode: DeltaMode,
    reference: Option<PollSnapshot>,
}

impl RateState {
    pub fn new(mode: DeltaMode) -> Self {
        Self {
            mode,
            reference: None,
        }
    }

    /// Whether a baseline poll has been stored
    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    /// Compare `snapshot` against the reference, then make it the new reference
    ///
    /// The snapshot's own timestamp is the poll time.
    pub fn compute(&mut self, snapshot: PollSnapshot) -> RateOutcome {
        let outcome = match &self.reference {
            None => {
                debug!("Stored baseline snapshot, no rates this poll");
                RateOutcome::Baseline
            }
            Some(reference) => {
                let report = compare(self.mode, reference, &snapshot);
                debug!(
                    jobs = report.jobs.len(),
                    query_duration = report.query_duration,
                    "Computed per-job deltas"
                );
                RateOutcome::Computed(report)
            }
        };

        self.reference = Some(snapshot);
        outcome
    }
}

/// Per-job sampling window between two polls
fn sampling_window(reference: &PollSnapshot, current: &PollSnapshot, job_id: &str) -> Option<i64> {
    let old = reference.times(job_id)?.snapshot_time?;
    let new = current.times(job_id)?.snapshot_time?;
    Some(new.saturating_sub(old))
}

fn compare(mode: DeltaMode, reference: &PollSnapshot, current: &PollSnapshot) -> RateReport {
    let mut report = RateReport {
        query_duration: current.timestamp.saturating_sub(reference.timestamp),
        ..Default::default()
    };

    for (job_id, old_job) in reference.jobs() {
        let window = sampling_window(reference, current, job_id);
        let new_job = current.job(job_id);
        let mut record = AggregatedJob::new(job_id.clone());

        for (op, old) in old_job.counts.iter() {
            let new = new_job.and_then(|job| job.get(op));
            let value = match (window, new) {
                (Some(window), Some(new)) => match mode {
                    DeltaMode::Rate if window <= 0 => 0,
                    DeltaMode::Rate => round_ratio(new as i128 - old as i128, window as i128),
                    DeltaMode::Difference => new.saturating_sub(old),
                },
                _ => 0,
            };
            record.counts.set(op, value);
        }

        report.jobs.insert(job_id.clone(), record);
        report.windows.insert(job_id.clone(), window);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{CounterValue, Counters, JobEntry, Operation};

    fn snapshot(timestamp: i64, jobs: &[(&str, Option<i64>, &[(&str, i64)])]) -> PollSnapshot {
        let mut snapshot = PollSnapshot::new(timestamp);
        for (job_id, snapshot_time, metrics) in jobs {
            let mut entry = JobEntry::new(*job_id);
            entry.times.snapshot_time = *snapshot_time;
            for (name, samples) in metrics.iter() {
                let mut counters = Counters::new();
                counters.insert("samples".into(), CounterValue::Integer(*samples));
                entry.metrics.insert(name.to_string(), counters);
            }
            snapshot.merge(&entry);
        }
        snapshot
    }

    fn computed(outcome: RateOutcome) -> RateReport {
        match outcome {
            RateOutcome::Computed(report) => report,
            RateOutcome::Baseline => panic!("expected computed rates"),
        }
    }

    #[test]
    fn test_first_poll_is_baseline() {
        let mut state = RateState::new(DeltaMode::Rate);
        assert!(!state.has_reference());
        let outcome = state.compute(snapshot(1000, &[("job", Some(100), &[("open", 10)])]));
        assert_eq!(outcome, RateOutcome::Baseline);
        assert!(state.has_reference());
    }

    #[test]
    fn test_rate_uses_job_window() {
        let mut state = RateState::new(DeltaMode::Rate);
        state.compute(snapshot(1000, &[("job", Some(100), &[("open", 10)])]));
        let report = computed(state.compute(snapshot(1030, &[("job", Some(110), &[("open", 25)])])));

        assert_eq!(report.query_duration, 30);
        let job = &report.jobs["job"];
        assert_eq!(job.get(Operation::Open), Some(2));
        assert_eq!(job.get(Operation::Ops), Some(2));
        assert_eq!(report.windows["job"], Some(10));
    }

    #[test]
    fn test_difference_mode_is_raw_delta() {
        let mut state = RateState::new(DeltaMode::Difference);
        state.compute(snapshot(1000, &[("job", Some(100), &[("open", 10)])]));
        let report = computed(state.compute(snapshot(1030, &[("job", Some(110), &[("open", 25)])])));

        assert_eq!(report.jobs["job"].get(Operation::Open), Some(15));
    }

    #[test]
    fn test_zero_window_is_zero_rate() {
        let mut state = RateState::new(DeltaMode::Rate);
        state.compute(snapshot(1000, &[("job", Some(100), &[("open", 10)])]));
        let report = computed(state.compute(snapshot(1010, &[("job", Some(100), &[("open", 25)])])));

        assert_eq!(report.jobs["job"].get(Operation::Open), Some(0));
        assert_eq!(report.windows["job"], Some(0));
    }

    #[test]
    fn test_backwards_window_is_zero_rate() {
        let mut state = RateState::new(DeltaMode::Rate);
        state.compute(snapshot(1000, &[("job", Some(110), &[("open", 10)])]));
        let report = computed(state.compute(snapshot(1010, &[("job", Some(100), &[("open", 25)])])));

        assert_eq!(report.jobs["job"].get(Operation::Open), Some(0));
        assert_eq!(report.jobs["job"].get(Operation::Ops), Some(0));
        assert_eq!(report.windows["job"], Some(-10));
    }

    #[test]
    fn test_extreme_counters_saturate() {
        let mut state = RateState::new(DeltaMode::Difference);
        state.compute(snapshot(1000, &[("job", Some(100), &[("open", -i64::MAX)])]));
        let report = computed(state.compute(snapshot(1010, &[("job", Some(110), &[("open", i64::MAX)])])));
        assert_eq!(report.jobs["job"].get(Operation::Open), Some(i64::MAX));

        let mut state = RateState::new(DeltaMode::Difference);
        state.compute(snapshot(1000, &[("job", Some(100), &[("open", i64::MAX)])]));
        let report = computed(state.compute(snapshot(1010, &[("job", Some(110), &[("open", -i64::MAX)])])));
        assert_eq!(report.jobs["job"].get(Operation::Open), Some(i64::MIN));
    }

    #[test]
    fn test_extreme_window_saturates() {
        let mut state = RateState::new(DeltaMode::Rate);
        state.compute(snapshot(1000, &[("job", Some(-i64::MAX), &[("open", -i64::MAX)])]));
        let report = computed(state.compute(snapshot(
            1010,
            &[("job", Some(i64::MAX), &[("open", i64::MAX)])],
        )));

        assert_eq!(report.windows["job"], Some(i64::MAX));
        // (2 * i64::MAX) / i64::MAX
        assert_eq!(report.jobs["job"].get(Operation::Open), Some(2));
    }

    #[test]
    fn test_missing_window_job_or_metric_is_zero() {
        let mut state = RateState::new(DeltaMode::Difference);
        state.compute(snapshot(
            1000,
            &[
                ("no_window", None, &[("open", 10)]),
                ("gone", Some(100), &[("open", 10)]),
                ("partial", Some(100), &[("open", 10), ("close", 4)]),
            ],
        ));
        let report = computed(state.compute(snapshot(
            1010,
            &[
                ("no_window", None, &[("open", 50)]),
                ("partial", Some(110), &[("open", 30)]),
                ("new_job", Some(110), &[("open", 99)]),
            ],
        )));

        assert_eq!(report.jobs["no_window"].get(Operation::Open), Some(0));
        assert_eq!(report.windows["no_window"], None);
        assert_eq!(report.jobs["gone"].get(Operation::Open), Some(0));
        assert_eq!(report.jobs["partial"].get(Operation::Open), Some(20));
        assert_eq!(report.jobs["partial"].get(Operation::Close), Some(0));
        assert!(!report.jobs.contains_key("new_job"));
    }

    #[test]
    fn test_reference_rolls_forward() {
        let mut state = RateState::new(DeltaMode::Difference);
        state.compute(snapshot(1000, &[("job", Some(100), &[("open", 10)])]));
        state.compute(snapshot(1010, &[("job", Some(110), &[("open", 25)])]));
        let report = computed(state.compute(snapshot(1020, &[("job", Some(120), &[("open", 26)])])));

        assert_eq!(report.query_duration, 10);
        assert_eq!(report.jobs["job"].get(Operation::Open), Some(1));
    }
}
