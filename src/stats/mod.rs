//! Job statistics aggregation engine
//!
//! Turns raw per-host job_stats dumps into cluster-wide per-job figures.
//!
//! Pipeline for one poll:
//!
//! ```text
//! raw blobs ──► parser ──► JobEntry* ──► aggregator ──► PollSnapshot
//!                                                          │
//!                     ┌────────────── rate (rate/diff) ◄───┘
//!                     ▼
//!                  totals ──► top ──► report
//!                     │
//!                     └──► peak (persisted)
//! ```
//!
//! # Example
//!
//! ```
//! use gljobstat::stats::{parser, aggregator::PollSnapshot, Operation};
//!
//! let dump = "job_stats:\n\
//! - job_id:          dd.0\n  \
//!   snapshot_time:   1700000000.123 secs.nsecs\n  \
//!   open:            { samples: 3, unit: usecs, min: 1, max: 9, sum: 12 }\n";
//!
//! let entries = parser::parse(dump).unwrap();
//! let mut snapshot = PollSnapshot::new(1700000000);
//! for entry in &entries {
//!     snapshot.merge(entry);
//! }
//!
//! let job = snapshot.job("dd.0").unwrap();
//! assert_eq!(job.get(Operation::Open), Some(3));
//! assert_eq!(job.ops(), 3);
//! ```

pub mod aggregator;
pub mod operation;
pub mod parser;
pub mod peak;
pub mod rate;
pub mod top;
pub mod totals;

pub use operation::{Operation, OPERATION_COUNT};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One counter inside a metric line's `{...}` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CounterValue {
    Integer(i64),
    Text(String),
}

impl CounterValue {
    /// Integer value, if the counter looked numeric
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            CounterValue::Integer(v) => Some(*v),
            CounterValue::Text(_) => None,
        }
    }
}

/// Sub-counters of one metric line (`samples`, `min`, `max`, `sum`, `unit`, ...)
pub type Counters = BTreeMap<String, CounterValue>;

/// Timestamp fields reported for a job, in whole seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTimes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_time: Option<i64>,
}

impl JobTimes {
    /// Overwrite the fields that `other` carries, leave the rest alone
    pub fn overwrite_with(&mut self, other: &JobTimes) {
        if other.snapshot_time.is_some() {
            self.snapshot_time = other.snapshot_time;
        }
        if other.start_time.is_some() {
            self.start_time = other.start_time;
        }
        if other.elapsed_time.is_some() {
            self.elapsed_time = other.elapsed_time;
        }
    }
}

/// One job as reported by one storage target in one poll
///
/// Metric names are kept verbatim; unknown metrics are the aggregator's
/// concern, not the parser's.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobEntry {
    pub job_id: String,
    pub times: JobTimes,
    pub metrics: BTreeMap<String, Counters>,
}

impl JobEntry {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            ..Default::default()
        }
    }

    /// The `samples` sub-counter of a metric, if present and numeric
    pub fn samples(&self, metric: &str) -> Option<i64> {
        self.metrics
            .get(metric)
            .and_then(|counters| counters.get("samples"))
            .and_then(CounterValue::as_integer)
    }
}

/// Fixed-schema counter row: one optional value per known operation
///
/// Absent and zero are different things: an absent column was never
/// reported for the job, a zero column was reported (or computed) as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Operation, i64>", into = "BTreeMap<Operation, i64>")]
pub struct OpCounts {
    values: [Option<i64>; OPERATION_COUNT],
}

impl OpCounts {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, op: Operation) -> Option<i64> {
        self.values[op.index()]
    }

    /// Value of a column, treating absent as zero
    #[inline]
    pub fn value(&self, op: Operation) -> i64 {
        self.get(op).unwrap_or(0)
    }

    #[inline]
    pub fn set(&mut self, op: Operation, value: i64) {
        self.values[op.index()] = Some(value);
    }

    /// Add to a column, creating it if absent
    #[inline]
    pub fn add(&mut self, op: Operation, value: i64) {
        let slot = &mut self.values[op.index()];
        *slot = Some(slot.unwrap_or(0).saturating_add(value));
    }

    /// Present columns in report order
    pub fn iter(&self) -> impl Iterator<Item = (Operation, i64)> + '_ {
        Operation::ALL
            .iter()
            .filter_map(move |&op| self.get(op).map(|v| (op, v)))
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    /// Whether any column holds a non-zero value
    pub fn has_nonzero(&self) -> bool {
        self.values.iter().any(|v| matches!(v, Some(x) if *x != 0))
    }
}

impl From<BTreeMap<Operation, i64>> for OpCounts {
    fn from(map: BTreeMap<Operation, i64>) -> Self {
        let mut counts = OpCounts::new();
        for (op, value) in map {
            counts.set(op, value);
        }
        counts
    }
}

impl From<OpCounts> for BTreeMap<Operation, i64> {
    fn from(counts: OpCounts) -> Self {
        counts.iter().collect()
    }
}

/// Cluster-wide figures for one job in one poll
///
/// Used for merged cumulative counts, for rate/difference records and for
/// percentage records alike; only the meaning of the numbers changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedJob {
    pub job_id: String,
    pub counts: OpCounts,
}

impl AggregatedJob {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            counts: OpCounts::new(),
        }
    }

    #[inline]
    pub fn get(&self, op: Operation) -> Option<i64> {
        self.counts.get(op)
    }

    /// The synthetic total, zero when nothing was counted
    #[inline]
    pub fn ops(&self) -> i64 {
        self.counts.value(Operation::Ops)
    }
}

/// Integer division rounded half-to-even, zero for a zero denominator
pub(crate) fn round_ratio(numerator: i128, denominator: i128) -> i64 {
    if denominator == 0 {
        return 0;
    }
    let (num, den) = if denominator < 0 {
        (-numerator, -denominator)
    } else {
        (numerator, denominator)
    };

    let quotient = num.div_euclid(den);
    let twice_rem = 2 * num.rem_euclid(den);
    let rounded = if twice_rem > den || (twice_rem == den && quotient % 2 != 0) {
        quotient + 1
    } else {
        quotient
    };

    rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_ratio() {
        assert_eq!(round_ratio(15, 10), 2);
        assert_eq!(round_ratio(25, 10), 2);
        assert_eq!(round_ratio(35, 10), 4);
        assert_eq!(round_ratio(14, 10), 1);
        assert_eq!(round_ratio(16, 10), 2);
        assert_eq!(round_ratio(-15, 10), -2);
        assert_eq!(round_ratio(-16, 10), -2);
        assert_eq!(round_ratio(3000, 120), 25);
        assert_eq!(round_ratio(7, 0), 0);
    }

    #[test]
    fn test_op_counts_absent_vs_zero() {
        let mut counts = OpCounts::new();
        assert!(counts.is_empty());
        counts.set(Operation::Read, 0);
        assert!(!counts.is_empty());
        assert!(!counts.has_nonzero());
        assert_eq!(counts.get(Operation::Read), Some(0));
        assert_eq!(counts.get(Operation::Write), None);

        counts.add(Operation::Write, 4);
        counts.add(Operation::Write, 6);
        assert_eq!(counts.get(Operation::Write), Some(10));
        assert!(counts.has_nonzero());
    }

    #[test]
    fn test_op_counts_serialize_as_named_map() {
        let mut counts = OpCounts::new();
        counts.set(Operation::Ops, 5);
        counts.set(Operation::GetInfo, 5);

        let json = serde_json::to_string(&counts).unwrap();
        assert_eq!(json, r#"{"ops":5,"get_info":5}"#);

        let back: OpCounts = serde_json::from_str(&json).unwrap();
        assert_eq!(back, counts);
    }

    #[test]
    fn test_entry_samples() {
        let mut entry = JobEntry::new("job.1");
        let mut counters = Counters::new();
        counters.insert("samples".into(), CounterValue::Integer(7));
        counters.insert("unit".into(), CounterValue::Text("usecs".into()));
        entry.metrics.insert("open".into(), counters);

        assert_eq!(entry.samples("open"), Some(7));
        assert_eq!(entry.samples("close"), None);
    }

    #[test]
    fn test_times_overwrite_only_present_fields() {
        let mut times = JobTimes {
            snapshot_time: Some(10),
            start_time: Some(1),
            elapsed_time: None,
        };
        times.overwrite_with(&JobTimes {
            snapshot_time: Some(20),
            start_time: None,
            elapsed_time: Some(19),
        });
        assert_eq!(times.snapshot_time, Some(20));
        assert_eq!(times.start_time, Some(1));
        assert_eq!(times.elapsed_time, Some(19));
    }
}
