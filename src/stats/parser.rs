//! job_stats dump parser
//!
//! Parses the text a storage target prints for `lctl get_param -n *.*.job_stats`:
//!
//! ```text
//! job_stats:
//! - job_id:          dd.1000
//!   snapshot_time:   1697018723.537620283 secs.nsecs
//!   start_time:      1697018700.000000000 secs.nsecs
//!   elapsed_time:    23.537620283 secs.nsecs
//!   open:            { samples:           4, unit: usecs, min: 3, max: 19, sum: 41, sumsq: 615 }
//!   read_bytes:      { samples:           0, unit: bytes, min: 0, max: 0, sum: 0, sumsq: 0 }
//! - job_id:          ls.0
//!   ...
//! ```
//!
//! Each line is classified on its own ([`classify`]), then a two-state machine
//! groups lines into entries:
//!
//! ```text
//!            marker                 marker (flush)
//! AwaitEntry ──────► InEntry ◄──────────────┐
//!     ▲               │  │ metric/timestamp │
//!     │   header      │  └──────────────────┘
//!     └───(flush)─────┘
//!                     end of input: flush
//! ```
//!
//! Empty or whitespace-only input yields no entries; a target with no active
//! jobs prints only the header.

use crate::stats::{CounterValue, Counters, JobEntry};
use thiserror::Error;

/// Header line opening a dump
const HEADER: &str = "job_stats:";

/// Prefix of the line opening each entry
const JOB_MARKER: &str = "- job_id:";

/// Typed parse failure with the 1-based line number it occurred on
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("job_stats line {line}: {kind}")]
pub struct ParseError {
    pub line: usize,
    pub kind: ParseErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("`{0}` appears before any job marker")]
    OutsideEntry(String),

    #[error("job marker without a job id")]
    MissingJobId,

    #[error("malformed {field} value `{value}`")]
    MalformedTimestamp { field: &'static str, value: String },

    #[error("malformed counter `{counter}` in metric `{metric}`")]
    MalformedCounter { metric: String, counter: String },

    #[error("unrecognized line `{0}`")]
    Unrecognized(String),
}

/// Which timestamp a timestamp line carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeField {
    Snapshot,
    Start,
    Elapsed,
}

impl TimeField {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "snapshot_time" => Some(TimeField::Snapshot),
            "start_time" => Some(TimeField::Start),
            "elapsed_time" => Some(TimeField::Elapsed),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            TimeField::Snapshot => "snapshot_time",
            TimeField::Start => "start_time",
            TimeField::Elapsed => "elapsed_time",
        }
    }
}

/// One classified input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    Blank,
    Header,
    Marker(&'a str),
    Timestamp(TimeField, i64),
    Metric(&'a str, Counters),
}

/// Classify a single line without any knowledge of its neighbours
pub fn classify(raw: &str) -> Result<Line<'_>, ParseErrorKind> {
    let line = raw.trim();

    if line.is_empty() {
        return Ok(Line::Blank);
    }
    if line == HEADER {
        return Ok(Line::Header);
    }
    if let Some(rest) = line.strip_prefix(JOB_MARKER) {
        return rest
            .split_whitespace()
            .next()
            .map(Line::Marker)
            .ok_or(ParseErrorKind::MissingJobId);
    }

    let (name, rest) = line
        .split_once(':')
        .ok_or_else(|| ParseErrorKind::Unrecognized(line.to_string()))?;
    let name = name.trim();
    let rest = rest.trim();

    if let Some(field) = TimeField::from_name(name) {
        return parse_timestamp(field, rest).map(|secs| Line::Timestamp(field, secs));
    }

    match rest.strip_prefix('{').and_then(|body| body.strip_suffix('}')) {
        Some(body) if !name.is_empty() => parse_counters(name, body).map(|c| Line::Metric(name, c)),
        _ => Err(ParseErrorKind::Unrecognized(line.to_string())),
    }
}

/// `1697018723.537620283 secs.nsecs` → 1697018723
fn parse_timestamp(field: TimeField, rest: &str) -> Result<i64, ParseErrorKind> {
    let malformed = || ParseErrorKind::MalformedTimestamp {
        field: field.name(),
        value: rest.to_string(),
    };

    let token = rest.split_whitespace().next().ok_or_else(malformed)?;
    let whole = token.split('.').next().unwrap_or(token);
    whole.parse::<i64>().map_err(|_| malformed())
}

/// `samples: 4, unit: usecs, min: 3` → {samples: 4, unit: "usecs", min: 3}
fn parse_counters(metric: &str, body: &str) -> Result<Counters, ParseErrorKind> {
    let mut counters = Counters::new();

    for item in body.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let (key, value) = item
            .split_once(':')
            .ok_or_else(|| ParseErrorKind::MalformedCounter {
                metric: metric.to_string(),
                counter: item.to_string(),
            })?;
        let value = value.trim();
        let value = match value.parse::<i64>() {
            Ok(v) => CounterValue::Integer(v),
            Err(_) => CounterValue::Text(value.to_string()),
        };
        counters.insert(key.trim().to_string(), value);
    }

    Ok(counters)
}

#[derive(Debug)]
enum State {
    AwaitEntry,
    InEntry(JobEntry),
}

/// Line-at-a-time state machine over one dump
#[derive(Debug)]
pub struct RecordParser {
    state: State,
    entries: Vec<JobEntry>,
    line_no: usize,
}

impl RecordParser {
    pub fn new() -> Self {
        Self {
            state: State::AwaitEntry,
            entries: Vec::new(),
            line_no: 0,
        }
    }

    /// Feed the next line of the dump
    pub fn feed(&mut self, raw: &str) -> Result<(), ParseError> {
        self.line_no += 1;
        let line_no = self.line_no;
        let line = classify(raw).map_err(|kind| ParseError { line: line_no, kind })?;

        match line {
            Line::Blank => {}
            Line::Header => self.flush(),
            Line::Marker(job_id) => {
                self.flush();
                self.state = State::InEntry(JobEntry::new(job_id));
            }
            Line::Timestamp(field, secs) => {
                let entry = self.current(raw)?;
                match field {
                    TimeField::Snapshot => entry.times.snapshot_time = Some(secs),
                    TimeField::Start => entry.times.start_time = Some(secs),
                    TimeField::Elapsed => entry.times.elapsed_time = Some(secs),
                }
            }
            Line::Metric(name, counters) => {
                let name = name.to_string();
                self.current(raw)?.metrics.insert(name, counters);
            }
        }

        Ok(())
    }

    /// Flush the in-progress entry and return everything parsed
    pub fn finish(mut self) -> Vec<JobEntry> {
        self.flush();
        self.entries
    }

    fn current(&mut self, raw: &str) -> Result<&mut JobEntry, ParseError> {
        match &mut self.state {
            State::InEntry(entry) => Ok(entry),
            State::AwaitEntry => Err(ParseError {
                line: self.line_no,
                kind: ParseErrorKind::OutsideEntry(raw.trim().to_string()),
            }),
        }
    }

    fn flush(&mut self) {
        if let State::InEntry(entry) = std::mem::replace(&mut self.state, State::AwaitEntry) {
            self.entries.push(entry);
        }
    }
}

impl Default for RecordParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse one host's dump into job entries
pub fn parse(raw: &str) -> Result<Vec<JobEntry>, ParseError> {
    let mut parser = RecordParser::new();
    for line in raw.lines() {
        parser.feed(line)?;
    }
    Ok(parser.finish())
}
