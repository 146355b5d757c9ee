//! Poll loop
//!
//! One cycle is strictly ordered:
//!
//! ```text
//! discover (new hosts only) → fetch all → parse all → merge
//!     → [rate/difference] → [totals/percent] → top-K
//!     → [peak update + persist] → report
//! ```
//!
//! The fetch-parse-merge part is retried as a whole, up to
//! [`CYCLE_ATTEMPTS`] times; one unparsable dump fails the attempt. Rate
//! state and the peak database belong to the [`Runner`] and are only touched
//! after a collection attempt succeeded, so a retry never sees half-updated
//! state.
//!
//! Cycles never overlap. Interrupt and terminate signals are observed only
//! while sleeping between cycles; a signal arriving mid-cycle takes effect
//! once that cycle, including its peak write, has finished.

use crate::config::Config;
use crate::fetch::{FetchTarget, Fetcher};
use crate::output::{PollReport, ReportJob, ReportPeak, ReportTotal, Reporter, ValueKind};
use crate::stats::aggregator::PollSnapshot;
use crate::stats::parser::parse;
use crate::stats::peak::{PeakDatabase, PeakLoad, PeakStore};
use crate::stats::rate::{RateOutcome, RateState};
use crate::stats::top::{self, JobFilter};
use crate::stats::{totals, AggregatedJob, JobEntry, OpCounts};
use crate::util::time::{epoch_now, format_interval};
use crate::Result;
use anyhow::Context;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::{debug, error, info, warn};

/// Attempts per poll cycle before giving up
pub const CYCLE_ATTEMPTS: usize = 3;

/// Merged result of one successful collection attempt
#[derive(Debug)]
pub struct Collected {
    pub snapshot: PollSnapshot,
    pub servers_failed: usize,
}

/// Lazily opened peak database
#[derive(Debug)]
struct PeakTracker {
    store: PeakStore,
    db: Option<PeakDatabase>,
}

impl PeakTracker {
    fn new(store: PeakStore) -> Self {
        Self { store, db: None }
    }

    /// Fold one poll into the records and persist them
    ///
    /// Returns the peak block to report, or `None` on the cycle that created
    /// the database.
    fn observe(
        &mut self,
        totals: &OpCounts,
        jobs: &BTreeMap<String, AggregatedJob>,
        now: i64,
    ) -> Result<Option<Vec<ReportPeak>>> {
        let (db, bootstrapped) = match self.db.take() {
            Some(db) => (db, false),
            None => match self.store.load()? {
                PeakLoad::Loaded(db) => {
                    info!(path = %self.store.path().display(), "Loaded peak database");
                    (db, false)
                }
                PeakLoad::Bootstrapped(db) => (db, true),
            },
        };
        let db = self.db.insert(db);

        let changes = db.update(totals, jobs, now);
        for op in &changes.new_totals {
            if let Some(peak) = db.top_ops.get(op) {
                info!(operation = %op, rate = peak.rate, "New peak total");
            }
        }
        for op in &changes.new_jobs {
            if let Some(peak) = db.top_job_per_op.get(op) {
                info!(
                    operation = %op,
                    job_id = %peak.job.job_id,
                    value = peak.job.counts.value(*op),
                    "New per-job peak"
                );
            }
        }
        self.store.save(db)?;

        if bootstrapped {
            Ok(None)
        } else {
            Ok(Some(ReportPeak::from_database(db)))
        }
    }
}

/// Interrupt/terminate listener, installed before the first cycle
struct Shutdown {
    interrupt: Signal,
    terminate: Signal,
}

impl Shutdown {
    fn install() -> Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?,
            terminate: signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?,
        })
    }

    async fn recv(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => {}
            _ = self.terminate.recv() => {}
        }
    }
}

/// Owns everything that lives across polls
pub struct Runner<F: Fetcher> {
    config: Config,
    fetcher: F,
    filter: JobFilter,
    /// host → job_stats parameters it exposes
    params: BTreeMap<String, Vec<String>>,
    rate: Option<RateState>,
    peaks: Option<PeakTracker>,
}

impl<F: Fetcher> Runner<F> {
    pub fn new(config: Config, fetcher: F) -> Result<Self> {
        let peaks = if config.report.peak {
            Some(PeakTracker::new(PeakStore::new(config.peak_path()?)))
        } else {
            None
        };

        Ok(Self {
            filter: config.filter.to_filter(),
            rate: config.poll.delta.map(RateState::new),
            params: BTreeMap::new(),
            peaks,
            fetcher,
            config,
        })
    }

    /// Cached parameter lists from discovery
    pub fn params(&self) -> &BTreeMap<String, Vec<String>> {
        &self.params
    }

    /// Poll until the repeat count is reached or a signal arrives
    pub async fn run<R: Reporter + ?Sized>(&mut self, reporter: &mut R) -> Result<()> {
        let mut shutdown = Shutdown::install()?;
        let interval = self.config.poll.interval();
        let mut completed: u64 = 0;

        info!(
            servers = self.config.servers.list.len(),
            interval = %format_interval(interval),
            param = %self.config.poll.param,
            "Starting poll loop"
        );

        loop {
            match self.run_cycle().await {
                Ok(Some(report)) => reporter.emit(&report)?,
                Ok(None) => {}
                Err(e) => {
                    error!(error = %format!("{:#}", e), "Giving up");
                    return Err(e);
                }
            }

            completed += 1;
            if self.config.poll.repeats.is_some_and(|n| completed >= n) {
                debug!(completed, "Repeat count reached");
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.recv() => {
                    info!("Received interrupt, stopping");
                    break;
                }
            }
        }

        Ok(())
    }

    /// One complete poll
    ///
    /// Returns `None` when the poll only established the rate baseline.
    pub async fn run_cycle(&mut self) -> Result<Option<PollReport>> {
        let mut attempt = 0;
        let collected = loop {
            attempt += 1;
            match self.collect().await {
                Ok(collected) => break collected,
                Err(e) if attempt < CYCLE_ATTEMPTS => {
                    warn!(attempt, error = %format!("{:#}", e), "Poll failed, retrying");
                }
                Err(e) => {
                    return Err(e.context(format!("Poll failed after {} attempts", CYCLE_ATTEMPTS)))
                }
            }
        };

        self.report(collected)
    }

    /// Fetch, parse and merge every server's job_stats
    pub async fn collect(&mut self) -> Result<Collected> {
        let timestamp = epoch_now();
        let mut failed = self.discover_missing().await;

        let targets: Vec<FetchTarget> = self
            .params
            .iter()
            .filter(|(host, _)| !failed.contains(*host))
            .flat_map(|(host, params)| params.iter().map(move |p| FetchTarget::new(host.clone(), p.clone())))
            .collect();

        let mut blobs = Vec::with_capacity(targets.len());
        let mut answered = BTreeSet::new();
        for blob in self.fetcher.fetch(&targets).await {
            answered.insert(blob.target.clone());
            match blob.outcome {
                Ok(text) => blobs.push((blob.target, text)),
                Err(e) => {
                    warn!(
                        host = %blob.target.host,
                        param = %blob.target.param,
                        error = %e,
                        "Fetch failed"
                    );
                    failed.insert(blob.target.host);
                }
            }
        }

        // A target the fetcher never answered for fails its host
        for target in targets.iter().filter(|t| !answered.contains(*t)) {
            warn!(host = %target.host, param = %target.param, "No fetch result returned");
            failed.insert(target.host.clone());
        }

        // A failed host is excluded as a whole and rediscovered next time
        blobs.retain(|(target, _)| !failed.contains(&target.host));
        for host in &failed {
            self.params.remove(host);
        }

        let queried = self.config.servers.list.len();
        if queried > 0 && failed.len() >= queried {
            anyhow::bail!("None of the {} servers answered", queried);
        }

        let parsed: Vec<Vec<JobEntry>> = blobs
            .par_iter()
            .map(|(target, text)| {
                parse(text).with_context(|| {
                    format!("Failed to parse job_stats from {} ({})", target.host, target.param)
                })
            })
            .collect::<Result<_>>()?;

        let mut snapshot = PollSnapshot::new(timestamp);
        for entries in &parsed {
            snapshot.merge_all(entries);
        }

        debug!(
            blobs = blobs.len(),
            jobs = snapshot.job_count(),
            failed = failed.len(),
            "Collected poll"
        );

        Ok(Collected {
            snapshot,
            servers_failed: failed.len(),
        })
    }

    /// Discover parameters for hosts without a cached list
    ///
    /// Returns the hosts whose discovery failed.
    async fn discover_missing(&mut self) -> BTreeSet<String> {
        let missing: Vec<String> = self
            .config
            .servers
            .list
            .iter()
            .filter(|host| !self.params.contains_key(*host))
            .cloned()
            .collect();

        let mut failed = BTreeSet::new();
        if missing.is_empty() {
            return failed;
        }

        for found in self.fetcher.discover(&missing, &self.config.poll.param).await {
            match found.outcome {
                Ok(params) => {
                    if params.is_empty() {
                        warn!(host = %found.host, param = %self.config.poll.param, "No job_stats parameters found");
                    } else {
                        debug!(host = %found.host, count = params.len(), "Discovered job_stats parameters");
                    }
                    self.params.insert(found.host, params);
                }
                Err(e) => {
                    warn!(host = %found.host, error = %e, "Parameter discovery failed");
                    failed.insert(found.host);
                }
            }
        }

        // A host the fetcher never answered for counts as failed
        for host in missing {
            if !self.params.contains_key(&host) {
                failed.insert(host);
            }
        }

        failed
    }

    /// Derive everything the report needs from a merged poll
    fn report(&mut self, collected: Collected) -> Result<Option<PollReport>> {
        let Collected {
            snapshot,
            servers_failed,
        } = collected;
        let timestamp = snapshot.timestamp;
        let total_jobs = snapshot.job_count();

        let (jobs, windows, query_duration) = match self.rate.as_mut() {
            None => (snapshot.into_jobs(), BTreeMap::new(), None),
            Some(state) => match state.compute(snapshot) {
                RateOutcome::Baseline => {
                    info!("Baseline established, first report follows the next poll");
                    return Ok(None);
                }
                RateOutcome::Computed(rates) => {
                    (rates.jobs, rates.windows, Some(rates.query_duration))
                }
            },
        };

        let report_config = &self.config.report;
        let grand_totals = report_config
            .needs_totals()
            .then(|| totals::total(jobs.values()));

        let top_jobs = top::select(&jobs, self.config.poll.count, &self.filter)
            .into_iter()
            .map(|job| {
                let window = if report_config.window {
                    windows.get(&job.job_id).copied().flatten()
                } else {
                    None
                };
                let job = match (&grand_totals, report_config.percent) {
                    (Some(t), true) => totals::percent_of(&job, t),
                    _ => job,
                };
                ReportJob {
                    window,
                    ..ReportJob::new(job)
                }
            })
            .collect();

        let totals_block = match (&grand_totals, report_config.totals) {
            (Some(t), true) => Some(
                totals::sorted_desc(t)
                    .into_iter()
                    .map(|(operation, value)| ReportTotal { operation, value })
                    .collect(),
            ),
            _ => None,
        };

        let peaks = match (self.peaks.as_mut(), &grand_totals) {
            (Some(tracker), Some(t)) => tracker.observe(t, &jobs, timestamp)?,
            _ => None,
        };

        Ok(Some(PollReport {
            timestamp,
            query_duration,
            servers_queried: self.config.servers.list.len(),
            servers_failed,
            total_jobs,
            values: ValueKind::for_mode(self.config.poll.delta, report_config.percent),
            count: self.config.poll.count,
            top_jobs,
            totals: totals_block,
            peaks,
        }))
    }
}
