//! End-to-end poll pipeline tests
//!
//! Drive the runner with an in-memory fetcher that replays scripted dumps,
//! covering baseline/rate flow, peak persistence across runs, and the
//! difference between a host that reports nothing and a host that failed.

use gljobstat::config::Config;
use gljobstat::fetch::{FetchError, FetchTarget, Fetcher, HostBlob, HostParams};
use gljobstat::output::{PollReport, Reporter, ValueKind};
use gljobstat::stats::peak::{PeakLoad, PeakStore};
use gljobstat::stats::rate::DeltaMode;
use gljobstat::stats::Operation;
use gljobstat::Runner;
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::Mutex;
use tempfile::TempDir;

/// One scripted answer for a host
enum Answer {
    Dump(String),
    Fail,
}

/// Replays per-host answers in order; every host exposes one OST parameter
#[derive(Default)]
struct ScriptedFetcher {
    answers: Mutex<BTreeMap<String, VecDeque<Answer>>>,
}

impl ScriptedFetcher {
    fn answer(&self, host: &str, answer: Answer) {
        self.answers
            .lock()
            .unwrap()
            .entry(host.to_string())
            .or_default()
            .push_back(answer);
    }
}

impl Fetcher for ScriptedFetcher {
    fn discover(&self, hosts: &[String], _pattern: &str) -> impl Future<Output = Vec<HostParams>> + Send {
        let results: Vec<HostParams> = hosts
            .iter()
            .map(|host| HostParams {
                host: host.clone(),
                outcome: Ok(vec![format!("obdfilter.{}-OST0000.job_stats", host)]),
            })
            .collect();
        async move { results }
    }

    fn fetch(&self, targets: &[FetchTarget]) -> impl Future<Output = Vec<HostBlob>> + Send {
        let mut answers = self.answers.lock().unwrap();
        let results: Vec<HostBlob> = targets
            .iter()
            .map(|target| {
                let next = answers.get_mut(&target.host).and_then(VecDeque::pop_front);
                let outcome = match next {
                    Some(Answer::Dump(text)) => Ok(text),
                    Some(Answer::Fail) | None => Err(FetchError::Timeout {
                        host: target.host.clone(),
                        timeout_secs: 30,
                    }),
                };
                HostBlob {
                    target: target.clone(),
                    outcome,
                }
            })
            .collect();
        async move { results }
    }
}

/// Collects reports instead of printing them
#[derive(Default)]
struct Collect {
    reports: Vec<PollReport>,
}

impl Reporter for Collect {
    fn emit(&mut self, report: &PollReport) -> gljobstat::Result<()> {
        self.reports.push(report.clone());
        Ok(())
    }
}

/// job_stats dump with `(job_id, snapshot_time, [(metric, samples)])` entries
fn dump(jobs: &[(&str, i64, &[(&str, i64)])]) -> Answer {
    let mut text = String::from("job_stats:\n");
    for (job_id, snapshot_time, metrics) in jobs {
        text.push_str(&format!("- job_id:          {}\n", job_id));
        text.push_str(&format!("  snapshot_time:   {}.250000000 secs.nsecs\n", snapshot_time));
        text.push_str("  start_time:      1000.000000000 secs.nsecs\n");
        for (metric, samples) in metrics.iter() {
            text.push_str(&format!(
                "  {:<16} {{ samples: {:>11}, unit: usecs, min: 1, max: 9, sum: 100, sumsq: 1000 }}\n",
                format!("{}:", metric),
                samples
            ));
        }
    }
    Answer::Dump(text)
}

fn config(servers: &[&str]) -> Config {
    let mut config = Config::default();
    config.servers.list = servers.iter().map(|s| s.to_string()).collect();
    config
}

#[tokio::test]
async fn test_parse_merge_reproduces_exact_counts() {
    let fetcher = ScriptedFetcher::default();
    fetcher.answer(
        "oss01",
        dump(&[
            ("dd.0", 100, &[("open", 4), ("close", 4), ("read", 10)]),
            ("cp.1", 100, &[("open", 1), ("close", 1), ("read", 2)]),
        ]),
    );

    let mut runner = Runner::new(config(&["oss01"]), fetcher).unwrap();
    let report = runner.run_cycle().await.unwrap().unwrap();

    assert_eq!(report.total_jobs, 2);
    let dd = &report.top_jobs[0];
    assert_eq!(dd.job_id, "dd.0");
    assert_eq!(dd.counts.get(Operation::Open), Some(4));
    assert_eq!(dd.counts.get(Operation::Close), Some(4));
    assert_eq!(dd.counts.get(Operation::Read), Some(10));
    assert_eq!(dd.counts.get(Operation::Ops), Some(18));
    let cp = &report.top_jobs[1];
    assert_eq!(cp.counts.get(Operation::Ops), Some(4));
}

#[tokio::test]
async fn test_first_rate_poll_is_baseline_only() {
    let fetcher = ScriptedFetcher::default();
    fetcher.answer("oss01", dump(&[("dd.0", 100, &[("read", 10)])]));
    fetcher.answer("oss01", dump(&[("dd.0", 110, &[("read", 25)])]));

    let mut config = config(&["oss01"]);
    config.poll.delta = Some(DeltaMode::Rate);
    config.report.window = true;
    let mut runner = Runner::new(config, fetcher).unwrap();

    assert!(runner.run_cycle().await.unwrap().is_none());

    let report = runner.run_cycle().await.unwrap().unwrap();
    assert_eq!(report.values, ValueKind::Rate);
    assert!(report.query_duration.is_some());
    let job = &report.top_jobs[0];
    assert_eq!(job.counts.get(Operation::Read), Some(2));
    assert_eq!(job.window, Some(10));
}

#[tokio::test]
async fn test_difference_mode() {
    let fetcher = ScriptedFetcher::default();
    fetcher.answer("oss01", dump(&[("dd.0", 100, &[("read", 10)])]));
    fetcher.answer("oss01", dump(&[("dd.0", 110, &[("read", 25)])]));

    let mut config = config(&["oss01"]);
    config.poll.delta = Some(DeltaMode::Difference);
    let mut runner = Runner::new(config, fetcher).unwrap();

    runner.run_cycle().await.unwrap();
    let report = runner.run_cycle().await.unwrap().unwrap();
    assert_eq!(report.values, ValueKind::Difference);
    assert_eq!(report.top_jobs[0].counts.get(Operation::Read), Some(15));
    assert_eq!(report.top_jobs[0].window, None);
}

#[tokio::test]
async fn test_empty_host_is_not_a_failed_host() {
    let fetcher = ScriptedFetcher::default();
    fetcher.answer("oss01", dump(&[("dd.0", 100, &[("write", 5)])]));
    fetcher.answer("oss02", Answer::Dump("job_stats:\n".to_string()));
    fetcher.answer("oss03", Answer::Fail);

    let mut runner = Runner::new(config(&["oss01", "oss02", "oss03"]), fetcher).unwrap();
    let report = runner.run_cycle().await.unwrap().unwrap();

    assert_eq!(report.servers_queried, 3);
    assert_eq!(report.servers_failed, 1);
    assert_eq!(report.total_jobs, 1);
    assert_eq!(report.top_jobs[0].counts.get(Operation::Write), Some(5));
}

#[tokio::test]
async fn test_peaks_persist_across_runs() {
    let temp_dir = TempDir::new().unwrap();
    let peak_file = temp_dir.path().join("peaks.json");

    let mut config = config(&["oss01"]);
    config.report.peak = true;
    config.misc.peak_file = Some(peak_file.clone());

    // First run: the database is created, the report carries no peak block
    let fetcher = ScriptedFetcher::default();
    fetcher.answer("oss01", dump(&[("dd.0", 100, &[("read", 50)])]));
    fetcher.answer("oss01", dump(&[("dd.0", 110, &[("read", 20)])]));
    let mut runner = Runner::new(config.clone(), fetcher).unwrap();

    let bootstrap = runner.run_cycle().await.unwrap().unwrap();
    assert!(bootstrap.peaks.is_none());
    assert!(peak_file.exists());

    let lower = runner.run_cycle().await.unwrap().unwrap();
    let peaks = lower.peaks.unwrap();
    let read = peaks.iter().find(|p| p.operation == Operation::Read).unwrap();
    assert_eq!(read.rate, 50);
    assert_eq!(read.job_id.as_deref(), Some("dd.0"));
    assert_eq!(read.job_value, Some(50));

    // Second run: records are read back and beaten
    let fetcher = ScriptedFetcher::default();
    fetcher.answer("oss01", dump(&[("io.9", 100, &[("read", 70)])]));
    let mut runner = Runner::new(config, fetcher).unwrap();

    let higher = runner.run_cycle().await.unwrap().unwrap();
    let peaks = higher.peaks.unwrap();
    let read = peaks.iter().find(|p| p.operation == Operation::Read).unwrap();
    assert_eq!(read.rate, 70);
    assert_eq!(read.job_id.as_deref(), Some("io.9"));

    match PeakStore::new(&peak_file).load().unwrap() {
        PeakLoad::Loaded(db) => {
            assert_eq!(db.top_ops[&Operation::Read].rate, 70);
            assert_eq!(db.top_job_per_op[&Operation::Read].job.job_id, "io.9");
        }
        other => panic!("unexpected load: {:?}", other),
    }
}

#[tokio::test]
async fn test_corrupt_peak_file_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let peak_file = temp_dir.path().join("peaks.json");
    std::fs::write(&peak_file, "{ not json").unwrap();

    let mut config = config(&["oss01"]);
    config.report.peak = true;
    config.misc.peak_file = Some(peak_file.clone());

    let fetcher = ScriptedFetcher::default();
    fetcher.answer("oss01", dump(&[("dd.0", 100, &[("read", 50)])]));
    let mut runner = Runner::new(config, fetcher).unwrap();

    assert!(runner.run_cycle().await.is_err());
    assert_eq!(std::fs::read_to_string(&peak_file).unwrap(), "{ not json");
}

#[tokio::test]
async fn test_run_stops_after_repeats() {
    let fetcher = ScriptedFetcher::default();
    fetcher.answer("oss01", dump(&[("dd.0", 100, &[("read", 10)])]));
    fetcher.answer("oss01", dump(&[("dd.0", 101, &[("read", 12)])]));

    let mut config = config(&["oss01"]);
    config.poll.delta = Some(DeltaMode::Difference);
    config.poll.repeats = Some(2);
    config.poll.interval_secs = 1;
    let mut runner = Runner::new(config, fetcher).unwrap();

    let mut sink = Collect::default();
    runner.run(&mut sink).await.unwrap();

    assert_eq!(sink.reports.len(), 1);
    assert_eq!(sink.reports[0].top_jobs[0].counts.get(Operation::Read), Some(2));
}

#[tokio::test]
async fn test_filtered_jobs_still_counted() {
    let fetcher = ScriptedFetcher::default();
    fetcher.answer(
        "oss01",
        dump(&[
            ("root.0", 100, &[("getattr", 900)]),
            ("dd.1", 100, &[("read", 10)]),
        ]),
    );

    let mut config = config(&["oss01"]);
    config.filter.list = vec!["root".to_string()];
    let mut runner = Runner::new(config, fetcher).unwrap();
    let report = runner.run_cycle().await.unwrap().unwrap();

    assert_eq!(report.total_jobs, 2);
    assert_eq!(report.top_jobs.len(), 1);
    assert_eq!(report.top_jobs[0].job_id, "dd.1");
}
