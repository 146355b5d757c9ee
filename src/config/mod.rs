//! Configuration module
//!
//! Handles CLI argument parsing, the TOML configuration file, and validation.
//!
//! Settings come from two layers. The config file (default
//! `~/.gljobstat.toml`) holds what rarely changes: the server list, job
//! filters, ssh credentials. Command line flags override any file value for a
//! single run.

pub mod cli;
pub mod toml;
pub mod validator;

use crate::fetch::ssh::{SshOptions, DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_CONNECT_TIMEOUT_SECS};
use crate::stats::rate::DeltaMode;
use crate::stats::top::{FilterMode, JobFilter};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name looked up in the home directory
pub const DEFAULT_CONFIG_FILE: &str = ".gljobstat.toml";

/// Peak database file name looked up in the home directory
pub const DEFAULT_PEAK_FILE: &str = ".gljobstat_peaks.json";

/// job_stats parameters on both MDTs and OSTs
pub const PARAM_ALL: &str = "*.*.job_stats";

/// job_stats parameters on OSTs only
pub const PARAM_OST: &str = "obdfilter.*.job_stats";

/// job_stats parameters on MDTs only
pub const PARAM_MDT: &str = "mdt.*.job_stats";

/// Written when no config file exists yet
pub const EXAMPLE_CONFIG: &str = r#"# gljobstat configuration

[servers]
# OSS/MDS hosts to query, e.g. ["oss01", "oss02", "mds01"]
list = []

[filter]
# Substrings of job_ids to filter
list = []
# "exclude" drops matching jobs, "include" keeps only matching jobs
mode = "exclude"

[misc]
# Width of the job_id column in reports
jobid_length = 17
# Where all-time peaks are kept (default ~/.gljobstat_peaks.json)
# peak_file = "~/.gljobstat_peaks.json"

[ssh]
# Remote user, defaults to the local ssh configuration
# user = "root"
# Private key file, defaults to the ssh agent / ssh configuration
# key = "~/.ssh/id_ed25519"
connect_timeout_secs = 10
command_timeout_secs = 30
# Concurrent ssh sessions, 0 means one per CPU
max_parallel = 0
"#;

/// Complete run configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub servers: ServersConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub misc: MiscConfig,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServersConfig {
    /// OSS/MDS hostnames
    #[serde(default)]
    pub list: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// job_id substrings
    #[serde(default)]
    pub list: Vec<String>,
    #[serde(default)]
    pub mode: FilterMode,
}

impl FilterConfig {
    pub fn to_filter(&self) -> JobFilter {
        JobFilter::new(self.list.iter().cloned(), self.mode)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiscConfig {
    /// Width of the padded job_id column
    #[serde(default = "default_jobid_length")]
    pub jobid_length: usize,
    /// Peak database location
    #[serde(default)]
    pub peak_file: Option<PathBuf>,
}

impl Default for MiscConfig {
    fn default() -> Self {
        Self {
            jobid_length: default_jobid_length(),
            peak_file: None,
        }
    }
}

fn default_jobid_length() -> usize {
    17
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default)]
    pub user: Option<String>,
    /// Private key file
    #[serde(default)]
    pub key: Option<PathBuf>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Concurrent ssh sessions (0 = one per CPU)
    #[serde(default)]
    pub max_parallel: usize,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: None,
            key: None,
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
            max_parallel: 0,
        }
    }
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_command_timeout() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}

impl SshConfig {
    pub fn to_options(&self) -> SshOptions {
        SshOptions {
            user: self.user.clone().filter(|u| !u.is_empty()),
            identity_file: self.key.as_deref().map(expand_home),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            command_timeout: Duration::from_secs(self.command_timeout_secs),
            max_parallel: self.max_parallel,
        }
    }
}

/// What to query and how often
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Number of top jobs per report
    #[serde(default = "default_count")]
    pub count: usize,
    /// Seconds between polls
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Number of polls, unlimited when unset
    #[serde(default)]
    pub repeats: Option<u64>,
    /// `lctl` parameter pattern
    #[serde(default = "default_param")]
    pub param: String,
    /// Report rates or differences instead of cumulative counts
    #[serde(default)]
    pub delta: Option<DeltaMode>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            count: default_count(),
            interval_secs: default_interval(),
            repeats: None,
            param: default_param(),
            delta: None,
        }
    }
}

fn default_count() -> usize {
    5
}

fn default_interval() -> u64 {
    10
}

fn default_param() -> String {
    PARAM_ALL.to_string()
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// YAML document stream
    #[default]
    Yaml,
    /// One JSON object per line
    Json,
}

/// What each report contains
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Long operation names instead of two-letter aliases
    #[serde(default)]
    pub fullname: bool,
    /// Grand totals block
    #[serde(default)]
    pub totals: bool,
    /// Show each job's share of the totals instead of raw values
    #[serde(default)]
    pub percent: bool,
    /// Track and report all-time peaks
    #[serde(default)]
    pub peak: bool,
    /// Annotate jobs with their sampling window
    #[serde(default)]
    pub window: bool,
    #[serde(default)]
    pub format: OutputFormat,
}

impl ReportConfig {
    /// Whether a poll needs grand totals computed
    pub fn needs_totals(&self) -> bool {
        self.totals || self.percent || self.peak
    }
}

impl Config {
    /// Peak database path, defaulting to the home directory
    pub fn peak_path(&self) -> Result<PathBuf> {
        match &self.misc.peak_file {
            Some(path) => Ok(expand_home(path)),
            None => home_file(DEFAULT_PEAK_FILE),
        }
    }
}

/// Default config file path
pub fn default_config_path() -> Result<PathBuf> {
    home_file(DEFAULT_CONFIG_FILE)
}

fn home_file(name: &str) -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Cannot determine home directory for {}", name))?;
    Ok(home.join(name))
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
