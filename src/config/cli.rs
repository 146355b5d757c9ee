//! CLI argument parsing using clap

use super::OutputFormat;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// gljobstat - list the top Lustre jobs across many storage servers
#[derive(Parser, Debug, Default)]
#[command(name = "gljobstat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Number of top jobs to show [default: 5]
    #[arg(short = 'c', long)]
    pub count: Option<usize>,

    /// Seconds between polls [default: 10]
    #[arg(short = 'i', long)]
    pub interval: Option<u64>,

    /// Number of polls [default: unlimited]
    #[arg(short = 'n', long)]
    pub repeats: Option<u64>,

    /// job_stats parameter pattern passed to lctl [default: *.*.job_stats]
    #[arg(long)]
    pub param: Option<String>,

    /// Query OST job_stats only
    #[arg(short = 'o', long)]
    pub ost: bool,

    /// Query MDT job_stats only
    #[arg(short = 'm', long)]
    pub mdt: bool,

    /// Comma-separated list of OSS/MDS to query
    #[arg(short = 's', long, value_delimiter = ',')]
    pub servers: Vec<String>,

    /// Comma-separated list of job_id substrings to filter
    #[arg(short = 'f', long, value_delimiter = ',')]
    pub filter: Vec<String>,

    /// Keep only jobs matching the filter instead of removing them
    #[arg(long)]
    pub fmod: bool,

    /// Show full operation names instead of two-letter aliases
    #[arg(long, overrides_with = "no_fullname")]
    pub fullname: bool,

    /// Show two-letter operation aliases
    #[arg(long, overrides_with = "fullname")]
    pub no_fullname: bool,

    /// job_id column width for pretty printing
    #[arg(short = 'l', long = "length")]
    pub jobid_length: Option<usize>,

    /// Report the rate per second between two polls
    #[arg(short = 'r', long)]
    pub rate: bool,

    /// Report the difference between two polls
    #[arg(short = 'd', long)]
    pub difference: bool,

    /// Show grand totals per operation
    #[arg(short = 't', long)]
    pub total: bool,

    /// Show each job's share of the totals
    #[arg(short = 'p', long)]
    pub percent: bool,

    /// Track and show all-time peaks
    #[arg(short = 'P', long)]
    pub peak: bool,

    /// Peak database file [default: ~/.gljobstat_peaks.json]
    #[arg(long)]
    pub peak_file: Option<PathBuf>,

    /// Annotate each job with its sampling window (rate/difference mode)
    #[arg(long)]
    pub window: bool,

    /// Report format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Config file [default: ~/.gljobstat.toml]
    #[arg(long, env = "GLJOBSTAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Reject flag combinations that cannot both apply
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rate && self.difference {
            anyhow::bail!("--rate and --difference are mutually exclusive");
        }
        if self.ost && self.mdt {
            anyhow::bail!("--ost and --mdt are mutually exclusive; omit both to query all targets");
        }
        if self.param.is_some() && (self.ost || self.mdt) {
            anyhow::bail!("--param cannot be combined with --ost or --mdt");
        }
        Ok(())
    }

    /// Explicit `--fullname`/`--no-fullname` choice, if any
    pub fn fullname_choice(&self) -> Option<bool> {
        if self.fullname {
            Some(true)
        } else if self.no_fullname {
            Some(false)
        } else {
            None
        }
    }
}
