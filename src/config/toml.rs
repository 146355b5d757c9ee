//! TOML configuration file parsing

use super::*;
use crate::config::cli::Cli;
use crate::stats::rate::DeltaMode;
use crate::util::fs::atomic_write;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Outcome of looking for the config file
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigLoad {
    Loaded(Config),
    /// No file existed; an example was written there instead
    Created(PathBuf),
}

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config = ::toml::from_str(contents)
        .context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Read the config file, writing an example one if it does not exist
pub fn load_or_bootstrap(path: &Path) -> Result<ConfigLoad> {
    if path.is_file() {
        return parse_toml_file(path).map(ConfigLoad::Loaded);
    }

    atomic_write(path, EXAMPLE_CONFIG.as_bytes())
        .with_context(|| format!("Failed to write example config: {}", path.display()))?;

    Ok(ConfigLoad::Created(path.to_path_buf()))
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Result<Config> {
    // Override poll settings
    if let Some(count) = cli.count {
        config.poll.count = count;
    }
    if let Some(interval) = cli.interval {
        config.poll.interval_secs = interval;
    }
    if let Some(repeats) = cli.repeats {
        config.poll.repeats = Some(repeats);
    }

    // Parameter pattern
    if let Some(ref param) = cli.param {
        config.poll.param = param.clone();
    } else if cli.ost {
        config.poll.param = PARAM_OST.to_string();
    } else if cli.mdt {
        config.poll.param = PARAM_MDT.to_string();
    }

    // Delta mode
    if cli.rate && cli.difference {
        anyhow::bail!("--rate and --difference are mutually exclusive");
    }
    if cli.rate {
        config.poll.delta = Some(DeltaMode::Rate);
    } else if cli.difference {
        config.poll.delta = Some(DeltaMode::Difference);
    }

    // Servers and filter
    let servers: Vec<String> = clean_list(&cli.servers);
    if !servers.is_empty() {
        config.servers.list = servers;
    }
    let filter: Vec<String> = clean_list(&cli.filter);
    if !filter.is_empty() {
        config.filter.list = filter;
    }
    if cli.fmod {
        config.filter.mode = FilterMode::Include;
    }
    config.servers.list = clean_list(&config.servers.list);
    config.servers.list.sort();
    config.servers.list.dedup();
    config.filter.list = clean_list(&config.filter.list);

    // Misc
    if let Some(length) = cli.jobid_length {
        config.misc.jobid_length = length;
    }
    if let Some(ref path) = cli.peak_file {
        config.misc.peak_file = Some(path.clone());
    }

    // Report contents
    if let Some(fullname) = cli.fullname_choice() {
        config.report.fullname = fullname;
    }
    if cli.total {
        config.report.totals = true;
    }
    if cli.percent {
        config.report.percent = true;
    }
    if cli.peak {
        config.report.peak = true;
    }
    if cli.window {
        config.report.window = true;
    }
    if let Some(format) = cli.format {
        config.report.format = format;
    }

    // The first rate/difference poll only establishes the baseline
    if config.poll.delta.is_some() && config.poll.repeats == Some(1) {
        config.poll.repeats = Some(2);
    }

    Ok(config)
}

/// Trimmed, non-empty entries
fn clean_list(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("gljobstat").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_full_config() {
        let config = parse_toml_string(
            r#"
[servers]
list = ["oss02", "oss01", "mds01"]

[filter]
list = ["cp.0", "rsync"]
mode = "include"

[misc]
jobid_length = 30
peak_file = "/var/tmp/peaks.json"

[ssh]
user = "admin"
key = "/root/.ssh/id_ed25519"
connect_timeout_secs = 5
max_parallel = 8

[poll]
count = 10
delta = "rate"

[report]
totals = true
format = "json"
"#,
        )
        .unwrap();

        assert_eq!(config.servers.list, vec!["oss02", "oss01", "mds01"]);
        assert_eq!(config.filter.mode, FilterMode::Include);
        assert_eq!(config.misc.jobid_length, 30);
        assert_eq!(config.ssh.user.as_deref(), Some("admin"));
        assert_eq!(config.ssh.connect_timeout_secs, 5);
        assert_eq!(config.ssh.command_timeout_secs, DEFAULT_COMMAND_TIMEOUT_SECS);
        assert_eq!(config.poll.count, 10);
        assert_eq!(config.poll.interval_secs, 10);
        assert_eq!(config.poll.delta, Some(DeltaMode::Rate));
        assert!(config.report.totals);
        assert_eq!(config.report.format, OutputFormat::Json);
    }

    #[test]
    fn test_example_config_parses() {
        let config = parse_toml_string(EXAMPLE_CONFIG).unwrap();
        assert!(config.servers.list.is_empty());
        assert_eq!(config.misc.jobid_length, 17);
        assert_eq!(config.ssh.max_parallel, 0);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(parse_toml_string("[servers\nlist = 1").is_err());
        assert!(parse_toml_string("[filter]\nmode = \"sometimes\"").is_err());
    }

    #[test]
    fn test_bootstrap_writes_example() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gljobstat.toml");

        let first = load_or_bootstrap(&path).unwrap();
        assert_eq!(first, ConfigLoad::Created(path.clone()));
        assert_eq!(fs::read_to_string(&path).unwrap(), EXAMPLE_CONFIG);

        match load_or_bootstrap(&path).unwrap() {
            ConfigLoad::Loaded(config) => assert!(config.servers.list.is_empty()),
            other => panic!("unexpected load: {:?}", other),
        }
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = Config::default();
        file.servers.list = vec!["oss01".into()];
        file.filter.list = vec!["root".into()];
        file.misc.jobid_length = 20;
        file.report.fullname = true;

        let merged = merge_cli_with_config(
            &cli(&["-s", "oss03, oss02,oss03", "-c", "7", "--no-fullname", "-m", "--fmod"]),
            file,
        )
        .unwrap();

        assert_eq!(merged.servers.list, vec!["oss02", "oss03"]);
        assert_eq!(merged.filter.list, vec!["root"]);
        assert_eq!(merged.filter.mode, FilterMode::Include);
        assert_eq!(merged.poll.count, 7);
        assert_eq!(merged.poll.param, PARAM_MDT);
        assert_eq!(merged.misc.jobid_length, 20);
        assert!(!merged.report.fullname);
    }

    #[test]
    fn test_rate_mode_needs_two_polls() {
        let merged = merge_cli_with_config(&cli(&["-r", "-n", "1"]), Config::default()).unwrap();
        assert_eq!(merged.poll.delta, Some(DeltaMode::Rate));
        assert_eq!(merged.poll.repeats, Some(2));

        let merged = merge_cli_with_config(&cli(&["-n", "1"]), Config::default()).unwrap();
        assert_eq!(merged.poll.repeats, Some(1));
    }

    #[test]
    fn test_param_shortcuts() {
        let ost = merge_cli_with_config(&cli(&["-o"]), Config::default()).unwrap();
        assert_eq!(ost.poll.param, PARAM_OST);
        let custom = merge_cli_with_config(&cli(&["--param", "mdt.lustre-*.job_stats"]), Config::default()).unwrap();
        assert_eq!(custom.poll.param, "mdt.lustre-*.job_stats");
    }
}
