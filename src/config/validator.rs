//! Configuration validation

use super::*;
use anyhow::Result;

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_servers(&config.servers)?;
    validate_poll(&config.poll)?;
    validate_misc(&config.misc)?;
    validate_ssh(&config.ssh)?;
    validate_report(config)?;

    Ok(())
}

/// Validate the server list
pub fn validate_servers(servers: &ServersConfig) -> Result<()> {
    if servers.list.is_empty() {
        anyhow::bail!(
            "No servers configured; add hosts to [servers] list in the config file or pass --servers"
        );
    }

    for host in &servers.list {
        if host.chars().any(char::is_whitespace) {
            anyhow::bail!("Server name '{}' contains whitespace", host);
        }
        if host.starts_with('-') {
            anyhow::bail!("Server name '{}' must not start with '-'", host);
        }
    }

    Ok(())
}

/// Validate poll settings
pub fn validate_poll(poll: &PollConfig) -> Result<()> {
    if poll.count == 0 {
        anyhow::bail!("count must be at least 1");
    }

    if poll.interval_secs == 0 {
        anyhow::bail!("interval must be at least 1 second");
    }

    if poll.repeats == Some(0) {
        anyhow::bail!("repeats must be at least 1 (omit it to poll until interrupted)");
    }

    if poll.param.trim().is_empty() {
        anyhow::bail!("job_stats parameter pattern cannot be empty");
    }

    if poll.param.contains('\'') {
        anyhow::bail!("job_stats parameter pattern cannot contain quotes: {}", poll.param);
    }

    Ok(())
}

/// Validate misc settings
pub fn validate_misc(misc: &MiscConfig) -> Result<()> {
    if misc.jobid_length == 0 {
        anyhow::bail!("jobid_length must be at least 1");
    }

    if let Some(ref path) = misc.peak_file {
        if path.as_os_str().is_empty() {
            anyhow::bail!("peak_file cannot be empty");
        }
    }

    Ok(())
}

/// Validate ssh settings
pub fn validate_ssh(ssh: &SshConfig) -> Result<()> {
    if ssh.connect_timeout_secs == 0 {
        anyhow::bail!("ssh connect_timeout_secs must be at least 1");
    }

    if ssh.command_timeout_secs == 0 {
        anyhow::bail!("ssh command_timeout_secs must be at least 1");
    }

    if let Some(ref key) = ssh.key {
        let key = expand_home(key);
        if !key.is_file() {
            anyhow::bail!("ssh key file not found: {}", key.display());
        }
    }

    Ok(())
}

/// Validate report settings against the poll mode
fn validate_report(config: &Config) -> Result<()> {
    if config.report.window && config.poll.delta.is_none() {
        anyhow::bail!("--window requires --rate or --difference");
    }

    Ok(())
}
