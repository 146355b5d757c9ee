//! Fetching job_stats over ssh
//!
//! Runs `lctl` on each storage server through the system `ssh` binary, so
//! existing ssh configuration, agents and known_hosts apply unchanged. Key or
//! agent authentication is assumed; `BatchMode` keeps a password prompt from
//! ever blocking a poll.
//!
//! Every remote command holds a permit from a shared semaphore, bounding how
//! many ssh processes run at once on the polling node.

use crate::fetch::{FetchError, FetchTarget, Fetcher, HostBlob, HostParams};
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Default ssh connection timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default remote command timeout in seconds
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Connection settings shared by every remote command
#[derive(Debug, Clone)]
pub struct SshOptions {
    pub user: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    /// Maximum concurrent ssh processes; 0 means one per CPU
    pub max_parallel: usize,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            user: None,
            identity_file: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            max_parallel: 0,
        }
    }
}

impl SshOptions {
    /// ssh destination for a host (`user@host` or bare `host`)
    pub fn destination(&self, host: &str) -> String {
        match &self.user {
            Some(user) if !user.is_empty() => format!("{}@{}", user, host),
            _ => host.to_string(),
        }
    }

    /// Effective concurrency limit
    pub fn parallelism(&self) -> usize {
        if self.max_parallel == 0 {
            num_cpus::get().max(1)
        } else {
            self.max_parallel
        }
    }

    /// Full ssh argument list for running `remote` on `host`
    pub fn ssh_args(&self, host: &str, remote: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs()),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ];
        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args.push(self.destination(host));
        args.push(remote.to_string());
        args
    }
}

/// `lctl` invocation listing parameters matching a pattern
pub fn list_param_command(pattern: &str) -> String {
    format!("lctl list_param '{}'", pattern)
}

/// `lctl` invocation dumping one parameter's value
pub fn get_param_command(param: &str) -> String {
    format!("lctl get_param -n '{}'", param)
}

/// [`Fetcher`] running `lctl` over ssh
#[derive(Debug, Clone)]
pub struct SshFetcher {
    options: Arc<SshOptions>,
    limiter: Arc<Semaphore>,
}

impl SshFetcher {
    pub fn new(options: SshOptions) -> Self {
        let limiter = Arc::new(Semaphore::new(options.parallelism()));
        Self {
            options: Arc::new(options),
            limiter,
        }
    }

    pub fn options(&self) -> &SshOptions {
        &self.options
    }
}

/// Run one remote command, holding a concurrency permit for its duration
async fn run_remote(
    options: Arc<SshOptions>,
    limiter: Arc<Semaphore>,
    host: String,
    remote: String,
) -> Result<String, FetchError> {
    // The semaphore lives as long as the fetcher and is never closed
    let _permit = limiter.acquire_owned().await.ok();

    debug!(host = %host, command = %remote, "Running remote command");

    let mut cmd = Command::new("ssh");
    cmd.args(options.ssh_args(&host, &remote))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(options.command_timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => return Err(FetchError::Spawn { host, source }),
        Err(_) => {
            return Err(FetchError::Timeout {
                host,
                timeout_secs: options.command_timeout.as_secs(),
            })
        }
    };

    if !output.status.success() {
        return Err(FetchError::CommandFailed {
            host,
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    String::from_utf8(output.stdout).map_err(|_| FetchError::InvalidUtf8 { host })
}

impl Fetcher for SshFetcher {
    fn discover(
        &self,
        hosts: &[String],
        pattern: &str,
    ) -> impl Future<Output = Vec<HostParams>> + Send {
        let hosts = hosts.to_vec();
        let remote = list_param_command(pattern);
        let options = Arc::clone(&self.options);
        let limiter = Arc::clone(&self.limiter);

        async move {
            let mut tasks = JoinSet::new();
            for host in hosts {
                let options = Arc::clone(&options);
                let limiter = Arc::clone(&limiter);
                let remote = remote.clone();
                tasks.spawn(async move {
                    let outcome = run_remote(options, limiter, host.clone(), remote)
                        .await
                        .map(|out| out.split_whitespace().map(str::to_string).collect());
                    HostParams { host, outcome }
                });
            }

            let mut results = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(result) => results.push(result),
                    Err(e) => warn!(error = %e, "Parameter discovery task aborted"),
                }
            }
            results.sort_by(|a, b| a.host.cmp(&b.host));
            results
        }
    }

    fn fetch(&self, targets: &[FetchTarget]) -> impl Future<Output = Vec<HostBlob>> + Send {
        let targets = targets.to_vec();
        let options = Arc::clone(&self.options);
        let limiter = Arc::clone(&self.limiter);

        async move {
            let mut tasks = JoinSet::new();
            for target in targets {
                let options = Arc::clone(&options);
                let limiter = Arc::clone(&limiter);
                tasks.spawn(async move {
                    let remote = get_param_command(&target.param);
                    let outcome = run_remote(options, limiter, target.host.clone(), remote).await;
                    HostBlob { target, outcome }
                });
            }

            let mut results = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(result) => results.push(result),
                    Err(e) => warn!(error = %e, "Fetch task aborted"),
                }
            }
            results.sort_by(|a, b| a.target.cmp(&b.target));
            results
        }
    }
}
