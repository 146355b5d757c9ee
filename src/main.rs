//! gljobstat CLI entry point

use anyhow::{Context, Result};
use gljobstat::config::cli::Cli;
use gljobstat::config::toml::{load_or_bootstrap, merge_cli_with_config, ConfigLoad};
use gljobstat::config::{default_config_path, validator};
use gljobstat::fetch::ssh::SshFetcher;
use gljobstat::output::reporter_for;
use gljobstat::Runner;
use tracing::debug;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();
    cli.validate()?;

    gljobstat::logging::init(cli.verbose);

    // Load the config file, writing an example on first use
    let config_path = match cli.config.clone() {
        Some(path) => path,
        None => default_config_path()?,
    };
    let file_config = match load_or_bootstrap(&config_path)? {
        ConfigLoad::Loaded(config) => config,
        ConfigLoad::Created(path) => {
            println!("Example configuration file {} created!", path.display());
            println!("Add your OSS/MDS servers to it and run gljobstat again.");
            return Ok(());
        }
    };

    let config = merge_cli_with_config(&cli, file_config)?;
    validator::validate_config(&config).context("Configuration validation failed")?;
    debug!(config = ?config, "Effective configuration");

    let runtime = tokio::runtime::Runtime::new()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(async {
        let fetcher = SshFetcher::new(config.ssh.to_options());
        let mut reporter = reporter_for(&config.report, config.misc.jobid_length, std::io::stdout());
        let mut runner = Runner::new(config, fetcher)?;

        runner.run(&mut reporter).await
    })
}
