//! fleet-deploy: entry point for the `deploy` command

use anyhow::Result;
use clap::Parser;
use tracing::debug;

use fleet_deploy::app::cli::Cli;
use fleet_deploy::app::run::run;
use fleet_deploy::logs::{init_logging, LogOptions};
use fleet_deploy::storage::settings::Settings;
use fleet_deploy::utils::version_info;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let settings = match Settings::default_path() {
            Some(path) => Settings::load(&path).await?,
            None => Settings::default(),
        };

        let log_options = LogOptions {
            log_level: cli.log_level.unwrap_or(settings.log_level),
            json_format: settings.json_logs,
        };
        if let Err(e) = init_logging(log_options) {
            eprintln!("Failed to initialize logging: {e}");
        }
        debug!("fleet-deploy {:?}", version_info());

        run(cli, settings).await?;
        Ok::<(), anyhow::Error>(())
    })
}
