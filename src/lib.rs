pub mod cli;
pub mod core;
pub mod providers;

pub use crate::cli::collect::{OutputFormat, Source};
pub use crate::core::config;

use anyhow::Result;
use tracing::{debug, info};

pub enum AppCommand {
    Collect {
        source: Option<Source>,
        format: OutputFormat,
    },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("kabuscrape starting...");

    let config = match config_path {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => config::AppConfig::load()?,
    };
    debug!(
        rakuten = config.rakuten.is_some(),
        sbi = config.sbi.is_some(),
        timeout_secs = config.timeout_secs,
        "Loaded config"
    );
    config.validate()?;

    match command {
        AppCommand::Collect { source, format } => cli::collect::run(&config, source, format).await,
    }
}
