use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use kabuscrape::core::log::init_logging;
use kabuscrape::{OutputFormat, Source};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Log in to the configured brokerages and print their holdings
    Collect {
        /// Only collect from this source
        #[arg(short, long, value_enum)]
        source: Option<Source>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => kabuscrape::cli::setup::setup(),
        Some(Commands::Collect { source, format }) => {
            kabuscrape::run_command(
                kabuscrape::AppCommand::Collect { source, format },
                cli.config_path.as_deref(),
            )
            .await
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
