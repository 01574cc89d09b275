//! zip3-ingest - state × ZIP3 polygon builder

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::{error, info};
use zip3_common::logging::{init_logging, LogConfig, LogLevel};
use zip3_ingest::config::PipelineConfig;
use zip3_ingest::pipeline::Pipeline;
use zip3_ingest::verify::OutputVerifier;

#[derive(Parser, Debug)]
#[command(name = "zip3-ingest")]
#[command(author, version, about = "Build state-trimmed ZIP3 polygons from Census ZCTAs")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TOML configuration file (ZIP3_* environment variables override it)
    #[arg(short, long, global = true, env = "ZIP3_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline and export the regions
    Transform,

    /// Download and cache the state boundary layer if absent
    FetchStates,

    /// Coverage analysis of the exported shapefile in the output directory
    Coverage,

    /// Check the exported shapefile's fields, keys and checksums
    Verify,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("zip3-ingest")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    let _guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {}", e);
            None
        },
    };

    if let Err(e) = run(&cli).await {
        error!(error = %format!("{:#}", e), "Command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config = PipelineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let pipeline = Pipeline::new(config);

    match &cli.command {
        Command::Transform => {
            let output = pipeline.run().await?;
            for file in &output.exported {
                info!(format = ?file.format, path = %file.path.display(), "Wrote");
            }
        },
        Command::FetchStates => {
            let path = pipeline.fetch_states().await?;
            info!(path = %path.display(), "State boundaries available");
        },
        Command::Coverage => {
            let report = pipeline.coverage_only().await?;
            info!(
                states = report.rows.len(),
                warnings = report.warnings.len(),
                "Coverage analysis complete"
            );
        },
        Command::Verify => {
            let report = OutputVerifier::new(&pipeline.config().output).verify()?;
            report.log();
            if !report.is_ok() {
                anyhow::bail!("{} verification issue(s) in {}", report.issues.len(), report.path.display());
            }
        },
    }

    Ok(())
}
