use anyhow::{Context as _, Result};
use clap::Parser;
use datasetjson::batch;
use datasetjson::config::{self, Settings};
use datasetjson::logging::LogOptions;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "datasetjson",
    version,
    about = "Converts SAS XPORT v5 and SAS7BDAT files to Dataset-JSON"
)]
pub struct Cli {
    /// The path to a SAS file, or a directory containing SAS files
    #[arg(short, long)]
    pub input: PathBuf,

    /// The directory to store the converted JSON file(s) in
    #[arg(short, long)]
    pub output: PathBuf,

    /// Pretty-print the metadata document
    #[arg(short, long, overrides_with = "no_pretty")]
    pub pretty: bool,

    /// Write a compact metadata document even if the settings file asks for pretty output
    #[arg(long, overrides_with = "pretty")]
    pub no_pretty: bool,

    /// The maximum number of files to convert in parallel (unset or <= 0 converts sequentially)
    #[arg(short, long, allow_negative_numbers = true)]
    pub threads: Option<i64>,

    /// Write rows to a separate <name>-data.jsonl file instead of inline
    #[arg(short, long, overrides_with = "no_external")]
    pub external: bool,

    /// Keep rows inline even if the settings file asks for external rows
    #[arg(long, overrides_with = "external")]
    pub no_external: bool,

    /// Path to a JSON settings file
    #[arg(long, env = "DATASETJSON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Store the effective settings in the settings file before converting
    #[arg(long)]
    pub save_config: bool,

    /// Also write rolling log files to the platform data directory
    #[arg(long)]
    pub log_file: bool,
}

impl Cli {
    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            log_to_file: self.log_file,
        }
    }

    /// Settings file values with command-line flags applied on top.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = config::load_settings(self.config.as_deref())
            .context("Failed to load settings")?;
        if let Some(pretty) = switch(self.pretty, self.no_pretty) {
            settings.pretty = pretty;
        }
        if let Some(external) = switch(self.external, self.no_external) {
            settings.external = external;
        }
        if self.threads.is_some() {
            settings.threads = self.threads;
        }
        Ok(settings)
    }
}

/// An on/off flag pair; `None` leaves the settings file value alone.
fn switch(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn save(cli: &Cli, settings: &Settings) -> Result<()> {
    let path = cli
        .config
        .clone()
        .or_else(config::get_config_path)
        .context("No settings file given and no platform config directory")?;
    config::save_settings(&path, settings)
        .with_context(|| format!("Failed to save settings to {}", path.display()))?;
    tracing::info!("Saved settings to {}", path.display());
    Ok(())
}

/// Runs a batch conversion.
///
/// Only setup failures are returned as errors; files that fail to convert
/// are logged and listed but leave the exit status at zero.
pub fn run(cli: &Cli) -> Result<()> {
    let settings = cli.settings()?;
    if cli.save_config {
        save(cli, &settings)?;
    }
    let report = batch::run(&cli.input, &cli.output, &settings.batch_options())
        .with_context(|| format!("Batch conversion into {} could not start", cli.output.display()))?;

    tracing::info!("{}", report.summary());
    for failed in report.failed() {
        if let batch::TaskStatus::Failed(reason) = &failed.status {
            tracing::warn!("Not converted: {} ({reason})", failed.input.display());
        }
    }
    Ok(())
}
