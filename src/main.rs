use anyhow::Context;
use clap::Parser;
use log::{error, info};
use s1tiling::{Configuration, OutputMode, Pipeline, RunOptions};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about = "Sentinel-1 GRD products onto MGRS tiles", long_about = None)]
struct Cli {
    /// Configuration file (INI)
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Extract the zip archives of the raw directory before processing
    #[arg(short = 'z', long = "zip")]
    zip: bool,
}

fn init_logging(mode: OutputMode) {
    let default_filter = if mode == OutputMode::Debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let loaded = Configuration::from_file(&cli.input);
    init_logging(loaded.as_ref().map(|c| c.mode).unwrap_or_default());
    let config = loaded.with_context(|| format!("Invalid configuration {}", cli.input.display()))?;

    info!("========== S1 tiling starting ==========");
    let summary = Pipeline::new(config)
        .run(RunOptions {
            extract_archives: cli.zip,
        })
        .context("Processing chain failed")?;

    info!("========== Done: {} tiles processed ==========", summary.processed());
    if summary.failed() > 0 {
        anyhow::bail!("{} tiles failed", summary.failed());
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}
