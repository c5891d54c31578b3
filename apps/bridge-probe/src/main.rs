use bridge_probe::args::{ProbeArgs, USAGE};
use bridge_probe::error::ProbeError;
use bridge_probe::logger::initialize as LoggerInitialize;
use bridge_probe::probe::{ProbeOutcome, config_dir, log_dir, run};

use bridge_core::BridgeConfig;

use common::ErrorLocation;

use std::env;
use std::fs::create_dir_all;
use std::panic::Location;
use std::process::ExitCode;

use log::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let raw: Vec<String> = env::args().skip(1).collect();
    if raw.iter().any(|a| a == "--help" || a == "-h") {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    match run_probe(raw).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_probe(raw: Vec<String>) -> Result<(), ProbeError> {
    let args = ProbeArgs::parse(raw)?;

    let log_dir = log_dir()?;
    create_dir_all(&log_dir).map_err(|e| ProbeError::Probe {
        message: format!("Failed to create log directory: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    // Logger first so config loading is logged
    LoggerInitialize(&log_dir)?;
    info!("Log directory: {}", log_dir.display());

    let config = BridgeConfig::load(&config_dir()?)?;
    let outcome = run(&args, config).await?;
    print_outcome(&outcome)
}

fn print_outcome(outcome: &ProbeOutcome) -> Result<(), ProbeError> {
    let pretty = serde_json::to_string_pretty(&outcome.reply).map_err(|e| ProbeError::Probe {
        message: format!("Failed to format reply: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;
    println!("{pretty}");

    for (topic, payload) in &outcome.pushes {
        println!("[{topic}] {payload}");
    }

    Ok(())
}
