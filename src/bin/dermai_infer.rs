//! Single-image inference entrypoint.
//!
//! Prints `{"predicted_class": ..., "confidence": ...}` on stdout on success.
//! On failure stdout stays empty, the error goes to stderr and the exit code
//! is non-zero.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use dermai::backend::ComputeBackend;
use dermai::inference::predict_json;
use dermai::training::checkpoint::FROZEN_ARTIFACT;
use dermai::utils::logging::{init_logging, LogConfig};

/// Classify a dermatoscopic image with the frozen dermai model
#[derive(Parser, Debug)]
#[command(name = "dermai-infer")]
#[command(version)]
struct Args {
    /// Image to classify
    image: PathBuf,

    /// Frozen artifact stem or .mpk file
    #[arg(short, long, default_value = FROZEN_ARTIFACT)]
    model: PathBuf,

    #[arg(long, value_enum, default_value_t = ComputeBackend::Auto)]
    backend: ComputeBackend,

    /// Enable verbose logging on stderr
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_config = if args.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::quiet()
    };
    let _ = init_logging(&log_config);

    match predict_json(&args.model, &args.image, args.backend) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
