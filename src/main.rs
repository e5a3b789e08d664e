use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mintcheck::{grade_batch, BatchEntry, BatchOptions, BatchStatus, Grader, GradingConfig};

#[derive(Parser)]
#[command(name = "mintcheck")]
#[command(about = "Estimate the condition grade of trading cards from photos")]
struct Cli {
    /// Card photos to grade
    #[arg(value_name = "IMAGES", required = true)]
    images: Vec<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// TOML file overriding the grading parameters
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Save debug outputs to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Print one JSON object per image instead of text
    #[arg(long)]
    json: bool,

    /// Images graded in parallel [default: available CPUs]
    #[arg(long, value_name = "N")]
    jobs: Option<usize>,

    /// Time limit per image
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // help and version go to stdout and are not failures
            let code = if e.use_stderr() { 1 } else { 0 };
            // logging is not set up yet, so a closed stream can only be reported through the exit code
            if e.print().is_err() {
                return ExitCode::from(1);
            }
            return ExitCode::from(code);
        }
    };

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let grader = match build_grader(&cli) {
        Ok(grader) => grader,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::from(1);
        }
    };

    let defaults = BatchOptions::default();
    let options = BatchOptions {
        jobs: cli.jobs.unwrap_or(defaults.jobs),
        timeout: Duration::from_secs(cli.timeout_secs),
    };

    let entries = grade_batch(Arc::new(grader), cli.images.clone(), options).await;

    for entry in &entries {
        if cli.json {
            print_json(entry);
        } else {
            print_human(entry);
        }
    }

    if entries.iter().all(|entry| entry.status.is_graded()) {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    }
}

fn build_grader(cli: &Cli) -> anyhow::Result<Grader> {
    let config = match &cli.config {
        Some(path) => GradingConfig::load(path).context("Could not load config")?,
        None => GradingConfig::default(),
    };

    let mut grader = Grader::new(&config);
    if let Some(debug_dir) = &cli.debug_out {
        grader = grader.with_debug(debug_dir.clone())?;
    }
    Ok(grader)
}

fn print_human(entry: &BatchEntry) {
    match &entry.status {
        BatchStatus::Graded { result } => {
            println!("Grading Results for image: {}", entry.path.display());
            println!("Centering: {}", result.centering);
            println!("Corners: {}", result.corners);
            println!("Edges: {}", result.edges);
            println!("Surface: {}", result.surface);
            println!("Grade: {}", result.grade);
        }
        BatchStatus::CardNotFound => {
            println!("{}: Failed to grade the image.", entry.path.display());
        }
        BatchStatus::Failed { error } => {
            println!("{}: Failed to grade the image.", entry.path.display());
            eprintln!("error: {error}");
        }
        BatchStatus::TimedOut { seconds } => {
            println!("{}: Failed to grade the image.", entry.path.display());
            eprintln!("error: timed out after {seconds}s");
        }
    }
}

fn print_json(entry: &BatchEntry) {
    match serde_json::to_string(entry) {
        Ok(line) => println!("{line}"),
        Err(e) => eprintln!("error: could not serialize result for {}: {e}", entry.path.display()),
    }
}
