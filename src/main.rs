use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;

mod error;
mod fetcher;
mod progress;
mod source;
mod target;

use error::FetchError;
use fetcher::{Fetcher, Outcome};
use progress::ProgressReporter;
use source::HttpSource;
use target::{to_mib, DownloadTarget};

/// Downloads the DSFD face detection checkpoint into the PyTorch hub cache.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// More log output on stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn run(target: &DownloadTarget) -> Result<Outcome, FetchError> {
    if !target.present() {
        println!("Downloading from: {}", target.url);
        println!("Saving to: {}", target.path.display());
    }

    let fetcher = Fetcher::new(HttpSource::new());
    let mut reporter: Option<ProgressReporter> = None;
    let result = fetcher.fetch(target, |done, total| {
        reporter
            .get_or_insert_with(ProgressReporter::new)
            .update(done, total)
    });
    if let Some(reporter) = reporter {
        match &result {
            Ok(_) | Err(FetchError::Missing { .. }) => reporter.finish(),
            Err(_) => reporter.abandon(),
        }
    }
    result
}

/// Prints the final status and recovery hints. Returns whether the run
/// counts as a success.
fn report<W: Write>(out: &mut W, target: &DownloadTarget, result: &Result<Outcome, FetchError>) -> io::Result<bool> {
    match result {
        Ok(Outcome::AlreadyPresent { size_bytes }) => {
            writeln!(out, "✓ Model already exists at: {}", target.path.display())?;
            writeln!(out, "  Size: {:.2} MB", to_mib(*size_bytes))?;
            Ok(true)
        }
        Ok(Outcome::Downloaded { size_bytes }) => {
            writeln!(out, "\n✓ Download complete!")?;
            writeln!(out, "✓ Model saved successfully!")?;
            writeln!(out, "  Location: {}", target.path.display())?;
            writeln!(out, "  Size: {:.2} MB", to_mib(*size_bytes))?;
            Ok(true)
        }
        Err(e) if !e.is_transfer_failure() => {
            writeln!(out, "\n✓ Download complete!")?;
            writeln!(out, "✗ Download completed but file not found!")?;
            Ok(false)
        }
        Err(e) => {
            writeln!(out, "\n✗ Download failed: {}", e)?;
            writeln!(out, "\nYou can manually download the model from:")?;
            writeln!(out, "  {}", target.url)?;
            writeln!(out, "\nAnd place it at:")?;
            writeln!(out, "  {}", target.path.display())?;
            Ok(false)
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logger(args.verbose);

    let target = match DownloadTarget::for_current_user() {
        Ok(target) => target,
        Err(e) => {
            log::error!("{}", e);
            println!("✗ {}", e);
            return ExitCode::FAILURE;
        }
    };
    log::debug!("target {:?}", target);

    let result = run(&target);
    match &result {
        Ok(outcome) => log::info!("{:?}, {} bytes on disk", outcome, outcome.size_bytes()),
        Err(e) => log::error!("{}", e),
    }

    let mut stdout = io::stdout().lock();
    match report(&mut stdout, &target, &result).and_then(|ok| stdout.flush().map(|_| ok)) {
        Ok(true) => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}
