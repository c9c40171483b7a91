//! fx-patch - snapshot and restore the audio connection graph
//!
//! Saves the live graph as a patchbay document on stdout, restores one
//! from stdin, or disconnects everything.
//!
//! # Usage
//!
//! ```bash
//! # Save the current connections
//! fx-patch --save > live.json
//!
//! # Restore them on top of the live graph
//! fx-patch --load < live.json
//!
//! # Replace the live graph with the saved one
//! fx-patch --clear --load < live.json
//!
//! # Disconnect everything
//! fx-patch --clear
//! ```
//!
//! Exits non-zero when the document does not parse or when any connect or
//! disconnect failed.

use std::io::{self, Read};
use std::process;

use anyhow::{bail, Context, Result};
use clap::Parser;
use fx_jack::{BatchReport, CliJackTools};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Snapshot and restore JACK connections
#[derive(Parser, Debug)]
#[command(name = "fx-patch", version, about)]
struct Args {
    /// Write the live graph to stdout
    #[arg(long, conflicts_with = "load")]
    save: bool,

    /// Read a patchbay document from stdin and connect it
    #[arg(long)]
    load: bool,

    /// Disconnect every link (before loading, when combined with --load)
    #[arg(long)]
    clear: bool,
}

fn report_failures(report: &BatchReport) -> bool {
    for failure in &report.failures {
        eprintln!(
            "failed: {} -> {}: {}",
            failure.source, failure.destination, failure.error
        );
    }
    report.is_clean()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("fx_patch=warn".parse()?)
                .add_directive("fx_jack=warn".parse()?),
        )
        .init();

    let args = Args::parse();
    if !(args.save || args.load || args.clear) {
        bail!("nothing to do: pass --save, --load or --clear");
    }

    let tools = CliJackTools::default();

    if args.save {
        let document = fx_jack::save(&tools).context("Failed to read the connection graph")?;
        println!("{}", document.to_json()?);
        if !args.clear {
            return Ok(());
        }
    }

    let report = if args.load {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .context("Failed to read patchbay document from stdin")?;
        fx_jack::load(&tools, &input, args.clear).context("Failed to load patchbay")?
    } else {
        fx_jack::clear(&tools).context("Failed to clear the connection graph")?
    };

    debug!(
        attempted = report.attempted,
        succeeded = report.succeeded(),
        "Batch finished"
    );

    if !report_failures(&report) {
        warn!(failed = report.failures.len(), "Some links could not be changed");
        process::exit(1);
    }
    Ok(())
}
