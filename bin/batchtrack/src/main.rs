//! Replay driver for the batch tracker.
//!
//! Feeds a JSON lines script of pipeline events (admissions, rejections,
//! ledger commits) into a tracker backed by an in-memory ledger and prints
//! the answers to the queries and watches in the script, one JSON object per
//! line.

mod args;
mod errors;
mod replay;
mod script;

use std::{
    fs,
    io::{self, Write},
};

use anyhow::Context;
use args::Args;
use batchtrack_common::logging;
use batchtrack_config::{Config, LoggingConfig};
use batchtrack_tracker::metrics;
use errors::DriverError;
use replay::Replayer;
use script::parse_script;
use tracing::*;

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    if let Err(e) = main_inner(args) {
        eprintln!("FATAL ERROR: {e:#}");

        return Err(e);
    }

    Ok(())
}

fn main_inner(args: Args) -> anyhow::Result<()> {
    let config = get_config(&args)?;

    // Init the logging before we do anything else.
    init_logging(&config.logging);

    let script = fs::read_to_string(&args.script)
        .map_err(DriverError::from)
        .with_context(|| format!("reading script {}", args.script.display()))?;
    let ops = parse_script(&script)?;
    info!(ops = ops.len(), "replaying script");

    let replayer = Replayer::new(&config.tracker);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for op in ops {
        for record in replayer.apply(op)? {
            serde_json::to_writer(&mut out, &record)?;
            writeln!(out)?;
        }
    }
    out.flush()?;

    let tracker = replayer.tracker();
    info!(
        pending = tracker.pending_count(),
        watchers = tracker.watcher_count(),
        "replay finished"
    );

    if args.print_metrics {
        write!(out, "{}", metrics::encode_text()?)?;
    }

    Ok(())
}

fn get_config(args: &Args) -> Result<Config, DriverError> {
    let config = match &args.config {
        Some(path) => batchtrack_config::load_config(path, &args.overrides)?,
        None => batchtrack_config::load_config_from_str("", &args.overrides)?,
    };
    Ok(config)
}

fn init_logging(config: &LoggingConfig) {
    logging::init_logging_from_config(logging::LoggingInitConfig {
        service_base_name: "batchtrack",
        service_label: config.service_label.as_deref(),
        log_dir: config.log_dir.as_ref(),
        log_file_prefix: config.log_file_prefix.as_deref(),
        json_format: config.json_format,
        default_log_prefix: "batchtrack",
    });
}
