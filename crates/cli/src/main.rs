//! walplayer CLI: replay log segments into a table store.
//!
//! ```text
//! walplayer [options] <wal-input-dir> <tables> [<table-mappings>]
//! ```
//!
//! Exit codes: 0 when every segment replayed, 1 when a segment failed or the
//! configuration was rejected, 2 for usage errors.

mod commands;
mod format;
mod logging;

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use tracing::info;
use walplayer_core::ReplayError;
use walplayer_engine::{MemoryStore, ReplayConfig, ReplayJob};

use commands::{build_cli, settings_from_matches, store_file, target_tables};
use format::{format_error, format_summary, OutputMode};

fn main() {
    let matches = build_cli().get_matches();

    let output_mode = if matches.get_flag("json") {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    logging::init(matches.get_count("verbose"));

    let exit_code = match run(&matches, output_mode) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", format_error(&e, output_mode));
            1
        }
    };
    process::exit(exit_code);
}

fn run(matches: &clap::ArgMatches, mode: OutputMode) -> anyhow::Result<i32> {
    let settings = settings_from_matches(matches)?;
    let config = ReplayConfig::from_settings(&settings)?;

    let input = matches
        .get_one::<String>("input")
        .map(PathBuf::from)
        .context("missing <wal-input-dir>")?;
    let store_path = matches
        .get_one::<PathBuf>("store")
        .map(|path| store_file(path))
        .context("missing --store")?;

    let store = MemoryStore::load(&store_path)
        .with_context(|| format!("Failed to open store '{}'", store_path.display()))?;
    if !matches.get_flag("no-create-tables") {
        for table in target_tables(&settings) {
            if store.create_table(&table) {
                info!(table = %table, "Created target table");
            }
        }
    }

    let job = ReplayJob::new(config, input);
    let summary = match matches.get_one::<PathBuf>("checkpoint") {
        // The store must hold a segment's rows before the checkpoint skips it
        Some(checkpoint) => job.with_checkpoint(checkpoint).run_with_commit(
            || store.clone(),
            |_| {
                store.save(&store_path).map_err(|e| {
                    ReplayError::Progress(format!("store '{}': {}", store_path.display(), e))
                })
            },
        )?,
        None => job.run(|| store.clone())?,
    };

    store
        .save(&store_path)
        .with_context(|| format!("Failed to save store '{}'", store_path.display()))?;

    println!("{}", format_summary(&summary, mode));
    Ok(if summary.is_success() { 0 } else { 1 })
}
