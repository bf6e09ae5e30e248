//! Clap command definition and settings resolution.
//!
//! Settings are layered: the optional `--config` file, then `-D key=value`
//! properties, then dedicated flags and positional arguments.

use anyhow::{bail, Context};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};
use walplayer_engine::{
    parse_time_zone, setup_time, Properties, ReplaySettings, END_TIME_KEY, START_TIME_KEY,
    TABLES_KEY, TABLE_MAP_KEY, TIME_ZONE_KEY,
};

/// Default store snapshot file.
pub const DEFAULT_STORE_FILE: &str = "walplayer-store.json";

/// Build the CLI command.
pub fn build_cli() -> Command {
    Command::new("walplayer")
        .about("Replay write-ahead log segments into a table store")
        .long_about(
            "Replay write-ahead log segments into a table store.\n\n\
             Reads every segment under <wal-input-dir>, keeps entries for <tables> \
             whose write time lies in [--start-time, --end-time), and applies their \
             edits to the tables named by <table-mappings> (or to the same tables \
             when no mapping is given). Both lists are comma-separated.",
        )
        .arg(
            Arg::new("input")
                .value_name("wal-input-dir")
                .required(true)
                .help("Segment file or directory of segments"),
        )
        .arg(
            Arg::new("tables")
                .value_name("tables")
                .required(true)
                .help("Comma-separated tables to replay"),
        )
        .arg(
            Arg::new("mappings")
                .value_name("table-mappings")
                .help("Comma-separated target tables, one per source table"),
        )
        .arg(
            Arg::new("start-time")
                .long("start-time")
                .value_name("TIME")
                .help("Inclusive window start: epoch ms or yyyy-M-dTH:m:s[.SSS]"),
        )
        .arg(
            Arg::new("end-time")
                .long("end-time")
                .value_name("TIME")
                .help("Exclusive window end: epoch ms or yyyy-M-dTH:m:s[.SSS]"),
        )
        .arg(
            Arg::new("time-zone")
                .long("time-zone")
                .value_name("ZONE")
                .help("Zone for textual times (default: America/Los_Angeles)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .help("TOML settings file"),
        )
        .arg(
            Arg::new("define")
                .short('D')
                .value_name("KEY=VALUE")
                .action(ArgAction::Append)
                .help("Set a walplayer.* property"),
        )
        .arg(
            Arg::new("workers")
                .long("workers")
                .short('w')
                .value_name("N")
                .value_parser(clap::value_parser!(usize))
                .help("Segments replayed concurrently"),
        )
        .arg(
            Arg::new("max-retries")
                .long("max-retries")
                .value_name("N")
                .value_parser(clap::value_parser!(u32))
                .help("Store retries per mutation"),
        )
        .arg(
            Arg::new("retry-backoff-ms")
                .long("retry-backoff-ms")
                .value_name("MS")
                .value_parser(clap::value_parser!(u64))
                .help("Base delay between store retries, doubled per attempt"),
        )
        .arg(
            Arg::new("store")
                .long("store")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .default_value(DEFAULT_STORE_FILE)
                .help("Store snapshot file or directory to replay into; created if missing"),
        )
        .arg(
            Arg::new("no-create-tables")
                .long("no-create-tables")
                .action(ArgAction::SetTrue)
                .help("Fail writes to target tables missing from the store"),
        )
        .arg(
            Arg::new("checkpoint")
                .long("checkpoint")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Progress file; completed segments are skipped on rerun"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("JSON output mode")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::Count)
                .help("More logging (-v debug, -vv trace)"),
        )
}

/// Resolve replay settings from parsed arguments.
pub fn settings_from_matches(matches: &ArgMatches) -> anyhow::Result<ReplaySettings> {
    let mut settings = match matches.get_one::<PathBuf>("config") {
        Some(path) => ReplaySettings::from_file(path)?,
        None => ReplaySettings::default(),
    };

    let mut properties = parse_defines(matches)?;
    if let Some(start) = matches.get_one::<String>("start-time") {
        properties.insert(START_TIME_KEY.to_string(), start.clone());
    }
    if let Some(end) = matches.get_one::<String>("end-time") {
        properties.insert(END_TIME_KEY.to_string(), end.clone());
    }
    if let Some(zone) = matches.get_one::<String>("time-zone") {
        properties.insert(TIME_ZONE_KEY.to_string(), zone.clone());
    }
    if let Some(tables) = matches.get_one::<String>("tables") {
        properties.insert(TABLES_KEY.to_string(), tables.clone());
    }
    if let Some(mappings) = matches.get_one::<String>("mappings") {
        properties.insert(TABLE_MAP_KEY.to_string(), mappings.clone());
    }

    // Normalize time bounds to epoch ms up front so bad values fail here
    let zone = properties
        .get(TIME_ZONE_KEY)
        .cloned()
        .unwrap_or_else(|| settings.time_zone.clone());
    let tz = parse_time_zone(&zone)?;
    setup_time(&mut properties, START_TIME_KEY, tz)?;
    setup_time(&mut properties, END_TIME_KEY, tz)?;

    settings.apply_properties(&properties)?;

    if let Some(&workers) = matches.get_one::<usize>("workers") {
        settings.workers = workers;
    }
    if let Some(&retries) = matches.get_one::<u32>("max-retries") {
        settings.max_retries = retries;
    }
    if let Some(&backoff) = matches.get_one::<u64>("retry-backoff-ms") {
        settings.retry_base_delay_ms = backoff;
    }

    if settings.tables.is_empty() {
        bail!("no tables given");
    }
    Ok(settings)
}

fn parse_defines(matches: &ArgMatches) -> anyhow::Result<Properties> {
    let mut properties = Properties::new();
    for define in matches.get_many::<String>("define").into_iter().flatten() {
        let (key, value) = define
            .split_once('=')
            .with_context(|| format!("expected KEY=VALUE, got '{}'", define))?;
        properties.insert(key.trim().to_string(), value.to_string());
    }
    Ok(properties)
}

/// Snapshot file for `--store`; a directory holds the default file name.
pub fn store_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(DEFAULT_STORE_FILE)
    } else {
        path.to_path_buf()
    }
}

/// Target tables named on the command line, for creation in the store.
pub fn target_tables(settings: &ReplaySettings) -> Vec<String> {
    if settings.table_mappings.is_empty() {
        settings.tables.clone()
    } else {
        settings.table_mappings.clone()
    }
}
