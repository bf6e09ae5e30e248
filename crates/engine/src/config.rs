//! Replay configuration via `walplayer.toml`
//!
//! Settings come from three layers, later ones winning: built-in defaults,
//! an optional TOML file, and `key=value` properties (the `walplayer.*` keys
//! below). [`ReplaySettings`] is the raw, string-typed form; it is validated
//! once into an immutable [`ReplayConfig`] before any segment is opened.
//!
//! # Example
//!
//! ```toml
//! start_time = "2012-4-10T14:21:01.01"
//! end_time = "1334092861010"
//! time_zone = "America/Los_Angeles"
//! tables = ["testWALPlayer1"]
//! table_mappings = ["testWALPlayer2"]
//! workers = 4
//! ```

use crate::applier::RetryConfig;
use crate::filter::{configure_bound, TimeWindow};
use crate::mapping::TableNameMapper;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use walplayer_core::{ReplayError, Result};

/// String-keyed configuration properties.
pub type Properties = BTreeMap<String, String>;

/// Inclusive lower bound of the replay window.
pub const START_TIME_KEY: &str = "walplayer.start.time";
/// Exclusive upper bound of the replay window.
pub const END_TIME_KEY: &str = "walplayer.end.time";
/// Comma-separated source tables.
pub const TABLES_KEY: &str = "walplayer.input.tables";
/// Comma-separated target tables, positionally matched with the sources.
pub const TABLE_MAP_KEY: &str = "walplayer.input.tablesmap";
/// Time zone for textual time bounds.
pub const TIME_ZONE_KEY: &str = "walplayer.time.zone";
/// Number of concurrent segment workers.
pub const WORKERS_KEY: &str = "walplayer.workers";
/// Retries per mutation after the first attempt.
pub const MAX_RETRIES_KEY: &str = "walplayer.apply.max.retries";

/// Zone used for textual time bounds unless configured otherwise.
pub const DEFAULT_TIME_ZONE: &str = "America/Los_Angeles";

/// Config file name looked up next to the input by the CLI.
pub const CONFIG_FILE_NAME: &str = "walplayer.toml";

/// Upper bound on concurrent workers.
pub const MAX_WORKERS: usize = 256;

/// Raw replay settings as read from TOML and properties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplaySettings {
    /// Inclusive window start (epoch ms or local date-time)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    /// Exclusive window end (epoch ms or local date-time)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    /// IANA zone for textual bounds
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    /// Source tables; empty replays every table under its own name
    #[serde(default)]
    pub tables: Vec<String>,
    /// Target tables, one per source table
    #[serde(default)]
    pub table_mappings: Vec<String>,
    /// Concurrent segment workers
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Retries per mutation after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First retry delay in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Cap on the retry delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_time_zone() -> String {
    DEFAULT_TIME_ZONE.to_string()
}

fn default_workers() -> usize {
    1
}

fn default_max_retries() -> u32 {
    RetryConfig::default().max_retries
}

fn default_base_delay_ms() -> u64 {
    RetryConfig::default().base_delay_ms
}

fn default_max_delay_ms() -> u64 {
    RetryConfig::default().max_delay_ms
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            start_time: None,
            end_time: None,
            time_zone: default_time_zone(),
            tables: Vec::new(),
            table_mappings: Vec::new(),
            workers: default_workers(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_base_delay_ms(),
            retry_max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl ReplaySettings {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# walplayer configuration
#
# Replay window. Either epoch milliseconds or a local date-time such as
# "2012-4-10T14:21:01.01" (digits after the dot are milliseconds).
# The start is inclusive, the end exclusive. Unset bounds are open.
# start_time = "2012-4-10T14:21:01.01"
# end_time = "1334092861010"

# Zone used to interpret textual times (default: America/Los_Angeles)
time_zone = "America/Los_Angeles"

# Tables to replay and, optionally, the tables to replay them into.
# With no tables every table is replayed under its own name.
tables = []
table_mappings = []

# Segments replayed concurrently (default: 1)
workers = 1

# Store retries per mutation and exponential backoff bounds
max_retries = 3
retry_base_delay_ms = 10
retry_max_delay_ms = 100
"#
    }

    /// Parse settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ReplayError::config(format!("Failed to parse config: {}", e)))
    }

    /// Read and parse settings from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReplayError::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content).map_err(|e| {
            ReplayError::config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Serialize these settings to TOML and write them to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ReplayError::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(ReplayError::from)
    }

    /// Overlay `walplayer.*` properties onto these settings.
    ///
    /// Unknown keys are ignored so callers can pass a shared property set.
    pub fn apply_properties(&mut self, properties: &Properties) -> Result<()> {
        for (key, value) in properties {
            match key.as_str() {
                START_TIME_KEY => self.start_time = Some(value.clone()),
                END_TIME_KEY => self.end_time = Some(value.clone()),
                TIME_ZONE_KEY => self.time_zone = value.trim().to_string(),
                TABLES_KEY => self.tables = split_list(value),
                TABLE_MAP_KEY => self.table_mappings = split_list(value),
                WORKERS_KEY => self.workers = parse_number(key, value)?,
                MAX_RETRIES_KEY => self.max_retries = parse_number(key, value)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Render these settings back into properties.
    ///
    /// Unset time bounds produce no entry.
    pub fn to_properties(&self) -> Properties {
        let mut properties = Properties::new();
        if let Some(start) = &self.start_time {
            properties.insert(START_TIME_KEY.to_string(), start.clone());
        }
        if let Some(end) = &self.end_time {
            properties.insert(END_TIME_KEY.to_string(), end.clone());
        }
        properties.insert(TIME_ZONE_KEY.to_string(), self.time_zone.clone());
        if !self.tables.is_empty() {
            properties.insert(TABLES_KEY.to_string(), self.tables.join(","));
        }
        if !self.table_mappings.is_empty() {
            properties.insert(TABLE_MAP_KEY.to_string(), self.table_mappings.join(","));
        }
        properties.insert(WORKERS_KEY.to_string(), self.workers.to_string());
        properties.insert(MAX_RETRIES_KEY.to_string(), self.max_retries.to_string());
        properties
    }
}

/// Split a comma-separated list, dropping blanks.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ReplayError::config(format!("{}={:?}: {}", key, value, e)))
}

/// Validated, immutable replay configuration shared by all workers.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    window: TimeWindow,
    mapper: TableNameMapper,
    time_zone: Tz,
    workers: usize,
    retry: RetryConfig,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        ReplayConfig {
            window: TimeWindow::unbounded(),
            mapper: TableNameMapper::identity(),
            time_zone: Tz::America__Los_Angeles,
            workers: default_workers(),
            retry: RetryConfig::default(),
        }
    }
}

impl ReplayConfig {
    /// Configuration with no window, identity mapping and one worker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve and validate raw settings.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown time zone, unparseable
    /// time bound, inverted window, mismatched table lists or an invalid
    /// worker count.
    pub fn from_settings(settings: &ReplaySettings) -> Result<Self> {
        let time_zone = parse_time_zone(&settings.time_zone)?;
        let start = configure_bound(START_TIME_KEY, settings.start_time.as_deref(), time_zone)?;
        let end = configure_bound(END_TIME_KEY, settings.end_time.as_deref(), time_zone)?;
        let mapper = TableNameMapper::from_lists(&settings.tables, &settings.table_mappings)?;

        let config = ReplayConfig {
            window: TimeWindow::new(start, end),
            mapper,
            time_zone,
            workers: settings.workers,
            retry: RetryConfig {
                max_retries: settings.max_retries,
                base_delay_ms: settings.retry_base_delay_ms,
                max_delay_ms: settings.retry_max_delay_ms,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the replay window (builder pattern).
    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    /// Set the table mapper (builder pattern).
    pub fn with_mapper(mut self, mapper: TableNameMapper) -> Self {
        self.mapper = mapper;
        self
    }

    /// Set the worker count (builder pattern).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the retry policy (builder pattern).
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        self.window.validate()?;
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(ReplayError::config(format!(
                "workers must be between 1 and {}, got {}",
                MAX_WORKERS, self.workers
            )));
        }
        Ok(())
    }

    /// Create a configuration for tests: no backoff delay.
    pub fn for_testing() -> Self {
        ReplayConfig::default().with_retry(RetryConfig {
            max_retries: 2,
            base_delay_ms: 0,
            max_delay_ms: 0,
        })
    }

    /// Replay window.
    pub fn window(&self) -> TimeWindow {
        self.window
    }

    /// Table mapper.
    pub fn mapper(&self) -> &TableNameMapper {
        &self.mapper
    }

    /// Zone used for textual bounds.
    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    /// Concurrent segment workers.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Store retry policy.
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }
}

/// Parse an IANA time zone name.
pub fn parse_time_zone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| ReplayError::config(format!("unknown time zone '{}': {}", name, e)))
}
