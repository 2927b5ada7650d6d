use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

/// Name of the optional configuration file in the working directory.
pub const CONFIG_FILE: &str = "remark.toml";

pub const DEFAULT_PATTERN: &str = "**/*.md";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8888;
pub const DEFAULT_INTERVAL_MS: u64 = 10;

/// Configuration loaded from `remark.toml` at the watch root.
#[derive(Debug, Deserialize, Default)]
pub struct RemarkConfig {
    /// Glob patterns of files to watch.
    pub patterns: Option<Vec<String>>,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Milliseconds between glob re-resolution passes.
    pub interval_ms: Option<u64>,
}

impl RemarkConfig {
    /// Load configuration from `remark.toml` in the given root directory.
    ///
    /// Returns a default (empty) configuration if the file does not exist or cannot be parsed.
    pub fn load(root: &Path) -> Self {
        let config_path = root.join(CONFIG_FILE);

        if !config_path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(config) => config,
                Err(err) => {
                    warn!("failed to parse {CONFIG_FILE}: {err}. Using defaults.");
                    Self::default()
                }
            },
            Err(err) => {
                warn!("failed to read {CONFIG_FILE}: {err}. Using defaults.");
                Self::default()
            }
        }
    }
}

/// Fully resolved settings: CLI flags over config file over built-in defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub patterns: Vec<String>,
    pub host: String,
    pub port: u16,
    pub interval: Duration,
}

/// Values given on the command line; `None`/empty means "not given".
#[derive(Debug, Default)]
pub struct Overrides {
    pub watch: Vec<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub interval_ms: Option<u64>,
}

impl Settings {
    pub fn resolve(config: RemarkConfig, overrides: Overrides) -> Self {
        let patterns = if !overrides.watch.is_empty() {
            split_patterns(&overrides.watch)
        } else if let Some(patterns) = config.patterns.filter(|p| !p.is_empty()) {
            split_patterns(&patterns)
        } else {
            vec![DEFAULT_PATTERN.to_owned()]
        };

        // A zero period would make the resolver tick spin.
        let interval_ms = overrides
            .interval_ms
            .or(config.interval_ms)
            .unwrap_or(DEFAULT_INTERVAL_MS)
            .max(1);

        Self {
            patterns,
            host: overrides
                .host
                .or(config.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            port: overrides.port.or(config.port).unwrap_or(DEFAULT_PORT),
            interval: Duration::from_millis(interval_ms),
        }
    }
}

/// Split each value on whitespace, so `-w "a/*.md b/*.md"` yields two patterns.
pub fn split_patterns(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split_whitespace())
        .map(str::to_owned)
        .collect()
}
