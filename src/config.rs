//! Immutable runtime configuration.
//!
//! Built once at startup from defaults, an optional YAML file and
//! `TABLE_SCOUT_*` environment variables, then shared by reference.

use std::{env, fmt::Write as _, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use log::warn;
use serde::Deserialize;

use crate::security::{ForbiddenToken, default_blacklist};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
pub const DEFAULT_PROFILE_SAMPLE_ROWS: usize = 100;
pub const DEFAULT_OUTPUT_RECORD_CAP: usize = 500;
pub const DEFAULT_ENCODING_SAMPLE_BYTES: usize = 64 * 1024;
pub const DEFAULT_ENCODING_CONFIDENCE_THRESHOLD: f64 = 0.70;
pub const DEFAULT_MEMORY_WARNING_THRESHOLD_MB: u64 = 500;
pub const DEFAULT_MAX_CODE_LENGTH: usize = 100_000;
pub const DEFAULT_MAX_PATH_LENGTH: usize = 4096;

const ENV_PREFIX: &str = "TABLE_SCOUT_";

#[derive(Debug, Clone)]
pub struct Config {
    pub max_file_size: u64,
    pub profile_sample_rows: usize,
    pub output_record_cap: usize,
    pub encoding_sample_bytes: usize,
    pub encoding_confidence_threshold: f64,
    pub blacklist: Vec<ForbiddenToken>,
    pub enable_memory_monitoring: bool,
    pub memory_warning_threshold_mb: u64,
    pub enable_code_execution: bool,
    pub max_code_length: usize,
    pub max_path_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            profile_sample_rows: DEFAULT_PROFILE_SAMPLE_ROWS,
            output_record_cap: DEFAULT_OUTPUT_RECORD_CAP,
            encoding_sample_bytes: DEFAULT_ENCODING_SAMPLE_BYTES,
            encoding_confidence_threshold: DEFAULT_ENCODING_CONFIDENCE_THRESHOLD,
            blacklist: default_blacklist(),
            enable_memory_monitoring: true,
            memory_warning_threshold_mb: DEFAULT_MEMORY_WARNING_THRESHOLD_MB,
            enable_code_execution: true,
            max_code_length: DEFAULT_MAX_CODE_LENGTH,
            max_path_length: DEFAULT_MAX_PATH_LENGTH,
        }
    }
}

/// Optional overrides read from a YAML file; absent keys keep the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    max_file_size: Option<u64>,
    profile_sample_rows: Option<usize>,
    output_record_cap: Option<usize>,
    encoding_sample_bytes: Option<usize>,
    encoding_confidence_threshold: Option<f64>,
    blacklist: Option<Vec<String>>,
    enable_memory_monitoring: Option<bool>,
    memory_warning_threshold_mb: Option<u64>,
    enable_code_execution: Option<bool>,
    max_code_length: Option<usize>,
    max_path_length: Option<usize>,
}

impl Config {
    /// Defaults overlaid with an optional YAML file, then with the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Config::default();
        if let Some(path) = path {
            let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
            let overrides: ConfigFile = serde_yaml::from_reader(BufReader::new(file))
                .with_context(|| format!("Parsing config file {path:?}"))?;
            config.apply_file(overrides);
        }
        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(value) = file.max_file_size {
            self.max_file_size = value;
        }
        if let Some(value) = file.profile_sample_rows {
            self.profile_sample_rows = value;
        }
        if let Some(value) = file.output_record_cap {
            self.output_record_cap = value;
        }
        if let Some(value) = file.encoding_sample_bytes {
            self.encoding_sample_bytes = value;
        }
        if let Some(value) = file.encoding_confidence_threshold {
            self.encoding_confidence_threshold = value;
        }
        if let Some(tokens) = file.blacklist {
            self.blacklist = parse_blacklist(tokens.iter().map(String::as_str));
        }
        if let Some(value) = file.enable_memory_monitoring {
            self.enable_memory_monitoring = value;
        }
        if let Some(value) = file.memory_warning_threshold_mb {
            self.memory_warning_threshold_mb = value;
        }
        if let Some(value) = file.enable_code_execution {
            self.enable_code_execution = value;
        }
        if let Some(value) = file.max_code_length {
            self.max_code_length = value;
        }
        if let Some(value) = file.max_path_length {
            self.max_path_length = value;
        }
    }

    /// Applies `TABLE_SCOUT_*` variables looked up through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        if let Some(value) = env_number(get("MAX_FILE_SIZE"), "MAX_FILE_SIZE") {
            self.max_file_size = value;
        }
        if let Some(value) = env_number(get("SAMPLE_ROWS"), "SAMPLE_ROWS") {
            self.profile_sample_rows = value;
        }
        if let Some(value) = env_number(get("OUTPUT_CAP"), "OUTPUT_CAP") {
            self.output_record_cap = value;
        }
        if let Some(raw) = get("BLACKLIST") {
            let tokens = parse_blacklist(raw.split(','));
            if !tokens.is_empty() {
                self.blacklist = tokens;
            }
        }
        if let Some(value) = env_bool(get("ENABLE_MEMORY_MONITORING"), "ENABLE_MEMORY_MONITORING") {
            self.enable_memory_monitoring = value;
        }
        if let Some(value) = env_number(get("MEMORY_WARNING_THRESHOLD"), "MEMORY_WARNING_THRESHOLD")
        {
            self.memory_warning_threshold_mb = value;
        }
        if let Some(value) = env_bool(get("ENABLE_CODE_EXECUTION"), "ENABLE_CODE_EXECUTION") {
            self.enable_code_execution = value;
        }
    }

    pub fn memory_warning_threshold_bytes(&self) -> u64 {
        self.memory_warning_threshold_mb.saturating_mul(1024 * 1024)
    }

    /// Human-readable dump of the effective configuration.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let rule = "=".repeat(60);
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "table-scout configuration");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(
            out,
            "max_file_size: {:.2} MB",
            self.max_file_size as f64 / (1024.0 * 1024.0)
        );
        let _ = writeln!(out, "profile_sample_rows: {}", self.profile_sample_rows);
        let _ = writeln!(out, "output_record_cap: {}", self.output_record_cap);
        let _ = writeln!(out, "encoding_sample_bytes: {}", self.encoding_sample_bytes);
        let _ = writeln!(
            out,
            "encoding_confidence_threshold: {:.2}",
            self.encoding_confidence_threshold
        );
        let _ = writeln!(
            out,
            "enable_memory_monitoring: {}",
            self.enable_memory_monitoring
        );
        let _ = writeln!(
            out,
            "memory_warning_threshold: {} MB",
            self.memory_warning_threshold_mb
        );
        let _ = writeln!(out, "enable_code_execution: {}", self.enable_code_execution);
        let _ = writeln!(out, "max_code_length: {}", self.max_code_length);
        let _ = writeln!(out, "blacklist items: {}", self.blacklist.len());
        let _ = writeln!(out, "{rule}");
        out
    }
}

fn parse_blacklist<'a, I>(tokens: I) -> Vec<ForbiddenToken>
where
    I: IntoIterator<Item = &'a str>,
{
    tokens
        .into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ForbiddenToken::from_config)
        .collect()
}

fn env_number<T: std::str::FromStr>(raw: Option<String>, name: &str) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {ENV_PREFIX}{name}='{raw}': not a valid number");
            None
        }
    }
}

fn env_bool(raw: Option<String>, name: &str) -> Option<bool> {
    let raw = raw?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => {
            warn!("Ignoring {ENV_PREFIX}{name}='{raw}': not a boolean");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::security::ForbiddenCategory;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_limits() {
        let config = Config::default();
        assert_eq!(config.max_file_size, 100 * 1024 * 1024);
        assert_eq!(config.profile_sample_rows, 100);
        assert!(config.enable_code_execution);
        assert_eq!(config.blacklist[0].token, "import os");
    }

    #[test]
    fn env_overrides_numbers_booleans_and_blacklist() {
        let mut config = Config::default();
        config.apply_env(lookup(&[
            ("TABLE_SCOUT_MAX_FILE_SIZE", "2048"),
            ("TABLE_SCOUT_ENABLE_CODE_EXECUTION", "off"),
            ("TABLE_SCOUT_BLACKLIST", "fetch(, rm -rf ,"),
        ]));
        assert_eq!(config.max_file_size, 2048);
        assert!(!config.enable_code_execution);
        assert_eq!(config.blacklist.len(), 2);
        assert_eq!(config.blacklist[0].category, ForbiddenCategory::RemoteCall);
        assert_eq!(config.blacklist[1].category, ForbiddenCategory::Custom);
    }

    #[test]
    fn malformed_env_values_keep_previous_layer() {
        let mut config = Config::default();
        config.apply_env(lookup(&[
            ("TABLE_SCOUT_SAMPLE_ROWS", "lots"),
            ("TABLE_SCOUT_ENABLE_MEMORY_MONITORING", "perhaps"),
        ]));
        assert_eq!(config.profile_sample_rows, DEFAULT_PROFILE_SAMPLE_ROWS);
        assert!(config.enable_memory_monitoring);
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("scout.yml");
        std::fs::write(&path, "output_record_cap: 25\nblacklist:\n  - \"import os\"\n")
            .expect("write config");
        let mut config = Config::default();
        let file = File::open(&path).expect("open");
        let overrides: ConfigFile = serde_yaml::from_reader(BufReader::new(file)).expect("parse");
        config.apply_file(overrides);
        assert_eq!(config.output_record_cap, 25);
        assert_eq!(config.blacklist.len(), 1);
    }

    #[test]
    fn describe_lists_effective_values() {
        let text = Config::default().describe();
        assert!(text.contains("max_file_size: 100.00 MB"));
        assert!(text.contains("blacklist items: 20"));
    }
}
