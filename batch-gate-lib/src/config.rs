//! Configuration file parsing and management.
//!
//! This module handles loading configuration from TOML files and `BG_*`
//! environment variables, and merging file layers with proper precedence.

use crate::error::BatchGateError;
use crate::types::MAX_CONCURRENCY;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration loaded from TOML files.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Default values for CLI options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,

    /// Output formatting preferences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputConfig>,
}

/// Default configuration values that map to CLI options.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DefaultsConfig {
    /// Default concurrency level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Per-request timeout (as string, e.g., "500ms", "5s")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Whole-batch deadline (as string, e.g., "30s", "2m")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_timeout: Option<String>,

    /// How many times the target list is repeated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat: Option<usize>,

    /// Default pretty output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pretty: Option<bool>,
}

/// Output formatting configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    /// Default output format ("text", "json" or "csv")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_format: Option<String>,

    /// Pretty-print JSON by default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_pretty: Option<bool>,
}

/// Configuration discovery and loading functionality.
#[derive(Debug, Default)]
pub struct ConfigManager;

impl ConfigManager {
    pub fn new() -> Self {
        Self
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// `FileError` when the file is missing or unreadable, `ConfigError` when
    /// it is not valid TOML or fails validation.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, BatchGateError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BatchGateError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            BatchGateError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config: FileConfig = toml::from_str(&content)?;

        self.validate_config(&config)?;
        debug!(path = %path.display(), "loaded configuration file");

        Ok(config)
    }

    /// Discover and load configuration files in precedence order.
    ///
    /// XDG config is the lowest layer, then the home directory file, then the
    /// file in the current directory. Files that fail to load are skipped with
    /// a warning.
    pub fn discover_and_load(&self) -> Result<FileConfig, BatchGateError> {
        let mut merged_config = FileConfig::default();
        let mut loaded_files = Vec::new();

        let candidates = [
            self.get_xdg_config_path(),
            self.get_global_config_path(),
            self.get_local_config_path(),
        ];

        for path in candidates.into_iter().flatten() {
            match self.load_file(&path) {
                Ok(config) => {
                    merged_config = self.merge_configs(merged_config, config);
                    loaded_files.push(path);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "ignoring configuration file"),
            }
        }

        if loaded_files.len() > 1 {
            info!(
                files = ?loaded_files,
                "multiple config files found, later files take precedence"
            );
        }

        Ok(merged_config)
    }

    /// Configuration file in the current directory.
    fn get_local_config_path(&self) -> Option<PathBuf> {
        let candidates = ["./batch-gate.toml", "./.batch-gate.toml"];

        candidates
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(Path::to_path_buf)
    }

    /// Configuration file in the user's home directory.
    fn get_global_config_path(&self) -> Option<PathBuf> {
        let home = env::var_os("HOME")?;
        let candidates = [".batch-gate.toml", "batch-gate.toml"];

        candidates
            .iter()
            .map(|candidate| Path::new(&home).join(candidate))
            .find(|path| path.exists())
    }

    /// Follows the XDG Base Directory Specification.
    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".config")))?;

        let path = config_dir.join("batch-gate").join("config.toml");
        path.exists().then_some(path)
    }

    /// Merge two configurations; values from `higher` win.
    fn merge_configs(&self, lower: FileConfig, higher: FileConfig) -> FileConfig {
        FileConfig {
            defaults: match (lower.defaults, higher.defaults) {
                (Some(mut lower_defaults), Some(higher_defaults)) => {
                    if higher_defaults.concurrency.is_some() {
                        lower_defaults.concurrency = higher_defaults.concurrency;
                    }
                    if higher_defaults.timeout.is_some() {
                        lower_defaults.timeout = higher_defaults.timeout;
                    }
                    if higher_defaults.batch_timeout.is_some() {
                        lower_defaults.batch_timeout = higher_defaults.batch_timeout;
                    }
                    if higher_defaults.repeat.is_some() {
                        lower_defaults.repeat = higher_defaults.repeat;
                    }
                    if higher_defaults.pretty.is_some() {
                        lower_defaults.pretty = higher_defaults.pretty;
                    }
                    Some(lower_defaults)
                }
                (lower_defaults, higher_defaults) => higher_defaults.or(lower_defaults),
            },
            output: match (lower.output, higher.output) {
                (Some(mut lower_output), Some(higher_output)) => {
                    if higher_output.default_format.is_some() {
                        lower_output.default_format = higher_output.default_format;
                    }
                    if higher_output.json_pretty.is_some() {
                        lower_output.json_pretty = higher_output.json_pretty;
                    }
                    Some(lower_output)
                }
                (lower_output, higher_output) => higher_output.or(lower_output),
            },
        }
    }

    /// Validate a configuration for common issues.
    fn validate_config(&self, config: &FileConfig) -> Result<(), BatchGateError> {
        if let Some(defaults) = &config.defaults {
            if let Some(concurrency) = defaults.concurrency {
                if concurrency == 0 || concurrency > MAX_CONCURRENCY {
                    return Err(BatchGateError::config(format!(
                        "Concurrency must be between 1 and {}",
                        MAX_CONCURRENCY
                    )));
                }
            }

            for (key, value) in [
                ("timeout", &defaults.timeout),
                ("batch_timeout", &defaults.batch_timeout),
            ] {
                if let Some(value) = value {
                    if parse_duration(value).is_none() {
                        return Err(BatchGateError::config(format!(
                            "Invalid {} '{}'. Use a format like '500ms', '5s', '2m'",
                            key, value
                        )));
                    }
                }
            }
        }

        if let Some(output) = &config.output {
            if let Some(format) = &output.default_format {
                if !matches!(format.as_str(), "text" | "json" | "csv") {
                    return Err(BatchGateError::config(format!(
                        "Invalid default_format '{}'. Use text, json or csv",
                        format
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Environment variable configuration that mirrors CLI options.
///
/// Values come from `BG_*` variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    pub concurrency: Option<usize>,
    pub timeout: Option<String>,
    pub batch_timeout: Option<String>,
    pub repeat: Option<usize>,
    pub pretty: Option<bool>,
    pub json: Option<bool>,
    pub csv: Option<bool>,
    pub file: Option<String>,
    pub config: Option<String>,
}

impl EnvConfig {
    /// Check if output format conflicts exist (JSON and CSV both set).
    pub fn has_output_format_conflict(&self) -> bool {
        matches!((self.json, self.csv), (Some(true), Some(true)))
    }
}

/// Load configuration from the process environment.
///
/// Invalid values are logged as warnings and ignored.
pub fn load_env_config() -> EnvConfig {
    load_env_config_from(|name| env::var(name).ok())
}

/// Load configuration from an arbitrary variable lookup.
pub fn load_env_config_from<F>(lookup: F) -> EnvConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut env_config = EnvConfig::default();

    // BG_CONCURRENCY - slots in the gate
    if let Some(val) = lookup("BG_CONCURRENCY") {
        match val.trim().parse::<usize>() {
            Ok(concurrency) if (1..=MAX_CONCURRENCY).contains(&concurrency) => {
                debug!(concurrency, "using BG_CONCURRENCY");
                env_config.concurrency = Some(concurrency);
            }
            _ => warn!(value = %val, "invalid BG_CONCURRENCY, must be 1-{}", MAX_CONCURRENCY),
        }
    }

    env_config.timeout = duration_var(&lookup, "BG_TIMEOUT");
    env_config.batch_timeout = duration_var(&lookup, "BG_BATCH_TIMEOUT");

    // BG_REPEAT - repetitions of the target list
    if let Some(val) = lookup("BG_REPEAT") {
        match val.trim().parse::<usize>() {
            Ok(repeat) if repeat > 0 => {
                debug!(repeat, "using BG_REPEAT");
                env_config.repeat = Some(repeat);
            }
            _ => warn!(value = %val, "invalid BG_REPEAT, must be a positive integer"),
        }
    }

    env_config.pretty = bool_var(&lookup, "BG_PRETTY");
    env_config.json = bool_var(&lookup, "BG_JSON");
    env_config.csv = bool_var(&lookup, "BG_CSV");
    env_config.file = string_var(&lookup, "BG_FILE");
    env_config.config = string_var(&lookup, "BG_CONFIG");

    env_config
}

fn bool_var<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str) -> Option<bool> {
    let val = lookup(name)?;
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => {
            warn!(variable = name, value = %val, "invalid boolean, use true/false");
            None
        }
    }
}

fn duration_var<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str) -> Option<String> {
    let val = lookup(name)?;
    if parse_duration(&val).is_some() {
        debug!(variable = name, value = %val, "using duration from environment");
        Some(val)
    } else {
        warn!(
            variable = name,
            value = %val,
            "invalid duration, use a format like '500ms', '5s', '2m'"
        );
        None
    }
}

fn string_var<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str) -> Option<String> {
    lookup(name).filter(|val| !val.trim().is_empty())
}

/// Parse a duration string like "500ms", "5s", "2m" or "30".
///
/// Bare numbers are seconds. Returns `None` for anything else, including zero.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim().to_lowercase();

    let duration = if let Some(ms) = value.strip_suffix("ms") {
        Duration::from_millis(ms.trim().parse().ok()?)
    } else if let Some(s) = value.strip_suffix('s') {
        Duration::from_secs(s.trim().parse().ok()?)
    } else if let Some(m) = value.strip_suffix('m') {
        Duration::from_secs(m.trim().parse::<u64>().ok()?.checked_mul(60)?)
    } else {
        Duration::from_secs(value.parse().ok()?)
    };

    (!duration.is_zero()).then_some(duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration(" 10S "), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("0s"), None);
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn test_load_valid_config() {
        let file = write_config(
            r#"
[defaults]
concurrency = 20
timeout = "5s"
batch_timeout = "2m"
repeat = 200
pretty = true

[output]
default_format = "json"
json_pretty = true
"#,
        );

        let config = ConfigManager::new().load_file(file.path()).unwrap();
        let defaults = config.defaults.unwrap();
        assert_eq!(defaults.concurrency, Some(20));
        assert_eq!(defaults.timeout.as_deref(), Some("5s"));
        assert_eq!(defaults.batch_timeout.as_deref(), Some("2m"));
        assert_eq!(defaults.repeat, Some(200));
        assert_eq!(defaults.pretty, Some(true));

        let output = config.output.unwrap();
        assert_eq!(output.default_format.as_deref(), Some("json"));
        assert_eq!(output.json_pretty, Some(true));
    }

    #[test]
    fn test_invalid_concurrency() {
        let file = write_config("[defaults]\nconcurrency = 0\n");
        let result = ConfigManager::new().load_file(file.path());
        assert!(matches!(result, Err(BatchGateError::ConfigError { .. })));
    }

    #[test]
    fn test_invalid_timeout_and_format() {
        let file = write_config("[defaults]\nbatch_timeout = \"whenever\"\n");
        assert!(ConfigManager::new().load_file(file.path()).is_err());

        let file = write_config("[output]\ndefault_format = \"xml\"\n");
        assert!(ConfigManager::new().load_file(file.path()).is_err());
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let file = write_config("[defaults\nconcurrency = ");
        let result = ConfigManager::new().load_file(file.path());
        assert!(matches!(result, Err(BatchGateError::ConfigError { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigManager::new().load_file("/no/such/batch-gate.toml");
        assert!(matches!(result, Err(BatchGateError::FileError { .. })));
    }

    #[test]
    fn test_merge_configs() {
        let manager = ConfigManager::new();

        let lower = FileConfig {
            defaults: Some(DefaultsConfig {
                concurrency: Some(10),
                timeout: Some("5s".to_string()),
                pretty: Some(false),
                ..Default::default()
            }),
            output: Some(OutputConfig {
                default_format: Some("csv".to_string()),
                json_pretty: None,
            }),
        };

        let higher = FileConfig {
            defaults: Some(DefaultsConfig {
                concurrency: Some(25),
                pretty: Some(true),
                ..Default::default()
            }),
            output: None,
        };

        let merged = manager.merge_configs(lower, higher);
        let defaults = merged.defaults.unwrap();

        assert_eq!(defaults.concurrency, Some(25)); // Higher wins
        assert_eq!(defaults.timeout.as_deref(), Some("5s")); // Lower preserved
        assert_eq!(defaults.pretty, Some(true)); // Higher wins
        assert_eq!(
            merged.output.unwrap().default_format.as_deref(),
            Some("csv")
        );
    }

    #[test]
    fn test_env_config_parsing() {
        let vars: HashMap<&str, &str> = [
            ("BG_CONCURRENCY", "15"),
            ("BG_TIMEOUT", "750ms"),
            ("BG_BATCH_TIMEOUT", "nonsense"),
            ("BG_REPEAT", "200"),
            ("BG_PRETTY", "yes"),
            ("BG_JSON", "maybe"),
            ("BG_FILE", "  "),
            ("BG_CONFIG", "custom.toml"),
        ]
        .into_iter()
        .collect();

        let env_config = load_env_config_from(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(env_config.concurrency, Some(15));
        assert_eq!(env_config.timeout.as_deref(), Some("750ms"));
        assert_eq!(env_config.batch_timeout, None);
        assert_eq!(env_config.repeat, Some(200));
        assert_eq!(env_config.pretty, Some(true));
        assert_eq!(env_config.json, None);
        assert_eq!(env_config.file, None);
        assert_eq!(env_config.config.as_deref(), Some("custom.toml"));
    }

    #[test]
    fn test_env_concurrency_out_of_range_ignored() {
        let env_config = load_env_config_from(|name| {
            (name == "BG_CONCURRENCY").then(|| "0".to_string())
        });
        assert_eq!(env_config.concurrency, None);
    }

    #[test]
    fn test_output_format_conflict() {
        let env_config = EnvConfig {
            json: Some(true),
            csv: Some(true),
            ..Default::default()
        };
        assert!(env_config.has_output_format_conflict());
        assert!(!EnvConfig::default().has_output_format_conflict());
    }
}
