//! # Configuration Loading
//!
//! Layers defaults, an optional TOML file and `QUAFKA_*` environment variables,
//! then validates the result.

use crate::{
    config::{schema::QuafkaConfig, validator::ConfigValidator},
    Error, Result,
};
use std::{
    collections::BTreeMap,
    env,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// File names probed in each search path.
const CONFIG_NAMES: [&str; 2] = ["quafka.toml", "config.toml"];

/// Configuration loader with support for multiple sources.
///
/// Environment variables map onto `section.field`: the segment after the prefix
/// names the section and the remainder names the field, so
/// `QUAFKA_SERVER_WORKER_THREADS=4` sets `server.worker_threads`.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
    file: Option<PathBuf>,
    env_prefix: String,
    env: Option<BTreeMap<String, String>>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader searching `.` and `./config`.
    pub fn new() -> Self {
        Self {
            search_paths: vec![PathBuf::from("."), PathBuf::from("./config")],
            file: None,
            env_prefix: "QUAFKA".to_string(),
            env: None,
        }
    }

    /// Add a search path for configuration files.
    #[must_use]
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Use this file instead of searching; it must exist.
    #[must_use]
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the environment variable prefix.
    #[must_use]
    pub fn with_env_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.env_prefix = prefix.as_ref().to_string();
        self
    }

    /// Read overrides from `vars` instead of the process environment.
    #[must_use]
    pub fn with_env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    /// Load configuration from all available sources.
    ///
    /// # Errors
    /// Fails if a file cannot be read or parsed, or the merged result is invalid.
    pub fn load(&self) -> Result<QuafkaConfig> {
        info!("Loading configuration");

        let mut config_value = toml::Value::try_from(QuafkaConfig::default()).map_err(|e| {
            Error::configuration(format!("failed to serialize default config: {e}"))
        })?;
        debug!("Applied default configuration");

        if let Some(path) = self.config_file()? {
            let file_value = load_config_file(&path)?;
            merge(&mut config_value, file_value);
            info!("Loaded configuration file: {}", path.display());
        } else {
            debug!("No configuration file found in search paths");
        }

        self.apply_env_vars(&mut config_value);

        let config: QuafkaConfig = config_value.try_into()?;
        ConfigValidator::validate(&config)?;

        info!("Configuration loaded and validated successfully");
        Ok(config)
    }

    fn config_file(&self) -> Result<Option<PathBuf>> {
        if let Some(file) = &self.file {
            if !file.exists() {
                return Err(Error::configuration(format!(
                    "config file {} does not exist",
                    file.display()
                )));
            }
            return Ok(Some(file.clone()));
        }

        Ok(self
            .search_paths
            .iter()
            .flat_map(|dir| CONFIG_NAMES.iter().map(move |name| dir.join(name)))
            .find(|candidate| candidate.exists()))
    }

    fn apply_env_vars(&self, config: &mut toml::Value) {
        let prefix = format!("{}_", self.env_prefix);
        let vars: Vec<(String, String)> = match &self.env {
            Some(vars) => vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            None => env::vars().collect(),
        };

        let mut applied = 0usize;
        for (key, value) in vars {
            let Some(rest) = key.strip_prefix(&prefix) else { continue };
            let Some((section, field)) = rest.split_once('_') else { continue };

            let section = section.to_lowercase();
            let field = field.to_lowercase();
            if let Some(toml::Value::Table(table)) = config.get_mut(section.as_str()) {
                table.insert(field, parse_env_value(&value));
                applied += 1;
            }
        }
        debug!("Applied {} environment overrides", applied);
    }
}

fn load_config_file(path: &Path) -> Result<toml::Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::configuration(format!("failed to read config file {}: {e}", path.display()))
            .with_source(e)
    })?;
    Ok(content.parse::<toml::Value>()?)
}

/// Recursively overlay `overlay` onto `base`.
fn merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) if existing.is_table() && value.is_table() => {
                        merge(existing, value);
                    },
                    _ => {
                        base_table.insert(key, value);
                    },
                }
            }
        },
        (base, overlay) => *base = overlay,
    }
}

fn parse_env_value(value: &str) -> toml::Value {
    if let Ok(b) = value.parse::<bool>() {
        return toml::Value::Boolean(b);
    }
    if let Ok(i) = value.parse::<i64>() {
        return toml::Value::Integer(i);
    }
    toml::Value::String(value.to_string())
}
