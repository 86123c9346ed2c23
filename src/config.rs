// Configuration module: the YAML documents the header-driven uploader
// reads at startup, and the secret resolution chain shared by both
// binaries.
//
// Everything here runs before the first file is opened. A config that
// fails to load, or a secret that cannot be found, stops the run here.

use crate::metadata::RemapTable;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default location of the main configuration document.
pub const CONFIG_FILE_PATH: &str = "./config.yaml";
/// Default location of the object-name remap document.
pub const NAMES_MAP_FILE_PATH: &str = "./names_map.yaml";
/// Environment variable consulted when the config has no hashtag.
pub const HASHTAG_ENV_VAR: &str = "bhtom_hashtag";
/// Environment variable consulted when `--token` is not given.
pub const TOKEN_ENV_VAR: &str = "TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no secret found in either the configuration or the environment variable `{env_var}`")]
    MissingSecret { env_var: String },
}

/// Settings for the header-driven uploader, as stored in `config.yaml`.
///
/// Required keys have no serde default, so a document missing any of
/// them fails to parse instead of producing a half-filled struct.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bhtom_url: String,
    #[serde(default)]
    pub bhtom_hashtag: Option<String>,
    pub filter_key: String,
    pub object_key: String,
    pub radius: f64,
    #[serde(default)]
    pub filter_map: Option<RemapTable>,
    #[serde(default)]
    pub object_map: Option<RemapTable>,
    #[serde(default = "default_data_product_type")]
    pub data_product_type: String,
    #[serde(default)]
    pub observatory: Option<String>,
}

fn default_data_product_type() -> String {
    "fits_file".into()
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = read(path)?;
        let config: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Resolve the upload hashtag: config value first, then the
    /// `bhtom_hashtag` environment variable.
    pub fn hashtag<F>(&self, lookup: F) -> Result<String, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        resolve_secret(self.bhtom_hashtag.as_deref(), HASHTAG_ENV_VAR, lookup)
    }
}

/// Load the object-name remap document.
///
/// The file must exist. An empty document means "no remapping"; anything
/// that is not a flat string map is an error.
pub fn load_names_map<P: AsRef<Path>>(path: P) -> Result<RemapTable, ConfigError> {
    let path = path.as_ref();
    let text = read(path)?;
    if text.trim().is_empty() {
        return Ok(RemapTable::default());
    }
    let table: Option<RemapTable> = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(table.unwrap_or_default())
}

/// Ordered secret lookup: the explicit value, then the named environment
/// variable, then failure. Blank values count as missing at every step.
pub fn resolve_secret<F>(explicit: Option<&str>, env_var: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = explicit.map(str::trim).filter(|v| !v.is_empty()) {
        return Ok(value.to_string());
    }

    match lookup(env_var) {
        Some(value) if !value.trim().is_empty() => {
            log::debug!("Using secret from environment variable `{}`", env_var);
            Ok(value.trim().to_string())
        }
        _ => Err(ConfigError::MissingSecret {
            env_var: env_var.to_string(),
        }),
    }
}

/// Process environment lookup, for production callers of [`resolve_secret`].
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}
