use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};

/// User-level configuration loaded from `~/.config/keyjar/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the data directory holding the key file and the record store.
    pub data_dir: Option<PathBuf>,
    /// Explicit key file path; wins over `data_dir`.
    pub key_file: Option<PathBuf>,
    /// Explicit record store path; wins over `data_dir`.
    pub store_file: Option<PathBuf>,
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("keyjar").join("config.toml"))
}

/// Write the given config to the default path unless a file is already there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_to_path_if_missing(config, &default_path()?)
}

/// Leaves an existing file alone to avoid clobbering user edits.
pub fn write_to_path_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}
