// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{NetworkConfig, RawNetworkConfig};
use crate::errors::Result;

/// Load a network description from a given path and return the raw
/// `RawNetworkConfig`.
///
/// This only performs TOML deserialization; it does **not** check
/// references, cardinality strings or link cycles. Use
/// [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawNetworkConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    debug!(path = %path.display(), bytes = contents.len(), "read network description");
    load_from_str(&contents)
}

pub fn load_from_str(contents: &str) -> Result<RawNetworkConfig> {
    let config: RawNetworkConfig = toml::from_str(contents)?;
    Ok(config)
}

/// Render a description as TOML text.
pub fn to_toml_string(config: &RawNetworkConfig) -> Result<String> {
    Ok(toml::to_string(config)?)
}

/// Write a description to `path`, replacing any existing file.
pub fn save_to_path(config: &RawNetworkConfig, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let contents = to_toml_string(config)?;
    fs::write(path, &contents)?;
    debug!(path = %path.display(), bytes = contents.len(), "wrote network description");
    Ok(())
}

/// Load a network description from path and check it.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` default functions).
/// - Checks for:
///   - unknown tools, nodes, inputs and outputs,
///   - malformed cardinality strings and unknown datatypes,
///   - cycles between linked nodes.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<NetworkConfig> {
    let raw_config = load_from_path(&path)?;
    let config = NetworkConfig::try_from(raw_config)?;
    Ok(config)
}

/// `Network.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Network.toml")
}
