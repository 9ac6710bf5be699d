//! Configuration file resolution and loading
//!
//! Resolution priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. User config file (`<config dir>/sonoro/config.toml`)
//! 4. System config file (`/etc/sonoro/config.toml`, Linux only)
//! 5. None: caller falls back to built-in defaults

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming a configuration file
pub const CONFIG_ENV_VAR: &str = "SONORO_CONFIG";

/// Resolve which configuration file to use, if any
///
/// Explicit sources (CLI argument, environment variable) are returned even if
/// the file does not exist, so that loading reports a clear error instead of
/// silently falling back to defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        debug!("Using config file from command line: {}", path.display());
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            debug!("Using config file from {}: {}", env_var_name, path);
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3/4: well-known locations
    default_config_locations().into_iter().find(|path| path.exists())
}

/// Well-known configuration file locations for this platform
pub fn default_config_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join("sonoro").join("config.toml"));
    }
    if cfg!(target_os = "linux") {
        locations.push(PathBuf::from("/etc/sonoro/config.toml"));
    }
    locations
}

/// Read and deserialize a TOML file
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Cannot read config file {}: {}", path.display(), e)))?;
    let value = toml::from_str(&content)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serial_test::serial;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        #[serde(default)]
        count: u32,
    }

    #[test]
    #[serial]
    fn test_cli_argument_wins() {
        std::env::set_var("SONORO_TEST_CONFIG_A", "/from/env.toml");
        let resolved = resolve_config_path(Some(Path::new("/from/cli.toml")), "SONORO_TEST_CONFIG_A");
        assert_eq!(resolved, Some(PathBuf::from("/from/cli.toml")));
        std::env::remove_var("SONORO_TEST_CONFIG_A");
    }

    #[test]
    #[serial]
    fn test_env_var_used_without_cli() {
        std::env::set_var("SONORO_TEST_CONFIG_B", "/from/env.toml");
        let resolved = resolve_config_path(None, "SONORO_TEST_CONFIG_B");
        assert_eq!(resolved, Some(PathBuf::from("/from/env.toml")));
        std::env::remove_var("SONORO_TEST_CONFIG_B");
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = \"lab\"\ncount = 3").unwrap();
        let sample: Sample = load_toml(file.path()).unwrap();
        assert_eq!(sample.name, "lab");
        assert_eq!(sample.count, 3);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let result: Result<Sample> = load_toml(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_malformed_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = ").unwrap();
        let result: Result<Sample> = load_toml(file.path());
        assert!(matches!(result, Err(Error::Toml(_))));
    }
}
