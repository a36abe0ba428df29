//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::validation::{Validate, ValidationError};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "CONFIG_FILE_PATH";

/// Config file used when `CONFIG_FILE_PATH` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "./.config/config.json";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Path of the config file: `$CONFIG_FILE_PATH`, or the default.
pub fn config_path() -> PathBuf {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_CONFIG_PATH),
    }
}

/// Load and validate configuration from the file named by the environment.
pub fn load_from_env<T>() -> Result<T, ConfigError>
where
    T: DeserializeOwned + Validate,
{
    load_from_file(&config_path())
}

/// Load and validate configuration from a file.
///
/// `.toml` files are parsed as TOML, everything else as JSON.
pub fn load_from_file<T>(path: &Path) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Validate,
{
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config: T = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(&content)?,
        _ => serde_json::from_str(&content)?,
    };

    config.validate().map_err(ConfigError::Validation)?;

    tracing::debug!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use std::io::Write;

    fn write_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_json() {
        let file = write_file(
            ".json",
            r#"{"lifecycle": {"start_timeout_secs": 5}, "http": {"bind_address": "127.0.0.1:3000", "service_id": 42}}"#,
        );
        let config: ServiceConfig = load_from_file(file.path()).unwrap();
        assert_eq!(config.lifecycle.start_timeout_secs, 5);
        assert_eq!(config.lifecycle.stop_timeout_secs, 0);
        assert_eq!(config.http.bind_address, "127.0.0.1:3000");
        assert_eq!(config.http.service_id, 42);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_load_toml() {
        let file = write_file(
            ".toml",
            "[lifecycle]\nstop_timeout_secs = 3\n\n[observability]\nlog_format = \"json\"\n",
        );
        let config: ServiceConfig = load_from_file(file.path()).unwrap();
        assert_eq!(config.lifecycle.stop_timeout_secs, 3);
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_validation_failure() {
        let file = write_file(".json", r#"{"http": {"service_id": 100}}"#);
        let err = load_from_file::<ServiceConfig>(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
        assert!(err.to_string().contains("http.service_id"));
    }

    #[test]
    fn test_parse_failure() {
        let file = write_file(".json", "{ not json");
        let err = load_from_file::<ServiceConfig>(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_load_from_env_path() {
        let file = write_file(".toml", "[http]\nservice_id = 77\n");

        // Only this test touches the variable.
        std::env::set_var(CONFIG_PATH_ENV, file.path());
        assert_eq!(config_path(), file.path());
        let config: ServiceConfig = load_from_env().unwrap();
        assert_eq!(config.http.service_id, 77);

        std::env::set_var(CONFIG_PATH_ENV, "");
        assert_eq!(config_path(), PathBuf::from(DEFAULT_CONFIG_PATH));

        std::env::remove_var(CONFIG_PATH_ENV);
        assert_eq!(config_path(), PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn test_missing_file() {
        let err =
            load_from_file::<ServiceConfig>(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/config.json"));
    }
}
