//! Configuration loading and validation.
//!
//! [`ConfigLoader::load`] reads `dmabuf-ion.toml` from the application config
//! directory (`~/.config/novade/` on Linux) unless an explicit path is given.
//! A missing default file yields the default configuration; a missing explicit
//! file is an error.
//!
//! Validation normalizes the log level and format, rejects zero window
//! dimensions and resolves a relative log file path against the application's
//! state directory.

use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use directories_next::{BaseDirs, ProjectDirs};

use super::types::ClientConfig;
use crate::error::ConfigError;

const QUALIFIER: &str = "org";
const ORGANIZATION: &str = "NovaDE";
const APPLICATION: &str = "NovaDE";

/// File name looked up in the application config directory.
pub const CONFIG_FILE_NAME: &str = "dmabuf-ion.toml";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// e.g. `~/.config/novade`.
pub fn get_app_config_dir() -> Result<PathBuf, ConfigError> {
    project_dirs()
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| ConfigError::DirectoryUnavailable {
            dir_type: "Application Config".to_string(),
        })
}

/// Directory name under the state base directory.
const STATE_DIR_NAME: &str = "novade";

/// `$XDG_STATE_HOME`, or `~/.local/state` when it is unset or empty.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn state_base_dir(xdg_state_home: Option<OsString>, home: &Path) -> PathBuf {
    match xdg_state_home {
        Some(state_home) if !state_home.is_empty() => PathBuf::from(state_home),
        _ => home.join(".local/state"),
    }
}

/// e.g. `~/.local/state/novade`. Other platforms use the local data directory.
pub fn get_app_state_dir() -> Result<PathBuf, ConfigError> {
    BaseDirs::new()
        .map(|dirs| {
            #[cfg(target_os = "linux")]
            {
                state_base_dir(std::env::var_os("XDG_STATE_HOME"), dirs.home_dir()).join(STATE_DIR_NAME)
            }
            #[cfg(not(target_os = "linux"))]
            {
                dirs.data_local_dir().join(STATE_DIR_NAME)
            }
        })
        .ok_or_else(|| ConfigError::DirectoryUnavailable {
            dir_type: "Application State".to_string(),
        })
}

/// Namespace for configuration loading.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads and validates the client configuration.
    pub fn load(explicit: Option<&Path>) -> Result<ClientConfig, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::read(path)?,
            None => {
                let path = get_app_config_dir()?.join(CONFIG_FILE_NAME);
                match Self::read(&path) {
                    Err(ConfigError::ReadError { source, .. }) if source.kind() == ErrorKind::NotFound => {
                        ClientConfig::default()
                    }
                    other => other?,
                }
            }
        };
        Self::validate_config(&mut config, get_app_state_dir)?;
        Ok(config)
    }

    /// Reads and parses one file. An empty file is the default configuration.
    pub fn read(path: &Path) -> Result<ClientConfig, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(ClientConfig::default());
        }
        Ok(toml::from_str(&content)?)
    }

    /// Checks value ranges and normalizes the logging section.
    ///
    /// `state_dir` is only consulted when the log file path is relative.
    pub fn validate_config(
        config: &mut ClientConfig,
        state_dir: impl FnOnce() -> Result<PathBuf, ConfigError>,
    ) -> Result<(), ConfigError> {
        let in_range = |v: u32| v != 0 && i32::try_from(v).is_ok();
        if !in_range(config.width) || !in_range(config.height) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid window size {}x{}: width and height must be between 1 and {}.",
                config.width,
                config.height,
                i32::MAX
            )));
        }

        let level_lower = config.logging.level.to_lowercase();
        match level_lower.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => config.logging.level = level_lower,
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: '{}'. Must be one of trace, debug, info, warn, error.",
                    config.logging.level
                )));
            }
        }

        let format_lower = config.logging.format.to_lowercase();
        match format_lower.as_str() {
            "text" | "json" => config.logging.format = format_lower,
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: '{}'. Must be one of text, json.",
                    config.logging.format
                )));
            }
        }

        if let Some(path) = &config.logging.file_path {
            if path.is_relative() {
                config.logging.file_path = Some(state_dir()?.join(path));
            }
        }
        Ok(())
    }
}
