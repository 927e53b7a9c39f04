//! Configuration data structures.
//!
//! Populated from TOML. Every field has a default, and unknown fields are
//! rejected via `#[serde(deny_unknown_fields)]`.

use std::path::PathBuf;

use serde::Deserialize;

use super::defaults;
use crate::buffer::BufferRequest;
use crate::format::PixelFormat;
use crate::ion::HeapType;

/// Configuration settings for the logging subsystem.
///
/// ```
/// use novade_dmabuf_ion::config::LoggingConfig;
///
/// let config = LoggingConfig::default();
/// assert_eq!(config.level, "info");
/// assert_eq!(config.format, "text");
/// assert_eq!(config.file_path, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// One of "trace", "debug", "info", "warn", "error" (case-insensitive).
    #[serde(default = "defaults::default_log_level")]
    pub level: String,
    /// Relative paths are resolved against the application's state directory.
    #[serde(default = "defaults::default_log_file_path")]
    pub file_path: Option<PathBuf>,
    /// "text" or "json".
    #[serde(default = "defaults::default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::default_log_level(),
            file_path: defaults::default_log_file_path(),
            format: defaults::default_log_format(),
        }
    }
}

/// Root configuration of the dma-buf client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Allocator device node.
    #[serde(default = "defaults::default_device")]
    pub device: PathBuf,
    #[serde(default = "defaults::default_dimension")]
    pub width: u32,
    #[serde(default = "defaults::default_dimension")]
    pub height: u32,
    /// Heap class to allocate from. The positional command line code overrides it.
    #[serde(default)]
    pub heap: HeapType,
    #[serde(default)]
    pub format: PixelFormat,
    /// Map every allocation into the client's address space.
    #[serde(default = "defaults::default_map_cpu")]
    pub map_cpu: bool,
    #[serde(default = "defaults::default_title")]
    pub title: String,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            device: defaults::default_device(),
            width: defaults::default_dimension(),
            height: defaults::default_dimension(),
            heap: HeapType::default(),
            format: PixelFormat::default(),
            map_cpu: defaults::default_map_cpu(),
            title: defaults::default_title(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parameters for each buffer of the window's pool.
    pub fn buffer_request(&self) -> BufferRequest {
        BufferRequest {
            width: self.width,
            height: self.height,
            format: self.format,
            heap: self.heap,
            map_cpu: self.map_cpu,
        }
    }
}
