//! Default configuration values.
//!
//! Referenced from the `serde(default = ...)` attributes in [`super::types`].

use std::path::PathBuf;

use crate::ion::ION_DEVICE;

pub(super) fn default_device() -> PathBuf {
    PathBuf::from(ION_DEVICE)
}

/// Window width and height in pixels.
pub(super) fn default_dimension() -> u32 {
    256
}

pub(super) fn default_map_cpu() -> bool {
    true
}

pub(super) fn default_title() -> String {
    "simple-dmabuf-ion".to_string()
}

/// Returns the default log level string (`"info"`).
pub(super) fn default_log_level() -> String {
    "info".to_string()
}

/// No log file by default.
pub(super) fn default_log_file_path() -> Option<PathBuf> {
    None
}

/// Returns the default log format string (`"text"`).
pub(super) fn default_log_format() -> String {
    "text".to_string()
}
