//! Client configuration: data types, defaults and the TOML loader.
//!
//! ```toml
//! device = "/dev/ion"
//! width = 256
//! height = 256
//! heap = "system"        # system | system-contig | carveout | carveout-cam | chunk | dma | custom
//! format = "argb8888"    # argb8888 | xrgb8888 | abgr8888 | xbgr8888
//! map_cpu = true
//! title = "simple-dmabuf-ion"
//!
//! [logging]
//! level = "info"
//! format = "text"
//! file_path = "dmabuf-ion.log"
//! ```

mod defaults;
pub mod loader;
pub mod types;

pub use loader::{get_app_config_dir, get_app_state_dir, ConfigLoader, CONFIG_FILE_NAME};
pub use types::{ClientConfig, LoggingConfig};
