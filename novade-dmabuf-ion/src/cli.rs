//! Command line interface.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::config::ClientConfig;
use crate::ion::HeapType;

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "novade-dmabuf-ion")]
#[command(about = "Presents ION-allocated dma-bufs through zwp_linux_dmabuf_v1", long_about = None)]
#[command(after_help = "Pass 1 as HEAP to allocate from the carve-out heap. Any other value selects the system heap.")]
pub struct Cli {
    /// Heap code: 1 = carve-out, anything else = system
    #[arg(value_name = "HEAP", allow_negative_numbers = true)]
    pub heap: Option<String>,

    /// Configuration file (default: dmabuf-ion.toml in the NovaDE config directory)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Allocator device node
    #[arg(long, value_name = "PATH")]
    pub device: Option<PathBuf>,
}

impl Cli {
    /// The heap class selected by the positional argument, if given.
    pub fn heap_type(&self) -> Option<HeapType> {
        self.heap.as_deref().map(HeapType::from_cli_code)
    }

    /// Overlays the command line on the loaded configuration.
    pub fn apply(&self, config: &mut ClientConfig) {
        match self.heap_type() {
            Some(heap) => {
                config.heap = heap;
                info!("ion type = {}", heap);
            }
            None => {
                info!("The default ion heap = {}", config.heap);
                info!("If you want the carve-out heap => # novade-dmabuf-ion 1");
            }
        }
        if let Some(device) = &self.device {
            config.device = device.clone();
        }
    }
}
