// NovaDE dma-buf client entry point

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use novade_dmabuf_ion::cli::Cli;
use novade_dmabuf_ion::config::{ClientConfig, ConfigLoader};
use novade_dmabuf_ion::logging::{init_logging, init_minimal_logging};
use novade_dmabuf_ion::wayland;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match ConfigLoader::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            init_minimal_logging();
            error!("Configuration loading failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = init_logging(&config.logging) {
        init_minimal_logging();
        error!("Logging initialization failed: {}. Continuing with minimal logging.", e);
    }
    cli.apply(&mut config);

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: &ClientConfig) -> Result<()> {
    info!(
        device = %config.device.display(),
        heap = %config.heap,
        format = %config.format,
        "Starting dma-buf client"
    );
    wayland::run(config).context("dma-buf client failed")?;
    Ok(())
}
