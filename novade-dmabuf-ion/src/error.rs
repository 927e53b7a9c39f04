//! Error handling for the NovaDE dma-buf client.
//!
//! Errors are grouped by the subsystem that raises them, mirroring the way
//! `novade-core` splits `CoreError` into `ConfigError` and `LoggingError`:
//!
//! - [`IonError`]: the kernel allocator (heap query, allocation, handle validation, mapping).
//! - [`ImportError`]: EGL/GLES setup and zero-copy image import.
//! - [`DisplayError`]: the Wayland connection and its negotiated globals.
//! - [`PoolError`]: presentation ring invariants.
//! - [`ConfigError`] and [`LoggingError`]: the ambient configuration and logging layers.
//!
//! [`BufferError`] covers construction of a single pooled buffer, and [`ClientError`]
//! is the top-level type returned by the session entry point.
//!
//! None of these errors is retried anywhere in the crate. A buffer that fails to
//! construct is torn down and the failure is propagated to window creation.

use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

use crate::format::PixelFormat;
use crate::ion::HeapType;

/// Errors raised while talking to the ION allocator device.
#[derive(Debug, Error)]
pub enum IonError {
    /// The allocator device node could not be opened read-write.
    #[error("Failed to open ion device node {path:?}")]
    OpenDevice {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `ION_IOC_HEAP_QUERY` failed.
    #[error("ION_IOC_HEAP_QUERY failed: {0}")]
    HeapQuery(#[source] Errno),

    /// The kernel reported no heap of the requested type.
    #[error("Heap type {0} does not exist")]
    HeapNotFound(HeapType),

    /// The matching heap has an id that cannot be expressed in a 32-bit heap mask.
    #[error("Heap id {0} cannot be encoded in a heap id mask")]
    HeapIdOutOfRange(u32),

    /// `ION_IOC_ALLOC` failed.
    #[error("ION_IOC_ALLOC failed for {len} bytes (heap mask {heap_mask:#x})")]
    Allocation {
        len: u64,
        heap_mask: u32,
        #[source]
        source: Errno,
    },

    /// The allocation call succeeded but returned an unusable dma-buf fd.
    #[error("Allocation returned an invalid dma-buf fd ({0})")]
    InvalidHandle(u32),

    /// The kernel returned fewer bytes than requested.
    #[error("Allocation returned {actual} bytes, {requested} were requested")]
    ShortAllocation { requested: u64, actual: u64 },

    /// Mapping the dma-buf into the address space failed.
    #[error("mmap of dma-buf failed: {0}")]
    Map(#[source] std::io::Error),
}

/// Errors raised by the GPU side: EGL/GLES setup and dma-buf import.
#[derive(Debug, Error)]
pub enum ImportError {
    /// `eglCreateImageKHR` returned `EGL_NO_IMAGE_KHR`.
    #[error("EGLImageKHR creation failed ({width}x{height}, fourcc {fourcc:#010x}, stride {stride})")]
    NoImage {
        width: u32,
        height: u32,
        fourcc: u32,
        stride: u32,
    },

    #[error("Texture creation failed: {0}")]
    TextureCreation(String),

    #[error("Framebuffer creation failed: {0}")]
    FramebufferCreation(String),

    /// `glCheckFramebufferStatus` did not report `GL_FRAMEBUFFER_COMPLETE`.
    #[error("FBO creation failed: framebuffer status {0:#x}")]
    IncompleteFramebuffer(u32),

    /// Any EGL call failed during context setup.
    #[error("EGL error: {0}")]
    Egl(String),

    /// A required EGL or GL extension is not advertised.
    #[error("{0} not supported")]
    MissingExtension(&'static str),

    /// An extension entry point could not be resolved.
    #[error("Failed to resolve entry point {0}")]
    MissingEntryPoint(&'static str),

    /// A draw into an imported framebuffer failed.
    #[error("Render call failed: {0}")]
    Render(String),
}

/// Errors raised by the Wayland side of the client.
#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("Failed to connect to the Wayland display: {0}")]
    Connect(#[from] wayland_client::ConnectError),

    #[error("Wayland dispatch failed: {0}")]
    Dispatch(#[from] wayland_client::DispatchError),

    #[error("Wayland connection error: {0}")]
    Backend(#[from] wayland_client::backend::WaylandError),

    /// A global required before any window is created was not advertised.
    #[error("No {0} global")]
    MissingGlobal(&'static str),

    /// Neither `xdg_wm_base` nor `zwp_fullscreen_shell_v1` is available.
    #[error("No supported shell global (xdg_wm_base or zwp_fullscreen_shell_v1)")]
    MissingShell,

    /// The compositor does not advertise the pixel format on `zwp_linux_dmabuf_v1`.
    #[error("format {0} is not available")]
    UnsupportedFormat(PixelFormat),

    /// A slot was drawn before its `wl_buffer` had been created by the compositor.
    #[error("wl_buffer for slot {0} has not been created")]
    BufferNotReady(usize),

    /// A `zwp_linux_buffer_params_v1.create` request was answered with `failed`.
    #[error("zwp_linux_buffer_params.create failed")]
    BufferCreationFailed,

    /// Polling the connection fd failed.
    #[error("poll on the Wayland connection failed: {0}")]
    Poll(#[source] Errno),
}

/// Violations of the presentation ring contract.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// Every slot is posted. The compositor is holding more buffers than the pool provides.
    #[error("{}", if *first_frame { "Failed to create the first buffer." } else { "All buffers busy at redraw(). Server bug?" })]
    Exhausted { first_frame: bool },

    #[error("Slot {0} is out of range")]
    SlotOutOfRange(usize),

    #[error("Slot {slot} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        slot: usize,
        from: crate::ring::SlotState,
        to: crate::ring::SlotState,
    },
}

/// Errors that abort construction of a single pooled buffer.
#[derive(Debug, Error)]
pub enum BufferError {
    #[error(transparent)]
    Ion(#[from] IonError),

    #[error(transparent)]
    Import(#[from] ImportError),

    /// Width or height is zero, or the byte size does not fit the allocator ABI.
    #[error("Invalid buffer dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

/// Errors raised while producing a frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Display(#[from] DisplayError),
}

/// Error type for configuration-related operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An error occurred while attempting to read a configuration file.
    #[error("Failed to read configuration file from {path:?}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`crate::config::ClientConfig`].
    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Parsed values are out of range.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// A required base directory (XDG config/state home) could not be determined.
    #[error("Could not determine base directory for {dir_type}")]
    DirectoryUnavailable { dir_type: String },
}

/// Error type for logging initialization.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to initialize logging: {0}")]
    InitializationFailure(String),

    #[error("Logging I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Top-level error for a client session.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Configuration Error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging Error: {0}")]
    Logging(#[from] LoggingError),

    #[error("Allocator Error: {0}")]
    Ion(#[from] IonError),

    #[error("GPU Import Error: {0}")]
    Import(#[from] ImportError),

    #[error("Buffer Error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Display Error: {0}")]
    Display(#[from] DisplayError),

    #[error("Pool Error: {0}")]
    Pool(#[from] PoolError),

    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FrameError> for ClientError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Pool(e) => ClientError::Pool(e),
            FrameError::Import(e) => ClientError::Import(e),
            FrameError::Display(e) => ClientError::Display(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_pool_exhausted_messages_distinguish_first_frame() {
        let first = PoolError::Exhausted { first_frame: true };
        let steady = PoolError::Exhausted { first_frame: false };
        assert_eq!(first.to_string(), "Failed to create the first buffer.");
        assert_eq!(steady.to_string(), "All buffers busy at redraw(). Server bug?");
    }

    #[test]
    fn test_allocation_error_keeps_errno_source() {
        let err = IonError::Allocation {
            len: 262_144,
            heap_mask: 0b100,
            source: Errno::ENOMEM,
        };
        assert_eq!(
            err.to_string(),
            "ION_IOC_ALLOC failed for 262144 bytes (heap mask 0x4)"
        );
        let source = err.source().expect("errno source");
        assert_eq!(source.downcast_ref::<Errno>(), Some(&Errno::ENOMEM));
    }

    #[test]
    fn test_buffer_error_is_transparent() {
        let err = BufferError::from(IonError::HeapNotFound(HeapType::Carveout));
        assert_eq!(err.to_string(), "Heap type carveout does not exist");
    }

    #[test]
    fn test_client_error_wraps_config_error() {
        let err = ClientError::from(ConfigError::ValidationError("width must be non-zero".into()));
        assert_eq!(
            err.to_string(),
            "Configuration Error: Configuration validation failed: width must be non-zero"
        );
    }

    #[test]
    fn test_frame_error_maps_to_matching_client_variant() {
        let err = ClientError::from(FrameError::Pool(PoolError::SlotOutOfRange(7)));
        assert!(matches!(err, ClientError::Pool(PoolError::SlotOutOfRange(7))));
    }
}
