//! # NovaDE dma-buf client (`novade-dmabuf-ion`)
//!
//! A Wayland client that allocates its frame buffers from an ION heap, imports
//! them into GLES without copying and presents them through
//! `zwp_linux_dmabuf_v1`.
//!
//! ## Layers
//!
//! - [`ion`]: the kernel allocator. Heap enumeration, heap selection by class
//!   and the allocation ioctl.
//! - [`format`] and [`memory`]: buffer geometry (stride rounded up to the GPU
//!   row alignment) and the owned dma-buf handle with its optional CPU mapping.
//! - [`gpu`]: zero-copy import of a dma-buf as an EGL image, texture and
//!   framebuffer, behind the [`gpu::GpuImporter`] trait.
//! - [`buffer`]: one pooled buffer owning all of the above and releasing it in
//!   reverse creation order.
//! - [`ring`] and [`frame`]: the fixed three-slot presentation pool and the
//!   per-frame draw step.
//! - [`wayland`]: globals, the window and the event loop.
//!
//! [`config`], [`logging`] and [`cli`] carry the ambient setup, and [`error`]
//! defines one error type per layer.

pub mod buffer;
pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod frame;
pub mod gpu;
pub mod ion;
pub mod logging;
pub mod memory;
pub mod ring;
pub mod session;
pub mod signals;
pub mod wayland;

#[cfg(test)]
pub(crate) mod testing;

pub use buffer::{BufferRequest, DmaBuffer, ReleasedResource};
pub use error::{
    BufferError, ClientError, ConfigError, DisplayError, FrameError, ImportError, IonError, LoggingError,
    PoolError,
};
pub use format::{BufferLayout, PixelFormat};
pub use frame::{render_next_frame, FrameTarget, Ramp};
pub use ring::{PresentationRing, SlotState, POOL_SIZE};
pub use session::Session;
