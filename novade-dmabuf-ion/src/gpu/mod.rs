//! Zero-copy GPU import of dma-bufs.
//!
//! [`GpuImporter`] is the seam between pooled buffers and the GPU API. Each
//! import step is a separate call so a buffer can record exactly which objects
//! were created before a failure and release only those.

pub mod egl;

use std::fmt;
use std::os::fd::BorrowedFd;

use crate::error::ImportError;

pub use egl::EglImporter;

/// Plane 0 of a single-plane dma-buf, as handed to the image import.
#[derive(Debug, Clone, Copy)]
pub struct DmabufPlane<'a> {
    pub fd: BorrowedFd<'a>,
    pub width: u32,
    pub height: u32,
    pub fourcc: u32,
    pub offset: u32,
    pub stride: u32,
}

/// GPU operations a pooled buffer needs.
///
/// Handles are plain `Copy` values; the owning [`crate::buffer::DmaBuffer`]
/// decides when each one is destroyed.
pub trait GpuImporter {
    type Image: Copy + fmt::Debug;
    type Texture: Copy + fmt::Debug;
    type Framebuffer: Copy + fmt::Debug;

    /// Wraps the external memory in an image without copying it.
    fn create_image(&self, plane: &DmabufPlane<'_>) -> Result<Self::Image, ImportError>;

    /// Creates a 2D texture whose storage is `image`.
    fn create_texture(&self, image: Self::Image) -> Result<Self::Texture, ImportError>;

    /// Creates a framebuffer with `texture` as its colour attachment.
    fn create_framebuffer(&self, texture: Self::Texture) -> Result<Self::Framebuffer, ImportError>;

    /// Fails with [`ImportError::IncompleteFramebuffer`] unless `framebuffer` is complete.
    fn check_framebuffer(&self, framebuffer: Self::Framebuffer) -> Result<(), ImportError>;

    /// Clears `framebuffer` to `rgba` and waits for the GPU to finish.
    fn fill(&self, framebuffer: Self::Framebuffer, rgba: [f32; 4]) -> Result<(), ImportError>;

    fn destroy_framebuffer(&self, framebuffer: Self::Framebuffer);
    fn destroy_texture(&self, texture: Self::Texture);
    fn destroy_image(&self, image: Self::Image);
}
