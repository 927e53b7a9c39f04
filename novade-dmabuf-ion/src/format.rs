//! Pixel formats and buffer layout (stride and byte length).

use std::fmt;

use serde::Deserialize;

use crate::error::BufferError;

/// Row alignment the GPU requires for 32-bit RGB formats.
pub const GPU_RGB_ALIGN: u32 = 64;

const fn fourcc_code(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24)
}

/// Single-plane 32-bit formats the client can allocate and import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[default]
    Argb8888,
    Xrgb8888,
    Abgr8888,
    Xbgr8888,
}

impl PixelFormat {
    /// DRM fourcc code.
    pub const fn fourcc(self) -> u32 {
        match self {
            PixelFormat::Argb8888 => fourcc_code(b'A', b'R', b'2', b'4'),
            PixelFormat::Xrgb8888 => fourcc_code(b'X', b'R', b'2', b'4'),
            PixelFormat::Abgr8888 => fourcc_code(b'A', b'B', b'2', b'4'),
            PixelFormat::Xbgr8888 => fourcc_code(b'X', b'B', b'2', b'4'),
        }
    }

    pub const fn bytes_per_pixel(self) -> u32 {
        4
    }

    pub const fn stride_alignment(self) -> u32 {
        GPU_RGB_ALIGN
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Argb8888 => "ARGB8888",
            PixelFormat::Xrgb8888 => "XRGB8888",
            PixelFormat::Abgr8888 => "ABGR8888",
            PixelFormat::Xbgr8888 => "XBGR8888",
        };
        f.write_str(name)
    }
}

/// Rounds `value` up to the next multiple of `alignment`.
///
/// Returns `None` on overflow or when `alignment` is zero.
pub fn align_up(value: u32, alignment: u32) -> Option<u32> {
    if alignment == 0 {
        return None;
    }
    let rem = value % alignment;
    if rem == 0 {
        Some(value)
    } else {
        value.checked_add(alignment - rem)
    }
}

/// Geometry of one single-plane buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    pub width: u32,
    pub height: u32,
    /// Bytes between the starts of consecutive rows.
    pub stride: u32,
    /// Bytes to allocate: `stride * height`.
    pub len: u64,
}

impl BufferLayout {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Result<Self, BufferError> {
        let invalid = || BufferError::InvalidDimensions { width, height };
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        let row_bytes = width
            .checked_mul(format.bytes_per_pixel())
            .ok_or_else(invalid)?;
        let stride = align_up(row_bytes, format.stride_alignment()).ok_or_else(invalid)?;
        // Wayland and EGL carry stride and height as signed 32-bit values.
        if i32::try_from(stride).is_err() || i32::try_from(height).is_err() {
            return Err(invalid());
        }
        let len = u64::from(stride) * u64::from(height);
        Ok(Self {
            width,
            height,
            stride,
            len,
        })
    }
}
