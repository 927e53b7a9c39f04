//! Globals negotiated with the compositor during startup.

use std::collections::HashSet;

use wayland_client::protocol::wl_compositor::WlCompositor;
use wayland_protocols::wp::fullscreen_shell::zv1::client::zwp_fullscreen_shell_v1::ZwpFullscreenShellV1;
use wayland_protocols::wp::linux_dmabuf::zv1::client::zwp_linux_dmabuf_v1::ZwpLinuxDmabufV1;
use wayland_protocols::xdg::shell::client::xdg_wm_base::XdgWmBase;

use crate::error::DisplayError;
use crate::format::PixelFormat;

/// Highest `zwp_linux_dmabuf_v1` version bound. Version 4 replaces the
/// `format`/`modifier` events with feedback objects.
pub const DMABUF_MAX_VERSION: u32 = 3;

pub fn dmabuf_bind_version(advertised: u32) -> u32 {
    advertised.min(DMABUF_MAX_VERSION)
}

/// Fourcc codes the compositor accepts for dma-buf import.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AdvertisedFormats(HashSet<u32>);

impl AdvertisedFormats {
    /// Returns `true` the first time `fourcc` is seen.
    pub fn mark(&mut self, fourcc: u32) -> bool {
        self.0.insert(fourcc)
    }

    pub fn contains(&self, format: PixelFormat) -> bool {
        self.0.contains(&format.fourcc())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The shell a window is mapped with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    Xdg,
    Fullscreen,
}

#[derive(Debug, Default)]
pub struct Globals {
    pub compositor: Option<WlCompositor>,
    pub wm_base: Option<XdgWmBase>,
    pub fullscreen_shell: Option<ZwpFullscreenShellV1>,
    pub dmabuf: Option<ZwpLinuxDmabufV1>,
    pub formats: AdvertisedFormats,
}

impl Globals {
    /// `xdg_wm_base` when present, otherwise the fullscreen shell.
    pub fn shell_kind(&self) -> Result<ShellKind, DisplayError> {
        select_shell(self.wm_base.is_some(), self.fullscreen_shell.is_some())
    }

    pub fn require_format(&self, format: PixelFormat) -> Result<(), DisplayError> {
        if self.formats.contains(format) {
            Ok(())
        } else {
            Err(DisplayError::UnsupportedFormat(format))
        }
    }
}

fn select_shell(has_xdg: bool, has_fullscreen: bool) -> Result<ShellKind, DisplayError> {
    match (has_xdg, has_fullscreen) {
        (true, _) => Ok(ShellKind::Xdg),
        (false, true) => Ok(ShellKind::Fullscreen),
        (false, false) => Err(DisplayError::MissingShell),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dmabuf_version_is_capped() {
        assert_eq!(dmabuf_bind_version(1), 1);
        assert_eq!(dmabuf_bind_version(3), 3);
        assert_eq!(dmabuf_bind_version(5), 3);
    }

    #[test]
    fn test_format_and_modifier_events_mark_once() {
        let mut formats = AdvertisedFormats::default();
        assert!(formats.mark(PixelFormat::Argb8888.fourcc()));
        assert!(!formats.mark(PixelFormat::Argb8888.fourcc()));
        assert_eq!(formats.len(), 1);
        assert!(formats.contains(PixelFormat::Argb8888));
        assert!(!formats.contains(PixelFormat::Xbgr8888));
    }

    #[test]
    fn test_missing_format_is_fatal() {
        let globals = Globals::default();
        assert!(matches!(
            globals.require_format(PixelFormat::Argb8888),
            Err(DisplayError::UnsupportedFormat(PixelFormat::Argb8888))
        ));
        assert_eq!(
            globals.require_format(PixelFormat::Argb8888).unwrap_err().to_string(),
            "format ARGB8888 is not available"
        );
    }

    #[test]
    fn test_shell_preference() {
        assert_eq!(select_shell(true, true).unwrap(), ShellKind::Xdg);
        assert_eq!(select_shell(false, true).unwrap(), ShellKind::Fullscreen);
        assert!(matches!(select_shell(false, false), Err(DisplayError::MissingShell)));
        assert!(matches!(Globals::default().shell_kind(), Err(DisplayError::MissingShell)));
    }
}
