//! The client window: one surface, its shell role and the buffer pool behind it.

use std::rc::Rc;

use tracing::{debug, info, warn};
use wayland_client::protocol::{wl_buffer::WlBuffer, wl_callback::WlCallback, wl_surface::WlSurface};
use wayland_client::QueueHandle;
use wayland_protocols::wp::fullscreen_shell::zv1::client::zwp_fullscreen_shell_v1;
use wayland_protocols::wp::linux_dmabuf::zv1::client::zwp_linux_buffer_params_v1;
use wayland_protocols::xdg::shell::client::{xdg_surface::XdgSurface, xdg_toplevel::XdgToplevel};

use super::app::App;
use super::globals::{Globals, ShellKind};
use crate::buffer::{BufferRequest, DmaBuffer};
use crate::error::{ClientError, DisplayError, FrameError, ImportError};
use crate::frame::{render_next_frame, FrameTarget};
use crate::gpu::GpuImporter;
use crate::ion::HeapDevice;
use crate::ring::PresentationRing;
use crate::session::Session;

/// A pooled dma-buf and the `wl_buffer` the compositor created for it.
pub struct SlotBuffer<G: GpuImporter> {
    wl_buffer: Option<WlBuffer>,
    dma: DmaBuffer<G>,
}

impl<G: GpuImporter> SlotBuffer<G> {
    fn new(dma: DmaBuffer<G>) -> Self {
        Self { wl_buffer: None, dma }
    }

    pub fn dma(&self) -> &DmaBuffer<G> {
        &self.dma
    }

    pub fn wl_buffer(&self) -> Option<&WlBuffer> {
        self.wl_buffer.as_ref()
    }
}

impl<G: GpuImporter> FrameTarget for SlotBuffer<G> {
    fn fill(&mut self, rgba: [f32; 4]) -> Result<(), ImportError> {
        self.dma.fill(rgba)
    }
}

impl<G: GpuImporter> Drop for SlotBuffer<G> {
    fn drop(&mut self) {
        // The protocol object goes first; `dma` is released after this body.
        if let Some(buffer) = self.wl_buffer.take() {
            buffer.destroy();
        }
    }
}

/// Access to the compositor-side buffer object of a pool slot.
trait ProtocolSlot {
    type Handle: Clone + PartialEq;

    fn handle(&self) -> Option<&Self::Handle>;
}

impl<G: GpuImporter> ProtocolSlot for SlotBuffer<G> {
    type Handle = WlBuffer;

    fn handle(&self) -> Option<&WlBuffer> {
        self.wl_buffer.as_ref()
    }
}

/// Frees the slot holding `handle`. Returns the slot, or `None` when no slot holds it.
fn release_by_handle<S: ProtocolSlot, const N: usize>(
    ring: &mut PresentationRing<S, N>,
    handle: &S::Handle,
) -> Option<usize> {
    let slot = ring.iter().position(|candidate| candidate.handle() == Some(handle))?;
    ring.release(slot);
    Some(slot)
}

/// The protocol buffer of a freshly posted slot.
///
/// A slot without one goes back to the pool so the next frame can retry.
fn posted_handle<S: ProtocolSlot, const N: usize>(
    ring: &mut PresentationRing<S, N>,
    slot: usize,
) -> Result<S::Handle, DisplayError> {
    match ring.buffer(slot).and_then(|b| b.handle().cloned()) {
        Some(handle) => Ok(handle),
        None => {
            ring.release(slot);
            Err(DisplayError::BufferNotReady(slot))
        }
    }
}

/// Tracks when the first frame may be drawn.
///
/// An xdg toplevel must see its first configure, and the pool must have
/// received its `wl_buffer`s, before anything is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigureState {
    initialized: bool,
    wait_for_configure: bool,
}

impl ConfigureState {
    pub fn new(wait_for_configure: bool) -> Self {
        Self {
            initialized: false,
            wait_for_configure,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_waiting_for_configure(&self) -> bool {
        self.wait_for_configure
    }

    pub fn set_initialized(&mut self) {
        self.initialized = true;
    }

    /// Records a configure. `true` only for the first one after initialization.
    pub fn configured(&mut self) -> bool {
        let first = self.wait_for_configure;
        self.wait_for_configure = false;
        first && self.initialized
    }
}

enum ShellRole {
    Xdg { xdg_surface: XdgSurface, toplevel: XdgToplevel },
    Fullscreen,
}

impl Drop for ShellRole {
    fn drop(&mut self) {
        if let ShellRole::Xdg { xdg_surface, toplevel } = self {
            toplevel.destroy();
            xdg_surface.destroy();
        }
    }
}

struct Surface(WlSurface);

impl Drop for Surface {
    fn drop(&mut self) {
        self.0.destroy();
    }
}

/// Fields drop in declaration order, which is also the teardown order:
/// buffers, then shell role, then surface.
pub struct Window<G: GpuImporter> {
    ring: PresentationRing<SlotBuffer<G>>,
    callback: Option<WlCallback>,
    role: ShellRole,
    surface: Surface,
    width: u32,
    height: u32,
    configure: ConfigureState,
}

impl<G: GpuImporter> Window<G> {
    /// Creates the surface and its role, allocates the whole pool and asks the
    /// compositor for one `wl_buffer` per slot.
    ///
    /// Buffer creation replies arrive asynchronously; the caller roundtrips
    /// before the first redraw.
    pub fn create<D: HeapDevice + ?Sized>(
        globals: &Globals,
        qh: &QueueHandle<App>,
        device: &D,
        gpu: Rc<G>,
        request: &BufferRequest,
        title: &str,
    ) -> Result<Self, ClientError> {
        let compositor = globals
            .compositor
            .as_ref()
            .ok_or(DisplayError::MissingGlobal("wl_compositor"))?;
        let dmabuf = globals
            .dmabuf
            .as_ref()
            .ok_or(DisplayError::MissingGlobal("zwp_linux_dmabuf"))?;
        let shell = globals.shell_kind()?;

        let surface = Surface(compositor.create_surface(qh, ()));
        let (role, wait_for_configure) = match (shell, &globals.wm_base, &globals.fullscreen_shell) {
            (ShellKind::Xdg, Some(wm_base), _) => {
                let xdg_surface = wm_base.get_xdg_surface(&surface.0, qh, ());
                let toplevel = xdg_surface.get_toplevel(qh, ());
                toplevel.set_title(title.to_string());
                (ShellRole::Xdg { xdg_surface, toplevel }, true)
            }
            (ShellKind::Fullscreen, _, Some(fullscreen_shell)) => {
                fullscreen_shell.present_surface(
                    Some(&surface.0),
                    zwp_fullscreen_shell_v1::PresentMethod::Default,
                    None,
                );
                (ShellRole::Fullscreen, false)
            }
            _ => return Err(DisplayError::MissingShell.into()),
        };

        let ring = PresentationRing::try_new(|_| {
            DmaBuffer::create(device, Rc::clone(&gpu), request).map(SlotBuffer::new)
        })?;

        for (slot, buffer) in ring.iter().enumerate() {
            let dma = buffer.dma();
            let Some(fd) = dma.fd() else {
                continue;
            };
            let params = dmabuf.create_params(qh, slot);
            params.add(fd, 0, 0, dma.stride(), 0, 0);
            params.create(
                dma.width() as i32,
                dma.height() as i32,
                dma.format().fourcc(),
                zwp_linux_buffer_params_v1::Flags::empty(),
            );
        }

        if matches!(role, ShellRole::Xdg { .. }) {
            surface.0.commit();
        }

        info!(
            width = request.width,
            height = request.height,
            pool = ring.len(),
            "Window created"
        );
        Ok(Self {
            ring,
            callback: None,
            role,
            surface,
            width: request.width,
            height: request.height,
            configure: ConfigureState::new(wait_for_configure),
        })
    }

    pub fn shell(&self) -> ShellKind {
        match self.role {
            ShellRole::Xdg { .. } => ShellKind::Xdg,
            ShellRole::Fullscreen => ShellKind::Fullscreen,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.configure.is_initialized()
    }

    pub fn set_initialized(&mut self) {
        self.configure.set_initialized();
    }

    pub fn is_waiting_for_configure(&self) -> bool {
        self.configure.is_waiting_for_configure()
    }

    /// Records a configure. Returns `true` if it should trigger the first frame.
    pub fn configured(&mut self) -> bool {
        self.configure.configured()
    }

    pub fn ring(&self) -> &PresentationRing<SlotBuffer<G>> {
        &self.ring
    }

    /// Stores the `wl_buffer` the compositor created for `slot`.
    pub fn buffer_created(&mut self, slot: usize, buffer: WlBuffer) {
        match self.ring.buffer_mut(slot) {
            Some(target) => {
                debug!(slot, "wl_buffer created");
                target.wl_buffer = Some(buffer);
            }
            None => {
                warn!(slot, "wl_buffer created for unknown slot");
                buffer.destroy();
            }
        }
    }

    /// Handles `wl_buffer.release`.
    pub fn buffer_released(&mut self, buffer: &WlBuffer) {
        if release_by_handle(&mut self.ring, buffer).is_none() {
            warn!("Release for a wl_buffer that is not in the pool");
        }
    }

    /// Draws the next frame, attaches it and requests the next frame callback.
    pub fn redraw(
        &mut self,
        session: &mut Session,
        qh: &QueueHandle<App>,
        first_frame: bool,
    ) -> Result<(), FrameError> {
        let slot = render_next_frame(&mut self.ring, session.ramp_mut(), first_frame)?;

        let wl_buffer = posted_handle(&mut self.ring, slot)?;

        let surface = &self.surface.0;
        surface.attach(Some(&wl_buffer), 0, 0);
        surface.damage(0, 0, self.width as i32, self.height as i32);
        // wl_callback has no destructor request; dropping the old proxy is enough.
        self.callback = Some(surface.frame(qh, ()));
        surface.commit();
        Ok(())
    }
}
