//! Event handling and the client main loop.

use std::ffi::c_void;
use std::io::ErrorKind;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use tracing::{debug, error, info, warn};
use wayland_client::backend::WaylandError;
use wayland_client::protocol::{
    wl_buffer, wl_callback, wl_compositor, wl_registry, wl_surface,
};
use wayland_client::{delegate_noop, event_created_child, Connection, Dispatch, EventQueue, QueueHandle};
use wayland_protocols::wp::fullscreen_shell::zv1::client::zwp_fullscreen_shell_v1;
use wayland_protocols::wp::linux_dmabuf::zv1::client::{zwp_linux_buffer_params_v1, zwp_linux_dmabuf_v1};
use wayland_protocols::xdg::shell::client::{xdg_surface, xdg_toplevel, xdg_wm_base};

use super::globals::{dmabuf_bind_version, Globals};
use super::window::Window;
use crate::config::ClientConfig;
use crate::error::{ClientError, DisplayError, FrameError, PoolError};
use crate::format::PixelFormat;
use crate::gpu::EglImporter;
use crate::ion::IonDevice;
use crate::session::Session;
use crate::signals::InterruptWatch;

/// State shared by every event handler.
pub struct App {
    pub session: Session,
    pub globals: Globals,
    pub window: Option<Window<EglImporter>>,
    format: PixelFormat,
}

impl App {
    pub fn new(session: Session, format: PixelFormat) -> Self {
        Self {
            session,
            globals: Globals::default(),
            window: None,
            format,
        }
    }

    /// `zwp_linux_buffer_params.failed`: the compositor refused one of the pool's dma-bufs.
    pub fn buffer_creation_failed(&mut self) {
        error!("Error: zwp_linux_buffer_params.create failed.");
        self.session.stop("buffer creation failed");
    }

    /// Called after the roundtrip that collects the buffer creation replies.
    pub fn ensure_buffers_created(&self) -> Result<(), DisplayError> {
        if self.session.is_running() {
            Ok(())
        } else {
            Err(DisplayError::BufferCreationFailed)
        }
    }

    /// Destroys the window and sends the queued destructor requests.
    fn shut_down(&mut self, conn: &Connection) {
        drop(self.window.take());
        if let Err(err) = conn.flush() {
            warn!("Failed to flush the Wayland connection at exit: {}", err);
        }
    }

    /// Draws and posts one frame. `first_frame` is false when driven by a frame callback.
    fn redraw(&mut self, qh: &QueueHandle<App>, first_frame: bool) {
        let Some(window) = self.window.as_mut() else {
            return;
        };
        match window.redraw(&mut self.session, qh, first_frame) {
            Ok(()) => {}
            // The compositor kept every buffer: it is not honoring the release
            // contract and there is nothing to draw into.
            Err(FrameError::Pool(PoolError::Exhausted { .. })) => std::process::abort(),
            Err(err) => {
                error!("Redraw failed: {}", err);
                self.session.stop("redraw failed");
            }
        }
    }
}

impl Dispatch<wl_registry::WlRegistry, ()> for App {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        let wl_registry::Event::Global {
            name,
            interface,
            version,
        } = event
        else {
            return;
        };

        match interface.as_str() {
            "wl_compositor" => {
                state.globals.compositor =
                    Some(registry.bind::<wl_compositor::WlCompositor, _, _>(name, 1, qh, ()));
            }
            "xdg_wm_base" => {
                state.globals.wm_base = Some(registry.bind::<xdg_wm_base::XdgWmBase, _, _>(name, 1, qh, ()));
            }
            "zwp_fullscreen_shell_v1" => {
                state.globals.fullscreen_shell = Some(
                    registry.bind::<zwp_fullscreen_shell_v1::ZwpFullscreenShellV1, _, _>(name, 1, qh, ()),
                );
            }
            "zwp_linux_dmabuf_v1" => {
                let bound = dmabuf_bind_version(version);
                state.globals.dmabuf = Some(
                    registry.bind::<zwp_linux_dmabuf_v1::ZwpLinuxDmabufV1, _, _>(name, bound, qh, ()),
                );
                debug!("Bound zwp_linux_dmabuf_v1 version {} (advertised {})", bound, version);
            }
            _ => {}
        }
    }
}

impl Dispatch<zwp_linux_dmabuf_v1::ZwpLinuxDmabufV1, ()> for App {
    fn event(
        state: &mut Self,
        _: &zwp_linux_dmabuf_v1::ZwpLinuxDmabufV1,
        event: zwp_linux_dmabuf_v1::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        let fourcc = match event {
            zwp_linux_dmabuf_v1::Event::Format { format } => format,
            zwp_linux_dmabuf_v1::Event::Modifier { format, .. } => format,
            _ => return,
        };
        if state.globals.formats.mark(fourcc) && fourcc == state.format.fourcc() {
            debug!("Compositor advertises {}", state.format);
        }
    }
}

impl Dispatch<zwp_linux_buffer_params_v1::ZwpLinuxBufferParamsV1, usize> for App {
    fn event(
        state: &mut Self,
        params: &zwp_linux_buffer_params_v1::ZwpLinuxBufferParamsV1,
        event: zwp_linux_buffer_params_v1::Event,
        slot: &usize,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            zwp_linux_buffer_params_v1::Event::Created { buffer } => {
                match state.window.as_mut() {
                    Some(window) => window.buffer_created(*slot, buffer),
                    None => buffer.destroy(),
                }
                params.destroy();
            }
            zwp_linux_buffer_params_v1::Event::Failed => {
                state.buffer_creation_failed();
                params.destroy();
            }
            _ => {}
        }
    }

    event_created_child!(App, zwp_linux_buffer_params_v1::ZwpLinuxBufferParamsV1, [
        zwp_linux_buffer_params_v1::EVT_CREATED_OPCODE => (wl_buffer::WlBuffer, ())
    ]);
}

impl Dispatch<wl_buffer::WlBuffer, ()> for App {
    fn event(
        state: &mut Self,
        buffer: &wl_buffer::WlBuffer,
        event: wl_buffer::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            if let Some(window) = state.window.as_mut() {
                window.buffer_released(buffer);
            }
        }
    }
}

impl Dispatch<wl_callback::WlCallback, ()> for App {
    fn event(
        state: &mut Self,
        _: &wl_callback::WlCallback,
        event: wl_callback::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        if let wl_callback::Event::Done { .. } = event {
            state.redraw(qh, false);
        }
    }
}

impl Dispatch<xdg_wm_base::XdgWmBase, ()> for App {
    fn event(
        _: &mut Self,
        wm_base: &xdg_wm_base::XdgWmBase,
        event: xdg_wm_base::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            wm_base.pong(serial);
        }
    }
}

impl Dispatch<xdg_surface::XdgSurface, ()> for App {
    fn event(
        state: &mut Self,
        xdg_surface: &xdg_surface::XdgSurface,
        event: xdg_surface::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        if let xdg_surface::Event::Configure { serial } = event {
            xdg_surface.ack_configure(serial);
            let first_frame = state
                .window
                .as_mut()
                .map_or(false, |window| window.configured());
            if first_frame {
                state.redraw(qh, true);
            }
        }
    }
}

impl Dispatch<xdg_toplevel::XdgToplevel, ()> for App {
    fn event(
        state: &mut Self,
        _: &xdg_toplevel::XdgToplevel,
        event: xdg_toplevel::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_toplevel::Event::Close = event {
            state.session.stop("close requested by compositor");
        }
    }
}

delegate_noop!(App: wl_compositor::WlCompositor);
delegate_noop!(App: ignore wl_surface::WlSurface);
delegate_noop!(App: ignore zwp_fullscreen_shell_v1::ZwpFullscreenShellV1);

/// Blocks until the connection or the signal pipe is readable, then dispatches.
fn dispatch_once(
    conn: &Connection,
    queue: &mut EventQueue<App>,
    app: &mut App,
    signals: &InterruptWatch,
) -> Result<(), DisplayError> {
    queue.dispatch_pending(app)?;
    if !app.session.is_running() {
        return Ok(());
    }
    conn.flush()?;

    let Some(guard) = queue.prepare_read() else {
        // Events were queued in the meantime; dispatch them on the next pass.
        return Ok(());
    };

    let (connection_ready, signal_ready) = {
        let connection_fd = guard.connection_fd();
        let mut fds = [
            PollFd::new(&connection_fd, PollFlags::POLLIN),
            PollFd::new(signals, PollFlags::POLLIN),
        ];
        match poll(&mut fds, -1) {
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok(()),
            Err(errno) => return Err(DisplayError::Poll(errno)),
        }
        let ready = |fd: &PollFd<'_>| fd.revents().map_or(false, |r| !r.is_empty());
        (ready(&fds[0]), ready(&fds[1]))
    };

    if signal_ready {
        signals.drain();
    }
    if connection_ready {
        match guard.read() {
            Ok(_) => {}
            Err(WaylandError::Io(err)) if err.kind() == ErrorKind::WouldBlock => {}
            Err(err) => return Err(err.into()),
        }
        queue.dispatch_pending(app)?;
    }
    Ok(())
}

/// Runs a client session until interrupted or closed.
///
/// Errors are startup failures; the caller exits non-zero on them.
pub fn run(config: &ClientConfig) -> Result<(), ClientError> {
    let conn = Connection::connect_to_env().map_err(DisplayError::from)?;
    let mut queue = conn.new_event_queue::<App>();
    let qh = queue.handle();
    let _registry = conn.display().get_registry(&qh, ());

    let interrupted = Arc::new(AtomicBool::new(false));
    let mut app = App::new(Session::new(Arc::clone(&interrupted)), config.format);

    queue.roundtrip(&mut app).map_err(DisplayError::from)?;
    if app.globals.dmabuf.is_none() {
        error!("No zwp_linux_dmabuf global");
        return Err(DisplayError::MissingGlobal("zwp_linux_dmabuf").into());
    }

    queue.roundtrip(&mut app).map_err(DisplayError::from)?;
    if let Err(err) = app.globals.require_format(config.format) {
        error!("{}", err);
        return Err(err.into());
    }

    let display_ptr = conn.backend().display_ptr() as *mut c_void;
    let gpu = Rc::new(EglImporter::new(display_ptr)?);
    let device = IonDevice::open(&config.device)?;

    let window = Window::create(
        &app.globals,
        &qh,
        &device,
        gpu,
        &config.buffer_request(),
        &config.title,
    )?;
    info!(shell = ?window.shell(), "Mapped window");
    app.window = Some(window);

    let signals = InterruptWatch::install(interrupted)?;

    // Collects the zwp_linux_buffer_params replies.
    queue.roundtrip(&mut app).map_err(DisplayError::from)?;
    if let Err(err) = app.ensure_buffers_created() {
        app.shut_down(&conn);
        return Err(err.into());
    }

    let wait_for_configure = match app.window.as_mut() {
        Some(window) => {
            window.set_initialized();
            window.is_waiting_for_configure()
        }
        None => false,
    };
    if !wait_for_configure {
        app.redraw(&qh, true);
    }

    while app.session.is_running() {
        if let Err(err) = dispatch_once(&conn, &mut queue, &mut app, &signals) {
            warn!("Wayland connection lost: {}", err);
            break;
        }
    }

    app.shut_down(&conn);
    info!("simple-dmabuf-ion exiting");
    Ok(())
}
