//! Wayland side of the client: globals, the window and the event loop.

pub mod app;
pub mod globals;
pub mod window;

pub use app::{run, App};
pub use globals::{AdvertisedFormats, Globals, ShellKind};
pub use window::{ConfigureState, SlotBuffer, Window};
