//! Per-process session state threaded through the event loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::frame::Ramp;

/// Running flag, interrupt flag and animation state of one client session.
#[derive(Debug)]
pub struct Session {
    running: bool,
    interrupted: Arc<AtomicBool>,
    ramp: Ramp,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Arc::new(AtomicBool::new(false)))
    }
}

impl Session {
    /// `interrupted` is set from signal context; the session only reads it.
    pub fn new(interrupted: Arc<AtomicBool>) -> Self {
        Self {
            running: true,
            interrupted,
            ramp: Ramp::default(),
        }
    }

    /// `false` once stopped or interrupted. Checked once per loop iteration.
    pub fn is_running(&self) -> bool {
        self.running && !self.interrupted.load(Ordering::Relaxed)
    }

    pub fn stop(&mut self, reason: &str) {
        if self.running {
            info!("Stopping session: {}", reason);
        }
        self.running = false;
    }

    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    pub fn ramp_mut(&mut self) -> &mut Ramp {
        &mut self.ramp
    }
}
