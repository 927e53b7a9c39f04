//! SIGINT handling for the single-threaded event loop.
//!
//! The first SIGINT sets the interrupt flag and writes a byte to a self-pipe so a
//! blocked `poll` wakes up. A second SIGINT while the flag is still set gets the
//! default disposition and terminates the process.

use std::io::{self, Read};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use signal_hook::consts::SIGINT;
use signal_hook::{flag, low_level, SigId};
use tracing::{debug, warn};

pub struct InterruptWatch {
    wake: UnixStream,
    ids: Vec<SigId>,
}

impl InterruptWatch {
    /// Installs the handlers. `interrupted` is set on delivery.
    pub fn install(interrupted: Arc<AtomicBool>) -> io::Result<Self> {
        let (wake, notify) = UnixStream::pair()?;
        wake.set_nonblocking(true)?;

        // Registration order matters: the conditional default must see the
        // flag before the first delivery sets it.
        let ids = vec![
            flag::register_conditional_default(SIGINT, Arc::clone(&interrupted))?,
            flag::register(SIGINT, interrupted)?,
            low_level::pipe::register(SIGINT, notify)?,
        ];
        debug!("SIGINT handlers installed");
        Ok(Self { wake, ids })
    }

    /// Empties the wake-up pipe after `poll` reported it readable.
    pub fn drain(&self) {
        let mut buf = [0u8; 16];
        loop {
            match (&self.wake).read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Failed to drain signal pipe: {}", e);
                    break;
                }
            }
        }
    }
}

impl AsFd for InterruptWatch {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.wake.as_fd()
    }
}

impl Drop for InterruptWatch {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            low_level::unregister(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_drain_on_empty_pipe_returns() {
        let (wake, _notify) = UnixStream::pair().unwrap();
        wake.set_nonblocking(true).unwrap();
        let watch = InterruptWatch { wake, ids: Vec::new() };
        watch.drain();
    }

    #[test]
    fn test_drain_consumes_pending_bytes() {
        use std::io::Write;

        let (wake, mut notify) = UnixStream::pair().unwrap();
        wake.set_nonblocking(true).unwrap();
        notify.write_all(&[1; 40]).unwrap();
        let watch = InterruptWatch { wake, ids: Vec::new() };
        watch.drain();

        let mut byte = [0u8; 1];
        let err = (&watch.wake).read(&mut byte).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_install_leaves_flag_clear() {
        let flag = Arc::new(AtomicBool::new(false));
        let watch = InterruptWatch::install(Arc::clone(&flag)).unwrap();
        assert!(!flag.load(Ordering::Relaxed));
        drop(watch);
    }
}
