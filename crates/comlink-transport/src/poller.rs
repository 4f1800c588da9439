use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use crate::error::{Result, TransportError};

/// Readiness interest for one [`Poller::wait`] call.
///
/// The io stage re-registers interest every iteration: read interest while
/// the inbound flow is open, write interest while an outbound frame is in
/// flight.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interest {
    pub read: Option<RawFd>,
    pub write: Option<RawFd>,
}

/// What a [`Poller::wait`] call observed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Readiness {
    /// The read endpoint has data (or EOF/error) to observe.
    pub readable: bool,
    /// The write endpoint can accept bytes (or has failed).
    pub writable: bool,
    /// Another thread called [`WakeHandle::wake`].
    pub woken: bool,
}

/// Readiness multiplexer for one endpoint pair.
///
/// Wraps `poll(2)` over the read endpoint, the write endpoint, and an
/// internal self-pipe. The self-pipe lets other stages interrupt a parked
/// wait — the encoder wakes the poller after queueing a frame, since the io
/// stage may be waiting with no write interest registered yet.
pub struct Poller {
    wake_rx: OwnedFd,
    wake_tx: Arc<OwnedFd>,
}

/// Cloneable handle that interrupts a parked [`Poller::wait`].
#[derive(Clone)]
pub struct WakeHandle {
    fd: Arc<OwnedFd>,
}

impl Poller {
    /// Create a poller with its wake pipe.
    pub fn new() -> Result<Self> {
        let mut fds = [0i32; 2];
        // SAFETY: `fds` is a valid writable array of two ints for pipe(2).
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if rc != 0 {
            return Err(TransportError::Poll(std::io::Error::last_os_error()));
        }
        // SAFETY: pipe(2) just returned ownership of both descriptors.
        let (wake_rx, wake_tx) =
            unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

        for fd in [wake_rx.as_raw_fd(), wake_tx.as_raw_fd()] {
            set_wake_fd_flags(fd)?;
        }

        Ok(Self {
            wake_rx,
            wake_tx: Arc::new(wake_tx),
        })
    }

    /// Handle for waking this poller from another thread.
    pub fn wake_handle(&self) -> WakeHandle {
        WakeHandle {
            fd: Arc::clone(&self.wake_tx),
        }
    }

    /// Wait until an interest is ready, a wake arrives, or the timeout
    /// elapses. A timeout yields an all-false [`Readiness`].
    pub fn wait(&self, interest: Interest, timeout: Duration) -> Result<Readiness> {
        let mut fds: Vec<libc::pollfd> = Vec::with_capacity(3);
        fds.push(libc::pollfd {
            fd: self.wake_rx.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        });
        let read_idx = interest.read.map(|fd| {
            fds.push(libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            });
            fds.len() - 1
        });
        let write_idx = interest.write.map(|fd| {
            fds.push(libc::pollfd {
                fd,
                events: libc::POLLOUT,
                revents: 0,
            });
            fds.len() - 1
        });

        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
        // SAFETY: `fds` is a valid pollfd array of the stated length for the
        // duration of the call.
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(Readiness::default());
            }
            return Err(TransportError::Poll(err));
        }
        if rc == 0 {
            return Ok(Readiness::default());
        }

        let mut readiness = Readiness::default();
        // HUP/ERR count as ready so the stage performs the I/O and observes
        // the EOF or error itself.
        const READY_MASK: libc::c_short = libc::POLLHUP | libc::POLLERR | libc::POLLNVAL;

        if fds[0].revents & (libc::POLLIN | READY_MASK) != 0 {
            readiness.woken = true;
            self.drain_wake_pipe();
        }
        if let Some(idx) = read_idx {
            readiness.readable = fds[idx].revents & (libc::POLLIN | READY_MASK) != 0;
        }
        if let Some(idx) = write_idx {
            readiness.writable = fds[idx].revents & (libc::POLLOUT | READY_MASK) != 0;
        }
        Ok(readiness)
    }

    fn drain_wake_pipe(&self) {
        let mut sink = [0u8; 64];
        loop {
            // SAFETY: `sink` is a valid writable buffer of the stated length
            // and the wake fd is owned by `self`.
            let n = unsafe {
                libc::read(
                    self.wake_rx.as_raw_fd(),
                    sink.as_mut_ptr().cast::<libc::c_void>(),
                    sink.len(),
                )
            };
            if n <= 0 {
                break;
            }
        }
    }
}

impl WakeHandle {
    /// Interrupt the poller's current (or next) wait.
    pub fn wake(&self) {
        let byte = [1u8];
        // SAFETY: one-byte write from a valid buffer into an owned fd.
        let rc = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                byte.as_ptr().cast::<libc::c_void>(),
                1,
            )
        };
        // A full pipe means a wake is already pending, which is enough.
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::WouldBlock {
                trace!(%err, "wake write failed");
            }
        }
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("wake_rx", &self.wake_rx.as_raw_fd())
            .field("wake_tx", &self.wake_tx.as_raw_fd())
            .finish()
    }
}

fn set_wake_fd_flags(fd: RawFd) -> Result<()> {
    // SAFETY: `fd` is an open descriptor owned by the poller; the fcntl
    // calls only manipulate its flags.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(TransportError::Poll(std::io::Error::last_os_error()));
        }
        if libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) < 0 {
            return Err(TransportError::Poll(std::io::Error::last_os_error()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::fd::AsRawFd;
    use std::time::Instant;

    use crate::endpoint::Endpoint;

    #[test]
    fn wait_times_out() {
        let poller = Poller::new().unwrap();
        let start = Instant::now();
        let readiness = poller
            .wait(Interest::default(), Duration::from_millis(20))
            .unwrap();
        assert!(!readiness.readable && !readiness.writable && !readiness.woken);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn wake_interrupts_wait() {
        let poller = Poller::new().unwrap();
        let handle = poller.wake_handle();

        let waker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            handle.wake();
        });

        let readiness = poller
            .wait(Interest::default(), Duration::from_secs(5))
            .unwrap();
        assert!(readiness.woken);
        waker.join().unwrap();
    }

    #[test]
    fn wake_is_drained() {
        let poller = Poller::new().unwrap();
        poller.wake_handle().wake();

        let first = poller
            .wait(Interest::default(), Duration::from_millis(50))
            .unwrap();
        assert!(first.woken);

        let second = poller
            .wait(Interest::default(), Duration::from_millis(20))
            .unwrap();
        assert!(!second.woken);
    }

    #[test]
    fn read_interest_reports_pending_data() {
        let (mut left, right) = Endpoint::pair().unwrap();
        let poller = Poller::new().unwrap();

        left.write_all(b"data").unwrap();

        let readiness = poller
            .wait(
                Interest {
                    read: Some(right.as_raw_fd()),
                    write: None,
                },
                Duration::from_secs(1),
            )
            .unwrap();
        assert!(readiness.readable);
    }

    #[test]
    fn write_interest_reports_room() {
        let (left, _right) = Endpoint::pair().unwrap();
        let poller = Poller::new().unwrap();

        let readiness = poller
            .wait(
                Interest {
                    read: None,
                    write: Some(left.as_raw_fd()),
                },
                Duration::from_secs(1),
            )
            .unwrap();
        assert!(readiness.writable);
    }

    #[test]
    fn hup_counts_as_readable() {
        let (left, right) = Endpoint::pair().unwrap();
        drop(left);

        let poller = Poller::new().unwrap();
        let readiness = poller
            .wait(
                Interest {
                    read: Some(right.as_raw_fd()),
                    write: None,
                },
                Duration::from_secs(1),
            )
            .unwrap();
        assert!(readiness.readable);
    }
}
