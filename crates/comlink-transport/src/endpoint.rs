use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::path::PathBuf;

use crate::error::{Result, TransportError};

/// One readable/writable byte-stream endpoint — implements Read + Write.
///
/// This is the fundamental I/O type the channel engine is built on. A
/// bidirectional connection is represented as two `Endpoint`s (usually
/// clones of one socket, or the two ends of a pipe pair such as a child
/// process's stdin/stdout).
pub struct Endpoint {
    inner: EndpointInner,
}

enum EndpointInner {
    Unix(std::os::unix::net::UnixStream),
    Tcp(TcpStream),
    /// A plain file descriptor: pipe end, stdio handle.
    Fd(std::fs::File),
}

impl Read for Endpoint {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            EndpointInner::Unix(stream) => stream.read(buf),
            EndpointInner::Tcp(stream) => stream.read(buf),
            EndpointInner::Fd(file) => file.read(buf),
        }
    }
}

impl Write for Endpoint {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            EndpointInner::Unix(stream) => stream.write(buf),
            EndpointInner::Tcp(stream) => stream.write(buf),
            EndpointInner::Fd(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            EndpointInner::Unix(stream) => stream.flush(),
            EndpointInner::Tcp(stream) => stream.flush(),
            EndpointInner::Fd(file) => file.flush(),
        }
    }
}

impl Endpoint {
    /// Wrap a connected Unix domain socket stream.
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: EndpointInner::Unix(stream),
        }
    }

    /// Wrap a connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: EndpointInner::Tcp(stream),
        }
    }

    /// Wrap an owned file descriptor (pipe end, stdio handle).
    pub fn from_fd(fd: OwnedFd) -> Self {
        Self {
            inner: EndpointInner::Fd(fd.into()),
        }
    }

    /// Connect to a TCP peer.
    pub fn connect_tcp(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Self> {
        let path = PathBuf::from(format!("{addr:?}"));
        let stream = TcpStream::connect(addr)
            .map_err(|source| TransportError::Connect { path, source })?;
        Ok(Self::from_tcp(stream))
    }

    /// Create a connected in-process endpoint pair (socketpair).
    ///
    /// Each returned endpoint is one full-duplex side; clone a side with
    /// [`Endpoint::try_clone`] to obtain its read and write halves.
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((Self::from_unix(left), Self::from_unix(right)))
    }

    /// Switch the endpoint in or out of non-blocking mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        match &self.inner {
            EndpointInner::Unix(stream) => stream.set_nonblocking(nonblocking)?,
            EndpointInner::Tcp(stream) => stream.set_nonblocking(nonblocking)?,
            EndpointInner::Fd(file) => set_nonblocking_fd(file.as_raw_fd(), nonblocking)?,
        }
        Ok(())
    }

    /// Shut down one or both directions of a socket endpoint.
    ///
    /// Pipe/fd endpoints have no half-close; their direction ends when the
    /// descriptor is dropped, so this is a no-op for them.
    pub fn shutdown(&self, how: Shutdown) -> Result<()> {
        let outcome = match &self.inner {
            EndpointInner::Unix(stream) => stream.shutdown(how),
            EndpointInner::Tcp(stream) => stream.shutdown(how),
            EndpointInner::Fd(_) => Ok(()),
        };
        match outcome {
            Ok(()) => Ok(()),
            // Already disconnected: the flow is as shut down as it gets.
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Try to clone this endpoint (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            EndpointInner::Unix(stream) => EndpointInner::Unix(stream.try_clone()?),
            EndpointInner::Tcp(stream) => EndpointInner::Tcp(stream.try_clone()?),
            EndpointInner::Fd(file) => EndpointInner::Fd(file.try_clone()?),
        };
        Ok(Self { inner })
    }
}

impl AsRawFd for Endpoint {
    fn as_raw_fd(&self) -> RawFd {
        match &self.inner {
            EndpointInner::Unix(stream) => stream.as_raw_fd(),
            EndpointInner::Tcp(stream) => stream.as_raw_fd(),
            EndpointInner::Fd(file) => file.as_raw_fd(),
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            EndpointInner::Unix(_) => "unix",
            EndpointInner::Tcp(_) => "tcp",
            EndpointInner::Fd(_) => "fd",
        };
        f.debug_struct("Endpoint")
            .field("kind", &kind)
            .field("fd", &self.as_raw_fd())
            .finish()
    }
}

fn set_nonblocking_fd(fd: RawFd, nonblocking: bool) -> std::io::Result<()> {
    // SAFETY: `fd` is an open descriptor owned by the enclosing `File`;
    // F_GETFL/F_SETFL only manipulate its status flags.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(std::io::Error::last_os_error());
        }
        let flags = if nonblocking {
            flags | libc::O_NONBLOCK
        } else {
            flags & !libc::O_NONBLOCK
        };
        if libc::fcntl(fd, libc::F_SETFL, flags) < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn pair_is_connected() {
        let (mut left, mut right) = Endpoint::pair().unwrap();
        left.write_all(b"ping").unwrap();

        let mut buf = [0u8; 4];
        right.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn nonblocking_read_would_block() {
        let (_left, mut right) = Endpoint::pair().unwrap();
        right.set_nonblocking(true).unwrap();

        let mut buf = [0u8; 16];
        let err = right.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);
    }

    #[test]
    fn clone_shares_the_stream() {
        let (mut left, right) = Endpoint::pair().unwrap();
        let mut reader = right.try_clone().unwrap();
        drop(right);

        left.write_all(b"x").unwrap();
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"x");
    }

    #[test]
    fn shutdown_write_signals_eof() {
        let (left, mut right) = Endpoint::pair().unwrap();
        left.shutdown(Shutdown::Write).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(right.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn fd_endpoint_supports_nonblocking() {
        // A pipe pair stands in for child-process stdio.
        let mut fds = [0i32; 2];
        // SAFETY: `fds` is a valid writable array of two ints for pipe(2).
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0);
        // SAFETY: pipe(2) just returned ownership of both descriptors.
        let (read_fd, write_fd) = unsafe {
            use std::os::fd::FromRawFd;
            (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1]))
        };

        let mut reader = Endpoint::from_fd(read_fd);
        let mut writer = Endpoint::from_fd(write_fd);
        reader.set_nonblocking(true).unwrap();

        let mut buf = [0u8; 4];
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);

        writer.write_all(b"pipe").unwrap();
        loop {
            match reader.read(&mut buf) {
                Ok(4) => break,
                Ok(n) => panic!("short read: {n}"),
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => panic!("read failed: {err}"),
            }
        }
        assert_eq!(&buf, b"pipe");
    }
}
