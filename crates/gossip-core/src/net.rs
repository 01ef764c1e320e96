//! Datagram transport seam.
//!
//! The engine only needs four socket operations, so they live behind a small
//! trait: the production implementation wraps a nonblocking UDP socket, and
//! the test suite plugs in an in-memory hub (see [`crate::testing`]).

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, UdpSocket};
#[cfg(unix)]
use std::os::unix::io::{AsRawFd, RawFd};

pub trait Transport {
    /// The bound address. Resolves ephemeral ports after binding to port 0.
    fn local_addr(&self) -> io::Result<SocketAddr>;

    fn send_to(&self, buffer: &[u8], addr: SocketAddr) -> io::Result<usize>;

    fn recv_from(&self, buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Readiness descriptor for the host's poll loop, when one exists.
    #[cfg(unix)]
    fn raw_fd(&self) -> Option<RawFd> {
        None
    }
}

/// Nonblocking UDP socket bound to the node's advertised address.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let domain = match addr {
            SocketAddr::V4(_) => Domain::IPV4,
            SocketAddr::V6(_) => Domain::IPV6,
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        Ok(Self {
            socket: socket.into(),
        })
    }
}

impl Transport for UdpTransport {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn send_to(&self, buffer: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(buffer, addr)
    }

    fn recv_from(&self, buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buffer)
    }

    #[cfg(unix)]
    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.socket.as_raw_fd())
    }
}
