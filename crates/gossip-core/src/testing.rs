//! In-memory datagram fabric for deterministic protocol tests.
//!
//! A [`Hub`] owns one inbound queue per registered address and delivers
//! `send_to` payloads synchronously. Directional links can be cut to model
//! partitions and silent peers; sending into a cut link or to an unknown
//! address silently drops the datagram, which is exactly what UDP does.

use crate::net::Transport;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct HubState {
    queues: HashMap<SocketAddr, VecDeque<(SocketAddr, Vec<u8>)>>,
    cut_links: HashSet<(SocketAddr, SocketAddr)>,
}

#[derive(Clone, Default)]
pub struct Hub {
    state: Arc<Mutex<HubState>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `addr` on the fabric and returns its transport endpoint.
    pub fn transport(&self, addr: SocketAddr) -> HubTransport {
        self.state
            .lock()
            .unwrap()
            .queues
            .entry(addr)
            .or_default();
        HubTransport {
            hub: self.clone(),
            addr,
        }
    }

    /// Drops all future datagrams flowing `from → to`.
    pub fn cut_link(&self, from: SocketAddr, to: SocketAddr) {
        self.state.lock().unwrap().cut_links.insert((from, to));
    }

    pub fn restore_link(&self, from: SocketAddr, to: SocketAddr) {
        self.state.lock().unwrap().cut_links.remove(&(from, to));
    }

    /// Number of datagrams waiting at `addr`.
    pub fn pending(&self, addr: SocketAddr) -> usize {
        self.state
            .lock()
            .unwrap()
            .queues
            .get(&addr)
            .map_or(0, VecDeque::len)
    }
}

pub struct HubTransport {
    hub: Hub,
    addr: SocketAddr,
}

impl Transport for HubTransport {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }

    fn send_to(&self, buffer: &[u8], addr: SocketAddr) -> io::Result<usize> {
        let mut state = self.hub.state.lock().unwrap();
        if state.cut_links.contains(&(self.addr, addr)) {
            return Ok(buffer.len());
        }
        if let Some(queue) = state.queues.get_mut(&addr) {
            queue.push_back((self.addr, buffer.to_vec()));
        }
        Ok(buffer.len())
    }

    fn recv_from(&self, buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut state = self.hub.state.lock().unwrap();
        let queue = state
            .queues
            .get_mut(&self.addr)
            .expect("transport registered with hub");
        match queue.pop_front() {
            Some((sender, datagram)) => {
                let len = datagram.len().min(buffer.len());
                buffer[..len].copy_from_slice(&datagram[..len]);
                Ok((len, sender))
            }
            None => Err(io::Error::from(io::ErrorKind::WouldBlock)),
        }
    }
}
