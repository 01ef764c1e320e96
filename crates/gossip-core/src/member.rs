//! Cluster member identity and the deduplicated member set.
//!
//! A member is `(version, uid, address)`. The uid is the wall-clock
//! millisecond timestamp captured at construction, which disambiguates a
//! peer that leaves and rejoins from the same address. Two members are equal
//! only if every field matches exactly.

use crate::codec::{now_ms, ByteReader, ByteWriter};
use crate::config::PROTOCOL_VERSION;
use crate::error::{GossipError, Result};
use crate::vector_clock::MemberId;
use rand::Rng;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

const MEMBERS_INITIAL_CAPACITY: usize = 32;
const MEMBERS_EXTENSION_FACTOR: usize = 2;
const MEMBERS_LOAD_FACTOR: f64 = 0.75;

// Address blob family tags.
const ADDR_FAMILY_V4: u8 = 4;
const ADDR_FAMILY_V6: u8 = 6;

/// Wire size of the address blob: family tag + port + address octets.
fn addr_blob_len(addr: &SocketAddr) -> usize {
    match addr {
        SocketAddr::V4(_) => 1 + 2 + 4,
        SocketAddr::V6(_) => 1 + 2 + 16,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    pub version: u16,
    pub uid: u32,
    pub addr: SocketAddr,
}

impl Member {
    /// New member identity for `addr`, stamped with the current cluster time.
    pub fn new(addr: SocketAddr) -> Self {
        Self::with_version(addr, PROTOCOL_VERSION)
    }

    pub fn with_version(addr: SocketAddr, version: u16) -> Self {
        Self {
            version,
            uid: now_ms() as u32,
            addr,
        }
    }

    /// Originator id used by the versioning layer: the uid, zero-extended.
    pub fn id(&self) -> MemberId {
        self.uid as MemberId
    }

    /// Encoded size on the wire.
    pub fn wire_size(&self) -> usize {
        2 + 4 + 4 + addr_blob_len(&self.addr)
    }

    /// `u16 version | u32 uid | u32 address_len | address blob`.
    pub fn encode(&self, w: &mut ByteWriter<'_>) -> Result<()> {
        w.put_u16(self.version)?;
        w.put_u32(self.uid)?;
        w.put_u32(addr_blob_len(&self.addr) as u32)?;
        match self.addr {
            SocketAddr::V4(v4) => {
                w.put_u8(ADDR_FAMILY_V4)?;
                w.put_u16(v4.port())?;
                w.put_bytes(&v4.ip().octets())?;
            }
            SocketAddr::V6(v6) => {
                w.put_u8(ADDR_FAMILY_V6)?;
                w.put_u16(v6.port())?;
                w.put_bytes(&v6.ip().octets())?;
            }
        }
        Ok(())
    }

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let version = r.get_u16()?;
        let uid = r.get_u32()?;
        let addr_len = r.get_u32()? as usize;
        let start = r.position();

        let family = r.get_u8()?;
        let port = r.get_u16()?;
        let addr = match family {
            ADDR_FAMILY_V4 => {
                let o = r.get_bytes(4)?;
                SocketAddr::new(IpAddr::V4(Ipv4Addr::new(o[0], o[1], o[2], o[3])), port)
            }
            ADDR_FAMILY_V6 => {
                let o = r.get_bytes(16)?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(o);
                SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port)
            }
            _ => return Err(GossipError::InvalidMessage),
        };
        if r.position() - start != addr_len {
            return Err(GossipError::InvalidMessage);
        }

        Ok(Self { version, uid, addr })
    }
}

/// Unordered, deduplicated collection of owned members.
///
/// Capacity grows by doubling whenever an insert would push the size past
/// 0.75 of the current capacity, starting from 32 slots. Removal shifts the
/// tail down in place and preserves nothing about ordering.
#[derive(Debug, Default)]
pub struct MemberSet {
    members: Vec<Member>,
}

impl MemberSet {
    pub fn new() -> Self {
        Self {
            members: Vec::with_capacity(MEMBERS_INITIAL_CAPACITY),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }

    pub fn as_slice(&self) -> &[Member] {
        &self.members
    }

    fn ensure_capacity(&mut self, required: usize) {
        let mut capacity = self.members.capacity().max(MEMBERS_INITIAL_CAPACITY);
        while required as f64 >= capacity as f64 * MEMBERS_LOAD_FACTOR {
            capacity *= MEMBERS_EXTENSION_FACTOR;
        }
        if capacity > self.members.capacity() {
            self.members
                .reserve_exact(capacity - self.members.len());
        }
    }

    /// Inserts each member unless an equal one already exists.
    pub fn put(&mut self, new_members: &[Member]) {
        self.ensure_capacity(self.members.len() + new_members.len());
        for candidate in new_members {
            if !self.members.iter().any(|m| m == candidate) {
                self.members.push(*candidate);
            }
        }
    }

    pub fn find_by_addr(&self, addr: &SocketAddr) -> Option<&Member> {
        self.members.iter().find(|m| m.addr == *addr)
    }

    /// Removes the first member bound to `addr`. Returns whether one existed.
    pub fn remove_by_addr(&mut self, addr: &SocketAddr) -> bool {
        if let Some(idx) = self.members.iter().position(|m| m.addr == *addr) {
            self.members.remove(idx);
            true
        } else {
            false
        }
    }

    /// Uniformly random subset of `min(k, len)` members (reservoir sampling).
    pub fn random_members<R: Rng>(&self, rng: &mut R, k: usize) -> Vec<Member> {
        if self.members.is_empty() || k == 0 {
            return Vec::new();
        }
        let take = k.min(self.members.len());
        let mut reservoir: Vec<Member> = self.members[..take].to_vec();
        for idx in take..self.members.len() {
            let slot = rng.gen_range(0..=idx);
            if slot < take {
                reservoir[slot] = self.members[idx];
            }
        }
        reservoir
    }
}
