//! The gossip protocol state machine.
//!
//! One engine owns one datagram socket and all protocol state. It never
//! blocks and spawns no tasks: the embedding host watches the socket for
//! readability, calls [`Gossip::process_receive`] when a datagram is ready,
//! drains [`Gossip::process_send`] every loop iteration, and uses the value
//! returned by [`Gossip::tick`] as its poll timeout. The engine is not
//! reentrant; a multi-threaded host must serialize access externally.
//!
//! Joining is a HELLO/WELCOME handshake against any number of seeds;
//! membership spreads via MEMBER_LIST broadcast on join, payloads via DATA
//! rumor rounds, and divergence is repaired by the periodic STATUS
//! anti-entropy exchange. A peer that lets an acknowledgeable message
//! exhaust its retries is evicted from the membership — that is the only
//! failure detector.

use crate::codec::now_ms;
use crate::config::GossipConfig;
use crate::data_log::DataLog;
use crate::error::{GossipError, Result};
use crate::member::{Member, MemberSet};
use crate::message::{
    member_list_chunks, Ack, Data, Hello, MemberList, Message, Status, Welcome, MAX_DATA_PAYLOAD,
    MESSAGE_MAX_SIZE,
};
use crate::net::{Transport, UdpTransport};
use crate::outbound::{encode_into_slot, Envelope, OutboundQueue};
use crate::vector_clock::{ClockOrdering, VectorClock};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::net::SocketAddr;
#[cfg(unix)]
use std::os::unix::io::RawFd;

/// Messages that never wait for an ACK.
const FIRE_AND_FORGET_ATTEMPTS: u16 = 1;

/// Engine lifecycle. `Leaving` and `Disconnected` are reserved states the
/// core protocol never enters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GossipState {
    Initialized,
    Joining,
    Connected,
    Leaving,
    Disconnected,
    Destroyed,
}

/// Invoked synchronously from `process_receive` for each newly seen payload.
/// The buffer is only valid for the duration of the call.
pub type DataReceiver = Box<dyn FnMut(&[u8]) + Send>;

pub struct Gossip<T: Transport = UdpTransport> {
    transport: T,
    config: GossipConfig,
    input_buffer: [u8; MESSAGE_MAX_SIZE],
    outbound: OutboundQueue,
    sequence_num: u32,
    data_counter: u32,
    data_version: VectorClock,
    state: GossipState,
    self_member: Member,
    members: MemberSet,
    data_log: DataLog,
    last_gossip_ts: u64,
    data_receiver: Option<DataReceiver>,
    rng: SmallRng,
}

impl Gossip<UdpTransport> {
    /// Binds a nonblocking datagram socket to `self_addr` and builds an
    /// engine around it. `self_addr` is also what gets advertised to peers,
    /// so it must be reachable from the rest of the cluster.
    pub fn new(self_addr: SocketAddr, data_receiver: Option<DataReceiver>) -> Result<Self> {
        let transport = UdpTransport::bind(self_addr).map_err(GossipError::InitFailed)?;
        Self::with_transport(transport, GossipConfig::default(), data_receiver)
    }
}

impl<T: Transport> Gossip<T> {
    /// Builds an engine over an already-bound transport. This is also the
    /// seam the deterministic test hub plugs into.
    pub fn with_transport(
        transport: T,
        config: GossipConfig,
        data_receiver: Option<DataReceiver>,
    ) -> Result<Self> {
        let bound = transport.local_addr().map_err(GossipError::InitFailed)?;
        let self_member = Member::with_version(bound, config.protocol_version);
        tracing::info!(addr = %bound, uid = self_member.uid, "gossip engine initialized");
        Ok(Self {
            transport,
            config,
            input_buffer: [0u8; MESSAGE_MAX_SIZE],
            outbound: OutboundQueue::new(),
            sequence_num: 0,
            data_counter: 0,
            data_version: VectorClock::new(),
            state: GossipState::Initialized,
            self_member,
            members: MemberSet::new(),
            data_log: DataLog::new(),
            last_gossip_ts: 0,
            data_receiver,
            rng: SmallRng::from_entropy(),
        })
    }

    pub fn state(&self) -> GossipState {
        self.state
    }

    pub fn self_member(&self) -> &Member {
        &self.self_member
    }

    /// Read-only membership snapshot: the self member followed by all peers.
    pub fn member_list(&self) -> Vec<Member> {
        let mut list = Vec::with_capacity(1 + self.members.len());
        list.push(self.self_member);
        list.extend(self.members.iter().copied());
        list
    }

    /// Known peers, excluding the self member.
    pub fn members(&self) -> &MemberSet {
        &self.members
    }

    /// Number of envelopes waiting in the outbound queue.
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    /// Descriptor for the host's readiness multiplexer.
    #[cfg(unix)]
    pub fn socket_fd(&self) -> Option<RawFd> {
        self.transport.raw_fd()
    }

    /// Joins the cluster. With no seeds this node becomes the initial member
    /// and is immediately connected; otherwise a HELLO goes out to every
    /// seed and the engine waits in `Joining` for the first WELCOME.
    pub fn join(&mut self, seeds: &[SocketAddr]) -> Result<()> {
        if self.state != GossipState::Initialized {
            return Err(GossipError::BadState(self.state));
        }

        if seeds.is_empty() {
            self.state = GossipState::Connected;
            tracing::info!("no seeds given; acting as the initial cluster node");
            return Ok(());
        }

        let attempts = self.config.message_retry_attempts;
        for &seed in seeds {
            let hello = Hello::new(self.self_member);
            self.enqueue_encoded(|buf| hello.encode(buf), &[seed], attempts)?;
        }
        self.state = GossipState::Joining;
        tracing::info!(seeds = seeds.len(), "joining cluster");
        Ok(())
    }

    /// Reads one datagram off the socket and runs the matching handler.
    /// The caller is responsible for only invoking this when the socket is
    /// readable. An undecodable datagram is discarded; a message arriving in
    /// a state its handler does not accept is dropped with `BadState`. The
    /// engine survives both.
    pub fn process_receive(&mut self) -> Result<()> {
        if self.state == GossipState::Destroyed {
            return Err(GossipError::BadState(self.state));
        }

        let (len, sender) = self
            .transport
            .recv_from(&mut self.input_buffer)
            .map_err(GossipError::ReadFailed)?;

        let message = match Message::decode(&self.input_buffer[..len]) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(%sender, len, "discarding undecodable datagram");
                return Err(err);
            }
        };

        match message {
            Message::Hello(msg) => self.handle_hello(msg, sender),
            Message::Welcome(msg) => self.handle_welcome(msg, sender),
            Message::MemberList(msg) => self.handle_member_list(msg, sender),
            Message::Ack(msg) => self.handle_ack(msg),
            Message::Data(msg) => self.handle_data(msg, sender),
            Message::Status(msg) => self.handle_status(msg, sender),
        }
    }

    /// Walks the outbound queue head to tail, sending everything that is due
    /// and reaping everything that has run out of attempts. Returns how many
    /// datagrams actually went out; a socket write failure aborts the drain
    /// with the queue otherwise intact, so the caller may retry.
    pub fn process_send(&mut self) -> Result<usize> {
        if self.state == GossipState::Destroyed {
            return Err(GossipError::BadState(self.state));
        }

        let now = now_ms();
        let mut sent = 0usize;
        let mut idx = 0usize;
        while idx < self.outbound.len() {
            let envelope = *self.outbound.get(idx);

            if envelope.attempt_num >= envelope.max_attempts {
                // Out of attempts. If ACKs were expected and never came, the
                // recipient is presumed dead: drop it from the membership and
                // flush everything else queued for it.
                if envelope.max_attempts > FIRE_AND_FORGET_ATTEMPTS {
                    self.evict_silent_peer(idx, envelope.recipient);
                }
                self.outbound.remove(idx);
                continue;
            }

            if envelope.attempt_num > 0
                && envelope.attempt_ts + self.config.message_retry_interval > now
            {
                idx += 1;
                continue;
            }

            // Fan-out envelopes share one encoded payload; stamp this
            // envelope's sequence number into the slot before sending.
            self.outbound
                .patch_sequence(envelope.slot, envelope.sequence_num);
            if let Err(err) = self
                .transport
                .send_to(self.outbound.payload(&envelope), envelope.recipient)
            {
                return Err(GossipError::WriteFailed(err));
            }
            sent += 1;

            let entry = self.outbound.get_mut(idx);
            entry.attempt_ts = now;
            entry.attempt_num += 1;

            if envelope.max_attempts <= FIRE_AND_FORGET_ATTEMPTS {
                self.outbound.remove(idx);
                continue;
            }
            idx += 1;
        }
        Ok(sent)
    }

    /// Periodic gossip trigger. When connected and the tick interval has
    /// elapsed, a STATUS goes out to a random peer subset. Always returns
    /// the milliseconds until the next tick is due, which doubles as the
    /// host's poll timeout.
    pub fn tick(&mut self) -> Result<u64> {
        match self.state {
            GossipState::Destroyed => Err(GossipError::BadState(self.state)),
            GossipState::Connected => {
                let now = now_ms();
                let interval = self.config.gossip_tick_interval;
                let elapsed = now.saturating_sub(self.last_gossip_ts);
                if elapsed >= interval {
                    let peers = self.random_peer_addrs();
                    self.enqueue_status(&peers)?;
                    self.last_gossip_ts = now;
                    Ok(interval)
                } else {
                    Ok(interval - elapsed)
                }
            }
            _ => Ok(self.config.gossip_tick_interval),
        }
    }

    /// Originates a new payload: versions it under the self member, stores
    /// it in the data log, and starts a rumor round towards random peers.
    pub fn send_data(&mut self, payload: &[u8]) -> Result<()> {
        if self.state != GossipState::Connected {
            return Err(GossipError::BadState(self.state));
        }
        if payload.len() > MAX_DATA_PAYLOAD {
            return Err(GossipError::BufferNotEnough);
        }

        self.data_counter += 1;
        let record = self.data_version.set(self.self_member.id(), self.data_counter);
        self.data_log.update(record, payload);

        let peers = self.random_peer_addrs();
        let attempts = self.config.message_retry_attempts;
        let data = Data::new(record, payload.to_vec());
        self.enqueue_encoded(|buf| data.encode(buf), &peers, attempts)
    }

    /// Tears the engine down: pending envelopes are dropped and every
    /// subsequent operation fails with `BadState`. The socket closes when
    /// the engine is dropped.
    pub fn destroy(&mut self) {
        self.outbound.clear();
        self.state = GossipState::Destroyed;
        tracing::info!("gossip engine destroyed");
    }

    // -----------------------------------------------------------------------
    // Inbound handlers
    // -----------------------------------------------------------------------

    fn handle_hello(&mut self, msg: Hello, sender: SocketAddr) -> Result<()> {
        if self.state != GossipState::Connected {
            return Err(GossipError::BadState(self.state));
        }
        let newcomer = msg.member;
        tracing::info!(%sender, uid = newcomer.uid, "hello from joining node");

        let welcome = Welcome::new(msg.header.sequence_num, self.self_member);
        self.enqueue_encoded(|buf| welcome.encode(buf), &[sender], FIRE_AND_FORGET_ATTEMPTS)?;

        if !self.members.is_empty() {
            let attempts = self.config.message_retry_attempts;

            // Tell the newcomer about everyone we know, in batches that fit
            // one message each.
            let known: Vec<Member> = self.members.as_slice().to_vec();
            for chunk in member_list_chunks(&known) {
                let list = MemberList::new(chunk);
                self.enqueue_encoded(|buf| list.encode(buf), &[sender], attempts)?;
            }

            // And tell everyone else about the newcomer. Some of them are
            // being introduced to the newcomer at the same time; duplicate
            // inserts converge via member-set dedup.
            let recipients: Vec<SocketAddr> = self.members.iter().map(|m| m.addr).collect();
            let list = MemberList::new(vec![newcomer]);
            self.enqueue_encoded(|buf| list.encode(buf), &recipients, attempts)?;
        }

        self.members.put(&[newcomer]);
        Ok(())
    }

    fn handle_welcome(&mut self, msg: Welcome, sender: SocketAddr) -> Result<()> {
        match self.state {
            GossipState::Joining | GossipState::Connected => {}
            state => return Err(GossipError::BadState(state)),
        }
        if self.state == GossipState::Joining {
            tracing::info!(%sender, "welcomed into the cluster");
        }
        self.state = GossipState::Connected;
        self.members.put(&[msg.member]);
        // The HELLO got through; stop retrying it.
        self.outbound.remove_by_sequence(msg.hello_sequence_num);
        Ok(())
    }

    fn handle_member_list(&mut self, msg: MemberList, sender: SocketAddr) -> Result<()> {
        if self.state != GossipState::Connected {
            return Err(GossipError::BadState(self.state));
        }
        // The broadcast-on-join convergence can echo our own record back.
        let others: Vec<Member> = msg
            .members
            .into_iter()
            .filter(|m| *m != self.self_member)
            .collect();
        self.members.put(&others);
        self.enqueue_ack(msg.header.sequence_num, sender)
    }

    fn handle_ack(&mut self, msg: Ack) -> Result<()> {
        if self.state != GossipState::Connected {
            return Err(GossipError::BadState(self.state));
        }
        // A duplicate ACK finds nothing; UDP duplication is not an error.
        self.outbound.remove_by_sequence(msg.ack_sequence_num);
        Ok(())
    }

    fn handle_data(&mut self, msg: Data, sender: SocketAddr) -> Result<()> {
        if self.state != GossipState::Connected {
            return Err(GossipError::BadState(self.state));
        }
        self.enqueue_ack(msg.header.sequence_num, sender)?;

        // Only strictly newer information is logged and re-gossiped; replays
        // and stale versions die here.
        if self.data_version.compare_with_record(&msg.data_version, true) != ClockOrdering::Before {
            return Ok(());
        }

        self.data_log.update(msg.data_version, &msg.data);
        if let Some(receiver) = self.data_receiver.as_mut() {
            receiver(&msg.data);
        }

        let peers = self.random_peer_addrs();
        let attempts = self.config.message_retry_attempts;
        let data = Data::new(msg.data_version, msg.data);
        self.enqueue_encoded(|buf| data.encode(buf), &peers, attempts)
    }

    fn handle_status(&mut self, msg: Status, sender: SocketAddr) -> Result<()> {
        if self.state != GossipState::Connected {
            return Err(GossipError::BadState(self.state));
        }
        self.enqueue_ack(msg.header.sequence_num, sender)?;

        let mut remote = msg.data_version;
        let ordering = self.data_version.compare(&remote, false);

        if matches!(ordering, ClockOrdering::After | ClockOrdering::Conflict) {
            // We hold payloads the sender has not seen; push each one whose
            // originator dimension the sender is behind on.
            let lagging: Vec<(crate::vector_clock::VectorRecord, Vec<u8>)> = self
                .data_log
                .iter()
                .filter(|record| {
                    remote.compare_with_record(&record.version, false) == ClockOrdering::Before
                })
                .map(|record| (record.version, record.payload().to_vec()))
                .collect();
            let attempts = self.config.message_retry_attempts;
            for (version, payload) in lagging {
                let data = Data::new(version, payload);
                self.enqueue_encoded(|buf| data.encode(buf), &[sender], attempts)?;
            }
        }
        if matches!(ordering, ClockOrdering::Before | ClockOrdering::Conflict) {
            // The sender is ahead; answer with our clock so it pushes back.
            self.enqueue_status(&[sender])?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Outbound helpers
    // -----------------------------------------------------------------------

    fn next_sequence(&mut self) -> u32 {
        self.sequence_num += 1;
        self.sequence_num
    }

    /// Encodes a message once and queues one envelope per recipient over the
    /// shared slot, each under its own sequence number.
    fn enqueue_encoded<F>(
        &mut self,
        encode: F,
        recipients: &[SocketAddr],
        max_attempts: u16,
    ) -> Result<()>
    where
        F: FnOnce(&mut [u8]) -> Result<usize>,
    {
        if recipients.is_empty() {
            return Ok(());
        }
        let (slot, len) = encode_into_slot(&mut self.outbound, encode)?;
        for &recipient in recipients {
            let sequence_num = self.next_sequence();
            self.outbound
                .push(Envelope::new(sequence_num, slot, len, recipient, max_attempts));
        }
        Ok(())
    }

    fn enqueue_ack(&mut self, sequence_num: u32, recipient: SocketAddr) -> Result<()> {
        let ack = Ack::new(sequence_num);
        self.enqueue_encoded(|buf| ack.encode(buf), &[recipient], FIRE_AND_FORGET_ATTEMPTS)
    }

    fn enqueue_status(&mut self, recipients: &[SocketAddr]) -> Result<()> {
        if recipients.is_empty() {
            return Ok(());
        }
        let status = Status::new(self.data_version.clone());
        let attempts = self.config.message_retry_attempts;
        self.enqueue_encoded(|buf| status.encode(buf), recipients, attempts)
    }

    fn random_peer_addrs(&mut self) -> Vec<SocketAddr> {
        self.members
            .random_members(&mut self.rng, self.config.message_rumor_factor)
            .iter()
            .map(|m| m.addr)
            .collect()
    }

    fn evict_silent_peer(&mut self, idx: usize, recipient: SocketAddr) {
        tracing::warn!(%recipient, "no ack after final retry; evicting peer");
        self.members.remove_by_addr(&recipient);
        // Everything queued after this envelope for the dead peer is moot.
        let mut j = idx + 1;
        while j < self.outbound.len() {
            if self.outbound.get(j).recipient == recipient {
                self.outbound.remove(j);
            } else {
                j += 1;
            }
        }
    }
}
