//! Outbound retry queue and the shared output-buffer pool.
//!
//! Encoded messages live in a pool of 100 fixed 512-byte slots. An envelope
//! is the per-recipient view of one slot: retry bookkeeping plus addressing.
//! When one message fans out to several peers, all of their envelopes share
//! a single slot — only `sequence_num` and `recipient` differ, and the
//! sequence-number field of the slot is patched right before each send.
//!
//! The queue is a `Vec` in enqueue order and slots are plain indices, so
//! envelopes carry no pointers into the pool.

use crate::error::{GossipError, Result};
use crate::message::{MESSAGE_MAX_SIZE, SEQUENCE_NUM_OFFSET};
use std::net::SocketAddr;

/// Maximum number of distinct encoded payloads outstanding.
pub const MAX_OUTPUT_MESSAGES: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct Envelope {
    pub sequence_num: u32,
    /// Index of the pool slot holding the encoded message.
    pub slot: usize,
    /// Encoded length within the slot.
    pub len: usize,
    pub recipient: SocketAddr,
    pub attempt_num: u16,
    /// Cluster time of the last delivery attempt, 0 before the first.
    pub attempt_ts: u64,
    pub max_attempts: u16,
}

impl Envelope {
    pub fn new(
        sequence_num: u32,
        slot: usize,
        len: usize,
        recipient: SocketAddr,
        max_attempts: u16,
    ) -> Self {
        Self {
            sequence_num,
            slot,
            len,
            recipient,
            attempt_num: 0,
            attempt_ts: 0,
            max_attempts,
        }
    }
}

pub struct OutboundQueue {
    pool: Vec<u8>,
    envelopes: Vec<Envelope>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self {
            pool: vec![0u8; MAX_OUTPUT_MESSAGES * MESSAGE_MAX_SIZE],
            envelopes: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    pub fn envelopes(&self) -> &[Envelope] {
        &self.envelopes
    }

    pub fn get(&self, idx: usize) -> &Envelope {
        &self.envelopes[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut Envelope {
        &mut self.envelopes[idx]
    }

    pub fn push(&mut self, envelope: Envelope) {
        self.envelopes.push(envelope);
    }

    pub fn remove(&mut self, idx: usize) -> Envelope {
        self.envelopes.remove(idx)
    }

    pub fn position_by_sequence(&self, sequence_num: u32) -> Option<usize> {
        self.envelopes
            .iter()
            .position(|e| e.sequence_num == sequence_num)
    }

    /// Drops the envelope with the given sequence number, if queued.
    pub fn remove_by_sequence(&mut self, sequence_num: u32) -> Option<Envelope> {
        self.position_by_sequence(sequence_num)
            .map(|idx| self.envelopes.remove(idx))
    }

    /// Finds a slot for a new encoded message.
    ///
    /// Scans the live envelopes for a free slot first. When every slot is
    /// referenced, the envelope with the highest `attempt_num` (the oldest
    /// from a retry perspective) loses its slot, together with every other
    /// envelope fanned out over the same slot.
    pub fn acquire_slot(&mut self) -> usize {
        let mut occupied = [false; MAX_OUTPUT_MESSAGES];
        let mut oldest: Option<usize> = None;
        for (idx, envelope) in self.envelopes.iter().enumerate() {
            occupied[envelope.slot] = true;
            match oldest {
                Some(o) if self.envelopes[o].attempt_num >= envelope.attempt_num => {}
                _ => oldest = Some(idx),
            }
        }

        if let Some(free) = occupied.iter().position(|used| !used) {
            return free;
        }

        // All 100 slots are referenced, so the queue is non-empty.
        let victim_slot = self.envelopes[oldest.expect("full pool implies envelopes")].slot;
        self.envelopes.retain(|e| e.slot != victim_slot);
        victim_slot
    }

    /// The full 512-byte region of `slot`, for encoding a new message.
    pub fn slot_mut(&mut self, slot: usize) -> &mut [u8] {
        let base = slot * MESSAGE_MAX_SIZE;
        &mut self.pool[base..base + MESSAGE_MAX_SIZE]
    }

    /// The encoded bytes of an envelope's message.
    pub fn payload(&self, envelope: &Envelope) -> &[u8] {
        let base = envelope.slot * MESSAGE_MAX_SIZE;
        &self.pool[base..base + envelope.len]
    }

    /// Rewrites the header sequence-number field of a slot in place. Called
    /// immediately before `sendto` so fan-out copies of one payload each go
    /// out under their own sequence number.
    pub fn patch_sequence(&mut self, slot: usize, sequence_num: u32) {
        let base = slot * MESSAGE_MAX_SIZE + SEQUENCE_NUM_OFFSET;
        self.pool[base..base + 4].copy_from_slice(&sequence_num.to_be_bytes());
    }

    /// Number of distinct slots referenced by live envelopes.
    pub fn distinct_slots(&self) -> usize {
        let mut seen = [false; MAX_OUTPUT_MESSAGES];
        let mut count = 0;
        for envelope in &self.envelopes {
            if !seen[envelope.slot] {
                seen[envelope.slot] = true;
                count += 1;
            }
        }
        count
    }

    pub fn clear(&mut self) {
        self.envelopes.clear();
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes a message into a freshly acquired slot and returns `(slot, len)`.
pub fn encode_into_slot<F>(queue: &mut OutboundQueue, encode: F) -> Result<(usize, usize)>
where
    F: FnOnce(&mut [u8]) -> Result<usize>,
{
    let slot = queue.acquire_slot();
    let len = encode(queue.slot_mut(slot))?;
    if len > MESSAGE_MAX_SIZE {
        return Err(GossipError::BufferNotEnough);
    }
    Ok((slot, len))
}
