//! Engine tunables.
//!
//! Mirrors the compile-time knobs of the protocol: every field defaults to
//! the canonical constant, and embedders (and the test suite, which shrinks
//! the retry timings) can override per engine. Table sizes that shape memory
//! layout — message size, output slots, data-log slots, clock width — are
//! `const`s in their owning modules and are not runtime-tunable.

/// Protocol version carried in every member record.
pub const PROTOCOL_VERSION: u16 = 0x01;

#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// Version stamped into the self member record.
    pub protocol_version: u16,
    /// Interval in milliseconds between delivery attempts of an
    /// acknowledgeable message.
    pub message_retry_interval: u64,
    /// Maximum delivery attempts before the recipient is presumed dead.
    pub message_retry_attempts: u16,
    /// Number of random peers chosen for each round of rumor propagation.
    pub message_rumor_factor: usize,
    /// Milliseconds between periodic STATUS gossip rounds.
    pub gossip_tick_interval: u64,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            message_retry_interval: 10_000,
            message_retry_attempts: 3,
            message_rumor_factor: 3,
            gossip_tick_interval: 1_000,
        }
    }
}
