//! Gossip-based cluster membership and data dissemination over UDP.
//!
//! A process embeds a [`Gossip`] engine to join a peer-to-peer cluster,
//! learn the membership set, and broadcast opaque payloads that spread
//! epidemically while tolerating the loss, duplication, and reordering of
//! datagram transport. The engine is single-threaded and never blocks: the
//! host drives it from its own event loop via `process_receive`,
//! `process_send`, and `tick`.

pub mod codec;
pub mod config;
pub mod data_log;
pub mod engine;
pub mod error;
pub mod member;
pub mod message;
pub mod net;
pub mod outbound;
pub mod testing;
pub mod vector_clock;

pub use config::GossipConfig;
pub use engine::{DataReceiver, Gossip, GossipState};
pub use error::{GossipError, Result};
pub use member::{Member, MemberSet};
pub use net::{Transport, UdpTransport};
pub use vector_clock::{ClockOrdering, VectorClock, VectorRecord};
