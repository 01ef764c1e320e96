//! Error taxonomy shared across the engine.
//!
//! Every fallible operation surfaces one of these variants to the caller;
//! the engine never panics on protocol or I/O failure. A decode error on a
//! received datagram discards that datagram only — engine state is untouched.

use crate::engine::GossipState;
use std::io;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, GossipError>;

#[derive(Debug, Error)]
pub enum GossipError {
    /// Socket creation, bind, or bound-address query failed.
    #[error("socket initialization failed: {0}")]
    InitFailed(#[source] io::Error),

    /// The operation requires a lifecycle state the engine is not in.
    #[error("operation invalid in state {0:?}")]
    BadState(GossipState),

    /// Protocol id, type tag, or payload layout did not match the wire format.
    #[error("invalid wire message")]
    InvalidMessage,

    /// Encode/decode buffer shorter than the fixed layout requires.
    #[error("buffer too short for message layout")]
    BufferNotEnough,

    #[error("not found")]
    NotFound,

    /// `sendto` failed (including would-block); the send drain is aborted and
    /// may be retried by the caller.
    #[error("socket write failed: {0}")]
    WriteFailed(#[source] io::Error),

    /// `recvfrom` failed.
    #[error("socket read failed: {0}")]
    ReadFailed(#[source] io::Error),
}
