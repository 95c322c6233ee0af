//! Minimal IPC transport to the backup daemon.
//!
//! Two channels over raw loopback TCP, sharing one wire grammar:
//!
//! - [`Querier`] — ephemeral request/response: one connection per command,
//!   one write, one read, close. Failures degrade to sentinel replies.
//! - [`SignalSubscriber`] — persistent pub/sub: one long-lived connection
//!   with a periodic heartbeat; inbound frames flow through a bounded
//!   channel to a single consumer.
//!
//! The grammar ([`wire`]) is fixed by the daemon and preserved exactly:
//! raw UTF-8 frames, no length prefix, one socket read per frame.

pub mod wire;

mod querier;
mod subscriber;

pub use querier::{query, Querier};
pub use subscriber::{SignalSubscriber, SubscriberHandle};
