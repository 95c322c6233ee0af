//! # Persistent publish/subscribe channel.
//!
//! [`SignalSubscriber`] opens one long-lived connection to the daemon's
//! broadcast endpoint, announces its subscription key once, and then receives
//! unsolicited frames for the lifetime of the connection.
//!
//! ## Architecture
//! ```text
//! connect():
//!   TcpStream ──► write "{app_id}-{signal_id}" once
//!        │
//!        ├─► reader task ──► [bounded frame channel] ──► SubscriberHandle::recv()
//!        │      (one read() = one frame; heartbeat replies discarded)
//!        │
//!        └─► heartbeat task  (first fire after heartbeat_initial,
//!                             then every heartbeat_period)
//! ```
//!
//! Frames are handed to the owner through a **bounded channel** rather than a
//! callback on the reader task: the single consumer draining the channel is
//! the only context that may touch shared restore state. A full channel drops
//! the frame with a warning; the reader never blocks on a slow consumer.
//!
//! ## Failure semantics
//! On any read error or EOF the reader exits, the heartbeat stops, and the
//! connection closes. There is **no automatic reconnection** — loss of the
//! channel is a silent, permanent disconnect until `connect()` is called
//! again by the owner. [`SubscriberHandle::closed`] lets the owner observe
//! the disconnect and decide for itself.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use std::io;
use std::time::Duration;

use crate::config::Config;
use crate::link::wire;

/// One broadcast frame fits in a single fixed-size read.
const FRAME_BUFFER: usize = 1024;

/// Persistent subscription client for the daemon's broadcast endpoint.
///
/// Construction only captures settings; [`SignalSubscriber::connect`] does
/// the work and returns a live [`SubscriberHandle`].
#[derive(Clone, Debug)]
pub struct SignalSubscriber {
    addr: String,
    subscription_key: String,
    heartbeat_initial: Duration,
    heartbeat_period: Duration,
    frame_capacity: usize,
}

impl SignalSubscriber {
    /// Creates a subscriber for the given endpoint and subscription key.
    pub fn to(addr: impl Into<String>, subscription_key: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            subscription_key: subscription_key.into(),
            heartbeat_initial: Duration::from_secs(60),
            heartbeat_period: Duration::from_secs(180),
            frame_capacity: 64,
        }
    }

    /// Creates a subscriber addressing the daemon's broadcast endpoint.
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            addr: cfg.subscribe_addr(),
            subscription_key: cfg.broadcast_key(),
            heartbeat_initial: cfg.heartbeat_initial,
            heartbeat_period: cfg.heartbeat_period,
            frame_capacity: cfg.frame_capacity_clamped(),
        }
    }

    /// Overrides the heartbeat schedule.
    #[must_use]
    pub fn with_heartbeat(mut self, initial: Duration, period: Duration) -> Self {
        self.heartbeat_initial = initial;
        self.heartbeat_period = period;
        self
    }

    /// Overrides the frame channel capacity (min 1, clamped).
    #[must_use]
    pub fn with_frame_capacity(mut self, capacity: usize) -> Self {
        self.frame_capacity = capacity.max(1);
        self
    }

    /// Connects, announces the subscription key, and spawns the reader and
    /// heartbeat tasks. Fails only on connect or the initial key write.
    pub async fn connect(&self) -> io::Result<SubscriberHandle> {
        let stream = TcpStream::connect(&self.addr).await?;
        let (reader, mut writer) = stream.into_split();
        writer.write_all(self.subscription_key.as_bytes()).await?;
        info!(addr = %self.addr, key = %self.subscription_key, "subscribed to broadcast channel");

        let shutdown = CancellationToken::new();
        let (tx, rx) = mpsc::channel(self.frame_capacity);

        tokio::spawn(read_frames(reader, tx, shutdown.clone()));
        tokio::spawn(send_heartbeats(
            writer,
            shutdown.clone(),
            self.heartbeat_initial,
            self.heartbeat_period,
        ));

        Ok(SubscriberHandle {
            frames: rx,
            shutdown,
        })
    }
}

/// Live subscription: the receiving end of the frame channel plus the stop
/// switch for the background tasks.
pub struct SubscriberHandle {
    frames: mpsc::Receiver<String>,
    shutdown: CancellationToken,
}

impl SubscriberHandle {
    /// Receives the next broadcast frame.
    ///
    /// Returns `None` once the connection is gone (EOF, read error, or
    /// [`SubscriberHandle::stop`]) and all buffered frames are drained.
    pub async fn recv(&mut self) -> Option<String> {
        self.frames.recv().await
    }

    /// Stops the subscription: cancels both tasks and closes the connection.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Resolves once the connection is no longer alive.
    pub async fn closed(&self) {
        self.shutdown.cancelled().await;
    }

    /// True once the connection is no longer alive.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Reader loop: one `read()` = one frame, heartbeat replies discarded,
/// everything else pushed onto the frame channel without blocking.
async fn read_frames(
    mut reader: OwnedReadHalf,
    tx: mpsc::Sender<String>,
    shutdown: CancellationToken,
) {
    let mut buf = [0u8; FRAME_BUFFER];
    loop {
        let n = tokio::select! {
            _ = shutdown.cancelled() => break,
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    info!("broadcast peer closed the connection");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    warn!(error = %e, "broadcast read failed");
                    break;
                }
            },
        };

        let frame = String::from_utf8_lossy(&buf[..n]).into_owned();
        if wire::is_heartbeat_reply(&frame) {
            debug!("discarding heartbeat reply");
            continue;
        }
        match tx.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(frame)) => {
                warn!(frame = %frame, "frame channel full, dropping broadcast frame");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }
    // Ends the heartbeat and marks the handle closed; dropping `tx` lets the
    // consumer drain buffered frames before observing the disconnect.
    shutdown.cancel();
}

/// Heartbeat loop: first fire after `initial`, then every `period`. A write
/// failure means the connection is dead, so it tears the subscription down.
async fn send_heartbeats(
    mut writer: OwnedWriteHalf,
    shutdown: CancellationToken,
    initial: Duration,
    period: Duration,
) {
    tokio::select! {
        _ = shutdown.cancelled() => return,
        _ = time::sleep(initial) => {}
    }
    loop {
        if let Err(e) = writer.write_all(wire::HEARTBEAT.as_bytes()).await {
            warn!(error = %e, "heartbeat write failed");
            shutdown.cancel();
            return;
        }
        debug!("heartbeat sent");
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = time::sleep(period) => {}
        }
    }
}
