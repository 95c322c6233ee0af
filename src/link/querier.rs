//! # Ephemeral request/response channel.
//!
//! [`Querier`] opens one short-lived connection per command, writes a single
//! framed packet, reads a single reply, and closes. There is no retry, no
//! multiplexing, and no persistent state; concurrent calls are fully
//! independent.
//!
//! ## Reply semantics
//! The restore pipeline frequently queries a peer that is offline or
//! mid-restart, so transport failures are an expected result, not a fault.
//! [`Querier::query`] therefore never returns an error: any failure degrades
//! to one of the sentinel replies from [`wire`]:
//!
//! ```text
//! connect refused / timeout / i/o error  →  "ERROR:COMMUNICATION_FAILED"
//! peer closed without sending data       →  "ERROR:NO_RESPONSE"
//! ```
//!
//! Callers that need the distinction can use [`Querier::try_query`], which
//! keeps the typed [`LinkError`].
//!
//! ## Framing
//! One `write` of `"{routing_key}&*&{command}"`, then one `read` into a
//! fixed 4096-byte buffer; the first chunk received is treated as the whole
//! reply. This bounds reply size and matches the daemon's exact on-wire
//! behavior. It is not a general framing protocol.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, warn};

use std::time::Duration;

use crate::config::Config;
use crate::error::LinkError;
use crate::link::wire;

/// One reply fits in a single fixed-size read.
const REPLY_BUFFER: usize = 4096;

/// Sends one command to the peer's query endpoint, degrading failures to the
/// sentinel replies.
///
/// Convenience wrapper over a one-off [`Querier`]; uses the default
/// 5-second deadline.
pub async fn query(peer_addr: &str, routing_key: &str, command: &str) -> String {
    Querier::to(peer_addr, routing_key).query(command).await
}

/// Ephemeral request/response client for the peer's query endpoint.
///
/// Cheap to clone; holds only the target address, routing key, and deadline.
#[derive(Clone, Debug)]
pub struct Querier {
    addr: String,
    routing_key: String,
    deadline: Duration,
}

impl Querier {
    /// Creates a querier for the given endpoint with the default deadline.
    pub fn to(addr: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            routing_key: routing_key.into(),
            deadline: Duration::from_secs(5),
        }
    }

    /// Creates a querier addressing the daemon's query endpoint from config.
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            addr: cfg.query_addr(),
            routing_key: cfg.query_key(),
            deadline: cfg.query_timeout,
        }
    }

    /// Overrides the exchange deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Sends `command` and returns the peer's reply, degrading any failure
    /// to a sentinel reply string. Never blocks past the deadline.
    pub async fn query(&self, command: &str) -> String {
        match self.try_query(command).await {
            Ok(reply) => reply,
            Err(LinkError::EmptyReply) => {
                warn!(addr = %self.addr, command, "peer closed without a reply");
                wire::REPLY_NO_RESPONSE.to_string()
            }
            Err(e) => {
                warn!(addr = %self.addr, command, error = %e, label = e.as_label(), "query failed");
                wire::REPLY_COMMUNICATION_FAILED.to_string()
            }
        }
    }

    /// Sends `command` and returns the raw reply, keeping the typed error.
    ///
    /// The whole exchange (connect, write, read) runs under the configured
    /// deadline. Exactly one read is performed; the first chunk is the reply.
    pub async fn try_query(&self, command: &str) -> Result<String, LinkError> {
        if command.trim().is_empty() {
            return Err(LinkError::EmptyCommand);
        }

        let packet = wire::query_packet(&self.routing_key, command);
        debug!(addr = %self.addr, command, "sending query");

        let exchange = async {
            let mut stream =
                TcpStream::connect(&self.addr)
                    .await
                    .map_err(|source| LinkError::Connect {
                        addr: self.addr.clone(),
                        source,
                    })?;
            stream.write_all(packet.as_bytes()).await?;

            let mut buf = [0u8; REPLY_BUFFER];
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                return Err(LinkError::EmptyReply);
            }
            Ok(String::from_utf8_lossy(&buf[..n]).into_owned())
        };

        match time::timeout(self.deadline, exchange).await {
            Ok(result) => {
                if let Ok(reply) = &result {
                    debug!(addr = %self.addr, reply, "query reply received");
                }
                result
            }
            Err(_elapsed) => Err(LinkError::Timeout {
                deadline: self.deadline,
            }),
        }
    }
}
