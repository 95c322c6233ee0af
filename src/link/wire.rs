//! Wire grammar shared by both link channels.
//!
//! The protocol is fixed and must stay byte-compatible with the backup
//! daemon: raw UTF-8 text, no length prefix, no terminator. One socket read
//! yields one frame. Changing any token here breaks interoperability.

use std::collections::HashMap;

/// Separator between the routing key and the command in a query packet.
pub const PACKET_SEPARATOR: &str = "&*&";

/// Periodic keep-alive token sent on the subscription connection.
pub const HEARTBEAT: &str = "heartbeat";

/// Reply token the daemon may echo back; discarded by the subscriber.
pub const HEARTBEAT_REPLY: &str = "heartbeat_response";

/// Sentinel reply for any transport failure (refused, timeout, I/O error).
pub const REPLY_COMMUNICATION_FAILED: &str = "ERROR:COMMUNICATION_FAILED";

/// Sentinel reply when the peer closed the connection without data.
pub const REPLY_NO_RESPONSE: &str = "ERROR:NO_RESPONSE";

/// Prefix of successful query replies, by convention of the daemon.
pub const REPLY_OK_PREFIX: &str = "OK:";

/// Prefix of failed query replies, by convention of the daemon.
pub const REPLY_ERROR_PREFIX: &str = "ERROR:";

/// Literal broadcast frame requesting an immediate world save. The daemon
/// sends this as-is, outside the `key=value` event grammar.
pub const REMOTE_SAVE_TRIGGER: &str = "minebackup save";

/// Command acknowledging a completed hot-backup world save.
pub const CMD_WORLD_SAVED: &str = "WORLD_SAVED";

/// Command telling the daemon the server has saved and is exiting.
pub const CMD_SAVE_AND_EXIT_COMPLETE: &str = "WORLD_SAVE_AND_EXIT_COMPLETE";

/// Command prefix of the handshake reply; followed by the agent version.
pub const CMD_HANDSHAKE_RESPONSE: &str = "HANDSHAKE_RESPONSE";

/// Mandatory key identifying an event record.
pub const EVENT_KEY: &str = "event";

/// Builds a routing key addressing one logical endpoint on the peer.
#[inline]
pub fn routing_key(app_id: &str, endpoint_id: &str) -> String {
    format!("{app_id}-{endpoint_id}")
}

/// Builds one query packet: `"{routing_key}&*&{command}"`.
#[inline]
pub fn query_packet(routing_key: &str, command: &str) -> String {
    format!("{routing_key}{PACKET_SEPARATOR}{command}")
}

/// True if a received frame is the heartbeat reply token (after trimming).
#[inline]
pub fn is_heartbeat_reply(frame: &str) -> bool {
    frame.trim() == HEARTBEAT_REPLY
}

/// Parses a `key=value;key=value;...` event record.
///
/// Pairs without a `=` are skipped; keys and values are trimmed. The caller
/// checks for the mandatory [`EVENT_KEY`] — a record without it is not an
/// event and is ignored, never an error: malformed peer input must not take
/// the dispatcher down.
pub fn parse_record(payload: &str) -> HashMap<String, String> {
    let mut record = HashMap::new();
    for pair in payload.split(';') {
        if let Some((key, value)) = pair.split_once('=') {
            let key = key.trim();
            if !key.is_empty() {
                record.insert(key.to_string(), value.trim().to_string());
            }
        }
    }
    record
}
