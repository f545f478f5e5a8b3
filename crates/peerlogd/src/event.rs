//! Stdin feed — one JSON packet event per line.
//!
//! ```text
//! {"slot": 3, "address": "10.0.0.5:4000", "version": 1, "direction": "inbound", "size": 128}
//! {"slot": 3, "handle": 43981, "payload": "deadbeef"}
//! {"slot": 3, "disconnect": true}
//! ```

use std::net::SocketAddr;

use bytes::Bytes;
use serde::Deserialize;

use peerlog_core::identity::PeerAddress;
use peerlog_core::record::{Direction, MonotonicClock, RawPacket};
use peerlog_services::Slot;

#[derive(Debug, Deserialize)]
pub struct PacketEvent {
    pub slot: Slot,
    #[serde(default)]
    pub address: Option<SocketAddr>,
    #[serde(default = "default_version")]
    pub version: u8,
    #[serde(default)]
    pub handle: Option<u64>,
    #[serde(default = "default_direction")]
    pub direction: Direction,
    /// Payload length when the payload itself is not supplied.
    #[serde(default)]
    pub size: Option<u32>,
    /// Hex-encoded payload bytes.
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub disconnect: bool,
}

/// Largest payload an event may declare or carry, one UDP datagram.
pub const MAX_EVENT_PAYLOAD: usize = 65_535;

/// Backing bytes for size-only events, so they never allocate.
static ZEROS: [u8; MAX_EVENT_PAYLOAD] = [0u8; MAX_EVENT_PAYLOAD];

fn default_version() -> u8 {
    1
}

fn default_direction() -> Direction {
    Direction::Inbound
}

/// What the daemon should do with one line of input.
#[derive(Debug)]
pub enum Action {
    Packet(Slot, RawPacket),
    Send(Slot, u32),
    Disconnect(Slot),
}

impl PacketEvent {
    pub fn parse(line: &str) -> Result<Self, EventError> {
        Ok(serde_json::from_str(line)?)
    }

    pub fn into_action(self) -> Result<Action, EventError> {
        if self.disconnect {
            return Ok(Action::Disconnect(self.slot));
        }
        let payload = match (&self.payload, self.size) {
            (Some(hex_payload), _) => {
                if hex_payload.len() / 2 > MAX_EVENT_PAYLOAD {
                    return Err(EventError::PayloadTooLarge(hex_payload.len() / 2));
                }
                Bytes::from(hex::decode(hex_payload)?)
            }
            (None, Some(size)) => {
                let size = size as usize;
                if size > MAX_EVENT_PAYLOAD {
                    return Err(EventError::PayloadTooLarge(size));
                }
                Bytes::from_static(&ZEROS[..size])
            }
            (None, None) => Bytes::new(),
        };
        match self.direction {
            Direction::Outbound => Ok(Action::Send(
                self.slot,
                u32::try_from(payload.len()).unwrap_or(u32::MAX),
            )),
            Direction::Inbound => Ok(Action::Packet(
                self.slot,
                RawPacket {
                    source_address: self
                        .address
                        .map(|a| PeerAddress::from_socket(a, self.version)),
                    source_handle: self.handle,
                    payload,
                    direction: Direction::Inbound,
                    timestamp_ms: MonotonicClock::now_ms(),
                },
            )),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("bad event json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bad payload hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("payload length {0} exceeds maximum {}", MAX_EVENT_PAYLOAD)]
    PayloadTooLarge(usize),
}
