//! Packet events — what the transport hands us, and what we log.

use std::fmt;
use std::sync::OnceLock;
use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::identity::{PeerAddress, PeerIdentity};

/// Which way a packet crossed the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "IN",
            Direction::Outbound => "OUT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Clock ─────────────────────────────────────────────────────────────────────

/// Process-wide monotonic clock, in milliseconds since first use.
pub struct MonotonicClock;

impl MonotonicClock {
    pub fn now_ms() -> u64 {
        static EPOCH: OnceLock<Instant> = OnceLock::new();
        EPOCH.get_or_init(Instant::now).elapsed().as_millis() as u64
    }
}

// ── Raw packet ────────────────────────────────────────────────────────────────

/// A packet event as delivered by the transport.
///
/// The transport attaches whatever it knows about the sender. Either field
/// may be missing; a packet with neither is accepted but unattributed.
#[derive(Debug, Clone)]
pub struct RawPacket {
    pub source_address: Option<PeerAddress>,
    pub source_handle: Option<u64>,
    pub payload: Bytes,
    pub direction: Direction,
    pub timestamp_ms: u64,
}

impl RawPacket {
    /// Inbound packet stamped with the current monotonic time.
    pub fn inbound(
        source_address: Option<PeerAddress>,
        source_handle: Option<u64>,
        payload: Bytes,
    ) -> Self {
        Self {
            source_address,
            source_handle,
            payload,
            direction: Direction::Inbound,
            timestamp_ms: MonotonicClock::now_ms(),
        }
    }

    /// Payload length, saturated to `u32`.
    pub fn payload_size(&self) -> u32 {
        u32::try_from(self.payload.len()).unwrap_or(u32::MAX)
    }
}

// ── Packet record ─────────────────────────────────────────────────────────────

/// Immutable snapshot of one packet event, ready for the logger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketRecord {
    pub identity: PeerIdentity,
    pub direction: Direction,
    pub payload_size: u32,
    pub timestamp_ms: u64,
}

impl PacketRecord {
    pub fn new(
        identity: PeerIdentity,
        direction: Direction,
        payload_size: u32,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            identity,
            direction,
            payload_size,
            timestamp_ms,
        }
    }

    /// Record for a raw packet once its sender has been resolved.
    pub fn from_raw(identity: PeerIdentity, packet: &RawPacket) -> Self {
        Self::new(
            identity,
            packet.direction,
            packet.payload_size(),
            packet.timestamp_ms,
        )
    }

    /// The same event with a different timestamp.
    pub fn restamped(self, timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            ..self
        }
    }

    /// `<timestamp> <direction> <identity> <payload size>`, no terminator.
    pub fn format_line(&self) -> String {
        format!(
            "{} {} {} {}",
            self.timestamp_ms,
            self.direction,
            self.identity.render(true),
            self.payload_size
        )
    }
}
