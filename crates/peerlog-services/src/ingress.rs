//! Transport adapter — resolve the sender, then record the packet.
//!
//! The transport calls `on_packet` for every packet it receives on a slot
//! and `on_send` for every packet it sends. Identity and registry errors
//! come back to the transport, which should drop the packet. Logging
//! problems never do.

use peerlog_core::identity::{IdentityError, PeerIdentity};
use peerlog_core::record::{Direction, MonotonicClock, PacketRecord, RawPacket};

use crate::logger::SharedLogger;
use crate::registry::{RegistryError, SharedRegistry, Slot};

#[derive(Clone)]
pub struct PacketIngress {
    registry: SharedRegistry,
    logger: SharedLogger,
}

impl PacketIngress {
    pub fn new(registry: SharedRegistry, logger: SharedLogger) -> Self {
        Self { registry, logger }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn logger(&self) -> &SharedLogger {
        &self.logger
    }

    /// A packet crossed the transport on `slot`.
    ///
    /// The identity attached to the packet is merged into the slot, and
    /// the merged identity is what gets logged and returned.
    pub fn on_packet(&self, slot: Slot, packet: &RawPacket) -> Result<PeerIdentity, IngressError> {
        let attached = PeerIdentity::from_packet(packet)?;
        let identity = self.registry.bind(slot, attached)?;
        self.logger.log(&PacketRecord::from_raw(identity, packet));
        Ok(identity)
    }

    /// We sent `payload_size` bytes to whoever holds `slot`.
    pub fn on_send(&self, slot: Slot, payload_size: u32) -> Result<PeerIdentity, IngressError> {
        let identity = self.registry.resolve(slot)?;
        self.logger.log(&PacketRecord::new(
            identity,
            Direction::Outbound,
            payload_size,
            MonotonicClock::now_ms(),
        ));
        Ok(identity)
    }

    /// The connection on `slot` is gone.
    pub fn on_disconnect(&self, slot: Slot) {
        self.registry.release(slot);
    }
}

/// Why the transport should reject a packet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngressError {
    #[error("malformed sender identity: {0}")]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
