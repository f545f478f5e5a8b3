//! peerlog-core — peer identity, packet records, and configuration.
//! The registry and logger crates build on these types.

pub mod config;
pub mod identity;
pub mod record;

pub use identity::{IdentityError, PeerAddress, PeerIdentity};
pub use record::{Direction, MonotonicClock, PacketRecord, RawPacket};
