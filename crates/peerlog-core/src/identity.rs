//! Peer identity — one value for "who is on the other end".
//!
//! A remote peer is known by its network address, by a stable 64-bit handle,
//! or by both once a handshake has tied the two together. `PeerIdentity`
//! carries whichever is known. It owns no resources and is `Copy`, so every
//! layer can compare and pass it around freely. The only place an identity
//! is upgraded is the registry.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};
use static_assertions::assert_impl_all;

use crate::record::RawPacket;

/// Handle value reserved for "no handle". Never a valid peer handle.
pub const UNASSIGNED_HANDLE: u64 = 0;

// ── Address ───────────────────────────────────────────────────────────────────

/// Network-layer address of a peer as seen by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    pub ip: IpAddr,
    pub port: u16,
    /// Transport protocol version the peer speaks on this address.
    pub protocol_version: u8,
}

impl PeerAddress {
    pub fn new(ip: IpAddr, port: u16, protocol_version: u8) -> Self {
        Self {
            ip,
            port,
            protocol_version,
        }
    }

    pub fn from_socket(addr: SocketAddr, protocol_version: u8) -> Self {
        Self::new(addr.ip(), addr.port(), protocol_version)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// The IPv4 form of this address, if it has one (native or v4-mapped).
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        match self.ip {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(v6) => v6.to_ipv4_mapped(),
        }
    }

    fn render(&self, include_port: bool) -> String {
        match (self.ip, include_port) {
            (ip, false) => ip.to_string(),
            (IpAddr::V4(v4), true) => format!("{v4}:{}", self.port),
            (IpAddr::V6(v6), true) => format!("[{v6}]:{}", self.port),
        }
    }
}

// ── Identity ──────────────────────────────────────────────────────────────────

/// Canonical reference to a remote peer.
///
/// Equality follows the handle when both sides have one, and falls back to
/// the address otherwise. That relation is not transitive (two `Both`
/// values with different handles can each equal the same `ByAddress`), so
/// the type implements `PartialEq` only. Use [`PeerIdentity::digest`], the
/// handle or the [`PeerAddress`] as map keys.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PeerIdentity {
    /// No known reference.
    #[default]
    Undefined,
    ByAddress { address: PeerAddress },
    ByHandle { handle: u64 },
    /// Address and handle both known and presumed consistent.
    Both { address: PeerAddress, handle: u64 },
}

assert_impl_all!(PeerIdentity: Copy, Send, Sync);

impl PeerIdentity {
    /// Identity from the source address of a packet. Always succeeds.
    pub fn from_address(ip: IpAddr, port: u16, protocol_version: u8) -> Self {
        Self::ByAddress {
            address: PeerAddress::new(ip, port, protocol_version),
        }
    }

    /// Identity from a handle revealed by a handshake.
    pub fn from_handle(handle: u64) -> Result<Self, IdentityError> {
        check_handle(handle)?;
        Ok(Self::ByHandle { handle })
    }

    /// Identity with both components known.
    pub fn from_both(address: PeerAddress, handle: u64) -> Result<Self, IdentityError> {
        check_handle(handle)?;
        Ok(Self::Both { address, handle })
    }

    /// Identity from whatever the transport attached to a packet.
    ///
    /// A packet carrying neither an address nor a handle yields `Undefined`.
    /// A zero handle on the wire is rejected rather than treated as absent.
    pub fn from_packet(packet: &RawPacket) -> Result<Self, IdentityError> {
        match (packet.source_address, packet.source_handle) {
            (None, None) => Ok(Self::Undefined),
            (Some(address), None) => Ok(Self::ByAddress { address }),
            (None, Some(handle)) => Self::from_handle(handle),
            (Some(address), Some(handle)) => Self::from_both(address, handle),
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Clear to `Undefined`. Registry entries keyed by the old value are untouched.
    pub fn set_undefined(&mut self) {
        *self = Self::Undefined;
    }

    pub fn address(&self) -> Option<PeerAddress> {
        match self {
            Self::ByAddress { address } | Self::Both { address, .. } => Some(*address),
            _ => None,
        }
    }

    pub fn handle(&self) -> Option<u64> {
        match self {
            Self::ByHandle { handle } | Self::Both { handle, .. } => Some(*handle),
            _ => None,
        }
    }

    /// This identity with its address replaced (or added).
    pub fn with_address(self, address: PeerAddress) -> Self {
        match self.handle() {
            Some(handle) => Self::Both { address, handle },
            None => Self::ByAddress { address },
        }
    }

    /// This identity with its handle set. Fails on the reserved handle.
    pub fn with_handle(self, handle: u64) -> Result<Self, IdentityError> {
        match self.address() {
            Some(address) => Self::from_both(address, handle),
            None => Self::from_handle(handle),
        }
    }

    /// This identity with the address component dropped.
    pub fn without_address(self) -> Self {
        match self.handle() {
            Some(handle) => Self::ByHandle { handle },
            None => Self::Undefined,
        }
    }

    /// Do both values refer to the same peer?
    pub fn equals(&self, other: &PeerIdentity) -> bool {
        if self.is_undefined() || other.is_undefined() {
            return self.is_undefined() && other.is_undefined();
        }
        if let (Some(a), Some(b)) = (self.handle(), other.handle()) {
            return a == b;
        }
        match (self.address(), other.address()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// 32-bit summary of this identity for fast keying.
    ///
    /// Identities with a handle fold it: `(handle >> 32) ^ (handle & 0xffff_ffff)`.
    /// The fold is injective for handles below 2^32. Address-only identities
    /// reduce only when the address is IPv4 (native or v4-mapped): the IPv4
    /// word is mixed with `(port << 8 | version)` rotated by 16 bits. Native
    /// IPv6 and `Undefined` have no reduction.
    pub fn digest(&self) -> Result<u32, IdentityError> {
        if let Some(handle) = self.handle() {
            return Ok(((handle >> 32) as u32) ^ (handle as u32));
        }
        let address = self.address().ok_or(IdentityError::UnsupportedReduction)?;
        let v4 = address.ipv4().ok_or(IdentityError::UnsupportedReduction)?;
        let tail = ((address.port as u32) << 8) | address.protocol_version as u32;
        Ok(u32::from(v4) ^ tail.rotate_left(16))
    }

    /// Human-readable form for logs. Never used for equality.
    pub fn render(&self, include_port: bool) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::ByAddress { address } | Self::Both { address, .. } => {
                address.render(include_port)
            }
            Self::ByHandle { handle } => format!("#{}", hex::encode(handle.to_be_bytes())),
        }
    }
}

impl PartialEq for PeerIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(true))
    }
}

fn check_handle(handle: u64) -> Result<(), IdentityError> {
    if handle == UNASSIGNED_HANDLE {
        Err(IdentityError::InvalidHandle)
    } else {
        Ok(())
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("handle 0 is reserved for undefined peers")]
    InvalidHandle,

    #[error("identity has no component that reduces to a 32-bit digest")]
    UnsupportedReduction,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
