//! Slot lifecycle as the transport sees it.

use anyhow::Result;
use bytes::Bytes;
use peerlog_core::identity::PeerIdentity;
use peerlog_core::record::{Direction, RawPacket};
use peerlog_services::{
    IdentityRegistry, IngressError, LoggerConfig, PacketIngress, PacketLogger, RegistryError,
    SlotState,
};

use crate::v4;

#[test]
fn address_then_handle_then_release() -> Result<()> {
    let registry = IdentityRegistry::new(16);
    let addr = v4(10, 0, 0, 5, 4000);

    registry.bind(3, PeerIdentity::ByAddress { address: addr })?;
    assert_eq!(registry.state(3), SlotState::AddressKnown);

    let merged = registry.bind(3, PeerIdentity::from_handle(0xABCD)?)?;
    assert!(matches!(merged, PeerIdentity::Both { handle: 0xABCD, .. }));
    assert_eq!(registry.lookup_by_handle(0xABCD), Some(3));
    assert_eq!(registry.lookup_by_address(&addr), Some(3));

    registry.release(3);
    assert_eq!(registry.lookup_by_handle(0xABCD), None);
    assert_eq!(registry.lookup_by_address(&addr), None);
    assert!(registry.resolve(3)?.is_undefined());
    Ok(())
}

#[test]
fn never_allocated_slot_is_unknown() {
    let registry = IdentityRegistry::new(16);
    assert_eq!(registry.resolve(9), Err(RegistryError::UnknownSlot(9)));
}

#[test]
fn fully_known_survives_address_only_traffic() -> Result<()> {
    let registry = IdentityRegistry::new(16);
    registry.bind(1, PeerIdentity::from_both(v4(10, 0, 0, 5, 4000), 42)?)?;
    for port in [4000, 4001, 4002] {
        registry.bind(1, PeerIdentity::ByAddress { address: v4(10, 0, 0, 5, port) })?;
        assert_eq!(registry.state(1), SlotState::FullyKnown);
    }
    assert_eq!(registry.lookup_by_address(&v4(10, 0, 0, 5, 4002)), Some(1));
    assert_eq!(registry.lookup_by_address(&v4(10, 0, 0, 5, 4000)), None);
    Ok(())
}

#[test]
fn nat_rebind_moves_address_between_slots() -> Result<()> {
    let registry = IdentityRegistry::new(16);
    let shared = v4(198, 51, 100, 7, 9000);
    registry.bind(1, PeerIdentity::from_both(shared, 1)?)?;
    // Peer 1 went quiet; a new peer now holds the NAT mapping.
    registry.bind(2, PeerIdentity::from_both(shared, 2)?)?;

    assert_eq!(registry.lookup_by_address(&shared), Some(2));
    assert_eq!(registry.resolve(1)?.address(), None);
    assert_eq!(registry.lookup_by_handle(1), Some(1));
    Ok(())
}

#[test]
fn ingress_rejects_bad_identities_without_logging() -> Result<()> {
    let logger = PacketLogger::shared(LoggerConfig::default());
    let ingress = PacketIngress::new(IdentityRegistry::shared(4), logger.clone());

    let zero_handle = RawPacket {
        source_address: None,
        source_handle: Some(0),
        payload: Bytes::from_static(b"x"),
        direction: Direction::Inbound,
        timestamp_ms: 1,
    };
    assert!(matches!(
        ingress.on_packet(0, &zero_handle),
        Err(IngressError::Identity(_))
    ));

    let out_of_pool = RawPacket::inbound(Some(v4(10, 0, 0, 1, 1)), None, Bytes::new());
    assert!(matches!(
        ingress.on_packet(4, &out_of_pool),
        Err(IngressError::Registry(RegistryError::UnknownSlot(4)))
    ));
    assert_eq!(logger.stats().lines_written, 0);
    Ok(())
}
