//! Identity registry — which peer sits behind each connection slot.
//!
//! Slots come from a bounded pool. Each slot holds one `PeerIdentity`, and
//! two reverse indices (handle → slot, address → slot) answer lookups in
//! either direction in O(1).
//!
//! Readers go straight to the `DashMap`s. Identities are `Copy` and are
//! replaced whole, so a reader sees either the old or the merged identity,
//! never a mix. Writers (`bind`, `release`) take the write lock so that the
//! three maps move together and the one-slot-per-handle / one-slot-per-address
//! invariants hold across slots.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use peerlog_core::identity::{IdentityError, PeerAddress, PeerIdentity};

/// Index into the connection pool.
pub type Slot = u16;

/// Progress of a slot towards a fully attributed peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Never bound, or released.
    Empty,
    /// Only the source address is known.
    AddressKnown,
    /// The handle is known. The only state where digest-keyed fast paths
    /// survive a rebind.
    FullyKnown,
}

impl SlotState {
    pub fn of(identity: &PeerIdentity) -> Self {
        match identity {
            PeerIdentity::Undefined => SlotState::Empty,
            PeerIdentity::ByAddress { .. } => SlotState::AddressKnown,
            PeerIdentity::ByHandle { .. } | PeerIdentity::Both { .. } => SlotState::FullyKnown,
        }
    }
}

/// Slot table plus reverse indices. Cheap to share: wrap in `Arc`.
pub struct IdentityRegistry {
    capacity: u16,
    slots: DashMap<Slot, PeerIdentity>,
    by_handle: DashMap<u64, Slot>,
    by_address: DashMap<PeerAddress, Slot>,
    write_lock: Mutex<()>,
}

pub type SharedRegistry = Arc<IdentityRegistry>;

impl IdentityRegistry {
    /// Registry with slots `0..capacity`.
    pub fn new(capacity: u16) -> Self {
        Self {
            capacity,
            slots: DashMap::new(),
            by_handle: DashMap::new(),
            by_address: DashMap::new(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn shared(capacity: u16) -> SharedRegistry {
        Arc::new(Self::new(capacity))
    }

    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    /// Slots currently holding a defined identity.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|e| !e.value().is_undefined()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current identity in `slot`.
    ///
    /// A released slot resolves to `Undefined`. A slot that was never bound,
    /// or lies outside the pool, is `UnknownSlot`.
    pub fn resolve(&self, slot: Slot) -> Result<PeerIdentity, RegistryError> {
        self.slots
            .get(&slot)
            .map(|e| *e.value())
            .ok_or(RegistryError::UnknownSlot(slot))
    }

    pub fn state(&self, slot: Slot) -> SlotState {
        self.slots
            .get(&slot)
            .map(|e| SlotState::of(e.value()))
            .unwrap_or(SlotState::Empty)
    }

    pub fn lookup_by_handle(&self, handle: u64) -> Option<Slot> {
        self.by_handle.get(&handle).map(|e| *e.value())
    }

    pub fn lookup_by_address(&self, address: &PeerAddress) -> Option<Slot> {
        self.by_address.get(address).map(|e| *e.value())
    }

    /// Bind `identity` to `slot`, merging with what the slot already holds.
    ///
    /// A handle, once set, is fixed for the slot. An address is refreshed to
    /// the most recent one (NAT rebind), and any other slot still claiming
    /// that address loses it. Returns the merged identity.
    pub fn bind(&self, slot: Slot, identity: PeerIdentity) -> Result<PeerIdentity, RegistryError> {
        if slot >= self.capacity {
            return Err(RegistryError::UnknownSlot(slot));
        }
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let current = self.slots.get(&slot).map(|e| *e.value()).unwrap_or_default();
        if identity.is_undefined() {
            return Ok(current);
        }

        let mut merged = current;
        if let Some(handle) = identity.handle() {
            match self.lookup_by_handle(handle) {
                Some(owner) if owner != slot => {
                    return Err(RegistryError::HandleCollision { handle, slot, owner });
                }
                _ => {}
            }
            match current.handle() {
                Some(bound) if bound != handle => {
                    return Err(RegistryError::HandleMismatch {
                        slot,
                        bound,
                        offered: handle,
                    });
                }
                Some(_) => {}
                None => merged = merged.with_handle(handle)?,
            }
        }
        if let Some(address) = identity.address() {
            merged = merged.with_address(address);
        }

        // Slot before indices: a reader that reaches the slot through an
        // index sees the merged identity.
        if let Some(old) = current.address() {
            if Some(old) != merged.address() {
                self.by_address.remove_if(&old, |_, owner| *owner == slot);
            }
        }
        self.slots.insert(slot, merged);
        if let Some(address) = merged.address() {
            if let Some(previous) = self.by_address.insert(address, slot) {
                if previous != slot {
                    self.purge_address(previous, &address);
                }
            }
        }
        if let Some(handle) = merged.handle() {
            self.by_handle.insert(handle, slot);
        }

        if SlotState::of(&current) != SlotState::of(&merged) {
            tracing::debug!(
                slot,
                peer = %merged,
                from = ?SlotState::of(&current),
                to = ?SlotState::of(&merged),
                "slot state changed"
            );
        }
        Ok(merged)
    }

    /// Clear `slot` and its index entries. Idempotent.
    pub fn release(&self, slot: Slot) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let Some(mut entry) = self.slots.get_mut(&slot) else {
            return;
        };
        let identity = *entry.value();
        if let Some(handle) = identity.handle() {
            self.by_handle.remove_if(&handle, |_, owner| *owner == slot);
        }
        if let Some(address) = identity.address() {
            self.by_address.remove_if(&address, |_, owner| *owner == slot);
        }
        entry.value_mut().set_undefined();

        if !identity.is_undefined() {
            tracing::debug!(slot, peer = %identity, "slot released");
        }
    }

    /// (slot, identity) for every slot holding a defined identity, ordered by slot.
    pub fn snapshot(&self) -> Vec<(Slot, PeerIdentity)> {
        let mut out: Vec<_> = self
            .slots
            .iter()
            .filter(|e| !e.value().is_undefined())
            .map(|e| (*e.key(), *e.value()))
            .collect();
        out.sort_by_key(|(slot, _)| *slot);
        out
    }

    /// Another slot held `address` stale; strip it from that slot.
    fn purge_address(&self, slot: Slot, address: &PeerAddress) {
        if let Some(mut entry) = self.slots.get_mut(&slot) {
            if entry.value().address().as_ref() == Some(address) {
                let stripped = entry.value().without_address();
                *entry.value_mut() = stripped;
                tracing::debug!(slot, addr = %address.socket_addr(), "stale address mapping purged");
            }
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("slot {0} is not allocated")]
    UnknownSlot(Slot),

    #[error("handle {handle:#018x} is already bound to slot {owner}, refusing slot {slot}")]
    HandleCollision { handle: u64, slot: Slot, owner: Slot },

    #[error("slot {slot} is bound to handle {bound:#018x}, refusing {offered:#018x}")]
    HandleMismatch { slot: Slot, bound: u64, offered: u64 },

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
