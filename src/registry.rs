//! Connection registry
//!
//! Tracks the single peripheral-role link and the fixed pool of central-role
//! link slots. Every other component looks links up here; all mutation
//! happens in application context during event dispatch.

use crate::address::PeerAddress;
use crate::constants::{CENTRAL_LINK_COUNT, DEFAULT_ATT_MTU, MAX_ATT_MTU};
use crate::radio::LinkRole;

/// The peripheral-role link (a peer connected to us)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeripheralLink {
    /// Link handle
    pub handle: u16,
    /// Address of the connected peer
    pub peer: PeerAddress,
    /// Effective ATT MTU on this link
    pub mtu: u16,
}

/// One central-role link (we connected out)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CentralLink {
    /// Link handle
    pub handle: u16,
    /// Effective ATT MTU on this link
    pub mtu: u16,
}

/// Registry of all live links
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    peripheral: Option<PeripheralLink>,
    central: [Option<CentralLink>; CENTRAL_LINK_COUNT],
}

impl ConnectionRegistry {
    /// Create an empty registry
    #[must_use]
    pub const fn new() -> Self {
        Self {
            peripheral: None,
            central: [None; CENTRAL_LINK_COUNT],
        }
    }

    /// The peripheral link, if a peer is connected
    #[must_use]
    pub fn peripheral(&self) -> Option<&PeripheralLink> {
        self.peripheral.as_ref()
    }

    /// Is a peer connected to us?
    #[must_use]
    pub fn has_peripheral_connection(&self) -> bool {
        self.peripheral.is_some()
    }

    /// Do we hold any central link?
    #[must_use]
    pub fn has_central_connection(&self) -> bool {
        self.central.iter().any(Option::is_some)
    }

    /// Is any link up at all?
    #[must_use]
    pub fn has_connection(&self) -> bool {
        self.has_peripheral_connection() || self.has_central_connection()
    }

    /// Record the peripheral link on a connect event
    pub fn set_peripheral(&mut self, handle: u16, peer: PeerAddress) {
        self.peripheral = Some(PeripheralLink {
            handle,
            peer,
            mtu: DEFAULT_ATT_MTU,
        });
    }

    /// Drop the peripheral link, returning it if one was up
    pub fn clear_peripheral(&mut self) -> Option<PeripheralLink> {
        self.peripheral.take()
    }

    /// Is `handle` the peripheral link?
    #[must_use]
    pub fn is_peripheral(&self, handle: u16) -> bool {
        self.peripheral.map(|p| p.handle) == Some(handle)
    }

    /// Claim a central slot for a new link.
    ///
    /// Returns the slot index, or `None` when the handle is already
    /// registered (a handle lives in at most one slot) or every slot is
    /// taken.
    pub fn claim_central(&mut self, handle: u16) -> Option<usize> {
        if self.central_index(handle).is_some() {
            return None;
        }
        let slot = self.central.iter().position(Option::is_none)?;
        self.central[slot] = Some(CentralLink {
            handle,
            mtu: DEFAULT_ATT_MTU,
        });
        Some(slot)
    }

    /// Release the central slot holding `handle`, returning its index
    pub fn release_central(&mut self, handle: u16) -> Option<usize> {
        let slot = self.central_index(handle)?;
        self.central[slot] = None;
        Some(slot)
    }

    /// Slot index of the central link with `handle`
    #[must_use]
    pub fn central_index(&self, handle: u16) -> Option<usize> {
        self.central
            .iter()
            .position(|link| link.map(|l| l.handle) == Some(handle))
    }

    /// Handle of the central link in `slot`
    #[must_use]
    pub fn central_handle(&self, slot: usize) -> Option<u16> {
        self.central.get(slot)?.map(|link| link.handle)
    }

    /// Role of the link with `handle`, if it is registered
    #[must_use]
    pub fn role_of(&self, handle: u16) -> Option<LinkRole> {
        if self.is_peripheral(handle) {
            Some(LinkRole::Peripheral)
        } else if self.central_index(handle).is_some() {
            Some(LinkRole::Central)
        } else {
            None
        }
    }

    /// Record a negotiated MTU, clamped to the supported range.
    ///
    /// Returns `false` when no link with `handle` exists.
    pub fn set_mtu(&mut self, handle: u16, mtu: u16) -> bool {
        let mtu = mtu.clamp(DEFAULT_ATT_MTU, MAX_ATT_MTU);
        if let Some(peripheral) = self.peripheral.as_mut() {
            if peripheral.handle == handle {
                peripheral.mtu = mtu;
                return true;
            }
        }
        for link in self.central.iter_mut().flatten() {
            if link.handle == handle {
                link.mtu = mtu;
                return true;
            }
        }
        false
    }

    /// Effective MTU of the link with `handle`
    #[must_use]
    pub fn mtu_of(&self, handle: u16) -> Option<u16> {
        if let Some(peripheral) = self.peripheral {
            if peripheral.handle == handle {
                return Some(peripheral.mtu);
            }
        }
        self.central
            .iter()
            .flatten()
            .find(|link| link.handle == handle)
            .map(|link| link.mtu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::PeerAddress;

    fn addr() -> PeerAddress {
        PeerAddress::public([1, 2, 3, 4, 5, 6])
    }

    #[test]
    fn test_empty_registry() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.has_connection());
        assert!(!registry.has_peripheral_connection());
        assert!(!registry.has_central_connection());
    }

    #[test]
    fn test_peripheral_lifecycle() {
        let mut registry = ConnectionRegistry::new();
        registry.set_peripheral(0x10, addr());
        assert!(registry.has_peripheral_connection());
        assert!(registry.is_peripheral(0x10));
        assert_eq!(registry.role_of(0x10), Some(LinkRole::Peripheral));
        assert_eq!(registry.peripheral().unwrap().mtu, DEFAULT_ATT_MTU);

        let link = registry.clear_peripheral().unwrap();
        assert_eq!(link.handle, 0x10);
        assert!(!registry.has_connection());
    }

    #[test]
    fn test_central_claim_and_release() {
        let mut registry = ConnectionRegistry::new();
        let slot_a = registry.claim_central(0x20).unwrap();
        let slot_b = registry.claim_central(0x21).unwrap();
        assert_ne!(slot_a, slot_b);
        assert!(registry.has_central_connection());
        assert_eq!(registry.central_index(0x21), Some(slot_b));
        assert_eq!(registry.central_handle(slot_a), Some(0x20));
        assert_eq!(registry.role_of(0x20), Some(LinkRole::Central));

        assert_eq!(registry.release_central(0x20), Some(slot_a));
        assert_eq!(registry.central_index(0x20), None);
        // Released slot can be claimed again
        assert_eq!(registry.claim_central(0x22), Some(slot_a));
    }

    #[test]
    fn test_central_slots_are_exhaustible() {
        let mut registry = ConnectionRegistry::new();
        for i in 0..CENTRAL_LINK_COUNT as u16 {
            assert!(registry.claim_central(0x30 + i).is_some());
        }
        assert_eq!(registry.claim_central(0x3F), None);
    }

    #[test]
    fn test_handle_lives_in_at_most_one_slot() {
        let mut registry = ConnectionRegistry::new();
        assert!(registry.claim_central(0x20).is_some());
        assert_eq!(registry.claim_central(0x20), None);
        assert_eq!(registry.central_index(0x20), Some(0));
    }

    #[test]
    fn test_mtu_clamped_to_supported_range() {
        let mut registry = ConnectionRegistry::new();
        registry.set_peripheral(0x10, addr());
        registry.claim_central(0x20);

        assert!(registry.set_mtu(0x10, 512));
        assert_eq!(registry.mtu_of(0x10), Some(MAX_ATT_MTU));

        assert!(registry.set_mtu(0x20, 5));
        assert_eq!(registry.mtu_of(0x20), Some(DEFAULT_ATT_MTU));

        assert!(!registry.set_mtu(0x99, 40));
        assert_eq!(registry.mtu_of(0x99), None);
    }
}
