//! Pairing, bonding and whitelist management
//!
//! The radio stack's peer manager owns the actual key exchange; this module
//! owns everything the driver decides for itself: whether an incoming
//! security-parameter negotiation is acceptable, how the bonding state
//! machine advances, when a lost-keys failure earns one automatic rebond,
//! and which bonded peers belong on the reconnect whitelist.

use crate::constants::{MAX_WHITELIST_PEERS, OOB_KEY_LEN, PASSKEY_LEN, PEER_ID_INVALID};
use crate::radio::{RadioError, RadioStack};
use heapless::Vec;

/// Peer-manager failure code for "one side lost its bonding keys".
///
/// Part of the [`RadioStack`] event contract; vendor glue maps its stack's
/// equivalent error onto this value.
pub const SEC_ERROR_PIN_OR_KEY_MISSING: u16 = 0x1002;

/// I/O capability class advertised during pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum IoCapability {
    /// Can show a passkey to the user
    DisplayOnly = 0,
    /// Can show a passkey and take a yes/no answer
    DisplayYesNo = 1,
    /// Can take a typed passkey
    KeyboardOnly = 2,
    /// No input, no output
    #[default]
    None = 3,
    /// Both display and keyboard
    KeyboardDisplay = 4,
}

impl IoCapability {
    /// Decode an I/O capability from its wire value
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(IoCapability::DisplayOnly),
            1 => Some(IoCapability::DisplayYesNo),
            2 => Some(IoCapability::KeyboardOnly),
            3 => Some(IoCapability::None),
            4 => Some(IoCapability::KeyboardDisplay),
            _ => None,
        }
    }

    const fn has_keyboard(self) -> bool {
        matches!(self, IoCapability::KeyboardOnly | IoCapability::KeyboardDisplay)
    }
}

/// Security parameters exchanged during pairing negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PairingParams {
    /// Bonding requested (keys stored for reconnection)
    pub bond: bool,
    /// Man-in-the-middle protection required
    pub mitm: bool,
    /// LE Secure Connections supported
    pub lesc: bool,
    /// Out-of-band pairing data available
    pub oob: bool,
    /// I/O capability class
    pub io_caps: IoCapability,
}

/// Encoded size of [`PairingParams`] on the event queue
pub const PAIRING_PARAMS_LEN: usize = 2;

impl PairingParams {
    /// Pack for the event queue
    #[must_use]
    pub fn to_bytes(&self) -> [u8; PAIRING_PARAMS_LEN] {
        let mut flags = 0u8;
        if self.bond {
            flags |= 0x01;
        }
        if self.mitm {
            flags |= 0x02;
        }
        if self.lesc {
            flags |= 0x04;
        }
        if self.oob {
            flags |= 0x08;
        }
        [flags, self.io_caps as u8]
    }

    /// Unpack from the event queue
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < PAIRING_PARAMS_LEN {
            return None;
        }
        Some(Self {
            bond: bytes[0] & 0x01 != 0,
            mitm: bytes[0] & 0x02 != 0,
            lesc: bytes[0] & 0x04 != 0,
            oob: bytes[0] & 0x08 != 0,
            io_caps: IoCapability::from_u8(bytes[1])?,
        })
    }
}

/// Local security configuration, applied when pairing is negotiated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityConfig {
    /// Perform bonding (store keys)
    pub bond: bool,
    /// Require man-in-the-middle protection
    pub mitm: bool,
    /// Offer LE Secure Connections
    pub lesc: bool,
    /// Local display available for passkey entry
    pub display: bool,
    /// Local keyboard available for passkey entry
    pub keyboard: bool,
    /// Accept pairing at all; `false` rejects every security procedure
    pub pairable: bool,
    /// Fixed out-of-band key used to answer auth-key requests
    pub oob_key: Option<[u8; OOB_KEY_LEN]>,
    /// Fixed passkey shown/exchanged during pairing
    pub passkey: Option<[u8; PASSKEY_LEN]>,
    /// Append newly bonded peers to the reconnect whitelist
    pub whitelist_on_bond: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            bond: true,
            mitm: false,
            lesc: false,
            display: false,
            keyboard: false,
            pairable: true,
            oob_key: None,
            passkey: None,
            whitelist_on_bond: false,
        }
    }
}

impl SecurityConfig {
    /// The pairing parameters this configuration offers a peer
    #[must_use]
    pub fn pairing_params(&self) -> PairingParams {
        let io_caps = match (self.display, self.keyboard) {
            (true, true) => IoCapability::KeyboardDisplay,
            (true, false) => IoCapability::DisplayOnly,
            (false, true) => IoCapability::KeyboardOnly,
            (false, false) => IoCapability::None,
        };
        PairingParams {
            bond: self.bond,
            mitm: self.mitm,
            lesc: self.lesc,
            oob: self.oob_key.is_some(),
            io_caps,
        }
    }
}

/// Can a pairing procedure between `own` and `peer` parameters succeed?
///
/// Implements the SMP authentication matrix: when we require MITM
/// protection and neither OOB data nor the I/O capability combination can
/// authenticate the link, the procedure is doomed and must be rejected up
/// front.
#[must_use]
pub fn params_compatible(own: &PairingParams, peer: &PairingParams) -> bool {
    let lesc = own.lesc && peer.lesc;
    let use_oob = if lesc {
        own.oob || peer.oob
    } else {
        own.oob && peer.oob
    };
    let authenticated = match peer.io_caps {
        IoCapability::DisplayOnly => own.io_caps.has_keyboard(),
        IoCapability::DisplayYesNo => {
            if lesc {
                own.io_caps.has_keyboard() || own.io_caps == IoCapability::DisplayYesNo
            } else {
                own.io_caps.has_keyboard()
            }
        }
        IoCapability::KeyboardOnly | IoCapability::KeyboardDisplay => {
            own.io_caps != IoCapability::None
        }
        IoCapability::None => false,
    };
    !(own.mitm && !use_oob && !authenticated)
}

/// Bonding progress reported by the radio stack's peer manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BondingStatus {
    /// A peer or the local side asked to secure the link
    Request = 0,
    /// The pairing procedure started
    Start = 1,
    /// The link is secured (and bonded, when a peer id is reported)
    Success = 2,
    /// The procedure failed
    Fail = 3,
}

impl BondingStatus {
    /// Decode a bonding status from its wire value
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(BondingStatus::Request),
            1 => Some(BondingStatus::Start),
            2 => Some(BondingStatus::Success),
            3 => Some(BondingStatus::Fail),
            _ => None,
        }
    }

    /// Short name surfaced to the application event sink
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            BondingStatus::Request => "request",
            BondingStatus::Start => "start",
            BondingStatus::Success => "success",
            BondingStatus::Fail => "fail",
        }
    }
}

/// Security negotiation state of the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SecurityState {
    /// No security procedure has run
    #[default]
    NoSecurity,
    /// A security request is outstanding
    PairingRequested,
    /// Pairing is in progress
    Pairing,
    /// The link is bonded
    Bonded,
    /// The last security procedure failed
    Failed,
}

/// Peer-manager identity of a bonded peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerId(pub u16);

impl PeerId {
    /// Decode a peer id, treating the invalid sentinel as `None`
    #[must_use]
    pub fn from_raw(raw: u16) -> Option<Self> {
        if raw == PEER_ID_INVALID {
            None
        } else {
            Some(Self(raw))
        }
    }
}

/// Security/bonding state machine and whitelist keeper
#[derive(Debug)]
pub struct SecurityManager {
    /// Local security configuration
    pub config: SecurityConfig,
    state: SecurityState,
    whitelist: Vec<PeerId, MAX_WHITELIST_PEERS>,
    whitelist_changed: bool,
    current_peer: Option<PeerId>,
    rebond_attempted: bool,
}

impl SecurityManager {
    /// Create a manager with the given configuration
    #[must_use]
    pub fn new(config: SecurityConfig) -> Self {
        Self {
            config,
            state: SecurityState::NoSecurity,
            whitelist: Vec::new(),
            whitelist_changed: false,
            current_peer: None,
            rebond_attempted: false,
        }
    }

    /// Current state of the security state machine
    #[must_use]
    pub fn state(&self) -> SecurityState {
        self.state
    }

    /// Would pairing with a peer offering `peer` parameters succeed?
    #[must_use]
    pub fn can_pair_with_peer(&self, peer: &PairingParams) -> bool {
        if !self.config.pairable {
            return false;
        }
        params_compatible(&self.config.pairing_params(), peer)
    }

    /// Advance the state machine on a bonding-status report.
    ///
    /// On success with a reported peer id the peer is recorded and, if the
    /// whitelist-on-bond policy is active, appended to the whitelist
    /// (de-duplicated).
    pub fn on_bonding_status(&mut self, status: BondingStatus, peer: Option<PeerId>) {
        match status {
            BondingStatus::Request => {
                self.state = SecurityState::PairingRequested;
                self.rebond_attempted = false;
            }
            BondingStatus::Start => {
                self.state = SecurityState::Pairing;
            }
            BondingStatus::Success => {
                self.state = SecurityState::Bonded;
                if let Some(peer) = peer {
                    self.current_peer = Some(peer);
                    if self.config.whitelist_on_bond {
                        self.add_to_whitelist(peer);
                    }
                }
            }
            BondingStatus::Fail => {
                self.state = SecurityState::Failed;
            }
        }
    }

    /// A previously bonded peer reconnected
    pub fn note_bonded_peer(&mut self, peer: PeerId) {
        self.current_peer = Some(peer);
    }

    /// Peer the last successful procedure bonded with
    #[must_use]
    pub fn current_peer(&self) -> Option<PeerId> {
        self.current_peer
    }

    /// Does this security failure earn the one automatic rebond attempt?
    ///
    /// Only the "pin or key missing" error qualifies (one side lost its
    /// bonding state), and only once per pairing attempt.
    pub fn should_rebond(&mut self, error: u16) -> bool {
        if error == SEC_ERROR_PIN_OR_KEY_MISSING && !self.rebond_attempted {
            self.rebond_attempted = true;
            true
        } else {
            false
        }
    }

    /// Append a peer to the whitelist; returns `true` if it was added.
    ///
    /// Duplicates and overflow are ignored, matching the bounded
    /// hardware-backed list.
    pub fn add_to_whitelist(&mut self, peer: PeerId) -> bool {
        if self.whitelist.contains(&peer) {
            return false;
        }
        if self.whitelist.push(peer).is_ok() {
            self.whitelist_changed = true;
            true
        } else {
            false
        }
    }

    /// Peers currently on the whitelist
    #[must_use]
    pub fn whitelist(&self) -> &[PeerId] {
        &self.whitelist
    }

    /// Has the whitelist changed since it was last pushed to the radio stack?
    #[must_use]
    pub fn whitelist_dirty(&self) -> bool {
        self.whitelist_changed
    }

    /// Push the whitelist to the radio stack if it changed
    pub fn flush_whitelist<R: RadioStack>(&mut self, radio: &mut R) -> Result<(), RadioError> {
        if self.whitelist_changed {
            radio.set_whitelist(&self.whitelist)?;
            self.whitelist_changed = false;
        }
        Ok(())
    }

    /// Enable or disable the whitelist-on-bond policy.
    ///
    /// Disabling clears the whitelist and marks it for flushing.
    pub fn set_whitelist_on_bond(&mut self, enabled: bool) {
        self.config.whitelist_on_bond = enabled;
        if !enabled && !self.whitelist.is_empty() {
            self.whitelist.clear();
            self.whitelist_changed = true;
        }
    }

    /// Erase all bonding information
    pub fn erase_bonds<R: RadioStack>(&mut self, radio: &mut R) -> Result<(), RadioError> {
        radio.erase_bonds()?;
        self.whitelist.clear();
        self.whitelist_changed = true;
        self.current_peer = None;
        self.state = SecurityState::NoSecurity;
        Ok(())
    }
}

/// Name for a raw authentication status code, when it is a known one
#[must_use]
pub fn auth_status_name(status: u8) -> Option<&'static str> {
    match status {
        0x00 => Some("SUCCESS"),
        0x01 => Some("TIMEOUT"),
        0x02 => Some("PDU_INVALID"),
        0x81 => Some("PASSKEY_ENTRY_FAILED"),
        0x82 => Some("OOB_NOT_AVAILABLE"),
        0x83 => Some("AUTH_REQ"),
        0x84 => Some("CONFIRM_VALUE"),
        0x85 => Some("PAIRING_NOT_SUPP"),
        0x86 => Some("ENC_KEY_SIZE"),
        0x87 => Some("SMP_CMD_UNSUPPORTED"),
        0x88 => Some("UNSPECIFIED"),
        0x89 => Some("REPEATED_ATTEMPTS"),
        0x8A => Some("INVALID_PARAMS"),
        0x8B => Some("DHKEY_FAILURE"),
        0x8C => Some("NUM_COMP_FAILURE"),
        0x8D => Some("BR_EDR_IN_PROG"),
        0x8E => Some("X_TRANS_KEY_DISALLOWED"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(mitm: bool, lesc: bool, oob: bool, io_caps: IoCapability) -> PairingParams {
        PairingParams {
            bond: true,
            mitm,
            lesc,
            oob,
            io_caps,
        }
    }

    #[test]
    fn test_pairing_params_roundtrip() {
        let p = params(true, true, false, IoCapability::KeyboardDisplay);
        assert_eq!(PairingParams::from_bytes(&p.to_bytes()), Some(p));
        assert!(PairingParams::from_bytes(&[0x01]).is_none());
    }

    #[test]
    fn test_config_io_caps_mapping() {
        let mut config = SecurityConfig::default();
        assert_eq!(config.pairing_params().io_caps, IoCapability::None);
        config.display = true;
        assert_eq!(config.pairing_params().io_caps, IoCapability::DisplayOnly);
        config.keyboard = true;
        assert_eq!(config.pairing_params().io_caps, IoCapability::KeyboardDisplay);
        config.display = false;
        assert_eq!(config.pairing_params().io_caps, IoCapability::KeyboardOnly);
    }

    #[test]
    fn test_no_mitm_is_always_compatible() {
        let own = params(false, false, false, IoCapability::None);
        let peer = params(false, false, false, IoCapability::None);
        assert!(params_compatible(&own, &peer));
    }

    #[test]
    fn test_mitm_without_io_rejected() {
        // We demand MITM but neither side can authenticate
        let own = params(true, false, false, IoCapability::None);
        let peer = params(false, false, false, IoCapability::DisplayOnly);
        assert!(!params_compatible(&own, &peer));
    }

    #[test]
    fn test_mitm_with_keyboard_against_display() {
        let own = params(true, false, false, IoCapability::KeyboardOnly);
        let peer = params(false, false, false, IoCapability::DisplayOnly);
        assert!(params_compatible(&own, &peer));
    }

    #[test]
    fn test_mitm_display_yesno_requires_lesc() {
        let own = params(true, false, false, IoCapability::DisplayYesNo);
        let peer = params(false, false, false, IoCapability::DisplayYesNo);
        assert!(!params_compatible(&own, &peer));

        let own = params(true, true, false, IoCapability::DisplayYesNo);
        let peer = params(false, true, false, IoCapability::DisplayYesNo);
        assert!(params_compatible(&own, &peer));
    }

    #[test]
    fn test_mitm_oob_bypasses_io_matrix() {
        // Legacy pairing needs OOB on both sides
        let own = params(true, false, true, IoCapability::None);
        let peer = params(false, false, false, IoCapability::None);
        assert!(!params_compatible(&own, &peer));

        let peer_with_oob = params(false, false, true, IoCapability::None);
        assert!(params_compatible(&own, &peer_with_oob));

        // LESC needs it on only one side
        let own_lesc = params(true, true, true, IoCapability::None);
        let peer_lesc = params(false, true, false, IoCapability::None);
        assert!(params_compatible(&own_lesc, &peer_lesc));
    }

    #[test]
    fn test_not_pairable_rejects_everything() {
        let mut manager = SecurityManager::new(SecurityConfig::default());
        manager.config.pairable = false;
        let peer = params(false, false, false, IoCapability::KeyboardDisplay);
        assert!(!manager.can_pair_with_peer(&peer));
    }

    #[test]
    fn test_state_machine_transitions() {
        let mut manager = SecurityManager::new(SecurityConfig::default());
        assert_eq!(manager.state(), SecurityState::NoSecurity);

        manager.on_bonding_status(BondingStatus::Request, None);
        assert_eq!(manager.state(), SecurityState::PairingRequested);

        manager.on_bonding_status(BondingStatus::Start, None);
        assert_eq!(manager.state(), SecurityState::Pairing);

        manager.on_bonding_status(BondingStatus::Success, Some(PeerId(3)));
        assert_eq!(manager.state(), SecurityState::Bonded);
        assert_eq!(manager.current_peer(), Some(PeerId(3)));

        manager.on_bonding_status(BondingStatus::Fail, None);
        assert_eq!(manager.state(), SecurityState::Failed);
    }

    #[test]
    fn test_whitelist_on_bond_appends_once() {
        let mut manager = SecurityManager::new(SecurityConfig {
            whitelist_on_bond: true,
            ..SecurityConfig::default()
        });

        manager.on_bonding_status(BondingStatus::Success, Some(PeerId(7)));
        manager.on_bonding_status(BondingStatus::Success, Some(PeerId(7)));
        manager.note_bonded_peer(PeerId(7));
        assert_eq!(manager.whitelist(), &[PeerId(7)]);
        assert!(manager.whitelist_dirty());
    }

    #[test]
    fn test_whitelist_ignored_without_policy() {
        let mut manager = SecurityManager::new(SecurityConfig::default());
        manager.on_bonding_status(BondingStatus::Success, Some(PeerId(1)));
        assert!(manager.whitelist().is_empty());
    }

    #[test]
    fn test_whitelist_is_bounded() {
        let mut manager = SecurityManager::new(SecurityConfig {
            whitelist_on_bond: true,
            ..SecurityConfig::default()
        });
        for i in 0..(MAX_WHITELIST_PEERS as u16 + 3) {
            manager.add_to_whitelist(PeerId(i));
        }
        assert_eq!(manager.whitelist().len(), MAX_WHITELIST_PEERS);
    }

    #[test]
    fn test_rebond_only_once_per_attempt() {
        let mut manager = SecurityManager::new(SecurityConfig::default());
        assert!(manager.should_rebond(SEC_ERROR_PIN_OR_KEY_MISSING));
        assert!(!manager.should_rebond(SEC_ERROR_PIN_OR_KEY_MISSING));

        // A fresh pairing request re-arms the retry
        manager.on_bonding_status(BondingStatus::Request, None);
        assert!(manager.should_rebond(SEC_ERROR_PIN_OR_KEY_MISSING));
    }

    #[test]
    fn test_rebond_ignores_other_errors() {
        let mut manager = SecurityManager::new(SecurityConfig::default());
        assert!(!manager.should_rebond(0x0001));
    }

    #[test]
    fn test_disable_whitelist_on_bond_clears_list() {
        let mut manager = SecurityManager::new(SecurityConfig {
            whitelist_on_bond: true,
            ..SecurityConfig::default()
        });
        manager.add_to_whitelist(PeerId(2));
        manager.set_whitelist_on_bond(false);
        assert!(manager.whitelist().is_empty());
        assert!(manager.whitelist_dirty());
    }

    #[test]
    fn test_auth_status_names() {
        assert_eq!(auth_status_name(0x00), Some("SUCCESS"));
        assert_eq!(auth_status_name(0x85), Some("PAIRING_NOT_SUPP"));
        assert_eq!(auth_status_name(0x55), None);
    }
}
