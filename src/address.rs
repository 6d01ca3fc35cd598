use crate::BleError;

/// BLE device address kind, as reported by the radio stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AddressKind {
    /// Public (IEEE-registered) address
    #[default]
    Public = 0,
    /// Random static address
    RandomStatic = 1,
    /// Random private resolvable address
    RandomPrivateResolvable = 2,
    /// Random private non-resolvable address
    RandomPrivateNonResolvable = 3,
}

impl AddressKind {
    /// Decode an address kind from its wire value
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(AddressKind::Public),
            1 => Some(AddressKind::RandomStatic),
            2 => Some(AddressKind::RandomPrivateResolvable),
            3 => Some(AddressKind::RandomPrivateNonResolvable),
            _ => None,
        }
    }
}

/// A BLE peer address: address kind plus six octets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerAddress {
    /// Address kind (public or one of the random flavours)
    pub kind: AddressKind,
    /// Raw address octets
    pub octets: [u8; 6],
}

/// Encoded size of a [`PeerAddress`] on the event queue
pub const PEER_ADDRESS_LEN: usize = 7;

impl PeerAddress {
    /// Create a new peer address from kind and octets
    #[must_use]
    pub const fn new(kind: AddressKind, octets: [u8; 6]) -> Self {
        Self { kind, octets }
    }

    /// Create a public address from octets
    #[must_use]
    pub const fn public(octets: [u8; 6]) -> Self {
        Self {
            kind: AddressKind::Public,
            octets,
        }
    }

    /// Get the raw address octets
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.octets
    }

    /// Pack the address (kind + octets) for the event queue
    #[must_use]
    pub fn to_bytes(&self) -> [u8; PEER_ADDRESS_LEN] {
        let mut out = [0u8; PEER_ADDRESS_LEN];
        out[0] = self.kind as u8;
        out[1..].copy_from_slice(&self.octets);
        out
    }

    /// Unpack an address previously packed with [`PeerAddress::to_bytes`]
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < PEER_ADDRESS_LEN {
            return None;
        }
        let kind = AddressKind::from_u8(bytes[0])?;
        let mut octets = [0u8; 6];
        octets.copy_from_slice(&bytes[1..7]);
        Some(Self { kind, octets })
    }

    /// Format the address as a colon-separated hex string
    #[must_use]
    pub fn format_hex(&self) -> heapless::String<17> {
        let mut result = heapless::String::new();
        for (i, byte) in self.octets.iter().enumerate() {
            if i > 0 {
                result.push(':').ok();
            }
            let hex_chars = [
                '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F',
            ];
            result.push(hex_chars[(byte >> 4) as usize]).ok();
            result.push(hex_chars[(byte & 0x0F) as usize]).ok();
        }
        result
    }

    /// Parse a peer address from a colon-separated hex string
    ///
    /// # Errors
    /// Returns an error if the string is not exactly 17 characters long or
    /// contains invalid characters
    pub fn from_hex(kind: AddressKind, hex: &str) -> Result<Self, BleError> {
        if hex.len() != 17 || !hex.chars().all(|c| c.is_ascii_hexdigit() || c == ':') {
            return Err(BleError::InvalidParameter);
        }

        let mut octets = [0u8; 6];
        for (i, byte) in hex.split(':').enumerate() {
            if i >= 6 || byte.len() != 2 {
                return Err(BleError::InvalidParameter);
            }
            octets[i] = u8::from_str_radix(byte, 16).map_err(|_| BleError::InvalidParameter)?;
        }
        Ok(Self { kind, octets })
    }
}

impl From<PeerAddress> for bt_hci::param::BdAddr {
    fn from(addr: PeerAddress) -> Self {
        bt_hci::param::BdAddr::new(addr.octets)
    }
}

impl From<PeerAddress> for heapless::String<17> {
    fn from(addr: PeerAddress) -> Self {
        addr.format_hex()
    }
}

impl TryFrom<&str> for PeerAddress {
    type Error = BleError;

    fn try_from(hex: &str) -> Result<Self, Self::Error> {
        PeerAddress::from_hex(AddressKind::Public, hex)
    }
}

impl TryFrom<&[u8]> for PeerAddress {
    type Error = BleError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        PeerAddress::from_bytes(bytes).ok_or(BleError::InvalidParameter)
    }
}
