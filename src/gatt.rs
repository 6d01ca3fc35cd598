//! GATT discovery data types
//!
//! The discovery pipeline hands services, characteristics and descriptors
//! from the radio stack's response pages to the task coordinator through the
//! event bridge. Each type here carries the handles the protocol needs for
//! pagination (services: handle range; characteristics: declaration and value
//! handles) together with a compact byte encoding that fits the bridge's
//! bounded payload slots.

use crate::uuid::BleUuid;

/// Characteristic property flags, packed the way they cross the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CharProps(u8);

impl CharProps {
    const BROADCAST: u8 = 0x01;
    const READ: u8 = 0x02;
    const WRITE_WITHOUT_RESPONSE: u8 = 0x04;
    const WRITE: u8 = 0x08;
    const NOTIFY: u8 = 0x10;
    const INDICATE: u8 = 0x20;
    const AUTH_SIGNED_WRITES: u8 = 0x40;

    /// Build property flags from the packed bit representation
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Packed bit representation
    #[must_use]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Characteristic supports broadcast
    #[must_use]
    pub const fn broadcast(&self) -> bool {
        self.0 & Self::BROADCAST != 0
    }

    /// Characteristic value can be read
    #[must_use]
    pub const fn read(&self) -> bool {
        self.0 & Self::READ != 0
    }

    /// Characteristic accepts write-without-response
    #[must_use]
    pub const fn write_without_response(&self) -> bool {
        self.0 & Self::WRITE_WITHOUT_RESPONSE != 0
    }

    /// Characteristic accepts acknowledged writes
    #[must_use]
    pub const fn write(&self) -> bool {
        self.0 & Self::WRITE != 0
    }

    /// Characteristic can notify
    #[must_use]
    pub const fn notify(&self) -> bool {
        self.0 & Self::NOTIFY != 0
    }

    /// Characteristic can indicate
    #[must_use]
    pub const fn indicate(&self) -> bool {
        self.0 & Self::INDICATE != 0
    }

    /// Characteristic accepts authenticated signed writes
    #[must_use]
    pub const fn authenticated_signed_writes(&self) -> bool {
        self.0 & Self::AUTH_SIGNED_WRITES != 0
    }

    /// Builder helper used by radio glue and tests
    #[must_use]
    pub const fn with(self, flag: u8) -> Self {
        Self(self.0 | flag)
    }

    /// Flag bit for [`CharProps::notify`]
    pub const FLAG_NOTIFY: u8 = Self::NOTIFY;
    /// Flag bit for [`CharProps::indicate`]
    pub const FLAG_INDICATE: u8 = Self::INDICATE;
    /// Flag bit for [`CharProps::read`]
    pub const FLAG_READ: u8 = Self::READ;
    /// Flag bit for [`CharProps::write`]
    pub const FLAG_WRITE: u8 = Self::WRITE;
    /// Flag bit for [`CharProps::write_without_response`]
    pub const FLAG_WRITE_WITHOUT_RESPONSE: u8 = Self::WRITE_WITHOUT_RESPONSE;
}

/// A primary service discovered on a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceInfo {
    /// Service UUID
    pub uuid: BleUuid,
    /// First attribute handle covered by the service
    pub start_handle: u16,
    /// Last attribute handle covered by the service
    pub end_handle: u16,
}

impl ServiceInfo {
    /// Encode for the event bridge; returns bytes written, `None` if `out`
    /// is too small
    pub fn encode_into(&self, out: &mut [u8]) -> Option<usize> {
        let n = self.uuid.encode_into(out)?;
        if out.len() < n + 4 {
            return None;
        }
        out[n..n + 2].copy_from_slice(&self.start_handle.to_le_bytes());
        out[n + 2..n + 4].copy_from_slice(&self.end_handle.to_le_bytes());
        Some(n + 4)
    }

    /// Decode an encoded service record
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let (uuid, n) = BleUuid::decode_from(bytes)?;
        if bytes.len() < n + 4 {
            return None;
        }
        Some(Self {
            uuid,
            start_handle: u16::from_le_bytes([bytes[n], bytes[n + 1]]),
            end_handle: u16::from_le_bytes([bytes[n + 2], bytes[n + 3]]),
        })
    }
}

/// A characteristic discovered within a service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CharacteristicInfo {
    /// Characteristic UUID
    pub uuid: BleUuid,
    /// Handle of the characteristic declaration attribute
    pub handle_decl: u16,
    /// Handle of the characteristic value attribute
    pub handle_value: u16,
    /// Property flags
    pub props: CharProps,
    /// Handle of the notification-configuration descriptor, once resolved
    pub cccd_handle: Option<u16>,
}

impl CharacteristicInfo {
    /// Encode for the event bridge; returns bytes written, `None` if `out`
    /// is too small
    pub fn encode_into(&self, out: &mut [u8]) -> Option<usize> {
        let n = self.uuid.encode_into(out)?;
        if out.len() < n + 7 {
            return None;
        }
        out[n..n + 2].copy_from_slice(&self.handle_decl.to_le_bytes());
        out[n + 2..n + 4].copy_from_slice(&self.handle_value.to_le_bytes());
        out[n + 4] = self.props.bits();
        let cccd = self.cccd_handle.unwrap_or(0);
        out[n + 5..n + 7].copy_from_slice(&cccd.to_le_bytes());
        Some(n + 7)
    }

    /// Decode an encoded characteristic record
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let (uuid, n) = BleUuid::decode_from(bytes)?;
        if bytes.len() < n + 7 {
            return None;
        }
        let cccd = u16::from_le_bytes([bytes[n + 5], bytes[n + 6]]);
        Some(Self {
            uuid,
            handle_decl: u16::from_le_bytes([bytes[n], bytes[n + 1]]),
            handle_value: u16::from_le_bytes([bytes[n + 2], bytes[n + 3]]),
            props: CharProps::from_bits(bytes[n + 4]),
            cccd_handle: if cccd == 0 { None } else { Some(cccd) },
        })
    }
}

/// A descriptor discovered next to a characteristic value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DescriptorInfo {
    /// Descriptor UUID
    pub uuid: BleUuid,
    /// Attribute handle of the descriptor
    pub handle: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::EVENT_SLOT_DATA;

    #[test]
    fn test_char_props_bits() {
        let props = CharProps::default()
            .with(CharProps::FLAG_READ)
            .with(CharProps::FLAG_NOTIFY);
        assert!(props.read());
        assert!(props.notify());
        assert!(!props.write());
        assert!(!props.indicate());
        assert_eq!(CharProps::from_bits(props.bits()), props);
    }

    #[test]
    fn test_service_info_roundtrip() {
        let svc = ServiceInfo {
            uuid: BleUuid::Uuid16(0x180D),
            start_handle: 0x0010,
            end_handle: 0x001F,
        };
        let mut buf = [0u8; EVENT_SLOT_DATA];
        let n = svc.encode_into(&mut buf).unwrap();
        assert_eq!(ServiceInfo::decode(&buf[..n]), Some(svc));
    }

    #[test]
    fn test_service_info_vendor_uuid_fits_one_slot() {
        let svc = ServiceInfo {
            uuid: BleUuid::Uuid128([0xAB; 16]),
            start_handle: 1,
            end_handle: 0xFFFF,
        };
        let mut buf = [0u8; EVENT_SLOT_DATA];
        let n = svc.encode_into(&mut buf).unwrap();
        assert!(n <= EVENT_SLOT_DATA);
        assert_eq!(ServiceInfo::decode(&buf[..n]), Some(svc));
    }

    #[test]
    fn test_characteristic_info_roundtrip() {
        let chr = CharacteristicInfo {
            uuid: BleUuid::Uuid16(0x2A4D),
            handle_decl: 0x001F,
            handle_value: 0x0020,
            props: CharProps::from_bits(CharProps::FLAG_READ | CharProps::FLAG_NOTIFY),
            cccd_handle: None,
        };
        let mut buf = [0u8; EVENT_SLOT_DATA];
        let n = chr.encode_into(&mut buf).unwrap();
        assert_eq!(CharacteristicInfo::decode(&buf[..n]), Some(chr));
    }

    #[test]
    fn test_characteristic_info_preserves_cccd() {
        let chr = CharacteristicInfo {
            uuid: BleUuid::Uuid128([0x42; 16]),
            handle_decl: 0x0030,
            handle_value: 0x0031,
            props: CharProps::from_bits(CharProps::FLAG_INDICATE),
            cccd_handle: Some(0x0032),
        };
        let mut buf = [0u8; EVENT_SLOT_DATA];
        let n = chr.encode_into(&mut buf).unwrap();
        assert!(n <= EVENT_SLOT_DATA);
        assert_eq!(CharacteristicInfo::decode(&buf[..n]), Some(chr));
    }

    #[test]
    fn test_decode_rejects_truncated_records() {
        let svc = ServiceInfo {
            uuid: BleUuid::Uuid16(0x1812),
            start_handle: 1,
            end_handle: 2,
        };
        let mut buf = [0u8; EVENT_SLOT_DATA];
        let n = svc.encode_into(&mut buf).unwrap();
        assert!(ServiceInfo::decode(&buf[..n - 1]).is_none());
        assert!(CharacteristicInfo::decode(&buf[..2]).is_none());
    }
}
