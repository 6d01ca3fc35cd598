//! BLE UUIDs and the discovery filter
//!
//! BLE attributes are identified by either a 16-bit SIG-assigned UUID or a
//! full 128-bit vendor UUID. [`BleUuid`] models the two forms as a sum type,
//! with the compact tagged encoding used when UUIDs cross the event bridge.
//! [`UuidFilter`] is the per-discovery-task filter: either "return all" or
//! an exact match against one UUID.

/// A 16-bit or 128-bit Bluetooth UUID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleUuid {
    /// SIG-assigned 16-bit UUID
    Uuid16(u16),
    /// Full 128-bit UUID, little-endian byte order
    Uuid128([u8; 16]),
}

const TAG_UUID16: u8 = 0x01;
const TAG_UUID128: u8 = 0x02;

impl BleUuid {
    /// Bytes this UUID occupies in the tagged wire encoding
    #[must_use]
    pub const fn encoded_len(&self) -> usize {
        match self {
            BleUuid::Uuid16(_) => 3,
            BleUuid::Uuid128(_) => 17,
        }
    }

    /// Write the tagged encoding into `out`, returning the bytes written.
    ///
    /// Returns `None` if `out` is too small.
    pub fn encode_into(&self, out: &mut [u8]) -> Option<usize> {
        match self {
            BleUuid::Uuid16(uuid) => {
                if out.len() < 3 {
                    return None;
                }
                out[0] = TAG_UUID16;
                out[1..3].copy_from_slice(&uuid.to_le_bytes());
                Some(3)
            }
            BleUuid::Uuid128(bytes) => {
                if out.len() < 17 {
                    return None;
                }
                out[0] = TAG_UUID128;
                out[1..17].copy_from_slice(bytes);
                Some(17)
            }
        }
    }

    /// Decode a tagged UUID from the front of `bytes`, returning the UUID and
    /// the bytes consumed
    pub fn decode_from(bytes: &[u8]) -> Option<(Self, usize)> {
        match bytes.first()? {
            &TAG_UUID16 if bytes.len() >= 3 => {
                let uuid = u16::from_le_bytes([bytes[1], bytes[2]]);
                Some((BleUuid::Uuid16(uuid), 3))
            }
            &TAG_UUID128 if bytes.len() >= 17 => {
                let mut raw = [0u8; 16];
                raw.copy_from_slice(&bytes[1..17]);
                Some((BleUuid::Uuid128(raw), 17))
            }
            _ => None,
        }
    }
}

/// UUID filter applied while discovering services or characteristics.
///
/// Scoped to the lifetime of one discovery task: [`UuidFilter::Any`] returns
/// everything, [`UuidFilter::Exact`] keeps only items whose UUID matches and
/// collapses the final result to the first match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UuidFilter {
    /// No filter - every discovered item is reported
    #[default]
    Any,
    /// Only items with exactly this UUID are reported
    Exact(BleUuid),
}

impl UuidFilter {
    /// Does `uuid` pass this filter?
    #[must_use]
    pub fn matches(&self, uuid: &BleUuid) -> bool {
        match self {
            UuidFilter::Any => true,
            UuidFilter::Exact(wanted) => wanted == uuid,
        }
    }

    /// True when an exact filter is set (result collapses to a single item)
    #[must_use]
    pub const fn is_filtering(&self) -> bool {
        matches!(self, UuidFilter::Exact(_))
    }
}
