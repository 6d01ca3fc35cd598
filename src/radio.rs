//! The narrow interface to the radio stack
//!
//! The radio firmware owns the RF protocol, link-layer timing and key
//! exchange; the driver reaches it only through [`RadioStack`] and hears
//! back only through [`RadioEvent`]s fed into the event bridge. Calls are
//! synchronous-issue: they return as soon as the stack accepts or rejects
//! the operation, and the matching completion arrives later as an event.
//! Events must be delivered in strict chronological order per link.
//!
//! Vendor glue implements [`RadioStack`] over the actual stack bindings and
//! translates the stack's interrupt callbacks into [`RadioEvent`]s.

use crate::address::PeerAddress;
use crate::gatt::{CharacteristicInfo, DescriptorInfo, ServiceInfo};
use crate::security::{BondingStatus, PairingParams, PeerId};
use bt_hci::param::ConnHandle;

/// Raw status codes a radio stack call can fail with.
///
/// Values follow the nRF-style error-code table; vendor glue maps its
/// stack's codes onto these.
pub mod status {
    /// Operation succeeded
    pub const SUCCESS: u32 = 0;
    /// Internal stack error
    pub const INTERNAL: u32 = 3;
    /// Out of memory
    pub const NO_MEM: u32 = 4;
    /// Item not found
    pub const NOT_FOUND: u32 = 5;
    /// Operation not supported
    pub const NOT_SUPPORTED: u32 = 6;
    /// Invalid parameter
    pub const INVALID_PARAM: u32 = 7;
    /// Call not legal in the current stack state
    pub const INVALID_STATE: u32 = 8;
    /// Invalid length
    pub const INVALID_LENGTH: u32 = 9;
    /// Invalid flags
    pub const INVALID_FLAGS: u32 = 10;
    /// Bad data size
    pub const DATA_SIZE: u32 = 12;
    /// Operation timed out
    pub const TIMEOUT: u32 = 13;
    /// Operation forbidden
    pub const FORBIDDEN: u32 = 15;
    /// Bad memory address
    pub const INVALID_ADDR: u32 = 16;
    /// Stack busy, retry later
    pub const BUSY: u32 = 17;
    /// No more connections can be opened
    pub const CONN_COUNT: u32 = 18;
    /// Out of stack resources
    pub const RESOURCES: u32 = 19;
}

/// A rejection from the radio stack: the raw status code, kept for
/// diagnostics, plus a short name for the codes we know
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RadioError {
    /// Raw status code returned by the stack
    pub status: u32,
}

impl RadioError {
    /// Wrap a raw status code
    #[must_use]
    pub const fn new(status: u32) -> Self {
        Self { status }
    }

    /// Human-readable classification for known status codes
    #[must_use]
    pub fn name(&self) -> Option<&'static str> {
        match self.status {
            status::NO_MEM => Some("NO_MEM"),
            status::NOT_FOUND => Some("NOT_FOUND"),
            status::NOT_SUPPORTED => Some("NOT_SUPPORTED"),
            status::INVALID_PARAM => Some("INVALID_PARAM"),
            status::INVALID_STATE => Some("INVALID_STATE"),
            status::INVALID_LENGTH => Some("INVALID_LENGTH"),
            status::INVALID_FLAGS => Some("INVALID_FLAGS"),
            status::DATA_SIZE => Some("DATA_SIZE"),
            status::TIMEOUT => Some("TIMEOUT"),
            status::FORBIDDEN => Some("FORBIDDEN"),
            status::INVALID_ADDR => Some("INVALID_ADDR"),
            status::BUSY => Some("BUSY"),
            status::CONN_COUNT => Some("CONN_COUNT"),
            _ => None,
        }
    }

    /// Is this the transient "stack busy" rejection?
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.status == status::BUSY
    }

    /// Is this the "invalid state" rejection (e.g. peer not ready)?
    #[must_use]
    pub const fn is_invalid_state(&self) -> bool {
        self.status == status::INVALID_STATE
    }
}

/// A range of attribute handles for a discovery call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HandleRange {
    /// First handle, inclusive
    pub start: u16,
    /// Last handle, inclusive
    pub end: u16,
}

/// Advertising parameters for [`RadioStack::start_advertising`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvertisingParams {
    /// Advertising interval in 0.625 ms units
    pub interval_units: u16,
    /// Peers may connect
    pub connectable: bool,
    /// Peers may request scan response data
    pub scannable: bool,
}

/// Scan parameters for [`RadioStack::start_scan`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanParams {
    /// Request scan response data from advertisers
    pub active: bool,
}

/// Connection parameters for connect and interval-change calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionParams {
    /// Minimum connection interval in 1.25 ms units
    pub min_interval_units: u16,
    /// Maximum connection interval in 1.25 ms units
    pub max_interval_units: u16,
    /// Number of connection events the slave may skip
    pub slave_latency: u16,
    /// Supervision timeout in 10 ms units
    pub sup_timeout_10ms: u16,
}

/// Encoded size of [`ConnectionParams`] on the event queue
pub const CONNECTION_PARAMS_LEN: usize = 8;

impl ConnectionParams {
    /// Pack for the event queue
    #[must_use]
    pub fn to_bytes(&self) -> [u8; CONNECTION_PARAMS_LEN] {
        let mut out = [0u8; CONNECTION_PARAMS_LEN];
        out[0..2].copy_from_slice(&self.min_interval_units.to_le_bytes());
        out[2..4].copy_from_slice(&self.max_interval_units.to_le_bytes());
        out[4..6].copy_from_slice(&self.slave_latency.to_le_bytes());
        out[6..8].copy_from_slice(&self.sup_timeout_10ms.to_le_bytes());
        out
    }

    /// Unpack from the event queue
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < CONNECTION_PARAMS_LEN {
            return None;
        }
        Some(Self {
            min_interval_units: u16::from_le_bytes([bytes[0], bytes[1]]),
            max_interval_units: u16::from_le_bytes([bytes[2], bytes[3]]),
            slave_latency: u16::from_le_bytes([bytes[4], bytes[5]]),
            sup_timeout_10ms: u16::from_le_bytes([bytes[6], bytes[7]]),
        })
    }
}

/// Reply to an incoming security-parameter negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityParamsReply {
    /// Accept, offering our own parameters
    Accept(PairingParams),
    /// Reject with an explicit "pairing not supported" status
    Reject,
}

/// Reply to an auth-key request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKeyReply {
    /// No key material available; fails the procedure explicitly
    None,
    /// A 6-digit passkey
    Passkey([u8; crate::constants::PASSKEY_LEN]),
    /// A 16-byte out-of-band key
    Oob([u8; crate::constants::OOB_KEY_LEN]),
}

/// What a GAP timeout event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TimeoutSource {
    /// Advertising stopped because its duration elapsed
    Advertising = 0,
    /// A connect attempt timed out
    Connection = 1,
    /// A security request timed out
    SecurityRequest = 2,
}

impl TimeoutSource {
    /// Decode a timeout source from its wire value
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(TimeoutSource::Advertising),
            1 => Some(TimeoutSource::Connection),
            2 => Some(TimeoutSource::SecurityRequest),
            _ => None,
        }
    }
}

/// Which role a new connection was established in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkRole {
    /// We are the peripheral (the peer connected to us)
    Peripheral,
    /// We are the central (we connected out)
    Central,
}

/// Asynchronous events delivered by the radio stack.
///
/// Produced in interrupt context by the vendor glue and handed straight to
/// [`EventBridge::push_radio_event`](crate::event::EventBridge::push_radio_event),
/// which copies every borrowed payload before returning.
#[derive(Debug)]
pub enum RadioEvent<'a> {
    /// A connection was established
    Connected {
        /// Link handle
        conn: u16,
        /// Our role on the link
        role: LinkRole,
        /// Address of the peer
        peer: PeerAddress,
    },
    /// A connection was closed
    Disconnected {
        /// Link handle
        conn: u16,
        /// Stack reason code
        reason: u8,
    },
    /// A GAP procedure timed out
    GapTimeout {
        /// What timed out
        source: TimeoutSource,
    },
    /// An advertising packet was received while scanning
    AdvReport {
        /// Advertiser address
        peer: PeerAddress,
        /// Signal strength in dBm
        rssi: i8,
        /// Raw advertising payload
        data: &'a [u8],
    },
    /// Signal strength changed on a monitored link
    RssiChanged {
        /// Link handle
        conn: u16,
        /// Signal strength in dBm
        rssi: i8,
    },
    /// The peer asked for new connection parameters
    ConnParamUpdateRequest {
        /// Link handle
        conn: u16,
        /// Parameters the peer wants
        params: ConnectionParams,
    },
    /// MTU exchange finished; the link's effective payload size changed
    MtuUpdated {
        /// Link handle
        conn: u16,
        /// Negotiated ATT MTU
        mtu: u16,
    },
    /// The peer initiated an MTU exchange that needs a reply
    MtuExchangeRequest {
        /// Link handle
        conn: u16,
        /// MTU the peer offers
        client_mtu: u16,
    },
    /// One response page of a primary service discovery
    ServicesDiscovered {
        /// Services in this page, ascending by handle
        page: &'a [ServiceInfo],
        /// Whether the response carried a success status
        status_ok: bool,
    },
    /// One response page of a characteristic discovery
    CharacteristicsDiscovered {
        /// Characteristics in this page, ascending by handle
        page: &'a [CharacteristicInfo],
        /// Whether the response carried a success status
        status_ok: bool,
    },
    /// One response page of a descriptor discovery
    DescriptorsDiscovered {
        /// Descriptors in this page
        page: &'a [DescriptorInfo],
        /// Whether the response carried a success status
        status_ok: bool,
    },
    /// A characteristic read finished
    CharacteristicRead {
        /// Value read from the peer
        data: &'a [u8],
    },
    /// An acknowledged write finished
    WriteResponse,
    /// A queued transmission (write-without-response, notification or
    /// stream packet) left the radio
    TxComplete {
        /// Link handle
        conn: u16,
    },
    /// The peer notified or indicated a subscribed characteristic
    Notification {
        /// Link handle
        conn: u16,
        /// Value attribute handle
        handle: u16,
        /// New value
        data: &'a [u8],
        /// Indication (needs confirmation) rather than notification
        indication: bool,
    },
    /// A peer wrote one of our characteristics
    PeripheralWrite {
        /// Attribute handle written
        handle: u16,
        /// Data written
        data: &'a [u8],
    },
    /// The peer opened a security-parameter negotiation
    SecurityParamsRequest {
        /// Link handle
        conn: u16,
        /// Parameters the peer offers
        peer: PairingParams,
    },
    /// A passkey must be shown to the user
    PasskeyDisplay {
        /// Link handle
        conn: u16,
        /// Six ASCII digits
        passkey: [u8; crate::constants::PASSKEY_LEN],
    },
    /// The stack needs key material from us to continue pairing
    AuthKeyRequest {
        /// Link handle
        conn: u16,
    },
    /// Authentication finished, successfully or not
    AuthStatus {
        /// Link handle
        conn: u16,
        /// Raw authentication status
        auth_status: u8,
        /// Whether the link is now bonded
        bonded: bool,
    },
    /// Bonding progress from the peer manager.
    ///
    /// `peer` is reported only for a completed bonding procedure; an
    /// encryption-only success reports `None`.
    BondingStatus {
        /// Link handle
        conn: u16,
        /// Progress report
        status: BondingStatus,
        /// Bonded peer identity, when one was established
        peer: Option<PeerId>,
        /// Failure code when `status` is [`BondingStatus::Fail`]
        error: u16,
    },
    /// A previously bonded peer reconnected
    BondedPeerConnected {
        /// Bonded peer identity
        peer: PeerId,
    },
    /// The stack reported an error outside any call
    StackError {
        /// Raw status code
        status: u32,
    },
    /// A HID output report value arrived (e.g. keyboard LED state)
    HidValue {
        /// Report value
        value: u8,
    },
    /// Periodic radio-notification tick
    RadioTick,
}

/// The calls the driver can issue against the radio stack.
///
/// Every method is non-blocking: it either queues the operation with the
/// stack or fails with a [`RadioError`]. Completions arrive later as
/// [`RadioEvent`]s. The two exceptions are [`RadioStack::delay_ms`] and
/// [`RadioStack::reset_system`], used only on the fatal-error path.
pub trait RadioStack {
    /// Start advertising with the given payload and scan response data
    fn start_advertising(
        &mut self,
        adv_data: &[u8],
        scan_rsp: &[u8],
        params: &AdvertisingParams,
    ) -> Result<(), RadioError>;

    /// Replace the advertising payload without restarting advertising
    fn update_advertising_data(&mut self, adv_data: &[u8]) -> Result<(), RadioError>;

    /// Stop advertising
    fn stop_advertising(&mut self) -> Result<(), RadioError>;

    /// Start scanning for advertising packets
    fn start_scan(&mut self, params: &ScanParams) -> Result<(), RadioError>;

    /// Stop scanning
    fn stop_scan(&mut self) -> Result<(), RadioError>;

    /// Open a central connection to `peer`
    fn connect(&mut self, peer: &PeerAddress, params: &ConnectionParams)
    -> Result<(), RadioError>;

    /// Close a connection
    fn disconnect(&mut self, conn: ConnHandle) -> Result<(), RadioError>;

    /// Renegotiate the connection interval of a link
    fn set_connection_interval(
        &mut self,
        conn: ConnHandle,
        params: &ConnectionParams,
    ) -> Result<(), RadioError>;

    /// Accept the connection parameters a peer requested
    fn accept_conn_param_update(
        &mut self,
        conn: ConnHandle,
        params: &ConnectionParams,
    ) -> Result<(), RadioError>;

    /// Ask the peer for a larger MTU
    fn request_mtu_exchange(&mut self, conn: ConnHandle, mtu: u16) -> Result<(), RadioError>;

    /// Answer a peer-initiated MTU exchange
    fn reply_mtu_exchange(&mut self, conn: ConnHandle, mtu: u16) -> Result<(), RadioError>;

    /// Discover primary services starting at `start_handle`
    fn discover_primary_services(
        &mut self,
        conn: ConnHandle,
        start_handle: u16,
    ) -> Result<(), RadioError>;

    /// Discover characteristics within a handle range
    fn discover_characteristics(
        &mut self,
        conn: ConnHandle,
        range: HandleRange,
    ) -> Result<(), RadioError>;

    /// Discover descriptors within a handle range
    fn discover_descriptors(
        &mut self,
        conn: ConnHandle,
        range: HandleRange,
    ) -> Result<(), RadioError>;

    /// Read a characteristic value
    fn read_characteristic(&mut self, conn: ConnHandle, handle: u16) -> Result<(), RadioError>;

    /// Write a characteristic or descriptor value
    fn write_characteristic(
        &mut self,
        conn: ConnHandle,
        handle: u16,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), RadioError>;

    /// Confirm a received indication
    fn confirm_indication(&mut self, conn: ConnHandle, handle: u16) -> Result<(), RadioError>;

    /// Enable or disable RSSI change reporting on a link
    fn set_rssi_reporting(&mut self, conn: ConnHandle, enabled: bool) -> Result<(), RadioError>;

    /// Send one chunk of outbound stream data
    fn send_stream_data(&mut self, conn: ConnHandle, data: &[u8]) -> Result<(), RadioError>;

    /// Send a HID input report
    fn send_hid_report(&mut self, conn: ConnHandle, data: &[u8]) -> Result<(), RadioError>;

    /// Start securing a link (pairing/bonding)
    fn secure_link(&mut self, conn: ConnHandle, force_repair: bool) -> Result<(), RadioError>;

    /// Answer an incoming security-parameter negotiation
    fn reply_security_params(
        &mut self,
        conn: ConnHandle,
        reply: SecurityParamsReply,
    ) -> Result<(), RadioError>;

    /// Answer an auth-key request
    fn reply_auth_key(&mut self, conn: ConnHandle, reply: AuthKeyReply)
    -> Result<(), RadioError>;

    /// Replace the reconnect whitelist
    fn set_whitelist(&mut self, peers: &[PeerId]) -> Result<(), RadioError>;

    /// Erase all stored bonds
    fn erase_bonds(&mut self) -> Result<(), RadioError>;

    /// Blocking delay; only legal on the fatal-error path
    fn delay_ms(&mut self, ms: u32);

    /// Request a full device reset; only legal on the fatal-error path
    fn reset_system(&mut self);
}

#[cfg(test)]
pub(crate) mod mock {
    //! Recording mock of the radio stack for driver-level tests

    use super::*;
    use heapless::{Deque, Vec};

    /// One recorded call against the mock radio
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        StartAdvertising,
        UpdateAdvertisingData(Vec<u8, 31>),
        StopAdvertising,
        StartScan,
        StopScan,
        Connect(PeerAddress),
        Disconnect(u16),
        SetConnectionInterval { conn: u16, max_units: u16 },
        AcceptConnParamUpdate(u16),
        RequestMtuExchange { conn: u16, mtu: u16 },
        ReplyMtuExchange { conn: u16, mtu: u16 },
        DiscoverPrimaryServices { conn: u16, start_handle: u16 },
        DiscoverCharacteristics { conn: u16, start: u16, end: u16 },
        DiscoverDescriptors { conn: u16, start: u16, end: u16 },
        ReadCharacteristic { conn: u16, handle: u16 },
        Write { conn: u16, handle: u16, data: Vec<u8, 64>, with_response: bool },
        ConfirmIndication { conn: u16, handle: u16 },
        SetRssiReporting { conn: u16, enabled: bool },
        SendStreamData(Vec<u8, 20>),
        SendHidReport(Vec<u8, 16>),
        SecureLink { conn: u16, force_repair: bool },
        ReplySecurityParams { conn: u16, accepted: bool },
        /// `kind`: 0 = none, 1 = passkey, 2 = out-of-band key
        ReplyAuthKey { conn: u16, kind: u8 },
        SetWhitelist(usize),
        EraseBonds,
        DelayMs(u32),
        ResetSystem,
    }

    /// Mock radio recording calls and failing on demand.
    ///
    /// `next_results` is consumed front-to-back, one entry per fallible
    /// call; when empty every call succeeds.
    #[derive(Debug, Default)]
    pub struct MockRadio {
        pub calls: Vec<Call, 64>,
        pub next_results: Deque<Result<(), RadioError>, 8>,
    }

    impl MockRadio {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_next(&mut self, status: u32) {
            self.next_results
                .push_back(Err(RadioError::new(status)))
                .unwrap();
        }

        fn record(&mut self, call: Call) -> Result<(), RadioError> {
            self.calls.push(call).unwrap();
            self.next_results.pop_front().unwrap_or(Ok(()))
        }

        pub fn calls(&self) -> &[Call] {
            &self.calls
        }

        pub fn clear_calls(&mut self) {
            self.calls.clear();
        }
    }

    impl RadioStack for MockRadio {
        fn start_advertising(
            &mut self,
            _adv_data: &[u8],
            _scan_rsp: &[u8],
            _params: &AdvertisingParams,
        ) -> Result<(), RadioError> {
            self.record(Call::StartAdvertising)
        }

        fn update_advertising_data(&mut self, adv_data: &[u8]) -> Result<(), RadioError> {
            let data = Vec::from_slice(adv_data).unwrap();
            self.record(Call::UpdateAdvertisingData(data))
        }

        fn stop_advertising(&mut self) -> Result<(), RadioError> {
            self.record(Call::StopAdvertising)
        }

        fn start_scan(&mut self, _params: &ScanParams) -> Result<(), RadioError> {
            self.record(Call::StartScan)
        }

        fn stop_scan(&mut self) -> Result<(), RadioError> {
            self.record(Call::StopScan)
        }

        fn connect(
            &mut self,
            peer: &PeerAddress,
            _params: &ConnectionParams,
        ) -> Result<(), RadioError> {
            self.record(Call::Connect(*peer))
        }

        fn disconnect(&mut self, conn: ConnHandle) -> Result<(), RadioError> {
            self.record(Call::Disconnect(conn.raw()))
        }

        fn set_connection_interval(
            &mut self,
            conn: ConnHandle,
            params: &ConnectionParams,
        ) -> Result<(), RadioError> {
            self.record(Call::SetConnectionInterval {
                conn: conn.raw(),
                max_units: params.max_interval_units,
            })
        }

        fn accept_conn_param_update(
            &mut self,
            conn: ConnHandle,
            _params: &ConnectionParams,
        ) -> Result<(), RadioError> {
            self.record(Call::AcceptConnParamUpdate(conn.raw()))
        }

        fn request_mtu_exchange(
            &mut self,
            conn: ConnHandle,
            mtu: u16,
        ) -> Result<(), RadioError> {
            self.record(Call::RequestMtuExchange {
                conn: conn.raw(),
                mtu,
            })
        }

        fn reply_mtu_exchange(&mut self, conn: ConnHandle, mtu: u16) -> Result<(), RadioError> {
            self.record(Call::ReplyMtuExchange {
                conn: conn.raw(),
                mtu,
            })
        }

        fn discover_primary_services(
            &mut self,
            conn: ConnHandle,
            start_handle: u16,
        ) -> Result<(), RadioError> {
            self.record(Call::DiscoverPrimaryServices {
                conn: conn.raw(),
                start_handle,
            })
        }

        fn discover_characteristics(
            &mut self,
            conn: ConnHandle,
            range: HandleRange,
        ) -> Result<(), RadioError> {
            self.record(Call::DiscoverCharacteristics {
                conn: conn.raw(),
                start: range.start,
                end: range.end,
            })
        }

        fn discover_descriptors(
            &mut self,
            conn: ConnHandle,
            range: HandleRange,
        ) -> Result<(), RadioError> {
            self.record(Call::DiscoverDescriptors {
                conn: conn.raw(),
                start: range.start,
                end: range.end,
            })
        }

        fn read_characteristic(
            &mut self,
            conn: ConnHandle,
            handle: u16,
        ) -> Result<(), RadioError> {
            self.record(Call::ReadCharacteristic {
                conn: conn.raw(),
                handle,
            })
        }

        fn write_characteristic(
            &mut self,
            conn: ConnHandle,
            handle: u16,
            data: &[u8],
            with_response: bool,
        ) -> Result<(), RadioError> {
            let data = Vec::from_slice(data).unwrap();
            self.record(Call::Write {
                conn: conn.raw(),
                handle,
                data,
                with_response,
            })
        }

        fn confirm_indication(
            &mut self,
            conn: ConnHandle,
            handle: u16,
        ) -> Result<(), RadioError> {
            self.record(Call::ConfirmIndication {
                conn: conn.raw(),
                handle,
            })
        }

        fn set_rssi_reporting(
            &mut self,
            conn: ConnHandle,
            enabled: bool,
        ) -> Result<(), RadioError> {
            self.record(Call::SetRssiReporting {
                conn: conn.raw(),
                enabled,
            })
        }

        fn send_stream_data(&mut self, _conn: ConnHandle, data: &[u8]) -> Result<(), RadioError> {
            let data = Vec::from_slice(data).unwrap();
            self.record(Call::SendStreamData(data))
        }

        fn send_hid_report(&mut self, _conn: ConnHandle, data: &[u8]) -> Result<(), RadioError> {
            let data = Vec::from_slice(data).unwrap();
            self.record(Call::SendHidReport(data))
        }

        fn secure_link(&mut self, conn: ConnHandle, force_repair: bool) -> Result<(), RadioError> {
            self.record(Call::SecureLink {
                conn: conn.raw(),
                force_repair,
            })
        }

        fn reply_security_params(
            &mut self,
            conn: ConnHandle,
            reply: SecurityParamsReply,
        ) -> Result<(), RadioError> {
            self.record(Call::ReplySecurityParams {
                conn: conn.raw(),
                accepted: matches!(reply, SecurityParamsReply::Accept(_)),
            })
        }

        fn reply_auth_key(
            &mut self,
            conn: ConnHandle,
            reply: AuthKeyReply,
        ) -> Result<(), RadioError> {
            let kind = match reply {
                AuthKeyReply::None => 0,
                AuthKeyReply::Passkey(_) => 1,
                AuthKeyReply::Oob(_) => 2,
            };
            self.record(Call::ReplyAuthKey {
                conn: conn.raw(),
                kind,
            })
        }

        fn set_whitelist(&mut self, peers: &[PeerId]) -> Result<(), RadioError> {
            self.record(Call::SetWhitelist(peers.len()))
        }

        fn erase_bonds(&mut self) -> Result<(), RadioError> {
            self.record(Call::EraseBonds)
        }

        fn delay_ms(&mut self, ms: u32) {
            self.calls.push(Call::DelayMs(ms)).unwrap();
        }

        fn reset_system(&mut self) {
            self.calls.push(Call::ResetSystem).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radio_error_names() {
        assert_eq!(RadioError::new(status::BUSY).name(), Some("BUSY"));
        assert_eq!(
            RadioError::new(status::INVALID_STATE).name(),
            Some("INVALID_STATE")
        );
        assert_eq!(RadioError::new(0xDEAD).name(), None);
    }

    #[test]
    fn test_radio_error_classification() {
        assert!(RadioError::new(status::BUSY).is_busy());
        assert!(!RadioError::new(status::NO_MEM).is_busy());
        assert!(RadioError::new(status::INVALID_STATE).is_invalid_state());
    }

    #[test]
    fn test_connection_params_roundtrip() {
        let params = ConnectionParams {
            min_interval_units: 6,
            max_interval_units: 160,
            slave_latency: 2,
            sup_timeout_10ms: 400,
        };
        assert_eq!(
            ConnectionParams::from_bytes(&params.to_bytes()),
            Some(params)
        );
        assert!(ConnectionParams::from_bytes(&[0u8; 4]).is_none());
    }

    #[test]
    fn test_timeout_source_decode() {
        assert_eq!(TimeoutSource::from_u16(0), Some(TimeoutSource::Advertising));
        assert_eq!(TimeoutSource::from_u16(1), Some(TimeoutSource::Connection));
        assert_eq!(TimeoutSource::from_u16(9), None);
    }
}
