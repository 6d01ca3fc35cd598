//! `Bluejay` Constants
//!
//! This module contains all the constants used throughout the `Bluejay` library:
//! link-count and buffer limits, timing parameters for the dynamic connection
//! interval, and the attribute-protocol values the driver needs to know about.

/// Number of central-role links the driver can hold at once
pub const CENTRAL_LINK_COUNT: usize = 2;

/// Default ATT payload size before any MTU exchange
pub const DEFAULT_ATT_MTU: u16 = 23;

/// Largest ATT payload size the driver will negotiate up to
pub const MAX_ATT_MTU: u16 = 64;

/// Upper bound on the byte payload carried by one pending event
pub const MAX_EVENT_PAYLOAD: usize = MAX_ATT_MTU as usize;

/// Bytes of payload stored in a single event-queue slot
pub const EVENT_SLOT_DATA: usize = 24;

/// Number of slots in the interrupt-to-application event queue
pub const EVENT_QUEUE_SLOTS: usize = 64;

/// Maximum advertising (or scan response) payload length in bytes
pub const MAX_ADV_DATA_LEN: usize = 31;

/// Maximum number of advertising payloads that can be rotated through
pub const MAX_ADV_PAYLOADS: usize = 4;

/// Default advertising interval in milliseconds
pub const ADVERTISING_INTERVAL_MS: u16 = 375;

/// Maximum services returned by one primary service discovery
pub const MAX_DISCOVERED_SERVICES: usize = 8;

/// Maximum characteristics returned by one characteristic discovery
pub const MAX_DISCOVERED_CHARACTERISTICS: usize = 8;

/// Fast (active) connection interval in 1.25 ms units (7.5 ms)
pub const FAST_CONN_INTERVAL_UNITS: u16 = 6;

/// Slow (idle, low power) connection interval in 1.25 ms units (200 ms)
pub const SLOW_CONN_INTERVAL_UNITS: u16 = 160;

/// Radio ticks without activity before the link drops to the slow interval
/// (120 s worth of 7.5 ms connection events)
pub const DYNAMIC_INTERVAL_IDLE_TICKS: u32 = 16_000;

/// Slave latency for the peripheral link - respond on every event
pub const SLAVE_LATENCY: u16 = 0;

/// Slave latency when connecting out as a central
pub const SLAVE_LATENCY_CENTRAL: u16 = 2;

/// Connection supervision timeout in 10 ms units (4 s)
pub const CONN_SUP_TIMEOUT_10MS: u16 = 400;

/// Default central connection interval range in 1.25 ms units (20..200 ms)
pub const CENTRAL_CONN_INTERVAL_MIN_UNITS: u16 = 16;
/// See [`CENTRAL_CONN_INTERVAL_MIN_UNITS`]
pub const CENTRAL_CONN_INTERVAL_MAX_UNITS: u16 = 160;

/// Radio ticks to wait before re-issuing a discovery call the stack
/// rejected as busy (roughly 500 ms of 7.5 ms connection events)
pub const BUSY_RETRY_DELAY_TICKS: u16 = 67;

/// Maximum peers held in the bonded-peer whitelist
pub const MAX_WHITELIST_PEERS: usize = 8;

/// Sentinel peer-manager id meaning "no peer"
pub const PEER_ID_INVALID: u16 = 0xFFFF;

/// Maximum length of a HID input report
pub const HID_REPORT_MAX_LEN: usize = 16;

/// Bytes that can be queued on the outbound stream before writes are refused
pub const STREAM_PENDING_CAPACITY: usize = 128;

/// Largest stream chunk handed to the radio stack in one call
pub const STREAM_CHUNK_MAX: usize = 20;

/// Queue depth for application events awaiting collection
pub const APP_EVENT_QUEUE: usize = 8;

/// Depth of the API request/response channels
pub const MAX_CHANNELS: usize = 4;

/// UUID of the Client Characteristic Configuration descriptor
pub const CCCD_UUID: u16 = 0x2902;

/// CCCD value bit enabling notifications
pub const CCCD_NOTIFICATION: u8 = 0x01;

/// CCCD value bit enabling indications
pub const CCCD_INDICATION: u8 = 0x02;

/// Last valid attribute handle; discovery past this handle is complete
pub const ATT_LAST_HANDLE: u16 = 0xFFFF;

/// Length of a pairing passkey in digits
pub const PASSKEY_LEN: usize = 6;

/// Length of an out-of-band pairing key in bytes
pub const OOB_KEY_LEN: usize = 16;

/// Blocking delay before the controlled reset on a fatal stack fault
pub const FATAL_RESET_DELAY_MS: u32 = 1000;
