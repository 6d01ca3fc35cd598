#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![allow(dead_code, clippy::too_many_lines)]

#[macro_use]
mod fmt;

mod address;
pub mod api;
pub mod constants;
pub mod event;
pub mod gap;
pub mod gatt;
mod host;
pub mod processor;
pub mod radio;
pub mod registry;
pub mod security;
pub mod stream;
pub mod task;
pub mod uuid;

use crate::constants::{
    ADVERTISING_INTERVAL_MS, APP_EVENT_QUEUE, HID_REPORT_MAX_LEN, MAX_ADV_PAYLOADS, MAX_CHANNELS,
    MAX_DISCOVERED_CHARACTERISTICS, MAX_DISCOVERED_SERVICES, MAX_EVENT_PAYLOAD, PASSKEY_LEN,
};
use crate::gap::{AdvPayload, AdvertisingLifecycle, IntervalAdjuster};
use crate::gatt::{CharacteristicInfo, ServiceInfo};
use crate::radio::RadioError;
use crate::registry::ConnectionRegistry;
use crate::security::{BondingStatus, SecurityConfig, SecurityManager, SecurityState};
use crate::stream::TxStream;
use crate::task::{PendingRetry, TaskCoordinator, TaskFailure, TaskOutcome, TaskResult};
use crate::uuid::UuidFilter;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    mutex::{MappedMutexGuard, Mutex, MutexGuard},
};
use heapless::{Deque, Vec};

pub use address::{AddressKind, PeerAddress};

pub(crate) static REQUEST_CHANNEL: Channel<CriticalSectionRawMutex, Request, MAX_CHANNELS> =
    Channel::new();

pub(crate) static RESPONSE_CHANNEL: Channel<CriticalSectionRawMutex, Response, MAX_CHANNELS> =
    Channel::new();

/// Application events produced by the driver, consumed via
/// [`api::next_event`]
pub static APP_EVENT_CHANNEL: Channel<CriticalSectionRawMutex, AppEvent, APP_EVENT_QUEUE> =
    Channel::new();

/// Signal raised after radio events were queued on the bridge; wakes the
/// processor loop. Vendor glue calls [`notify_event_pending`] after pushing.
pub static EVENT_WAKE: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Global `BleHost`, initialized by the client at runtime
pub(crate) static BLE_HOST: Mutex<CriticalSectionRawMutex, Option<BleHost>> = Mutex::new(None);

/// Tell the processor loop that radio events are waiting on the bridge.
///
/// Safe to call from interrupt context.
pub fn notify_event_pending() {
    EVENT_WAKE.signal(());
}

/// Initialize the global `BleHost` with the given options.
///
/// Must be called before using any API functions or running the processor.
///
/// # Errors
///
/// Returns an error if the `BleHost` has already been initialized.
pub async fn init_ble_host(options: BleHostOptions) -> Result<(), &'static str> {
    let mut guard = BLE_HOST.lock().await;
    if guard.is_some() {
        return Err("BleHost already initialized");
    }
    *guard = Some(BleHost::new(options));
    Ok(())
}

/// Get a locked reference to the global `BleHost`.
///
/// Primarily intended for the processor loop; applications should use the
/// functions in the `api` module instead.
///
/// # Errors
///
/// Returns an error if the `BleHost` has not been initialized.
///
/// # Panics
///
/// Panics if the mutex guard cannot be mapped (never happens in practice).
pub async fn ble_host<'a>()
-> Result<MappedMutexGuard<'a, CriticalSectionRawMutex, BleHost>, &'static str> {
    let guard = BLE_HOST.lock().await;
    if guard.is_none() {
        return Err("BleHost not initialized");
    }
    Ok(MutexGuard::map(guard, |opt| opt.as_mut().unwrap()))
}

/// Options for configuring a [`BleHost`] instance
#[derive(Debug, Clone, Copy)]
pub struct BleHostOptions {
    /// Advertising interval in milliseconds
    pub advertising_interval_ms: u16,
    /// Keep advertising while a peripheral connection is up
    pub advertise_when_connected: bool,
    /// Advertise as connectable
    pub connectable: bool,
    /// Advertise as scannable
    pub scannable: bool,
    /// Disable dynamic connection-interval adaptation
    pub disable_dynamic_interval: bool,
    /// Local security configuration
    pub security: SecurityConfig,
}

impl Default for BleHostOptions {
    fn default() -> Self {
        Self {
            advertising_interval_ms: ADVERTISING_INTERVAL_MS,
            advertise_when_connected: false,
            connectable: true,
            scannable: true,
            disable_dynamic_interval: false,
            security: SecurityConfig::default(),
        }
    }
}

/// Identifies one link from the application's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkId {
    /// The peripheral link (the peer that connected to us)
    Peripheral,
    /// A central link by registry slot index
    Central(u8),
}

/// Options for an outgoing central connection
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionOptions {
    /// Minimum connection interval in milliseconds (7.5 ms to 4 s)
    pub min_interval_ms: Option<u16>,
    /// Maximum connection interval in milliseconds (7.5 ms to 4 s)
    pub max_interval_ms: Option<u16>,
}

/// Bluetooth-related errors with the raw status preserved where one exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleError {
    /// The global host has not been initialized
    NotInitialized,
    /// Another asynchronous operation is already in flight
    Busy,
    /// The addressed link is not connected
    NotConnected,
    /// Every central link slot is taken
    NoFreeLink,
    /// Invalid parameter provided
    InvalidParameter,
    /// An internal queue is full
    QueueFull,
    /// The radio stack rejected a call
    Radio(RadioError),
    /// The active task failed
    Task(TaskFailure),
}

impl BleError {
    /// Short human-readable classification of the error
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            BleError::NotInitialized => "Not initialized",
            BleError::Busy => "Operation in progress",
            BleError::NotConnected => "Not connected",
            BleError::NoFreeLink => "No free central link",
            BleError::InvalidParameter => "Invalid parameter",
            BleError::QueueFull => "Queue full",
            BleError::Radio(error) => error.name().unwrap_or("Radio stack error"),
            BleError::Task(failure) => failure.message,
        }
    }
}

impl From<RadioError> for BleError {
    fn from(error: RadioError) -> Self {
        BleError::Radio(error)
    }
}

/// Events surfaced to the application layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// A peer connected to us
    Connected {
        /// Address of the peer
        peer: PeerAddress,
    },
    /// The peripheral link closed
    Disconnected {
        /// Stack reason code
        reason: u8,
    },
    /// A central link came up outside of task completion
    CentralConnected {
        /// Registry slot of the link
        index: u8,
    },
    /// A central link closed
    CentralDisconnected {
        /// Registry slot the link held
        index: u8,
        /// Stack reason code
        reason: u8,
    },
    /// Advertising started (`true`) or stopped (`false`)
    Advertising(bool),
    /// An advertising packet was received while scanning
    AdvReport {
        /// Advertiser address
        peer: PeerAddress,
        /// Signal strength in dBm
        rssi: i8,
        /// Raw advertising payload
        data: Vec<u8, { constants::MAX_ADV_DATA_LEN }>,
    },
    /// Signal strength sample for a monitored link
    Rssi {
        /// Central slot of the link, `None` for the peripheral link
        central_index: Option<u8>,
        /// Signal strength in dBm
        rssi: i8,
    },
    /// Bonding progress
    Bond(BondingStatus),
    /// Authentication finished
    Security {
        /// Raw authentication status (see [`security::auth_status_name`])
        auth_status: u8,
        /// Whether the link is bonded
        bonded: bool,
    },
    /// Show this passkey to the user
    PasskeyDisplay {
        /// Six ASCII digits
        passkey: [u8; PASSKEY_LEN],
        /// Central slot of the link, `None` for the peripheral link
        central_index: Option<u8>,
    },
    /// The peer wants a credential we must supply
    PasskeyRequest,
    /// A peer wrote one of our characteristics; see [`write_event_name`]
    CharacteristicWrite {
        /// Attribute handle written
        handle: u16,
        /// Data written
        data: Vec<u8, MAX_EVENT_PAYLOAD>,
    },
    /// A subscribed characteristic notified or indicated a new value
    Notification {
        /// Value attribute handle
        handle: u16,
        /// New value
        data: Vec<u8, MAX_EVENT_PAYLOAD>,
    },
    /// A HID output report value arrived
    HidValue(u8),
    /// The queued HID input report left the radio
    HidSent,
    /// Non-fatal stack error outside any task
    Error {
        /// Raw status code
        status: u32,
    },
}

/// Event-sink name for a write to the characteristic at `handle`,
/// e.g. `write:0x0021`
#[must_use]
pub fn write_event_name(handle: u16) -> heapless::String<12> {
    let mut name = heapless::String::new();
    name.push_str("write:0x").ok();
    let hex_chars = [
        '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F',
    ];
    for shift in [12u16, 8, 4, 0] {
        name.push(hex_chars[((handle >> shift) & 0xF) as usize]).ok();
    }
    name
}

/// API requests sent to the processor loop
#[derive(Debug, Clone)]
pub(crate) enum Request {
    /// Start advertising
    StartAdvertising,
    /// Stop advertising
    StopAdvertising,
    /// Replace the advertising payload list
    SetAdvertisingData(Vec<AdvPayload, MAX_ADV_PAYLOADS>),
    /// Start or stop scanning
    SetScanning {
        enabled: bool,
        active: bool,
    },
    /// Open a central connection
    Connect {
        peer: PeerAddress,
        options: ConnectionOptions,
    },
    /// Close a link
    Disconnect(LinkId),
    /// Discover primary services on a central link
    DiscoverServices {
        link: u8,
        filter: UuidFilter,
    },
    /// Discover characteristics within a service
    DiscoverCharacteristics {
        link: u8,
        service: ServiceInfo,
        filter: UuidFilter,
    },
    /// Read a characteristic value
    ReadCharacteristic {
        link: u8,
        characteristic: CharacteristicInfo,
    },
    /// Write a characteristic value
    WriteCharacteristic {
        link: u8,
        characteristic: CharacteristicInfo,
        data: Vec<u8, MAX_EVENT_PAYLOAD>,
    },
    /// Enable or disable notifications on a characteristic
    SetNotifications {
        link: u8,
        characteristic: CharacteristicInfo,
        enable: bool,
    },
    /// Secure/bond a link
    StartBonding {
        link: LinkId,
        force_repair: bool,
    },
    /// Enable or disable RSSI reporting on a link
    SetRssiReporting {
        link: LinkId,
        enabled: bool,
    },
    /// Send a HID input report
    SendHidReport(Vec<u8, HID_REPORT_MAX_LEN>),
    /// Queue bytes on the outbound stream
    WriteStream(Vec<u8, MAX_EVENT_PAYLOAD>),
    /// Enable or disable the whitelist-on-bond policy
    SetWhitelistOnBond(bool),
    /// Erase all stored bonds
    EraseBonds,
    /// Read the security state machine
    GetSecurityState,
}

/// API responses sent back from the processor loop
#[derive(Debug)]
pub(crate) enum Response {
    /// Operation finished with nothing further to report
    Done,
    /// Bytes accepted onto the outbound stream
    StreamAccepted(usize),
    /// A central link came up
    CentralLink { index: u8 },
    /// Unfiltered service discovery result
    Services(Vec<ServiceInfo, MAX_DISCOVERED_SERVICES>),
    /// Filtered service discovery result
    Service(ServiceInfo),
    /// Unfiltered characteristic discovery result
    Characteristics(Vec<CharacteristicInfo, MAX_DISCOVERED_CHARACTERISTICS>),
    /// Filtered characteristic discovery result
    Characteristic(CharacteristicInfo),
    /// A read characteristic value
    Value(Vec<u8, MAX_EVENT_PAYLOAD>),
    /// Current security state
    SecurityState(SecurityState),
    /// Error occurred
    Error(BleError),
}

impl From<TaskOutcome> for Response {
    fn from(outcome: TaskOutcome) -> Self {
        match outcome.result {
            Ok(TaskResult::Done) => Response::Done,
            Ok(TaskResult::CentralLink { index, .. }) => Response::CentralLink { index },
            Ok(TaskResult::Services(services)) => Response::Services(services),
            Ok(TaskResult::Service(service)) => Response::Service(service),
            Ok(TaskResult::Characteristics(chars)) => Response::Characteristics(chars),
            Ok(TaskResult::Characteristic(characteristic)) => {
                Response::Characteristic(characteristic)
            }
            Ok(TaskResult::Value(value)) => Response::Value(value),
            Err(failure) => Response::Error(BleError::Task(failure)),
        }
    }
}

/// The BLE host driver state: connection registry, task coordinator,
/// advertising/scanning lifecycle, security state machine and the outbound
/// stream.
///
/// All mutation happens in application context; the interrupt side only
/// feeds the event bridge.
pub struct BleHost {
    pub(crate) registry: ConnectionRegistry,
    pub(crate) tasks: TaskCoordinator,
    pub(crate) adv: AdvertisingLifecycle,
    pub(crate) interval: IntervalAdjuster,
    pub(crate) security: SecurityManager,
    pub(crate) stream: TxStream,
    pub(crate) retry: Option<PendingRetry>,
    pub(crate) hid_sending: bool,
    app_events: Deque<AppEvent, APP_EVENT_QUEUE>,
    outcome: Option<TaskOutcome>,
}

impl BleHost {
    /// Create a host with the given options
    #[must_use]
    pub fn new(options: BleHostOptions) -> Self {
        let interval_units = (u32::from(options.advertising_interval_ms) * 8 / 5) as u16;
        Self {
            registry: ConnectionRegistry::new(),
            tasks: TaskCoordinator::new(),
            adv: AdvertisingLifecycle::new(
                interval_units,
                options.connectable,
                options.scannable,
                options.advertise_when_connected,
            ),
            interval: IntervalAdjuster::new(options.disable_dynamic_interval),
            security: SecurityManager::new(options.security),
            stream: TxStream::new(),
            retry: None,
            hid_sending: false,
            app_events: Deque::new(),
            outcome: None,
        }
    }

    /// The connection registry
    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Current security state
    #[must_use]
    pub fn security_state(&self) -> SecurityState {
        self.security.state()
    }

    /// Queue an application event for collection.
    ///
    /// The queue is bounded; when full the event is dropped (the API
    /// channel applies backpressure before this happens in practice).
    pub(crate) fn emit(&mut self, event: AppEvent) {
        if self.app_events.push_back(event).is_err() {
            debug!("app event queue full, dropping event");
        }
    }

    /// Pop the next queued application event
    pub(crate) fn take_app_event(&mut self) -> Option<AppEvent> {
        self.app_events.pop_front()
    }

    /// Record the outcome of the task that just resolved
    pub(crate) fn set_outcome(&mut self, outcome: TaskOutcome) {
        if self.outcome.is_some() {
            warn!("unconsumed task outcome overwritten");
        }
        self.outcome = Some(outcome);
    }

    /// Take the outcome of the task that just resolved, if any
    pub(crate) fn take_task_outcome(&mut self) -> Option<TaskOutcome> {
        self.outcome.take()
    }

    pub(crate) fn fail_task(&mut self, kind: crate::task::TaskKind, failure: TaskFailure) {
        self.set_outcome(TaskOutcome {
            kind,
            result: Err(failure),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_default() {
        let options = BleHostOptions::default();
        assert_eq!(options.advertising_interval_ms, ADVERTISING_INTERVAL_MS);
        assert!(options.connectable);
        assert!(options.scannable);
        assert!(!options.advertise_when_connected);
        assert!(!options.disable_dynamic_interval);
    }

    #[test]
    fn test_host_starts_idle() {
        let host = BleHost::new(BleHostOptions::default());
        assert!(host.tasks.is_idle());
        assert!(!host.registry.has_connection());
        assert!(!host.adv.is_advertising());
        assert_eq!(host.security_state(), SecurityState::NoSecurity);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(BleError::Busy.message(), "Operation in progress");
        assert_eq!(
            BleError::Radio(RadioError::new(radio::status::BUSY)).message(),
            "BUSY"
        );
        assert_eq!(
            BleError::Radio(RadioError::new(0x7777)).message(),
            "Radio stack error"
        );
        assert_eq!(
            BleError::Task(TaskFailure::new("No Characteristics found")).message(),
            "No Characteristics found"
        );
    }

    #[test]
    fn test_write_event_name() {
        assert_eq!(write_event_name(0x0021).as_str(), "write:0x0021");
        assert_eq!(write_event_name(0xBEEF).as_str(), "write:0xBEEF");
    }

    #[test]
    fn test_app_event_queue_is_bounded() {
        let mut host = BleHost::new(BleHostOptions::default());
        for _ in 0..APP_EVENT_QUEUE + 4 {
            host.emit(AppEvent::HidSent);
        }
        let mut drained = 0;
        while host.take_app_event().is_some() {
            drained += 1;
        }
        assert_eq!(drained, APP_EVENT_QUEUE);
    }

    #[test]
    fn test_outcome_slot() {
        let mut host = BleHost::new(BleHostOptions::default());
        assert!(host.take_task_outcome().is_none());
        host.set_outcome(TaskOutcome {
            kind: task::TaskKind::CharacteristicWrite,
            result: Ok(TaskResult::Done),
        });
        let outcome = host.take_task_outcome().unwrap();
        assert_eq!(outcome.kind, task::TaskKind::CharacteristicWrite);
        assert!(host.take_task_outcome().is_none());
    }
}
