//! `Bluejay` API Functions
//!
//! The public application surface of the driver. These functions talk to
//! the processor loop over static channels and are designed to be called
//! from application code.
//!
//! Asynchronous GATT/GAP operations resolve when their underlying task
//! resolves - a discovery returns once every response page arrived, a
//! subscribe returns once the configuration write was acknowledged. The
//! coordinator runs at most one such task at a time and does not queue:
//! callers must serialize their operations, and an overlapping call fails
//! with [`BleError::Busy`].
//!
//! # Usage
//!
//! ```ignore
//! use bluejay::{api, uuid::{BleUuid, UuidFilter}};
//!
//! let link = api::connect(peer, Default::default()).await?;
//! let service = api::find_service(link, BleUuid::Uuid16(0x180D)).await?;
//! let chr = api::find_characteristic(link, &service, BleUuid::Uuid16(0x2A37)).await?;
//! let chr = api::subscribe(link, &chr).await?;
//! while let bluejay::AppEvent::Notification { handle, data } = api::next_event().await {
//!     // ...
//! }
//! ```

use crate::constants::{
    HID_REPORT_MAX_LEN, MAX_ADV_PAYLOADS, MAX_DISCOVERED_CHARACTERISTICS,
    MAX_DISCOVERED_SERVICES, MAX_EVENT_PAYLOAD,
};
use crate::gap::AdvPayload;
use crate::gatt::{CharacteristicInfo, ServiceInfo};
use crate::radio::{RadioError, status};
use crate::security::SecurityState;
use crate::uuid::{BleUuid, UuidFilter};
use crate::{
    APP_EVENT_CHANNEL, AppEvent, BleError, ConnectionOptions, LinkId, PeerAddress,
    REQUEST_CHANNEL, RESPONSE_CHANNEL, Request, Response,
};
use heapless::Vec;

fn unexpected() -> BleError {
    BleError::Radio(RadioError::new(status::INTERNAL))
}

/// Start advertising.
///
/// # Errors
/// Returns an error when the radio stack rejects the call.
pub async fn start_advertising() -> Result<(), BleError> {
    REQUEST_CHANNEL.sender().send(Request::StartAdvertising).await;
    match RESPONSE_CHANNEL.receiver().receive().await {
        Response::Done => Ok(()),
        Response::Error(e) => Err(e),
        _ => Err(unexpected()),
    }
}

/// Stop advertising.
///
/// # Errors
/// Returns an error when the radio stack rejects the call.
pub async fn stop_advertising() -> Result<(), BleError> {
    REQUEST_CHANNEL.sender().send(Request::StopAdvertising).await;
    match RESPONSE_CHANNEL.receiver().receive().await {
        Response::Done => Ok(()),
        Response::Error(e) => Err(e),
        _ => Err(unexpected()),
    }
}

/// Replace the advertising payload list. More than one payload rotates one
/// payload per radio tick.
///
/// # Errors
/// Returns an error when a live payload update is rejected.
pub async fn set_advertising_data(
    payloads: Vec<AdvPayload, MAX_ADV_PAYLOADS>,
) -> Result<(), BleError> {
    REQUEST_CHANNEL
        .sender()
        .send(Request::SetAdvertisingData(payloads))
        .await;
    match RESPONSE_CHANNEL.receiver().receive().await {
        Response::Done => Ok(()),
        Response::Error(e) => Err(e),
        _ => Err(unexpected()),
    }
}

/// Start or stop scanning. Advertising reports arrive as
/// [`AppEvent::AdvReport`] through [`next_event`].
///
/// # Errors
/// Returns an error when the radio stack rejects the call.
pub async fn set_scanning(enabled: bool, active: bool) -> Result<(), BleError> {
    REQUEST_CHANNEL
        .sender()
        .send(Request::SetScanning { enabled, active })
        .await;
    match RESPONSE_CHANNEL.receiver().receive().await {
        Response::Done => Ok(()),
        Response::Error(e) => Err(e),
        _ => Err(unexpected()),
    }
}

/// Connect to a peer as a central. Resolves with the new link's slot index
/// once the stack reports the connection.
///
/// # Errors
/// `Busy` while another operation is in flight, a timeout failure when the
/// connect attempt expires, or the raw status for a rejected call.
pub async fn connect(peer: PeerAddress, options: ConnectionOptions) -> Result<u8, BleError> {
    REQUEST_CHANNEL
        .sender()
        .send(Request::Connect { peer, options })
        .await;
    match RESPONSE_CHANNEL.receiver().receive().await {
        Response::CentralLink { index } => Ok(index),
        Response::Error(e) => Err(e),
        _ => Err(unexpected()),
    }
}

/// Close a link.
///
/// # Errors
/// `NotConnected` when no such link exists, or the raw status when the
/// radio stack rejects the call.
pub async fn disconnect(link: LinkId) -> Result<(), BleError> {
    REQUEST_CHANNEL.sender().send(Request::Disconnect(link)).await;
    match RESPONSE_CHANNEL.receiver().receive().await {
        Response::Done => Ok(()),
        Response::Error(e) => Err(e),
        _ => Err(unexpected()),
    }
}

/// Discover all primary services on a central link, in ascending handle
/// order.
///
/// # Errors
/// `Busy` while another operation is in flight, `NotConnected` for a dead
/// link, or a task failure from the discovery itself.
pub async fn discover_services(
    link: u8,
) -> Result<Vec<ServiceInfo, MAX_DISCOVERED_SERVICES>, BleError> {
    REQUEST_CHANNEL
        .sender()
        .send(Request::DiscoverServices {
            link,
            filter: UuidFilter::Any,
        })
        .await;
    match RESPONSE_CHANNEL.receiver().receive().await {
        Response::Services(services) => Ok(services),
        Response::Error(e) => Err(e),
        _ => Err(unexpected()),
    }
}

/// Discover the one primary service with `uuid`.
///
/// # Errors
/// As [`discover_services`]; fails with "No Services found" when the peer
/// does not offer the service.
pub async fn find_service(link: u8, uuid: BleUuid) -> Result<ServiceInfo, BleError> {
    REQUEST_CHANNEL
        .sender()
        .send(Request::DiscoverServices {
            link,
            filter: UuidFilter::Exact(uuid),
        })
        .await;
    match RESPONSE_CHANNEL.receiver().receive().await {
        Response::Service(service) => Ok(service),
        Response::Error(e) => Err(e),
        _ => Err(unexpected()),
    }
}

/// Discover all characteristics within `service`, in ascending handle
/// order.
///
/// # Errors
/// As [`discover_services`].
pub async fn discover_characteristics(
    link: u8,
    service: &ServiceInfo,
) -> Result<Vec<CharacteristicInfo, MAX_DISCOVERED_CHARACTERISTICS>, BleError> {
    REQUEST_CHANNEL
        .sender()
        .send(Request::DiscoverCharacteristics {
            link,
            service: *service,
            filter: UuidFilter::Any,
        })
        .await;
    match RESPONSE_CHANNEL.receiver().receive().await {
        Response::Characteristics(characteristics) => Ok(characteristics),
        Response::Error(e) => Err(e),
        _ => Err(unexpected()),
    }
}

/// Discover the one characteristic with `uuid` within `service`.
///
/// # Errors
/// As [`discover_services`]; fails with "No Characteristics found" when the
/// service does not contain it.
pub async fn find_characteristic(
    link: u8,
    service: &ServiceInfo,
    uuid: BleUuid,
) -> Result<CharacteristicInfo, BleError> {
    REQUEST_CHANNEL
        .sender()
        .send(Request::DiscoverCharacteristics {
            link,
            service: *service,
            filter: UuidFilter::Exact(uuid),
        })
        .await;
    match RESPONSE_CHANNEL.receiver().receive().await {
        Response::Characteristic(characteristic) => Ok(characteristic),
        Response::Error(e) => Err(e),
        _ => Err(unexpected()),
    }
}

/// Read a characteristic value.
///
/// # Errors
/// As [`discover_services`].
pub async fn read_characteristic(
    link: u8,
    characteristic: &CharacteristicInfo,
) -> Result<Vec<u8, MAX_EVENT_PAYLOAD>, BleError> {
    REQUEST_CHANNEL
        .sender()
        .send(Request::ReadCharacteristic {
            link,
            characteristic: *characteristic,
        })
        .await;
    match RESPONSE_CHANNEL.receiver().receive().await {
        Response::Value(value) => Ok(value),
        Response::Error(e) => Err(e),
        _ => Err(unexpected()),
    }
}

/// Write a characteristic value. Uses write-without-response when that is
/// all the characteristic supports.
///
/// # Errors
/// `InvalidParameter` for an oversized value, otherwise as
/// [`discover_services`].
pub async fn write_characteristic(
    link: u8,
    characteristic: &CharacteristicInfo,
    data: &[u8],
) -> Result<(), BleError> {
    let data = Vec::from_slice(data).map_err(|()| BleError::InvalidParameter)?;
    REQUEST_CHANNEL
        .sender()
        .send(Request::WriteCharacteristic {
            link,
            characteristic: *characteristic,
            data,
        })
        .await;
    match RESPONSE_CHANNEL.receiver().receive().await {
        Response::Done => Ok(()),
        Response::Error(e) => Err(e),
        _ => Err(unexpected()),
    }
}

/// Subscribe to notifications (or indications) from a characteristic.
///
/// Discovers the notification-configuration descriptor when its handle is
/// not known yet, then enables it; the returned characteristic carries the
/// resolved descriptor handle for later unsubscribing. Values arrive as
/// [`AppEvent::Notification`] through [`next_event`].
///
/// # Errors
/// As [`discover_services`]; fails with "CCCD Handle not found" when the
/// characteristic has no configuration descriptor.
pub async fn subscribe(
    link: u8,
    characteristic: &CharacteristicInfo,
) -> Result<CharacteristicInfo, BleError> {
    REQUEST_CHANNEL
        .sender()
        .send(Request::SetNotifications {
            link,
            characteristic: *characteristic,
            enable: true,
        })
        .await;
    match RESPONSE_CHANNEL.receiver().receive().await {
        Response::Characteristic(characteristic) => Ok(characteristic),
        Response::Done => Ok(*characteristic),
        Response::Error(e) => Err(e),
        _ => Err(unexpected()),
    }
}

/// Disable notifications on a characteristic previously subscribed with
/// [`subscribe`].
///
/// # Errors
/// Fails when the characteristic's configuration descriptor handle is not
/// known, otherwise as [`discover_services`].
pub async fn unsubscribe(
    link: u8,
    characteristic: &CharacteristicInfo,
) -> Result<(), BleError> {
    REQUEST_CHANNEL
        .sender()
        .send(Request::SetNotifications {
            link,
            characteristic: *characteristic,
            enable: false,
        })
        .await;
    match RESPONSE_CHANNEL.receiver().receive().await {
        Response::Characteristic(_) | Response::Done => Ok(()),
        Response::Error(e) => Err(e),
        _ => Err(unexpected()),
    }
}

/// Secure/bond a link. `force_repair` renegotiates even when keys already
/// exist.
///
/// # Errors
/// As [`discover_services`]; fails with "Bonding failed" when the pairing
/// procedure does not complete.
pub async fn start_bonding(link: LinkId, force_repair: bool) -> Result<(), BleError> {
    REQUEST_CHANNEL
        .sender()
        .send(Request::StartBonding { link, force_repair })
        .await;
    match RESPONSE_CHANNEL.receiver().receive().await {
        Response::Done => Ok(()),
        Response::Error(e) => Err(e),
        _ => Err(unexpected()),
    }
}

/// Enable or disable RSSI change reporting on a link; samples arrive as
/// [`AppEvent::Rssi`] through [`next_event`].
///
/// # Errors
/// `NotConnected` when no such link exists, or the raw status when the
/// radio stack rejects the call.
pub async fn set_rssi_reporting(link: LinkId, enabled: bool) -> Result<(), BleError> {
    REQUEST_CHANNEL
        .sender()
        .send(Request::SetRssiReporting { link, enabled })
        .await;
    match RESPONSE_CHANNEL.receiver().receive().await {
        Response::Done => Ok(()),
        Response::Error(e) => Err(e),
        _ => Err(unexpected()),
    }
}

/// Send a HID input report over the peripheral link. [`AppEvent::HidSent`]
/// reports when it left the radio.
///
/// # Errors
/// `InvalidParameter` for an empty or oversized report, `NotConnected`
/// without a peripheral link.
pub async fn send_hid_report(data: &[u8]) -> Result<(), BleError> {
    let data: Vec<u8, HID_REPORT_MAX_LEN> =
        Vec::from_slice(data).map_err(|()| BleError::InvalidParameter)?;
    REQUEST_CHANNEL.sender().send(Request::SendHidReport(data)).await;
    match RESPONSE_CHANNEL.receiver().receive().await {
        Response::Done => Ok(()),
        Response::Error(e) => Err(e),
        _ => Err(unexpected()),
    }
}

/// Queue bytes on the outbound stream. They drain one chunk per radio tick;
/// a peer that is not reading drops the stream. Returns how many bytes the
/// buffer accepted.
///
/// # Errors
/// Returns an error when the processor is not running.
pub async fn write_stream(data: &[u8]) -> Result<usize, BleError> {
    let data: Vec<u8, MAX_EVENT_PAYLOAD> =
        Vec::from_slice(&data[..data.len().min(MAX_EVENT_PAYLOAD)]).unwrap_or_default();
    REQUEST_CHANNEL.sender().send(Request::WriteStream(data)).await;
    match RESPONSE_CHANNEL.receiver().receive().await {
        Response::StreamAccepted(accepted) => Ok(accepted),
        Response::Error(e) => Err(e),
        _ => Err(unexpected()),
    }
}

/// Enable or disable adding newly bonded peers to the reconnect whitelist.
/// Disabling clears the whitelist.
///
/// # Errors
/// Returns an error when pushing the whitelist to the radio stack fails.
pub async fn set_whitelist_on_bond(enabled: bool) -> Result<(), BleError> {
    REQUEST_CHANNEL
        .sender()
        .send(Request::SetWhitelistOnBond(enabled))
        .await;
    match RESPONSE_CHANNEL.receiver().receive().await {
        Response::Done => Ok(()),
        Response::Error(e) => Err(e),
        _ => Err(unexpected()),
    }
}

/// Erase all stored bonds and the whitelist.
///
/// # Errors
/// Returns an error when the radio stack rejects the call.
pub async fn erase_bonds() -> Result<(), BleError> {
    REQUEST_CHANNEL.sender().send(Request::EraseBonds).await;
    match RESPONSE_CHANNEL.receiver().receive().await {
        Response::Done => Ok(()),
        Response::Error(e) => Err(e),
        _ => Err(unexpected()),
    }
}

/// Current state of the security/bonding state machine.
///
/// # Errors
/// Returns an error when the processor is not running.
pub async fn security_state() -> Result<SecurityState, BleError> {
    REQUEST_CHANNEL.sender().send(Request::GetSecurityState).await;
    match RESPONSE_CHANNEL.receiver().receive().await {
        Response::SecurityState(state) => Ok(state),
        Response::Error(e) => Err(e),
        _ => Err(unexpected()),
    }
}

/// Wait for the next application event (connects, disconnects, bond
/// progress, notifications, peripheral writes, HID traffic, adv reports)
pub async fn next_event() -> AppEvent {
    APP_EVENT_CHANNEL.receiver().receive().await
}
