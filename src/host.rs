//! BLE host operations
//!
//! The operational surface of [`BleHost`]: everything the application can
//! ask the driver to do. Each asynchronous GATT/GAP operation claims the
//! single task slot, issues exactly one radio-stack call and returns; the
//! completion arrives later through the event bridge and is resolved in
//! [`dispatch`](self::dispatch). Operations that the radio rejects
//! immediately release the task slot again and surface the raw status.
//!
//! ## Architecture
//!
//! * **Operations** (this file) - validate, claim the task slot, issue the
//!   radio call
//! * **Dispatch** (`host/dispatch.rs`) - consume bridge events, advance the
//!   state machines, resolve the task
//! * **Processor** (`processor.rs`) - the async loop wiring both to the
//!   API channels

mod dispatch;

use crate::constants::{
    BUSY_RETRY_DELAY_TICKS, CCCD_INDICATION, CCCD_NOTIFICATION, CENTRAL_CONN_INTERVAL_MAX_UNITS,
    CENTRAL_CONN_INTERVAL_MIN_UNITS, CONN_SUP_TIMEOUT_10MS, FATAL_RESET_DELAY_MS,
    HID_REPORT_MAX_LEN, SLAVE_LATENCY_CENTRAL,
};
use crate::gatt::{CharacteristicInfo, ServiceInfo};
use crate::radio::{ConnectionParams, HandleRange, RadioStack};
use crate::task::{
    ActiveTask, PendingRetry, RetryOp, TaskFailure, TaskKind, TaskOutcome, TaskResult,
};
use crate::uuid::UuidFilter;
use crate::{BleError, BleHost, ConnectionOptions, LinkId, PeerAddress, Request, Response};
use bt_hci::param::ConnHandle;

impl BleHost {
    /// Start advertising. Idempotent; a no-op while a peripheral connection
    /// is up unless `advertise_when_connected` was configured.
    ///
    /// # Errors
    /// Returns the raw status when the radio stack rejects the call.
    pub fn start_advertising<R: RadioStack>(&mut self, radio: &mut R) -> Result<(), BleError> {
        let connected = self.registry.has_peripheral_connection();
        if self.adv.start(radio, connected)? {
            self.emit(crate::AppEvent::Advertising(true));
        }
        Ok(())
    }

    /// Stop advertising. Idempotent.
    ///
    /// # Errors
    /// Returns the raw status when the radio stack rejects the call.
    pub fn stop_advertising<R: RadioStack>(&mut self, radio: &mut R) -> Result<(), BleError> {
        if self.adv.stop(radio)? {
            self.emit(crate::AppEvent::Advertising(false));
        }
        Ok(())
    }

    /// Replace the advertising payload list. A list with more than one
    /// entry rotates one payload per radio tick.
    ///
    /// # Errors
    /// Returns the raw status when a live payload update is rejected.
    pub fn set_advertising_data<R: RadioStack>(
        &mut self,
        radio: &mut R,
        payloads: heapless::Vec<crate::gap::AdvPayload, { crate::constants::MAX_ADV_PAYLOADS }>,
    ) -> Result<(), BleError> {
        let update_live = self.adv.is_advertising() && payloads.len() == 1;
        self.adv.set_payloads(payloads);
        if update_live {
            // Swap the running advertising set's payload in place; rotation
            // handles the multi-payload case on the next tick
            if let Some(first) = self.adv.first_payload() {
                radio.update_advertising_data(first)?;
            }
        }
        Ok(())
    }

    /// Start or stop scanning for advertising packets
    ///
    /// # Errors
    /// Returns the raw status when the radio stack rejects the call.
    pub fn set_scanning<R: RadioStack>(
        &mut self,
        radio: &mut R,
        enabled: bool,
        active: bool,
    ) -> Result<(), BleError> {
        self.adv.set_scanning(radio, enabled, active)?;
        Ok(())
    }

    /// Open a central connection to `peer`. Resolves through the task
    /// coordinator when the stack reports the link.
    ///
    /// # Errors
    /// `Busy` when another task is in flight, or the raw status when the
    /// radio stack rejects the connect call.
    pub fn connect<R: RadioStack>(
        &mut self,
        radio: &mut R,
        peer: PeerAddress,
        options: ConnectionOptions,
    ) -> Result<(), BleError> {
        self.start_task(ActiveTask::new(TaskKind::Connect))?;

        let params = Self::central_conn_params(&options);
        if let Err(error) = radio.connect(&peer, &params) {
            self.tasks.take();
            return Err(error.into());
        }
        Ok(())
    }

    fn central_conn_params(options: &ConnectionOptions) -> ConnectionParams {
        let ms_to_units = |ms: u16| (u32::from(ms) * 4 / 5) as u16;
        let min_interval_units = options
            .min_interval_ms
            .map_or(CENTRAL_CONN_INTERVAL_MIN_UNITS, ms_to_units);
        let max_interval_units = options
            .max_interval_ms
            .map_or(CENTRAL_CONN_INTERVAL_MAX_UNITS, ms_to_units);

        // Supervision timeout must exceed (1 + latency) * interval * 2;
        // round the floor up
        let min_sup_timeout =
            ((u32::from(1 + SLAVE_LATENCY_CENTRAL) * u32::from(max_interval_units) + 4) >> 2)
                as u16;
        ConnectionParams {
            min_interval_units,
            max_interval_units,
            slave_latency: SLAVE_LATENCY_CENTRAL,
            sup_timeout_10ms: CONN_SUP_TIMEOUT_10MS.max(min_sup_timeout),
        }
    }

    /// Close a link
    ///
    /// # Errors
    /// `NotConnected` when no such link exists, or the raw status when the
    /// radio stack rejects the call.
    pub fn disconnect<R: RadioStack>(
        &mut self,
        radio: &mut R,
        link: LinkId,
    ) -> Result<(), BleError> {
        let handle = self.link_handle(link).ok_or(BleError::NotConnected)?;
        radio.disconnect(ConnHandle::new(handle))?;
        Ok(())
    }

    /// Discover primary services on a central link, optionally filtered by
    /// UUID.
    ///
    /// A transient "busy" rejection from the stack is not a failure: the
    /// call is re-issued after [`BUSY_RETRY_DELAY_TICKS`] radio ticks, and a
    /// further busy answer re-arms the same retry.
    ///
    /// # Errors
    /// `Busy` when another task is in flight, `NotConnected` for a dead
    /// link, or the raw status for any other rejection.
    pub fn discover_primary_services<R: RadioStack>(
        &mut self,
        radio: &mut R,
        link: u8,
        filter: UuidFilter,
    ) -> Result<(), BleError> {
        let conn = self.central_handle(link)?;
        self.start_task(
            ActiveTask::new(TaskKind::PrimaryServiceDiscovery)
                .on_link(conn)
                .with_filter(filter),
        )?;

        match radio.discover_primary_services(ConnHandle::new(conn), 1) {
            Ok(()) => Ok(()),
            Err(error) if error.is_busy() => {
                debug!("service discovery busy, retrying in {} ticks", BUSY_RETRY_DELAY_TICKS);
                self.retry = Some(PendingRetry {
                    op: RetryOp::PrimaryServiceDiscovery { conn },
                    ticks_left: BUSY_RETRY_DELAY_TICKS,
                });
                Ok(())
            }
            Err(error) => {
                self.tasks.take();
                Err(error.into())
            }
        }
    }

    /// Discover characteristics within `service`, optionally filtered by
    /// UUID.
    ///
    /// # Errors
    /// `Busy` when another task is in flight, `NotConnected` for a dead
    /// link, or the raw status when the radio stack rejects the call.
    pub fn discover_characteristics<R: RadioStack>(
        &mut self,
        radio: &mut R,
        link: u8,
        service: &ServiceInfo,
        filter: UuidFilter,
    ) -> Result<(), BleError> {
        let conn = self.central_handle(link)?;
        self.start_task(
            ActiveTask::new(TaskKind::CharacteristicDiscovery)
                .on_link(conn)
                .with_filter(filter)
                .until_handle(service.end_handle),
        )?;

        let range = HandleRange {
            start: service.start_handle,
            end: service.end_handle,
        };
        if let Err(error) = radio.discover_characteristics(ConnHandle::new(conn), range) {
            self.tasks.take();
            return Err(error.into());
        }
        Ok(())
    }

    /// Read a characteristic value
    ///
    /// # Errors
    /// `Busy` when another task is in flight, `NotConnected` for a dead
    /// link, or the raw status when the radio stack rejects the call.
    pub fn read_characteristic<R: RadioStack>(
        &mut self,
        radio: &mut R,
        link: u8,
        characteristic: &CharacteristicInfo,
    ) -> Result<(), BleError> {
        let conn = self.central_handle(link)?;
        self.start_task(
            ActiveTask::new(TaskKind::CharacteristicRead)
                .on_link(conn)
                .with_target(*characteristic),
        )?;

        if let Err(error) = radio.read_characteristic(ConnHandle::new(conn), characteristic.handle_value)
        {
            self.tasks.take();
            return Err(error.into());
        }
        Ok(())
    }

    /// Write a characteristic value. Uses write-without-response when the
    /// characteristic only supports that; the completion event differs but
    /// the task resolves the same way.
    ///
    /// # Errors
    /// `Busy` when another task is in flight, `NotConnected` for a dead
    /// link, or the raw status when the radio stack rejects the call.
    pub fn write_characteristic<R: RadioStack>(
        &mut self,
        radio: &mut R,
        link: u8,
        characteristic: &CharacteristicInfo,
        data: &[u8],
    ) -> Result<(), BleError> {
        let conn = self.central_handle(link)?;
        self.start_task(
            ActiveTask::new(TaskKind::CharacteristicWrite)
                .on_link(conn)
                .with_target(*characteristic),
        )?;

        let with_response = !characteristic.props.write_without_response();
        if let Err(error) = radio.write_characteristic(
            ConnHandle::new(conn),
            characteristic.handle_value,
            data,
            with_response,
        ) {
            self.tasks.take();
            return Err(error.into());
        }
        Ok(())
    }

    /// Enable or disable notifications on a characteristic.
    ///
    /// When the notification-configuration descriptor handle is not known
    /// yet, a descriptor discovery runs first and hands off into the
    /// configuration write; the operation resolves once the write is
    /// acknowledged.
    ///
    /// # Errors
    /// `Busy` when another task is in flight, `NotConnected` for a dead
    /// link, a task failure when disabling without a known descriptor, or
    /// the raw status when the radio stack rejects the call.
    pub fn set_notifications<R: RadioStack>(
        &mut self,
        radio: &mut R,
        link: u8,
        characteristic: &CharacteristicInfo,
        enable: bool,
    ) -> Result<(), BleError> {
        let conn = self.central_handle(link)?;

        if let Some(cccd_handle) = characteristic.cccd_handle {
            self.start_task(
                ActiveTask::new(TaskKind::NotifyToggle)
                    .on_link(conn)
                    .with_target(*characteristic),
            )?;
            let value = Self::cccd_value(characteristic, enable);
            if let Err(error) =
                radio.write_characteristic(ConnHandle::new(conn), cccd_handle, &value, true)
            {
                self.tasks.take();
                return Err(error.into());
            }
            return Ok(());
        }

        if !enable {
            return Err(BleError::Task(TaskFailure::new("handle_cccd not set")));
        }

        // Resolve the descriptor first; only the handle right behind the
        // value attribute is of interest
        self.start_task(
            ActiveTask::new(TaskKind::DescriptorDiscovery)
                .on_link(conn)
                .with_target(*characteristic),
        )?;
        let range = HandleRange {
            start: characteristic.handle_value + 1,
            end: characteristic.handle_value + 1,
        };
        if let Err(error) = radio.discover_descriptors(ConnHandle::new(conn), range) {
            self.tasks.take();
            return Err(error.into());
        }
        Ok(())
    }

    pub(crate) fn cccd_value(characteristic: &CharacteristicInfo, enable: bool) -> [u8; 2] {
        if !enable {
            return [0, 0];
        }
        if characteristic.props.notify() {
            [CCCD_NOTIFICATION, 0]
        } else if characteristic.props.indicate() {
            [CCCD_INDICATION, 0]
        } else {
            [0, 0]
        }
    }

    /// Secure/bond a link. `force_repair` renegotiates even when keys exist.
    ///
    /// # Errors
    /// `Busy` when another task is in flight, `NotConnected` for a dead
    /// link, or the raw status when the radio stack rejects the call.
    pub fn start_bonding<R: RadioStack>(
        &mut self,
        radio: &mut R,
        link: LinkId,
        force_repair: bool,
    ) -> Result<(), BleError> {
        let conn = self.link_handle(link).ok_or(BleError::NotConnected)?;
        self.start_task(ActiveTask::new(TaskKind::Bonding).on_link(conn))?;

        if let Err(error) = radio.secure_link(ConnHandle::new(conn), force_repair) {
            self.tasks.take();
            return Err(error.into());
        }
        Ok(())
    }

    /// Enable or disable RSSI change reporting on a link; samples arrive as
    /// [`crate::AppEvent::Rssi`]
    ///
    /// # Errors
    /// `NotConnected` when no such link exists, or the raw status when the
    /// radio stack rejects the call.
    pub fn set_rssi_reporting<R: RadioStack>(
        &mut self,
        radio: &mut R,
        link: LinkId,
        enabled: bool,
    ) -> Result<(), BleError> {
        let conn = self.link_handle(link).ok_or(BleError::NotConnected)?;
        radio.set_rssi_reporting(ConnHandle::new(conn), enabled)?;
        Ok(())
    }

    /// Send a HID input report over the peripheral link
    ///
    /// # Errors
    /// `InvalidParameter` for an oversized report, `NotConnected` without a
    /// peripheral link, or the raw status when the radio stack rejects the
    /// call.
    pub fn send_hid_report<R: RadioStack>(
        &mut self,
        radio: &mut R,
        data: &[u8],
    ) -> Result<(), BleError> {
        if data.is_empty() || data.len() > HID_REPORT_MAX_LEN {
            return Err(BleError::InvalidParameter);
        }
        let handle = self
            .registry
            .peripheral()
            .map(|p| p.handle)
            .ok_or(BleError::NotConnected)?;
        radio.send_hid_report(ConnHandle::new(handle), data)?;
        self.hid_sending = true;
        Ok(())
    }

    /// Queue bytes on the outbound stream; they drain on radio ticks.
    /// Returns how many bytes the buffer accepted.
    pub fn write_stream(&mut self, data: &[u8]) -> usize {
        self.stream.write(data)
    }

    /// Enable or disable the whitelist-on-bond policy. Disabling clears the
    /// whitelist on the radio stack as well.
    ///
    /// # Errors
    /// Returns the raw status when pushing the cleared whitelist fails.
    pub fn set_whitelist_on_bond<R: RadioStack>(
        &mut self,
        radio: &mut R,
        enabled: bool,
    ) -> Result<(), BleError> {
        self.security.set_whitelist_on_bond(enabled);
        self.security.flush_whitelist(radio)?;
        Ok(())
    }

    /// Erase all stored bonds and the whitelist
    ///
    /// # Errors
    /// Returns the raw status when the radio stack rejects the call.
    pub fn erase_bonds<R: RadioStack>(&mut self, radio: &mut R) -> Result<(), BleError> {
        self.security.erase_bonds(radio)?;
        self.security.flush_whitelist(radio)?;
        Ok(())
    }

    /// Unrecoverable stack fault: log, wait out any in-flight flash/radio
    /// activity, then request a full device reset.
    pub fn fatal_error<R: RadioStack>(&mut self, radio: &mut R, status: u32) {
        error!("fatal radio stack fault 0x{:x}, resetting", status);
        radio.delay_ms(FATAL_RESET_DELAY_MS);
        radio.reset_system();
    }

    /// Resolve a link id against the registry
    pub(crate) fn link_handle(&self, link: LinkId) -> Option<u16> {
        match link {
            LinkId::Peripheral => self.registry.peripheral().map(|p| p.handle),
            LinkId::Central(index) => self.registry.central_handle(usize::from(index)),
        }
    }

    fn central_handle(&self, link: u8) -> Result<u16, BleError> {
        self.registry
            .central_handle(usize::from(link))
            .ok_or(BleError::NotConnected)
    }

    fn start_task(&mut self, task: ActiveTask) -> Result<(), BleError> {
        self.tasks.start(task).map_err(|_| BleError::Busy)
    }

    /// Handle one API request. `None` means the request started a task and
    /// the response is produced when that task resolves.
    pub(crate) fn process_request<R: RadioStack>(
        &mut self,
        radio: &mut R,
        request: Request,
    ) -> Option<Response> {
        match request {
            Request::StartAdvertising => Some(match self.start_advertising(radio) {
                Ok(()) => Response::Done,
                Err(e) => Response::Error(e),
            }),
            Request::StopAdvertising => Some(match self.stop_advertising(radio) {
                Ok(()) => Response::Done,
                Err(e) => Response::Error(e),
            }),
            Request::SetAdvertisingData(payloads) => {
                Some(match self.set_advertising_data(radio, payloads) {
                    Ok(()) => Response::Done,
                    Err(e) => Response::Error(e),
                })
            }
            Request::SetScanning { enabled, active } => {
                Some(match self.set_scanning(radio, enabled, active) {
                    Ok(()) => Response::Done,
                    Err(e) => Response::Error(e),
                })
            }
            Request::Connect { peer, options } => match self.connect(radio, peer, options) {
                Ok(()) => None,
                Err(e) => Some(Response::Error(e)),
            },
            Request::Disconnect(link) => Some(match self.disconnect(radio, link) {
                Ok(()) => Response::Done,
                Err(e) => Response::Error(e),
            }),
            Request::DiscoverServices { link, filter } => {
                match self.discover_primary_services(radio, link, filter) {
                    Ok(()) => None,
                    Err(e) => Some(Response::Error(e)),
                }
            }
            Request::DiscoverCharacteristics {
                link,
                service,
                filter,
            } => match self.discover_characteristics(radio, link, &service, filter) {
                Ok(()) => None,
                Err(e) => Some(Response::Error(e)),
            },
            Request::ReadCharacteristic {
                link,
                characteristic,
            } => match self.read_characteristic(radio, link, &characteristic) {
                Ok(()) => None,
                Err(e) => Some(Response::Error(e)),
            },
            Request::WriteCharacteristic {
                link,
                characteristic,
                data,
            } => match self.write_characteristic(radio, link, &characteristic, &data) {
                Ok(()) => None,
                Err(e) => Some(Response::Error(e)),
            },
            Request::SetNotifications {
                link,
                characteristic,
                enable,
            } => match self.set_notifications(radio, link, &characteristic, enable) {
                Ok(()) => None,
                Err(e) => Some(Response::Error(e)),
            },
            Request::StartBonding { link, force_repair } => {
                match self.start_bonding(radio, link, force_repair) {
                    Ok(()) => None,
                    Err(e) => Some(Response::Error(e)),
                }
            }
            Request::SetRssiReporting { link, enabled } => {
                Some(match self.set_rssi_reporting(radio, link, enabled) {
                    Ok(()) => Response::Done,
                    Err(e) => Response::Error(e),
                })
            }
            Request::SendHidReport(data) => Some(match self.send_hid_report(radio, &data) {
                Ok(()) => Response::Done,
                Err(e) => Response::Error(e),
            }),
            Request::WriteStream(data) => Some(Response::StreamAccepted(self.write_stream(&data))),
            Request::SetWhitelistOnBond(enabled) => {
                Some(match self.set_whitelist_on_bond(radio, enabled) {
                    Ok(()) => Response::Done,
                    Err(e) => Response::Error(e),
                })
            }
            Request::EraseBonds => Some(match self.erase_bonds(radio) {
                Ok(()) => Response::Done,
                Err(e) => Response::Error(e),
            }),
            Request::GetSecurityState => Some(Response::SecurityState(self.security_state())),
        }
    }

    /// Resolve a finished discovery task into its result, applying the
    /// filter-collapse rule: a filtered discovery resolves with its first
    /// match, or fails when nothing matched.
    pub(crate) fn finish_discovery(&mut self, kind: TaskKind) {
        let Some(task) = self.tasks.complete_success(kind) else {
            return;
        };
        let result = match kind {
            TaskKind::PrimaryServiceDiscovery => {
                if task.filter.is_filtering() {
                    match task.services.first() {
                        Some(service) => Ok(TaskResult::Service(*service)),
                        None => Err(TaskFailure::new("No Services found")),
                    }
                } else {
                    Ok(TaskResult::Services(task.services))
                }
            }
            TaskKind::CharacteristicDiscovery => {
                if task.filter.is_filtering() {
                    match task.characteristics.first() {
                        Some(characteristic) => Ok(TaskResult::Characteristic(*characteristic)),
                        None => Err(TaskFailure::new("No Characteristics found")),
                    }
                } else {
                    Ok(TaskResult::Characteristics(task.characteristics))
                }
            }
            _ => Ok(TaskResult::Done),
        };
        self.set_outcome(TaskOutcome { kind, result });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::mock::{Call, MockRadio};
    use crate::radio::status;
    use crate::uuid::BleUuid;
    use crate::{AppEvent, BleHostOptions};
    use crate::gatt::CharProps;

    fn host_with_central() -> (crate::BleHost, MockRadio) {
        let mut host = crate::BleHost::new(BleHostOptions::default());
        let radio = MockRadio::new();
        host.registry.claim_central(0x20).unwrap();
        (host, radio)
    }

    fn characteristic(cccd: Option<u16>) -> CharacteristicInfo {
        CharacteristicInfo {
            uuid: BleUuid::Uuid16(0x2A4D),
            handle_decl: 0x001F,
            handle_value: 0x0020,
            props: CharProps::from_bits(CharProps::FLAG_READ | CharProps::FLAG_NOTIFY),
            cccd_handle: cccd,
        }
    }

    #[test]
    fn test_task_overlap_is_rejected_up_front() {
        let (mut host, mut radio) = host_with_central();
        host.discover_primary_services(&mut radio, 0, UuidFilter::Any)
            .unwrap();

        let err = host.read_characteristic(&mut radio, 0, &characteristic(None));
        assert_eq!(err, Err(BleError::Busy));
        // Original task is untouched
        assert!(host.tasks.in_task(TaskKind::PrimaryServiceDiscovery));
        // Only the discovery reached the radio
        assert_eq!(radio.calls().len(), 1);
    }

    #[test]
    fn test_immediate_radio_rejection_releases_task() {
        let (mut host, mut radio) = host_with_central();
        radio.fail_next(status::INVALID_STATE);

        let err = host.read_characteristic(&mut radio, 0, &characteristic(None));
        assert_eq!(
            err,
            Err(BleError::Radio(crate::radio::RadioError::new(
                status::INVALID_STATE
            )))
        );
        assert!(host.tasks.is_idle());
    }

    #[test]
    fn test_discovery_busy_arms_retry_instead_of_failing() {
        let (mut host, mut radio) = host_with_central();
        radio.fail_next(status::BUSY);

        host.discover_primary_services(&mut radio, 0, UuidFilter::Any)
            .unwrap();
        assert!(host.tasks.in_task(TaskKind::PrimaryServiceDiscovery));
        assert_eq!(
            host.retry,
            Some(PendingRetry {
                op: RetryOp::PrimaryServiceDiscovery { conn: 0x20 },
                ticks_left: BUSY_RETRY_DELAY_TICKS,
            })
        );
    }

    #[test]
    fn test_operations_require_a_live_link() {
        let mut host = crate::BleHost::new(BleHostOptions::default());
        let mut radio = MockRadio::new();
        assert_eq!(
            host.discover_primary_services(&mut radio, 0, UuidFilter::Any),
            Err(BleError::NotConnected)
        );
        assert_eq!(
            host.start_bonding(&mut radio, LinkId::Peripheral, false),
            Err(BleError::NotConnected)
        );
    }

    #[test]
    fn test_subscribe_without_cccd_starts_descriptor_discovery() {
        let (mut host, mut radio) = host_with_central();
        host.set_notifications(&mut radio, 0, &characteristic(None), true)
            .unwrap();
        assert!(host.tasks.in_task(TaskKind::DescriptorDiscovery));
        // Only the handle right behind the value attribute is probed
        assert_eq!(
            radio.calls(),
            &[Call::DiscoverDescriptors {
                conn: 0x20,
                start: 0x0021,
                end: 0x0021
            }]
        );
    }

    #[test]
    fn test_subscribe_with_known_cccd_writes_directly() {
        let (mut host, mut radio) = host_with_central();
        host.set_notifications(&mut radio, 0, &characteristic(Some(0x0021)), true)
            .unwrap();
        assert!(host.tasks.in_task(TaskKind::NotifyToggle));
        assert_eq!(
            radio.calls(),
            &[Call::Write {
                conn: 0x20,
                handle: 0x0021,
                data: heapless::Vec::from_slice(&[0x01, 0x00]).unwrap(),
                with_response: true
            }]
        );
    }

    #[test]
    fn test_unsubscribe_without_cccd_fails_immediately() {
        let (mut host, mut radio) = host_with_central();
        let err = host.set_notifications(&mut radio, 0, &characteristic(None), false);
        assert_eq!(
            err,
            Err(BleError::Task(TaskFailure::new("handle_cccd not set")))
        );
        assert!(host.tasks.is_idle());
    }

    #[test]
    fn test_cccd_value_prefers_notification() {
        let notify = characteristic(Some(1));
        assert_eq!(crate::BleHost::cccd_value(&notify, true), [0x01, 0x00]);

        let mut indicate_only = notify;
        indicate_only.props = CharProps::from_bits(CharProps::FLAG_INDICATE);
        assert_eq!(
            crate::BleHost::cccd_value(&indicate_only, true),
            [0x02, 0x00]
        );
        assert_eq!(crate::BleHost::cccd_value(&notify, false), [0x00, 0x00]);
    }

    #[test]
    fn test_write_uses_command_when_response_unsupported() {
        let (mut host, mut radio) = host_with_central();
        let mut chr = characteristic(None);
        chr.props = CharProps::from_bits(CharProps::FLAG_WRITE_WITHOUT_RESPONSE);
        host.write_characteristic(&mut radio, 0, &chr, &[0xAA])
            .unwrap();
        assert_eq!(
            radio.calls(),
            &[Call::Write {
                conn: 0x20,
                handle: 0x0020,
                data: heapless::Vec::from_slice(&[0xAA]).unwrap(),
                with_response: false
            }]
        );
    }

    #[test]
    fn test_hid_report_validation() {
        let mut host = crate::BleHost::new(BleHostOptions::default());
        let mut radio = MockRadio::new();
        assert_eq!(
            host.send_hid_report(&mut radio, &[0; HID_REPORT_MAX_LEN + 1]),
            Err(BleError::InvalidParameter)
        );
        assert_eq!(
            host.send_hid_report(&mut radio, &[1, 2, 3]),
            Err(BleError::NotConnected)
        );

        host.registry
            .set_peripheral(0x10, PeerAddress::public([0; 6]));
        host.send_hid_report(&mut radio, &[1, 2, 3]).unwrap();
        assert!(host.hid_sending);
    }

    #[test]
    fn test_advertising_events_emitted_on_change_only() {
        let mut host = crate::BleHost::new(BleHostOptions::default());
        let mut radio = MockRadio::new();
        host.start_advertising(&mut radio).unwrap();
        host.start_advertising(&mut radio).unwrap();
        assert_eq!(host.take_app_event(), Some(AppEvent::Advertising(true)));
        assert_eq!(host.take_app_event(), None);
    }

    #[test]
    fn test_central_conn_params_supervision_floor() {
        // A huge interval forces the supervision timeout above its default
        let params = crate::BleHost::central_conn_params(&ConnectionOptions {
            min_interval_ms: Some(3000),
            max_interval_ms: Some(4000),
        });
        assert_eq!(params.max_interval_units, 3200);
        assert!(params.sup_timeout_10ms > CONN_SUP_TIMEOUT_10MS);

        let default_params = crate::BleHost::central_conn_params(&ConnectionOptions::default());
        assert_eq!(default_params.sup_timeout_10ms, CONN_SUP_TIMEOUT_10MS);
    }
}
