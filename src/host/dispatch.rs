//! Application-context event dispatch
//!
//! [`BleHost::drain_and_dispatch`] pops pending events off the bridge in
//! arrival order and advances the driver state machines: registry updates,
//! task completion, discovery pagination, the descriptor-to-notify hand-off,
//! security reactions and the periodic tick housekeeping. Radio calls made
//! here run in application context, never in the interrupt that produced
//! the event.
//!
//! Events that name a task other than the active one are stale leftovers of
//! an earlier operation and are dropped.

use crate::constants::{ATT_LAST_HANDLE, BUSY_RETRY_DELAY_TICKS, CCCD_UUID, MAX_ATT_MTU};
use crate::event::{EventBridge, PendingEvent, PendingKind};
use crate::gatt::{CharacteristicInfo, ServiceInfo};
use crate::radio::{AuthKeyReply, ConnectionParams, RadioStack, SecurityParamsReply};
use crate::security::{BondingStatus, PairingParams, PeerId};
use crate::stream::TxOutcome;
use crate::task::{
    PendingRetry, RetryOp, TaskFailure, TaskKind, TaskOutcome, TaskResult,
};
use crate::uuid::BleUuid;
use crate::{AppEvent, BleHost, PeerAddress};
use bt_hci::param::ConnHandle;
use heapless::Vec;

impl BleHost {
    /// Drain the event bridge, dispatching every queued event in FIFO
    /// order. Returns the number of queue slots consumed.
    pub fn drain_and_dispatch<R: RadioStack>(
        &mut self,
        radio: &mut R,
        bridge: &mut EventBridge,
    ) -> usize {
        let mut slots = 0;
        while let Some((event, consumed)) = bridge.pop_event() {
            slots += consumed;
            self.dispatch(radio, event);
        }
        slots
    }

    /// Dispatch one pending event
    pub(crate) fn dispatch<R: RadioStack>(&mut self, radio: &mut R, event: PendingEvent) {
        match event.kind {
            PendingKind::Continuation => {}
            PendingKind::Connected => self.on_peripheral_connected(radio, &event),
            PendingKind::CentralConnected => self.on_central_connected(radio, event.data),
            PendingKind::Disconnected => self.on_disconnected(radio, &event),
            PendingKind::GapTimeout => self.on_gap_timeout(radio),
            PendingKind::AdvReport => self.on_adv_report(&event),
            PendingKind::Rssi => {
                let rssi = event.payload.first().map_or(0, |&b| b as i8);
                let central_index = self
                    .registry
                    .central_index(event.data)
                    .map(|index| index as u8);
                self.emit(AppEvent::Rssi {
                    central_index,
                    rssi,
                });
            }
            PendingKind::ConnParamUpdateRequest => {
                // Accept whatever the peer asked for
                if let Some(params) = ConnectionParams::from_bytes(&event.payload) {
                    radio
                        .accept_conn_param_update(ConnHandle::new(event.data), &params)
                        .ok();
                }
            }
            PendingKind::MtuUpdated => {
                if event.payload.len() >= 2 {
                    let mtu = u16::from_le_bytes([event.payload[0], event.payload[1]]);
                    self.registry.set_mtu(event.data, mtu);
                }
            }
            PendingKind::MtuExchangeRequest => {
                if event.payload.len() >= 2 {
                    let mtu = u16::from_le_bytes([event.payload[0], event.payload[1]]);
                    self.registry.set_mtu(event.data, mtu);
                }
                radio
                    .reply_mtu_exchange(ConnHandle::new(event.data), MAX_ATT_MTU)
                    .ok();
            }
            PendingKind::ServiceDiscovered => self.on_service_discovered(&event),
            PendingKind::ServicePageEnd => self.on_service_page_end(radio, event.data),
            PendingKind::CharacteristicDiscovered => self.on_characteristic_discovered(&event),
            PendingKind::CharacteristicPageEnd => {
                self.on_characteristic_page_end(radio, event.data);
            }
            PendingKind::DescriptorDiscovered => self.on_descriptor_discovered(&event),
            PendingKind::DescriptorPageEnd => self.on_descriptor_page_end(radio),
            PendingKind::CharacteristicValueRead => {
                if let Some(_task) = self.tasks.complete_success(TaskKind::CharacteristicRead) {
                    let mut value = Vec::new();
                    value.extend_from_slice(&event.payload).ok();
                    self.set_outcome(TaskOutcome {
                        kind: TaskKind::CharacteristicRead,
                        result: Ok(TaskResult::Value(value)),
                    });
                }
            }
            PendingKind::WriteResponse => self.on_write_response(),
            PendingKind::TxComplete => self.on_tx_complete(radio, event.data),
            PendingKind::Notification | PendingKind::Indication => {
                self.on_notification(radio, &event);
            }
            PendingKind::PeripheralWrite => {
                let mut data = Vec::new();
                data.extend_from_slice(&event.payload).ok();
                self.emit(AppEvent::CharacteristicWrite {
                    handle: event.data,
                    data,
                });
                let peripheral = self.registry.peripheral().map(|p| p.handle);
                self.interval.on_activity(radio, peripheral);
            }
            PendingKind::SecurityParamsRequest => self.on_security_params_request(radio, &event),
            PendingKind::PasskeyDisplay => {
                if event.payload.len() >= crate::constants::PASSKEY_LEN {
                    let mut passkey = [0u8; crate::constants::PASSKEY_LEN];
                    passkey.copy_from_slice(&event.payload[..crate::constants::PASSKEY_LEN]);
                    let central_index = self
                        .registry
                        .central_index(event.data)
                        .map(|index| index as u8);
                    self.emit(AppEvent::PasskeyDisplay {
                        passkey,
                        central_index,
                    });
                }
            }
            PendingKind::AuthKeyRequest => {
                self.emit(AppEvent::PasskeyRequest);
                // Must be answered from locally configured material; an
                // explicit empty reply fails the procedure rather than
                // letting it time out
                let reply = match (self.security.config.oob_key, self.security.config.passkey) {
                    (Some(key), _) => AuthKeyReply::Oob(key),
                    (None, Some(passkey)) => AuthKeyReply::Passkey(passkey),
                    (None, None) => AuthKeyReply::None,
                };
                radio
                    .reply_auth_key(ConnHandle::new(event.data), reply)
                    .ok();
            }
            PendingKind::AuthStatus => {
                if event.payload.len() >= 2 {
                    self.emit(AppEvent::Security {
                        auth_status: event.payload[0],
                        bonded: event.payload[1] != 0,
                    });
                }
            }
            PendingKind::BondingStatus => self.on_bonding_status(radio, &event),
            PendingKind::BondedPeerConnected => {
                if let Some(peer) = PeerId::from_raw(event.data) {
                    self.security.note_bonded_peer(peer);
                }
            }
            PendingKind::StackError => {
                if event.payload.len() >= 4 {
                    let status = u32::from_le_bytes([
                        event.payload[0],
                        event.payload[1],
                        event.payload[2],
                        event.payload[3],
                    ]);
                    warn!("radio stack error 0x{:x}", status);
                    self.emit(AppEvent::Error { status });
                }
            }
            PendingKind::HidValue => self.emit(AppEvent::HidValue(event.data as u8)),
            PendingKind::RadioTick => self.on_radio_tick(radio),
        }
    }

    fn on_peripheral_connected<R: RadioStack>(&mut self, radio: &mut R, event: &PendingEvent) {
        let Some(peer) = PeerAddress::from_bytes(&event.payload) else {
            return;
        };
        self.registry.set_peripheral(event.data, peer);
        self.interval.on_peripheral_connected();
        self.hid_sending = false;

        // A connectable advertising set ends with the connection; restart it
        // right away when configured to advertise while connected
        if self.adv.stop_for_connection(radio) {
            self.emit(AppEvent::Advertising(false));
        }
        if self.adv.advertise_when_connected {
            if let Ok(true) = self.adv.restart_if_enabled(radio, true) {
                self.emit(AppEvent::Advertising(true));
            }
        }
        self.emit(AppEvent::Connected { peer });
    }

    fn on_central_connected<R: RadioStack>(&mut self, radio: &mut R, handle: u16) {
        match self.registry.claim_central(handle) {
            Some(index) => {
                radio
                    .request_mtu_exchange(ConnHandle::new(handle), MAX_ATT_MTU)
                    .ok();
                if self.tasks.complete_success(TaskKind::Connect).is_some() {
                    self.set_outcome(TaskOutcome {
                        kind: TaskKind::Connect,
                        result: Ok(TaskResult::CentralLink {
                            index: index as u8,
                            handle,
                        }),
                    });
                }
                self.emit(AppEvent::CentralConnected {
                    index: index as u8,
                });
            }
            None => {
                warn!("central connected but no free link slot");
                if self.tasks.complete_failure(TaskKind::Connect).is_some() {
                    self.fail_task(
                        TaskKind::Connect,
                        TaskFailure {
                            message: "No free central link",
                            status: Some(crate::radio::status::CONN_COUNT),
                        },
                    );
                }
            }
        }
    }

    fn on_disconnected<R: RadioStack>(&mut self, radio: &mut R, event: &PendingEvent) {
        let handle = event.data;
        let reason = event.payload.first().copied().unwrap_or(0);

        if let Some(index) = self.registry.release_central(handle) {
            // Link loss beats whatever the task was waiting for
            if let Some(task) = self.tasks.fail_on_disconnect(handle) {
                self.fail_task(task.kind, TaskFailure::new("Disconnected"));
            }
            self.emit(AppEvent::CentralDisconnected {
                index: index as u8,
                reason,
            });
        } else if self.registry.is_peripheral(handle) {
            self.registry.clear_peripheral();
            self.interval.on_disconnected();
            self.stream.clear();
            self.hid_sending = false;
            if let Err(error) = self.security.flush_whitelist(radio) {
                self.emit(AppEvent::Error {
                    status: error.status,
                });
            }
            self.emit(AppEvent::Disconnected { reason });
            if let Ok(true) = self.adv.restart_if_enabled(radio, false) {
                self.emit(AppEvent::Advertising(true));
            }
        }
    }

    fn on_gap_timeout<R: RadioStack>(&mut self, radio: &mut R) {
        // A connect or bonding attempt that was waiting dies here
        let kind = self.tasks.current_kind();
        if matches!(kind, Some(TaskKind::Connect | TaskKind::Bonding)) {
            let task = self.tasks.take().unwrap();
            self.fail_task(
                task.kind,
                TaskFailure {
                    message: "Connection Timeout",
                    status: Some(crate::radio::status::TIMEOUT),
                },
            );
            return;
        }
        // Otherwise the advertising duration elapsed; kick it off again
        self.adv.mark_stopped();
        if let Ok(true) = self.adv.restart_if_enabled(radio, self.registry.has_peripheral_connection())
        {
            self.emit(AppEvent::Advertising(true));
        }
    }

    fn on_adv_report(&mut self, event: &PendingEvent) {
        let Some(peer) = PeerAddress::from_bytes(&event.payload) else {
            return;
        };
        let rest = &event.payload[crate::address::PEER_ADDRESS_LEN..];
        let Some((&rssi_raw, data)) = rest.split_first() else {
            return;
        };
        let mut report = Vec::new();
        report
            .extend_from_slice(&data[..data.len().min(report.capacity())])
            .ok();
        self.emit(AppEvent::AdvReport {
            peer,
            rssi: rssi_raw as i8,
            data: report,
        });
    }

    fn on_service_discovered(&mut self, event: &PendingEvent) {
        let Some(task) = self.tasks.active_mut() else {
            return;
        };
        if task.kind != TaskKind::PrimaryServiceDiscovery {
            debug!("stray service discovery response dropped");
            return;
        }
        if let Some(service) = ServiceInfo::decode(&event.payload) {
            if task.filter.matches(&service.uuid) {
                task.services.push(service).ok();
            }
        }
    }

    fn on_service_page_end<R: RadioStack>(&mut self, radio: &mut R, last_end_handle: u16) {
        if !self.tasks.in_task(TaskKind::PrimaryServiceDiscovery) {
            return;
        }
        if last_end_handle < ATT_LAST_HANDLE {
            let conn = self.tasks.active().and_then(|task| task.conn);
            if let Some(conn) = conn {
                // More attribute space left; ask for the next page. A
                // rejected continuation ends discovery with what we have.
                if radio
                    .discover_primary_services(ConnHandle::new(conn), last_end_handle + 1)
                    .is_ok()
                {
                    return;
                }
            }
        }
        self.finish_discovery(TaskKind::PrimaryServiceDiscovery);
    }

    fn on_characteristic_discovered(&mut self, event: &PendingEvent) {
        let Some(task) = self.tasks.active_mut() else {
            return;
        };
        if task.kind != TaskKind::CharacteristicDiscovery {
            debug!("stray characteristic discovery response dropped");
            return;
        }
        if let Some(characteristic) = CharacteristicInfo::decode(&event.payload) {
            if task.filter.matches(&characteristic.uuid) {
                task.characteristics.push(characteristic).ok();
            }
        }
    }

    fn on_characteristic_page_end<R: RadioStack>(&mut self, radio: &mut R, last_value_handle: u16) {
        if !self.tasks.in_task(TaskKind::CharacteristicDiscovery) {
            return;
        }
        let (conn, final_handle) = {
            let task = self.tasks.active().unwrap();
            (task.conn, task.final_handle)
        };
        if last_value_handle < final_handle {
            if let Some(conn) = conn {
                let range = crate::radio::HandleRange {
                    start: last_value_handle + 1,
                    end: final_handle,
                };
                // May be rejected for the last characteristic of the last
                // service; that simply ends discovery
                if radio
                    .discover_characteristics(ConnHandle::new(conn), range)
                    .is_ok()
                {
                    return;
                }
            }
        }
        self.finish_discovery(TaskKind::CharacteristicDiscovery);
    }

    fn on_descriptor_discovered(&mut self, event: &PendingEvent) {
        let Some(task) = self.tasks.active_mut() else {
            return;
        };
        if task.kind != TaskKind::DescriptorDiscovery {
            return;
        }
        if let Some((uuid, _)) = BleUuid::decode_from(&event.payload) {
            if uuid == BleUuid::Uuid16(CCCD_UUID) {
                if let Some(target) = task.target.as_mut() {
                    target.cccd_handle = Some(event.data);
                }
            }
        }
    }

    fn on_descriptor_page_end<R: RadioStack>(&mut self, radio: &mut R) {
        if !self.tasks.in_task(TaskKind::DescriptorDiscovery) {
            return;
        }
        let target = self.tasks.active().and_then(|task| task.target);
        match target.and_then(|t| t.cccd_handle.map(|handle| (t, handle))) {
            Some((target, cccd_handle)) => {
                // Hand off into the configuration write instead of
                // completing; the caller's subscribe spans both exchanges
                let conn = self.tasks.active().and_then(|task| task.conn);
                self.tasks.switch_to(TaskKind::NotifyToggle);
                if let Some(task) = self.tasks.active_mut() {
                    task.target = Some(target);
                }
                let value = Self::cccd_value(&target, true);
                let result = conn.map(|conn| {
                    radio.write_characteristic(ConnHandle::new(conn), cccd_handle, &value, true)
                });
                if !matches!(result, Some(Ok(()))) {
                    self.tasks.take();
                    self.fail_task(
                        TaskKind::NotifyToggle,
                        TaskFailure::new("Notify configuration write failed"),
                    );
                }
            }
            None => {
                self.tasks.take();
                self.fail_task(
                    TaskKind::DescriptorDiscovery,
                    TaskFailure::new("CCCD Handle not found"),
                );
            }
        }
    }

    fn on_write_response(&mut self) {
        if let Some(task) = self.tasks.complete_success(TaskKind::NotifyToggle) {
            // The acknowledged configuration write resolves the original
            // subscribe operation
            let result = match task.target {
                Some(characteristic) => Ok(TaskResult::Characteristic(characteristic)),
                None => Ok(TaskResult::Done),
            };
            self.set_outcome(TaskOutcome {
                kind: TaskKind::NotifyToggle,
                result,
            });
        } else if self.tasks.complete_success(TaskKind::CharacteristicWrite).is_some() {
            self.set_outcome(TaskOutcome {
                kind: TaskKind::CharacteristicWrite,
                result: Ok(TaskResult::Done),
            });
        }
    }

    fn on_tx_complete<R: RadioStack>(&mut self, radio: &mut R, handle: u16) {
        if self.registry.central_index(handle).is_some() {
            // Completion of a write-without-response
            if self.tasks.complete_success(TaskKind::CharacteristicWrite).is_some() {
                self.set_outcome(TaskOutcome {
                    kind: TaskKind::CharacteristicWrite,
                    result: Ok(TaskResult::Done),
                });
            }
            return;
        }
        if self.registry.is_peripheral(handle) {
            self.interval.on_activity(radio, Some(handle));
            if self.hid_sending {
                self.hid_sending = false;
                self.emit(AppEvent::HidSent);
            }
            // Room freed up; push more stream data out
            if let Some(peripheral) = self.registry.peripheral().copied() {
                self.stream.transmit(radio, peripheral.handle, peripheral.mtu);
            }
        }
    }

    fn on_notification<R: RadioStack>(&mut self, radio: &mut R, event: &PendingEvent) {
        if event.payload.len() < 2 {
            return;
        }
        let conn = u16::from_le_bytes([event.payload[0], event.payload[1]]);
        let mut data = Vec::new();
        data.extend_from_slice(&event.payload[2..]).ok();
        self.emit(AppEvent::Notification {
            handle: event.data,
            data,
        });
        if event.kind == PendingKind::Indication {
            radio
                .confirm_indication(ConnHandle::new(conn), event.data)
                .ok();
        }
    }

    fn on_security_params_request<R: RadioStack>(&mut self, radio: &mut R, event: &PendingEvent) {
        let Some(peer) = PairingParams::from_bytes(&event.payload) else {
            return;
        };
        let reply = if self.security.can_pair_with_peer(&peer) {
            SecurityParamsReply::Accept(self.security.config.pairing_params())
        } else {
            // Refuse explicitly; a dropped request would leave the peer
            // waiting for the protocol timeout
            SecurityParamsReply::Reject
        };
        radio
            .reply_security_params(ConnHandle::new(event.data), reply)
            .ok();
    }

    fn on_bonding_status<R: RadioStack>(&mut self, radio: &mut R, event: &PendingEvent) {
        let Some(status) = BondingStatus::from_u8(event.data as u8) else {
            return;
        };
        let mut peer = None;
        let mut error = 0u16;
        let mut conn = None;
        if event.payload.len() >= 6 {
            peer = PeerId::from_raw(u16::from_le_bytes([event.payload[0], event.payload[1]]));
            error = u16::from_le_bytes([event.payload[2], event.payload[3]]);
            conn = Some(u16::from_le_bytes([event.payload[4], event.payload[5]]));
        }

        self.security.on_bonding_status(status, peer);
        self.emit(AppEvent::Bond(status));

        match status {
            BondingStatus::Success => {
                if self.tasks.complete_success(TaskKind::Bonding).is_some() {
                    self.set_outcome(TaskOutcome {
                        kind: TaskKind::Bonding,
                        result: Ok(TaskResult::Done),
                    });
                }
            }
            BondingStatus::Fail => {
                // One side lost its keys: rebond once before giving up
                if self.security.should_rebond(error) {
                    if let Some(conn) = conn {
                        if radio.secure_link(ConnHandle::new(conn), true).is_ok() {
                            return;
                        }
                    }
                }
                if self.tasks.complete_failure(TaskKind::Bonding).is_some() {
                    self.fail_task(TaskKind::Bonding, TaskFailure::new("Bonding failed"));
                }
            }
            BondingStatus::Request | BondingStatus::Start => {}
        }
    }

    fn on_radio_tick<R: RadioStack>(&mut self, radio: &mut R) {
        // Drain the outbound stream
        if let Some(peripheral) = self.registry.peripheral().copied() {
            if self.stream.transmit(radio, peripheral.handle, peripheral.mtu) == TxOutcome::Sent {
                self.interval.on_activity(radio, Some(peripheral.handle));
            }
        } else if !self.stream.is_empty() {
            // No connection to drain into
            self.stream.clear();
        }

        // Rotate multi-advertising payloads
        self.adv.rotate(radio);

        // Dynamic interval adaptation
        let peripheral = self.registry.peripheral().map(|p| p.handle);
        self.interval.on_tick(radio, peripheral);

        // Busy-retry of a deferred discovery call
        if let Some(mut retry) = self.retry.take() {
            retry.ticks_left = retry.ticks_left.saturating_sub(1);
            if retry.ticks_left > 0 {
                self.retry = Some(retry);
                return;
            }
            let RetryOp::PrimaryServiceDiscovery { conn } = retry.op;
            match radio.discover_primary_services(ConnHandle::new(conn), 1) {
                Ok(()) => {}
                Err(error) if error.is_busy() => {
                    // Still contended; go around again
                    self.retry = Some(PendingRetry {
                        op: retry.op,
                        ticks_left: BUSY_RETRY_DELAY_TICKS,
                    });
                }
                Err(error) => {
                    if self
                        .tasks
                        .complete_failure(TaskKind::PrimaryServiceDiscovery)
                        .is_some()
                    {
                        self.fail_task(
                            TaskKind::PrimaryServiceDiscovery,
                            TaskFailure::from_radio(error),
                        );
                    }
                }
            }
        }
    }
}
