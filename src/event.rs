//! Interrupt-to-application event bridge
//!
//! Radio stack callbacks run in interrupt context where nothing interesting
//! is allowed to happen. [`EventBridge::push_radio_event`] converts each
//! callback into one or more fixed-size queue slots - copying every borrowed
//! payload before the interrupt returns - and the application side pops them
//! back out as typed [`PendingEvent`]s, in arrival order, with
//! [`EventBridge::pop_event`].
//!
//! A payload larger than one slot spills into continuation slots directly
//! behind its head slot; the consumer reassembles them. The queue is a
//! bounded `heapless` SPSC ring; when an event does not fit, it is dropped
//! and counted, never silently lost. In an embedded image the bridge lives in
//! a `static` guarded for the single interrupt priority that produces into
//! it (the same critical-section discipline the API channels use); under test
//! it is used directly.

use crate::constants::{EVENT_QUEUE_SLOTS, EVENT_SLOT_DATA, MAX_EVENT_PAYLOAD, PEER_ID_INVALID};
use crate::radio::RadioEvent;
use heapless::Vec;
use heapless::spsc::Queue;

/// Discriminant of a pending event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PendingKind {
    /// Continuation of the previous slot's payload; never surfaces as an event
    Continuation = 0,
    /// Stack error outside any call; payload = status u32 LE
    StackError = 1,
    /// Peripheral link connected; data = handle, payload = peer address
    Connected = 2,
    /// Central link connected; data = handle, payload = peer address
    CentralConnected = 3,
    /// Link closed; data = handle, payload = \[reason\]
    Disconnected = 4,
    /// GAP procedure timeout; data = source
    GapTimeout = 5,
    /// Advertising report; payload = peer address + rssi + adv data
    AdvReport = 6,
    /// RSSI sample; data = handle, payload = \[rssi\]
    Rssi = 7,
    /// Peer wants new connection parameters; data = handle, payload = params
    ConnParamUpdateRequest = 8,
    /// MTU negotiated; data = handle, payload = mtu u16 LE
    MtuUpdated = 9,
    /// Peer-initiated MTU exchange; data = handle, payload = mtu u16 LE
    MtuExchangeRequest = 10,
    /// One discovered service; payload = encoded [`crate::gatt::ServiceInfo`]
    ServiceDiscovered = 11,
    /// Service page finished; data = last end handle (0xFFFF = done)
    ServicePageEnd = 12,
    /// One discovered characteristic; payload = encoded record
    CharacteristicDiscovered = 13,
    /// Characteristic page finished; data = last value handle (0xFFFF = done)
    CharacteristicPageEnd = 14,
    /// One discovered descriptor; data = handle, payload = encoded UUID
    DescriptorDiscovered = 15,
    /// Descriptor page finished
    DescriptorPageEnd = 16,
    /// Characteristic read finished; payload = value
    CharacteristicValueRead = 17,
    /// Acknowledged write finished
    WriteResponse = 18,
    /// Transmission left the radio; data = handle
    TxComplete = 19,
    /// Peer notified a subscribed characteristic; data = attribute handle,
    /// payload = link handle u16 LE + value
    Notification = 20,
    /// As [`PendingKind::Notification`] but needs a confirmation
    Indication = 21,
    /// Peer wrote one of our characteristics; data = handle, payload = value
    PeripheralWrite = 22,
    /// Incoming security negotiation; data = handle, payload = peer params
    SecurityParamsRequest = 23,
    /// Passkey to show; data = handle, payload = 6 digits
    PasskeyDisplay = 24,
    /// Stack wants key material; data = handle
    AuthKeyRequest = 25,
    /// Authentication finished; data = handle, payload = \[status, bonded\]
    AuthStatus = 26,
    /// Bonding progress; data = status, payload = peer + error + handle
    BondingStatus = 27,
    /// Previously bonded peer reconnected; data = peer id
    BondedPeerConnected = 28,
    /// HID output report value; data = value
    HidValue = 29,
    /// Periodic radio-notification tick
    RadioTick = 30,
}

impl PendingKind {
    /// Decode a kind from its slot discriminant
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PendingKind::Continuation),
            1 => Some(PendingKind::StackError),
            2 => Some(PendingKind::Connected),
            3 => Some(PendingKind::CentralConnected),
            4 => Some(PendingKind::Disconnected),
            5 => Some(PendingKind::GapTimeout),
            6 => Some(PendingKind::AdvReport),
            7 => Some(PendingKind::Rssi),
            8 => Some(PendingKind::ConnParamUpdateRequest),
            9 => Some(PendingKind::MtuUpdated),
            10 => Some(PendingKind::MtuExchangeRequest),
            11 => Some(PendingKind::ServiceDiscovered),
            12 => Some(PendingKind::ServicePageEnd),
            13 => Some(PendingKind::CharacteristicDiscovered),
            14 => Some(PendingKind::CharacteristicPageEnd),
            15 => Some(PendingKind::DescriptorDiscovered),
            16 => Some(PendingKind::DescriptorPageEnd),
            17 => Some(PendingKind::CharacteristicValueRead),
            18 => Some(PendingKind::WriteResponse),
            19 => Some(PendingKind::TxComplete),
            20 => Some(PendingKind::Notification),
            21 => Some(PendingKind::Indication),
            22 => Some(PendingKind::PeripheralWrite),
            23 => Some(PendingKind::SecurityParamsRequest),
            24 => Some(PendingKind::PasskeyDisplay),
            25 => Some(PendingKind::AuthKeyRequest),
            26 => Some(PendingKind::AuthStatus),
            27 => Some(PendingKind::BondingStatus),
            28 => Some(PendingKind::BondedPeerConnected),
            29 => Some(PendingKind::HidValue),
            30 => Some(PendingKind::RadioTick),
            _ => None,
        }
    }
}

/// One slot of the event queue
#[derive(Debug, Clone, Copy)]
struct EventSlot {
    kind: u8,
    data: u16,
    len: u8,
    payload: [u8; EVENT_SLOT_DATA],
}

impl EventSlot {
    const fn empty(kind: u8, data: u16) -> Self {
        Self {
            kind,
            data,
            len: 0,
            payload: [0; EVENT_SLOT_DATA],
        }
    }
}

/// A fully reassembled pending event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEvent {
    /// What happened
    pub kind: PendingKind,
    /// 16-bit scalar payload (handle, status, index - kind-dependent)
    pub data: u16,
    /// Variable-length byte payload, reassembled across continuation slots
    pub payload: Vec<u8, MAX_EVENT_PAYLOAD>,
}

/// The bounded FIFO between interrupt context and the application
pub struct EventBridge {
    queue: Queue<EventSlot, EVENT_QUEUE_SLOTS>,
    dropped: u32,
}

impl Default for EventBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBridge {
    /// Create an empty bridge
    #[must_use]
    pub const fn new() -> Self {
        Self {
            queue: Queue::new(),
            dropped: 0,
        }
    }

    /// Events dropped because the queue was full
    #[must_use]
    pub fn dropped_events(&self) -> u32 {
        self.dropped
    }

    /// Is the queue empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Slots currently queued
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    fn free_slots(&self) -> usize {
        self.queue.capacity() - self.queue.len()
    }

    /// Queue an event with no byte payload. Returns `false` (and counts a
    /// drop) when the queue is full.
    pub fn enqueue(&mut self, kind: PendingKind, data: u16) -> bool {
        self.enqueue_with_payload(kind, data, &[])
    }

    /// Queue an event, copying `payload` into as many slots as it needs.
    ///
    /// Payloads beyond [`MAX_EVENT_PAYLOAD`] are truncated (the radio cannot
    /// produce more than one MTU of data per event). Returns `false` and
    /// counts a drop when the queue cannot hold the whole event - partial
    /// events are never queued.
    pub fn enqueue_with_payload(&mut self, kind: PendingKind, data: u16, payload: &[u8]) -> bool {
        let payload = &payload[..payload.len().min(MAX_EVENT_PAYLOAD)];
        let continuation_slots = payload.len().saturating_sub(1) / EVENT_SLOT_DATA;
        if self.free_slots() < 1 + continuation_slots {
            self.dropped = self.dropped.saturating_add(1);
            return false;
        }

        let mut chunks = payload.chunks(EVENT_SLOT_DATA);
        let mut head = EventSlot::empty(kind as u8, data);
        if let Some(chunk) = chunks.next() {
            head.len = chunk.len() as u8;
            head.payload[..chunk.len()].copy_from_slice(chunk);
        }
        // Space was checked above, the enqueues cannot fail
        self.queue.enqueue(head).ok();
        for chunk in chunks {
            let mut slot = EventSlot::empty(PendingKind::Continuation as u8, 0);
            slot.len = chunk.len() as u8;
            slot.payload[..chunk.len()].copy_from_slice(chunk);
            self.queue.enqueue(slot).ok();
        }
        true
    }

    /// Pop the next event, reassembling continuation slots.
    ///
    /// Returns the event and the number of queue slots it consumed.
    pub fn pop_event(&mut self) -> Option<(PendingEvent, usize)> {
        loop {
            let slot = self.queue.dequeue()?;
            let mut consumed = 1;
            let Some(kind) = PendingKind::from_u8(slot.kind) else {
                continue;
            };
            if kind == PendingKind::Continuation {
                // Orphaned continuation, skip it
                continue;
            }

            let mut payload: Vec<u8, MAX_EVENT_PAYLOAD> = Vec::new();
            payload.extend_from_slice(&slot.payload[..slot.len as usize]).ok();
            while let Some(next) = self.queue.peek() {
                if next.kind != PendingKind::Continuation as u8 {
                    break;
                }
                let next = self.queue.dequeue().unwrap();
                consumed += 1;
                payload.extend_from_slice(&next.payload[..next.len as usize]).ok();
            }

            return Some((
                PendingEvent {
                    kind,
                    data: slot.data,
                    payload,
                },
                consumed,
            ));
        }
    }

    /// Interrupt-context entry point: convert one radio event into queued
    /// pending events.
    ///
    /// Discovery pages fan out into one event per discovered item plus a
    /// page-end marker carrying the page's last handle, so the application
    /// side can decide whether another page must be requested. No other
    /// logic happens here.
    pub fn push_radio_event(&mut self, event: &RadioEvent<'_>) {
        match event {
            RadioEvent::Connected { conn, role, peer } => {
                let kind = match role {
                    crate::radio::LinkRole::Peripheral => PendingKind::Connected,
                    crate::radio::LinkRole::Central => PendingKind::CentralConnected,
                };
                self.enqueue_with_payload(kind, *conn, &peer.to_bytes());
            }
            RadioEvent::Disconnected { conn, reason } => {
                self.enqueue_with_payload(PendingKind::Disconnected, *conn, &[*reason]);
            }
            RadioEvent::GapTimeout { source } => {
                self.enqueue(PendingKind::GapTimeout, *source as u16);
            }
            RadioEvent::AdvReport { peer, rssi, data } => {
                let mut buf: Vec<u8, MAX_EVENT_PAYLOAD> = Vec::new();
                buf.extend_from_slice(&peer.to_bytes()).ok();
                buf.push(*rssi as u8).ok();
                let room = buf.capacity() - buf.len();
                buf.extend_from_slice(&data[..data.len().min(room)]).ok();
                self.enqueue_with_payload(PendingKind::AdvReport, 0, &buf);
            }
            RadioEvent::RssiChanged { conn, rssi } => {
                self.enqueue_with_payload(PendingKind::Rssi, *conn, &[*rssi as u8]);
            }
            RadioEvent::ConnParamUpdateRequest { conn, params } => {
                self.enqueue_with_payload(
                    PendingKind::ConnParamUpdateRequest,
                    *conn,
                    &params.to_bytes(),
                );
            }
            RadioEvent::MtuUpdated { conn, mtu } => {
                self.enqueue_with_payload(PendingKind::MtuUpdated, *conn, &mtu.to_le_bytes());
            }
            RadioEvent::MtuExchangeRequest { conn, client_mtu } => {
                self.enqueue_with_payload(
                    PendingKind::MtuExchangeRequest,
                    *conn,
                    &client_mtu.to_le_bytes(),
                );
            }
            RadioEvent::ServicesDiscovered { page, status_ok } => {
                let mut buf = [0u8; EVENT_SLOT_DATA];
                for service in *page {
                    if let Some(n) = service.encode_into(&mut buf) {
                        self.enqueue_with_payload(PendingKind::ServiceDiscovered, 0, &buf[..n]);
                    }
                }
                let last = if *status_ok && !page.is_empty() {
                    page[page.len() - 1].end_handle
                } else {
                    crate::constants::ATT_LAST_HANDLE
                };
                self.enqueue(PendingKind::ServicePageEnd, last);
            }
            RadioEvent::CharacteristicsDiscovered { page, status_ok } => {
                let mut buf = [0u8; EVENT_SLOT_DATA];
                for characteristic in *page {
                    if let Some(n) = characteristic.encode_into(&mut buf) {
                        self.enqueue_with_payload(
                            PendingKind::CharacteristicDiscovered,
                            0,
                            &buf[..n],
                        );
                    }
                }
                let last = if *status_ok && !page.is_empty() {
                    page[page.len() - 1].handle_value
                } else {
                    crate::constants::ATT_LAST_HANDLE
                };
                self.enqueue(PendingKind::CharacteristicPageEnd, last);
            }
            RadioEvent::DescriptorsDiscovered { page, status_ok } => {
                if *status_ok {
                    let mut buf = [0u8; EVENT_SLOT_DATA];
                    for descriptor in *page {
                        if let Some(n) = descriptor.uuid.encode_into(&mut buf) {
                            self.enqueue_with_payload(
                                PendingKind::DescriptorDiscovered,
                                descriptor.handle,
                                &buf[..n],
                            );
                        }
                    }
                }
                self.enqueue(PendingKind::DescriptorPageEnd, 0);
            }
            RadioEvent::CharacteristicRead { data } => {
                self.enqueue_with_payload(PendingKind::CharacteristicValueRead, 0, data);
            }
            RadioEvent::WriteResponse => {
                self.enqueue(PendingKind::WriteResponse, 0);
            }
            RadioEvent::TxComplete { conn } => {
                self.enqueue(PendingKind::TxComplete, *conn);
            }
            RadioEvent::Notification {
                conn,
                handle,
                data,
                indication,
            } => {
                let kind = if *indication {
                    PendingKind::Indication
                } else {
                    PendingKind::Notification
                };
                let mut buf: Vec<u8, MAX_EVENT_PAYLOAD> = Vec::new();
                buf.extend_from_slice(&conn.to_le_bytes()).ok();
                let room = buf.capacity() - buf.len();
                buf.extend_from_slice(&data[..data.len().min(room)]).ok();
                self.enqueue_with_payload(kind, *handle, &buf);
            }
            RadioEvent::PeripheralWrite { handle, data } => {
                self.enqueue_with_payload(PendingKind::PeripheralWrite, *handle, data);
            }
            RadioEvent::SecurityParamsRequest { conn, peer } => {
                self.enqueue_with_payload(
                    PendingKind::SecurityParamsRequest,
                    *conn,
                    &peer.to_bytes(),
                );
            }
            RadioEvent::PasskeyDisplay { conn, passkey } => {
                self.enqueue_with_payload(PendingKind::PasskeyDisplay, *conn, passkey);
            }
            RadioEvent::AuthKeyRequest { conn } => {
                self.enqueue(PendingKind::AuthKeyRequest, *conn);
            }
            RadioEvent::AuthStatus {
                conn,
                auth_status,
                bonded,
            } => {
                self.enqueue_with_payload(
                    PendingKind::AuthStatus,
                    *conn,
                    &[*auth_status, u8::from(*bonded)],
                );
            }
            RadioEvent::BondingStatus {
                conn,
                status,
                peer,
                error,
            } => {
                let peer_raw = peer.map_or(PEER_ID_INVALID, |p| p.0);
                let mut buf = [0u8; 6];
                buf[0..2].copy_from_slice(&peer_raw.to_le_bytes());
                buf[2..4].copy_from_slice(&error.to_le_bytes());
                buf[4..6].copy_from_slice(&conn.to_le_bytes());
                self.enqueue_with_payload(PendingKind::BondingStatus, *status as u16, &buf);
            }
            RadioEvent::BondedPeerConnected { peer } => {
                self.enqueue(PendingKind::BondedPeerConnected, peer.0);
            }
            RadioEvent::StackError { status } => {
                self.enqueue_with_payload(PendingKind::StackError, 0, &status.to_le_bytes());
            }
            RadioEvent::HidValue { value } => {
                self.enqueue(PendingKind::HidValue, u16::from(*value));
            }
            RadioEvent::RadioTick => {
                self.enqueue(PendingKind::RadioTick, 0);
            }
        }
    }
}
