//! Advertising, scanning and connection-parameter lifecycle
//!
//! [`AdvertisingLifecycle`] keeps the user's advertising intent separate
//! from the radio state, so advertising comes back by itself after a
//! disconnect or an advertising timeout. When more than one advertising
//! payload is configured, the periodic radio tick rotates through them.
//!
//! [`IntervalAdjuster`] implements dynamic connection-interval adaptation
//! for the peripheral link: after long enough with nothing happening the
//! link is renegotiated down to a low-power interval, and the first
//! qualifying activity brings the fast interval back. Renegotiation is
//! best-effort - the link stays usable at the old interval if the stack
//! refuses.

use crate::constants::{
    CONN_SUP_TIMEOUT_10MS, DYNAMIC_INTERVAL_IDLE_TICKS, FAST_CONN_INTERVAL_UNITS,
    MAX_ADV_DATA_LEN, MAX_ADV_PAYLOADS, SLAVE_LATENCY, SLOW_CONN_INTERVAL_UNITS,
};
use crate::radio::{AdvertisingParams, ConnectionParams, RadioError, RadioStack, ScanParams};
use bt_hci::param::ConnHandle;
use heapless::Vec;

/// One advertising payload buffer
pub type AdvPayload = Vec<u8, MAX_ADV_DATA_LEN>;

/// Advertising and scanning state
#[derive(Debug)]
pub struct AdvertisingLifecycle {
    /// User intent: should the device be advertising when it can?
    enabled: bool,
    /// Radio state: is an advertising set running right now?
    advertising: bool,
    /// Rotate through multiple payloads on radio ticks
    multi: bool,
    multi_index: usize,
    payloads: Vec<AdvPayload, MAX_ADV_PAYLOADS>,
    /// Advertising interval in 0.625 ms units
    pub interval_units: u16,
    /// Advertise as connectable
    pub connectable: bool,
    /// Advertise as scannable
    pub scannable: bool,
    /// Keep advertising while a peripheral connection is up
    pub advertise_when_connected: bool,
    scanning: bool,
}

impl AdvertisingLifecycle {
    /// Create the lifecycle state
    #[must_use]
    pub fn new(
        interval_units: u16,
        connectable: bool,
        scannable: bool,
        advertise_when_connected: bool,
    ) -> Self {
        Self {
            enabled: false,
            advertising: false,
            multi: false,
            multi_index: 0,
            payloads: Vec::new(),
            interval_units,
            connectable,
            scannable,
            advertise_when_connected,
            scanning: false,
        }
    }

    /// Is an advertising set running?
    #[must_use]
    pub fn is_advertising(&self) -> bool {
        self.advertising
    }

    /// Does the user want advertising on?
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Is payload rotation active?
    #[must_use]
    pub fn is_multi(&self) -> bool {
        self.multi
    }

    /// Is scanning running?
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Replace the advertising payload list.
    ///
    /// More than one payload enables rotation on radio ticks.
    pub fn set_payloads(&mut self, payloads: Vec<AdvPayload, MAX_ADV_PAYLOADS>) {
        self.multi = payloads.len() > 1;
        self.multi_index = 0;
        self.payloads = payloads;
    }

    fn current_payload(&self) -> &[u8] {
        self.payloads.first().map_or(&[], Vec::as_slice)
    }

    /// First configured advertising payload, if any
    #[must_use]
    pub fn first_payload(&self) -> Option<&[u8]> {
        self.payloads.first().map(Vec::as_slice)
    }

    fn params(&self) -> AdvertisingParams {
        AdvertisingParams {
            interval_units: self.interval_units,
            connectable: self.connectable,
            scannable: self.scannable,
        }
    }

    /// Turn advertising on (user intent) and start it if possible.
    ///
    /// Idempotent: already advertising is a no-op. Starting while a
    /// peripheral connection is up is a no-op unless
    /// `advertise_when_connected` is set. Returns whether the radio state
    /// changed.
    pub fn start<R: RadioStack>(
        &mut self,
        radio: &mut R,
        has_peripheral_conn: bool,
    ) -> Result<bool, RadioError> {
        self.enabled = true;
        self.activate(radio, has_peripheral_conn)
    }

    /// Restart advertising after a disconnect or timeout, if the user
    /// wants it on
    pub fn restart_if_enabled<R: RadioStack>(
        &mut self,
        radio: &mut R,
        has_peripheral_conn: bool,
    ) -> Result<bool, RadioError> {
        if !self.enabled {
            return Ok(false);
        }
        self.activate(radio, has_peripheral_conn)
    }

    fn activate<R: RadioStack>(
        &mut self,
        radio: &mut R,
        has_peripheral_conn: bool,
    ) -> Result<bool, RadioError> {
        if self.advertising {
            return Ok(false);
        }
        if has_peripheral_conn && !self.advertise_when_connected {
            return Ok(false);
        }
        let params = self.params();
        radio.start_advertising(self.current_payload(), &[], &params)?;
        self.advertising = true;
        Ok(true)
    }

    /// Turn advertising off (user intent). Idempotent; returns whether the
    /// radio state changed.
    pub fn stop<R: RadioStack>(&mut self, radio: &mut R) -> Result<bool, RadioError> {
        self.enabled = false;
        if !self.advertising {
            return Ok(false);
        }
        radio.stop_advertising()?;
        self.advertising = false;
        Ok(true)
    }

    /// Stop the advertising set because a peer connected, keeping the user
    /// intent so advertising can come back later.
    ///
    /// The stack may have stopped the set on its own already, so its
    /// rejection is not an error.
    pub fn stop_for_connection<R: RadioStack>(&mut self, radio: &mut R) -> bool {
        if !self.advertising {
            return false;
        }
        radio.stop_advertising().ok();
        self.advertising = false;
        true
    }

    /// The stack stopped advertising on its own (duration elapsed)
    pub fn mark_stopped(&mut self) {
        self.advertising = false;
    }

    /// Rotate to the next advertising payload, if rotation is active.
    ///
    /// A missing or empty payload, or a rejected update, disables rotation.
    pub fn rotate<R: RadioStack>(&mut self, radio: &mut R) {
        if !self.advertising || !self.multi {
            return;
        }
        let ok = match self.payloads.get(self.multi_index) {
            Some(payload) if !payload.is_empty() => {
                self.multi_index = (self.multi_index + 1) % self.payloads.len();
                radio.update_advertising_data(payload).is_ok()
            }
            _ => false,
        };
        if !ok {
            self.multi = false;
            self.multi_index = 0;
        }
    }

    /// Start or stop scanning. Idempotent; returns whether the state
    /// changed.
    pub fn set_scanning<R: RadioStack>(
        &mut self,
        radio: &mut R,
        enabled: bool,
        active: bool,
    ) -> Result<bool, RadioError> {
        if enabled == self.scanning {
            return Ok(false);
        }
        if enabled {
            radio.start_scan(&ScanParams { active })?;
        } else {
            radio.stop_scan()?;
        }
        self.scanning = enabled;
        Ok(true)
    }
}

/// Dynamic connection-interval adaptation for the peripheral link
#[derive(Debug)]
pub struct IntervalAdjuster {
    idle_ticks: u32,
    fast: bool,
    disabled: bool,
}

impl IntervalAdjuster {
    /// Create the adjuster; `disabled` pins the link at the fast interval
    #[must_use]
    pub const fn new(disabled: bool) -> Self {
        Self {
            idle_ticks: 0,
            fast: true,
            disabled,
        }
    }

    /// Is the link at the fast interval?
    #[must_use]
    pub fn is_fast(&self) -> bool {
        self.fast
    }

    /// Ticks since the last qualifying activity
    #[must_use]
    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks
    }

    fn interval_params(units: u16) -> ConnectionParams {
        ConnectionParams {
            min_interval_units: units,
            max_interval_units: units,
            slave_latency: SLAVE_LATENCY,
            sup_timeout_10ms: CONN_SUP_TIMEOUT_10MS,
        }
    }

    /// Count one radio tick; after the idle threshold the link is
    /// renegotiated down to the slow interval, exactly once.
    pub fn on_tick<R: RadioStack>(&mut self, radio: &mut R, peripheral_conn: Option<u16>) {
        if self.idle_ticks < DYNAMIC_INTERVAL_IDLE_TICKS {
            self.idle_ticks += 1;
            return;
        }
        if let Some(conn) = peripheral_conn {
            if !self.disabled && self.fast {
                self.fast = false;
                radio
                    .set_connection_interval(
                        ConnHandle::new(conn),
                        &Self::interval_params(SLOW_CONN_INTERVAL_UNITS),
                    )
                    .ok();
            }
        }
    }

    /// Qualifying activity: reset the idle counter and, if the link is at
    /// the slow interval, request the fast one again (exactly once).
    pub fn on_activity<R: RadioStack>(&mut self, radio: &mut R, peripheral_conn: Option<u16>) {
        if let Some(conn) = peripheral_conn {
            if !self.disabled && !self.fast {
                self.fast = true;
                radio
                    .set_connection_interval(
                        ConnHandle::new(conn),
                        &Self::interval_params(FAST_CONN_INTERVAL_UNITS),
                    )
                    .ok();
            }
        }
        self.idle_ticks = 0;
    }

    /// A peripheral connection came up; start counting from zero
    pub fn on_peripheral_connected(&mut self) {
        self.idle_ticks = 0;
    }

    /// The peripheral connection dropped; the next connection starts fast
    pub fn on_disconnected(&mut self) {
        self.fast = true;
        self.idle_ticks = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::mock::{Call, MockRadio};
    use crate::radio::status;

    fn lifecycle() -> AdvertisingLifecycle {
        AdvertisingLifecycle::new(600, true, true, false)
    }

    fn payloads(n: usize) -> Vec<AdvPayload, MAX_ADV_PAYLOADS> {
        let mut list = Vec::new();
        for i in 0..n {
            let mut payload = AdvPayload::new();
            payload.extend_from_slice(&[i as u8; 3]).unwrap();
            list.push(payload).unwrap();
        }
        list
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut radio = MockRadio::new();
        let mut adv = lifecycle();

        assert!(adv.start(&mut radio, false).unwrap());
        assert!(!adv.start(&mut radio, false).unwrap());
        assert_eq!(radio.calls(), &[Call::StartAdvertising]);
        assert!(adv.is_advertising());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut radio = MockRadio::new();
        let mut adv = lifecycle();
        assert!(!adv.stop(&mut radio).unwrap());

        adv.start(&mut radio, false).unwrap();
        assert!(adv.stop(&mut radio).unwrap());
        assert!(!adv.stop(&mut radio).unwrap());
        assert!(!adv.is_advertising());
    }

    #[test]
    fn test_no_advertising_while_connected() {
        let mut radio = MockRadio::new();
        let mut adv = lifecycle();
        assert!(!adv.start(&mut radio, true).unwrap());
        assert!(radio.calls().is_empty());
        // Intent was recorded, so a later restart works
        assert!(adv.restart_if_enabled(&mut radio, false).unwrap());
    }

    #[test]
    fn test_advertise_when_connected_flag() {
        let mut radio = MockRadio::new();
        let mut adv = AdvertisingLifecycle::new(600, true, true, true);
        assert!(adv.start(&mut radio, true).unwrap());
    }

    #[test]
    fn test_restart_respects_intent() {
        let mut radio = MockRadio::new();
        let mut adv = lifecycle();
        assert!(!adv.restart_if_enabled(&mut radio, false).unwrap());

        adv.start(&mut radio, false).unwrap();
        adv.mark_stopped();
        assert!(adv.restart_if_enabled(&mut radio, false).unwrap());
    }

    #[test]
    fn test_rotation_cycles_payloads() {
        let mut radio = MockRadio::new();
        let mut adv = lifecycle();
        adv.set_payloads(payloads(3));
        adv.start(&mut radio, false).unwrap();
        radio.clear_calls();

        for expected in [0u8, 1, 2, 0] {
            adv.rotate(&mut radio);
            let last = radio.calls().last().unwrap();
            assert_eq!(
                last,
                &Call::UpdateAdvertisingData(Vec::from_slice(&[expected; 3]).unwrap())
            );
        }
        assert!(adv.is_multi());
    }

    #[test]
    fn test_rotation_disabled_on_update_failure() {
        let mut radio = MockRadio::new();
        let mut adv = lifecycle();
        adv.set_payloads(payloads(2));
        adv.start(&mut radio, false).unwrap();

        radio.fail_next(status::INVALID_PARAM);
        adv.rotate(&mut radio);
        assert!(!adv.is_multi());

        // Further ticks no longer touch the radio
        radio.clear_calls();
        adv.rotate(&mut radio);
        assert!(radio.calls().is_empty());
    }

    #[test]
    fn test_rotation_disabled_on_empty_list() {
        let mut radio = MockRadio::new();
        let mut adv = lifecycle();
        adv.set_payloads(payloads(2));
        adv.start(&mut radio, false).unwrap();
        adv.set_payloads(Vec::new());
        adv.rotate(&mut radio);
        assert!(!adv.is_multi());
    }

    #[test]
    fn test_single_payload_does_not_rotate() {
        let mut radio = MockRadio::new();
        let mut adv = lifecycle();
        adv.set_payloads(payloads(1));
        adv.start(&mut radio, false).unwrap();
        radio.clear_calls();
        adv.rotate(&mut radio);
        assert!(radio.calls().is_empty());
    }

    #[test]
    fn test_scanning_toggles_once() {
        let mut radio = MockRadio::new();
        let mut adv = lifecycle();
        assert!(adv.set_scanning(&mut radio, true, true).unwrap());
        assert!(!adv.set_scanning(&mut radio, true, true).unwrap());
        assert!(adv.set_scanning(&mut radio, false, false).unwrap());
        assert_eq!(radio.calls(), &[Call::StartScan, Call::StopScan]);
    }

    #[test]
    fn test_idle_threshold_slows_exactly_once() {
        let mut radio = MockRadio::new();
        let mut interval = IntervalAdjuster::new(false);

        for _ in 0..DYNAMIC_INTERVAL_IDLE_TICKS + 10 {
            interval.on_tick(&mut radio, Some(0x10));
        }
        assert!(!interval.is_fast());
        assert_eq!(
            radio.calls(),
            &[Call::SetConnectionInterval {
                conn: 0x10,
                max_units: SLOW_CONN_INTERVAL_UNITS
            }]
        );
    }

    #[test]
    fn test_activity_resets_counter_before_threshold() {
        let mut radio = MockRadio::new();
        let mut interval = IntervalAdjuster::new(false);

        for _ in 0..DYNAMIC_INTERVAL_IDLE_TICKS - 1 {
            interval.on_tick(&mut radio, Some(0x10));
        }
        interval.on_activity(&mut radio, Some(0x10));
        assert_eq!(interval.idle_ticks(), 0);
        assert!(interval.is_fast());
        // Still fast, so no interval change was requested
        assert!(radio.calls().is_empty());
    }

    #[test]
    fn test_activity_while_slow_requests_fast_once() {
        let mut radio = MockRadio::new();
        let mut interval = IntervalAdjuster::new(false);
        for _ in 0..=DYNAMIC_INTERVAL_IDLE_TICKS {
            interval.on_tick(&mut radio, Some(0x10));
        }
        radio.clear_calls();

        interval.on_activity(&mut radio, Some(0x10));
        interval.on_activity(&mut radio, Some(0x10));
        assert_eq!(
            radio.calls(),
            &[Call::SetConnectionInterval {
                conn: 0x10,
                max_units: FAST_CONN_INTERVAL_UNITS
            }]
        );
    }

    #[test]
    fn test_adjustment_disabled() {
        let mut radio = MockRadio::new();
        let mut interval = IntervalAdjuster::new(true);
        for _ in 0..DYNAMIC_INTERVAL_IDLE_TICKS + 5 {
            interval.on_tick(&mut radio, Some(0x10));
        }
        interval.on_activity(&mut radio, Some(0x10));
        assert!(radio.calls().is_empty());
        assert!(interval.is_fast());
    }

    #[test]
    fn test_no_peripheral_no_renegotiation() {
        let mut radio = MockRadio::new();
        let mut interval = IntervalAdjuster::new(false);
        for _ in 0..DYNAMIC_INTERVAL_IDLE_TICKS + 5 {
            interval.on_tick(&mut radio, None);
        }
        assert!(radio.calls().is_empty());
        assert!(interval.is_fast());
    }

    #[test]
    fn test_disconnect_restores_fast_for_next_connection() {
        let mut radio = MockRadio::new();
        let mut interval = IntervalAdjuster::new(false);
        for _ in 0..=DYNAMIC_INTERVAL_IDLE_TICKS {
            interval.on_tick(&mut radio, Some(0x10));
        }
        assert!(!interval.is_fast());
        interval.on_disconnected();
        assert!(interval.is_fast());
        assert_eq!(interval.idle_ticks(), 0);
    }
}
