//! Processor loop - radio event and API request processing
//!
//! One async loop owns the driver: it waits for either a wake-up from the
//! event bridge (raised by the vendor glue after queueing radio events) or
//! an API request, and runs both against the shared [`BleHost`] state.
//! Responses for task-starting requests are sent when the task resolves,
//! which a later radio event decides.
//!
//! # Usage
//!
//! Run the processor as an Embassy task after initializing the host:
//!
//! ```ignore
//! use bluejay::{init_ble_host, BleHostOptions, processor};
//!
//! init_ble_host(BleHostOptions::default()).await.unwrap();
//! spawner.spawn(ble_task(radio, bridge)).unwrap();
//!
//! #[embassy_executor::task]
//! async fn ble_task(mut radio: Radio, bridge: &'static mut EventBridge) {
//!     processor::run(&mut radio, bridge).await;
//! }
//! ```
//!
//! The vendor glue feeds the bridge from its radio interrupt and then wakes
//! the loop:
//!
//! ```ignore
//! bridge.push_radio_event(&event);
//! bluejay::notify_event_pending();
//! ```

use crate::constants::APP_EVENT_QUEUE;
use crate::event::EventBridge;
use crate::radio::RadioStack;
use crate::{
    APP_EVENT_CHANNEL, AppEvent, BleError, EVENT_WAKE, REQUEST_CHANNEL, RESPONSE_CHANNEL,
    Response, ble_host,
};
use embassy_futures::select::{Either, select};
use heapless::Vec;

/// Run the BLE host processor loop.
///
/// [`crate::init_ble_host`] must have been called first; requests arriving
/// before that resolve with [`BleError::NotInitialized`].
pub async fn run<R: RadioStack>(radio: &mut R, bridge: &mut EventBridge) -> ! {
    loop {
        match select(EVENT_WAKE.wait(), REQUEST_CHANNEL.receive()).await {
            Either::First(()) => {
                let (events, outcome) = match ble_host().await {
                    Ok(mut host) => {
                        let slots = host.drain_and_dispatch(radio, bridge);
                        trace!("dispatched {} event slots", slots);
                        (collect_events(&mut host), host.take_task_outcome())
                    }
                    Err(message) => {
                        error!("{}", message);
                        (Vec::new(), None)
                    }
                };
                // Channel sends may suspend; never hold the host lock across
                // them
                for event in events {
                    APP_EVENT_CHANNEL.send(event).await;
                }
                if let Some(outcome) = outcome {
                    RESPONSE_CHANNEL.send(outcome.into()).await;
                }
            }
            Either::Second(request) => {
                let (response, events) = match ble_host().await {
                    Ok(mut host) => {
                        let response = host.process_request(radio, request);
                        (response, collect_events(&mut host))
                    }
                    Err(message) => {
                        error!("{}", message);
                        (
                            Some(Response::Error(BleError::NotInitialized)),
                            Vec::new(),
                        )
                    }
                };
                for event in events {
                    APP_EVENT_CHANNEL.send(event).await;
                }
                // A `None` response means a task was started; the matching
                // radio event resolves it and answers the caller later
                if let Some(response) = response {
                    RESPONSE_CHANNEL.send(response).await;
                }
            }
        }
    }
}

fn collect_events(host: &mut crate::BleHost) -> Vec<AppEvent, APP_EVENT_QUEUE> {
    let mut events = Vec::new();
    while let Some(event) = host.take_app_event() {
        if events.push(event).is_err() {
            break;
        }
    }
    events
}
