//! Listener-to-decoder wiring.
//!
//! The feed is what an application actually holds: it runs the receive loop,
//! decodes in place on the receiving task, and hands finished events across
//! the thread boundary through a bounded channel. The hand-off is
//! fire-and-forget; a slow consumer loses events rather than stalling the
//! loop.

use gridline_telemetry_core::{EventReceiver, TelemetryError};
use gridline_telemetry_f1::F1TelemetryDecoder;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::{EVENT_CHANNEL_CAPACITY, ListenerConfig, ListenerState, UdpTelemetryListener};

/// F1 25 telemetry feed: one UDP listener, one decoder, one event channel.
///
/// The decoder is moved into the receive task on `start`, so all competitor
/// state is touched from exactly one context; no locking is involved. Each
/// `start` begins from a pristine decoder — reconnecting is the one and only
/// point where accumulated state is discarded.
#[derive(Debug)]
pub struct F1TelemetryFeed {
    listener: UdpTelemetryListener,
}

impl F1TelemetryFeed {
    pub fn new(config: ListenerConfig) -> Self {
        Self {
            listener: UdpTelemetryListener::new(config),
        }
    }

    /// Bind and start decoding; returns the consumer end of the event stream.
    ///
    /// Events arrive in datagram order. When the channel is full the event
    /// is dropped with a warning; the receive loop never blocks on the
    /// consumer.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::AlreadyRunning`] when the feed is already started
    /// (the existing receiver stays valid), or any listener setup error.
    pub async fn start(&mut self) -> Result<EventReceiver, TelemetryError> {
        if matches!(
            self.listener.state(),
            ListenerState::Starting | ListenerState::Running
        ) {
            return Err(TelemetryError::AlreadyRunning);
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut decoder = F1TelemetryDecoder::new();
        self.listener
            .start(move |datagram, _peer| {
                let Some(event) = decoder.decode(datagram) else {
                    return;
                };
                match tx.try_send(event) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!("event channel full; dropping event");
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!("event consumer gone; dropping event");
                    }
                }
            })
            .await?;
        Ok(rx)
    }

    /// Stop the receive loop and wait for it to wind down completely.
    pub async fn stop(&mut self) {
        self.listener.stop().await;
    }

    /// Reconnect: stop the previous loop fully, then start fresh.
    ///
    /// All accumulated competitor state (lap bests, names, colors) is gone
    /// afterwards; the new receiver starts from a clean slate.
    ///
    /// # Errors
    ///
    /// Any listener setup error from the new `start`.
    pub async fn restart(&mut self) -> Result<EventReceiver, TelemetryError> {
        self.stop().await;
        self.start().await
    }

    /// Lifecycle state of the underlying listener.
    pub fn state(&self) -> ListenerState {
        self.listener.state()
    }
}
