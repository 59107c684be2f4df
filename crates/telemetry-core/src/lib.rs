//! Core domain types and per-competitor state for GridLine telemetry.
//!
//! This crate holds everything the protocol layer and the receive loop share:
//! - [`contracts`] - the decoded race events emitted per processed datagram
//!   (`TelemetryEvent` and its payload structs)
//! - [`competitors`] - the [`CompetitorStore`] that accumulates cross-packet
//!   knowledge (lap bests, driver codes, livery colors) for a connection
//! - [`TelemetryError`] - setup-time failures surfaced to callers
//!
//! Per-packet decode failures are never represented here: malformed or
//! unrecognized datagrams simply produce no event.

#![deny(static_mut_refs)]

use std::net::SocketAddr;

use thiserror::Error;
use tokio::sync::mpsc;

pub mod competitors;
pub mod contracts;

pub use competitors::{CompetitorStore, MAX_CARS, PLACEHOLDER_LIVERY_ARGB, derive_driver_code};
pub use contracts::{FastestLap, RaceOrderEntry, TelemetryEvent, WorldPosition};

/// Bounded stream of decoded race events, one side of the hand-off between
/// the receive loop and a consumer.
pub type EventReceiver = mpsc::Receiver<TelemetryEvent>;

/// Sender half of the decoded-event channel.
pub type EventSender = mpsc::Sender<TelemetryEvent>;

/// Setup-time telemetry failures.
///
/// Everything here is user-visible: a listener refuses to start rather than
/// limping along with a bad configuration. Per-datagram problems are handled
/// internally and never reach this enum.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("invalid bind address {0:?}: expected an IPv4 address")]
    InvalidBindAddress(String),

    #[error("invalid UDP port {0}: must be in 1..=65535")]
    InvalidPort(u16),

    #[error("failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("listener already running")]
    AlreadyRunning,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
