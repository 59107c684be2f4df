//! Decoded race events.
//!
//! Each processed datagram yields at most one [`TelemetryEvent`]. Events are
//! plain data: formatting (millisecond durations, colors, map coordinates)
//! belongs to whatever consumes them.
//!
//! Lap times and gaps use `Option<u32>` milliseconds. `None` always means
//! "not known yet", never zero.

use serde::{Deserialize, Serialize};

/// One row of a race-order snapshot, decoded from a LapData packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceOrderEntry {
    /// Competitor slot index, `0..MAX_CARS`.
    pub car_index: u8,

    /// Race position as reported by the game (1 = leader).
    pub position: u8,

    /// Stable 3-letter driver code, or the `CAR {n}` placeholder when no
    /// Participants data has arrived yet.
    pub driver_code: String,

    /// Lap the competitor is currently on.
    pub lap: u8,

    /// Most recent completed lap, if any lap has been completed.
    pub last_lap_ms: Option<u32>,

    /// Best lap recorded so far for this competitor, across both LapData
    /// packets and fastest-lap events.
    pub best_lap_ms: Option<u32>,

    /// Delta to the race leader; absent while the game reports the sentinel.
    pub gap_to_leader_ms: Option<u32>,
}

/// A competitor's planar world position, decoded from a Motion packet.
///
/// Y (elevation) is intentionally never decoded; a 2D track map has no use
/// for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldPosition {
    /// Competitor slot index, `0..MAX_CARS`.
    pub car_index: u8,

    /// World-space X coordinate in meters.
    pub world_x: f32,

    /// World-space Z coordinate in meters.
    pub world_z: f32,

    /// Stable 3-letter driver code or placeholder.
    pub driver_code: String,

    /// Primary livery color as fully-opaque ARGB.
    pub livery_argb: u32,
}

/// A fastest-lap announcement, decoded from an `FTLP` event packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FastestLap {
    /// Competitor slot index, `0..MAX_CARS`.
    pub car_index: u8,

    /// Stable 3-letter driver code or placeholder.
    pub driver_code: String,

    /// Lap the time was set on; at least 1 (a fastest lap cannot refer to
    /// lap 0, so an unknown lap counter is reported as 1).
    pub lap_number: u8,

    /// The lap time in milliseconds.
    pub lap_time_ms: u32,
}

/// The event produced by decoding one datagram.
///
/// Closed set by design: the dispatcher matches the packet discriminant
/// exhaustively and anything unrecognized produces no event at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryEvent {
    /// Full race-order snapshot, one entry per competitor slot.
    RaceOrder(Vec<RaceOrderEntry>),

    /// World positions for every competitor slot.
    WorldPositions(Vec<WorldPosition>),

    /// A single fastest-lap announcement.
    FastestLap(FastestLap),
}
