//! EA Sports F1 25 UDP telemetry decoding.
//!
//! Parses the EA F1 25 (packet format `2025`) binary UDP protocol into
//! GridLine race events and keeps the per-competitor enrichment state those
//! events depend on.
//!
//! ## Supported packet types
//!
//! | Packet ID | Name         | Produces                                   |
//! |-----------|--------------|--------------------------------------------|
//! | 0         | Motion       | world-position batch for the track map     |
//! | 2         | LapData      | race-order snapshot batch                  |
//! | 3         | Event        | fastest-lap announcement (`FTLP` only)     |
//! | 4         | Participants | nothing (updates names and livery colors)  |
//!
//! All other packet IDs, undersized datagrams, and unrecognized event codes
//! are silently discarded. Decode failures never escape
//! [`F1TelemetryDecoder::decode`]: a noisy, lossy, partially corrupt stream
//! is the expected steady state of UDP telemetry.
//!
//! ## Layout conventions
//!
//! Every packet is a 29-byte little-endian header (discriminant byte at
//! offset 6) followed by a fixed-stride array of 22 per-competitor records.
//! The game always transmits the full array; inactive slots are decoded
//! uniformly. Byte offsets below are authoritative for the 2025 protocol
//! revision and deliberately isolated behind named constants.

#![deny(static_mut_refs)]

use anyhow::{Result, anyhow};
use gridline_telemetry_core::{
    CompetitorStore, FastestLap, MAX_CARS, RaceOrderEntry, TelemetryEvent, WorldPosition,
};
use tracing::debug;

// ── Header and packet-type constants ─────────────────────────────────────────

/// Size of the common packet header (consistent across F1 2023-2025 formats).
pub const HEADER_SIZE: usize = 29;
/// Offset of the packet-type discriminant within the header.
pub const PACKET_ID_OFFSET: usize = 6;

pub const PACKET_ID_MOTION: u8 = 0;
pub const PACKET_ID_LAP_DATA: u8 = 2;
pub const PACKET_ID_EVENT: u8 = 3;
pub const PACKET_ID_PARTICIPANTS: u8 = 4;

// ── Per-competitor record strides ────────────────────────────────────────────

/// Size of one CarMotionData entry.
pub const MOTION_ENTRY_SIZE: usize = 60;
/// Size of one LapData entry.
pub const LAP_DATA_ENTRY_SIZE: usize = 57;
/// Size of one ParticipantData entry.
pub const PARTICIPANT_ENTRY_SIZE: usize = 57;

/// Minimum size of a decodable Motion packet (header + full car array).
pub const MIN_MOTION_PACKET_SIZE: usize = HEADER_SIZE + MAX_CARS * MOTION_ENTRY_SIZE;
/// Minimum size of a decodable LapData packet.
pub const MIN_LAP_DATA_PACKET_SIZE: usize = HEADER_SIZE + MAX_CARS * LAP_DATA_ENTRY_SIZE;
/// Minimum size of an Event packet (header + 4-byte event code).
pub const MIN_EVENT_PACKET_SIZE: usize = HEADER_SIZE + EVENT_CODE_LEN;
/// Minimum size of a fastest-lap Event packet (code + vehicle byte + f32).
pub const MIN_FASTEST_LAP_PACKET_SIZE: usize = MIN_EVENT_PACKET_SIZE + 1 + 4;
/// Minimum size of a Participants packet (header + count byte + full array).
pub const MIN_PARTICIPANTS_PACKET_SIZE: usize =
    HEADER_SIZE + 1 + MAX_CARS * PARTICIPANT_ENTRY_SIZE;

// ── Field offsets within per-competitor records ──────────────────────────────

const MOTION_WORLD_X_OFFSET: usize = 0;
const MOTION_WORLD_Z_OFFSET: usize = 8;

const LAP_LAST_LAP_TIME_OFFSET: usize = 0;
const LAP_GAP_LEADER_FRACTION_OFFSET: usize = 17;
const LAP_GAP_LEADER_MINUTES_OFFSET: usize = 19;
const LAP_CAR_POSITION_OFFSET: usize = 32;
const LAP_CURRENT_LAP_OFFSET: usize = 33;

/// Minutes byte value the game uses for "no gap available".
pub const GAP_MINUTES_SENTINEL: u8 = 0xFF;

/// Single-byte fields preceding the name in a ParticipantData record
/// (aiControlled, driverId, networkId, teamId, myTeam, raceNumber,
/// nationality).
const PARTICIPANT_NAME_OFFSET: usize = 7;
/// Fixed width of the NUL-terminated UTF-8 name field.
pub const PARTICIPANT_NAME_LEN: usize = 32;
/// yourTelemetry + showOnlineNames, then techLevel (u16) + platform.
const PARTICIPANT_POST_NAME_SKIP: usize = 2 + 3;
/// Reserved space for up to 4 RGB livery colors.
const PARTICIPANT_COLOR_TABLE_LEN: usize = 12;
/// Livery RGB applied when a record carries no colors.
const PARTICIPANT_FALLBACK_RGB: [u8; 3] = [200, 60, 60];

pub const EVENT_CODE_LEN: usize = 4;
/// Event string code for a fastest-lap announcement.
pub const EVENT_CODE_FASTEST_LAP: [u8; 4] = *b"FTLP";

// ── Packet classification ────────────────────────────────────────────────────

/// Packet layouts this decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketId {
    Motion,
    LapData,
    Event,
    Participants,
}

/// Classify a raw datagram by its header discriminant.
///
/// Returns `None` for buffers shorter than the 29-byte header and for
/// discriminants outside the supported set; undersized datagrams are
/// expected noise, not errors.
pub fn classify(raw: &[u8]) -> Option<PacketId> {
    if raw.len() < HEADER_SIZE {
        return None;
    }
    match *raw.get(PACKET_ID_OFFSET)? {
        PACKET_ID_MOTION => Some(PacketId::Motion),
        PACKET_ID_LAP_DATA => Some(PacketId::LapData),
        PACKET_ID_EVENT => Some(PacketId::Event),
        PACKET_ID_PARTICIPANTS => Some(PacketId::Participants),
        _ => None,
    }
}

// ── Low-level binary reading ─────────────────────────────────────────────────

/// Bounds-checked little-endian cursor over a datagram.
///
/// Reads fail with a descriptive error instead of panicking; callers are
/// expected to have validated the packet's minimum length, so a failure here
/// means a truncated or mis-sized frame.
#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Cursor over `buf` starting at byte `offset`.
    pub fn at(buf: &'a [u8], offset: usize) -> Self {
        Self { buf, pos: offset }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or_else(|| anyhow!("offset overflow reading {len} bytes at {}", self.pos))?;
        let chunk = self.buf.get(self.pos..end).ok_or_else(|| {
            anyhow!(
                "out of bounds: {len} bytes at offset {} of a {}-byte buffer",
                self.pos,
                self.buf.len()
            )
        })?;
        self.pos = end;
        Ok(chunk)
    }

    #[inline]
    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    #[inline]
    pub fn u16_le(&mut self) -> Result<u16> {
        self.array().map(u16::from_le_bytes)
    }

    #[inline]
    pub fn u32_le(&mut self) -> Result<u32> {
        self.array().map(u32::from_le_bytes)
    }

    /// Read an IEEE 754 float; non-finite values decode as 0.0.
    #[inline]
    pub fn f32_le(&mut self) -> Result<f32> {
        let value = self.array().map(f32::from_le_bytes)?;
        Ok(if value.is_finite() { value } else { 0.0 })
    }

    /// Read a fixed-size byte array.
    pub fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let chunk = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(chunk);
        Ok(out)
    }

    /// Borrow the next `len` bytes.
    pub fn slice(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    /// Bytes left between the cursor and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }
}

fn ensure_len(raw: &[u8], min: usize, what: &str) -> Result<()> {
    if raw.len() < min {
        return Err(anyhow!(
            "{what} packet too short: {} bytes (need {min})",
            raw.len()
        ));
    }
    Ok(())
}

// ── Frame decoders ───────────────────────────────────────────────────────────

/// Decode a Motion packet into a world-position batch.
///
/// Reads world X and Z per slot; Y is skipped, a 2D track map has no use for
/// elevation. Driver code and livery color come from the store.
pub fn decode_motion(raw: &[u8], competitors: &CompetitorStore) -> Result<Vec<WorldPosition>> {
    ensure_len(raw, MIN_MOTION_PACKET_SIZE, "Motion")?;

    let mut batch = Vec::with_capacity(MAX_CARS);
    for index in 0..MAX_CARS {
        let base = HEADER_SIZE + index * MOTION_ENTRY_SIZE;
        let mut r = ByteReader::at(raw, base + MOTION_WORLD_X_OFFSET);
        let world_x = r.f32_le()?; // 0-3
        r.skip(MOTION_WORLD_Z_OFFSET - MOTION_WORLD_X_OFFSET - 4)?; // worldPositionY (4-7)
        let world_z = r.f32_le()?; // 8-11

        batch.push(WorldPosition {
            car_index: index as u8,
            world_x,
            world_z,
            driver_code: competitors.driver_code(index),
            livery_argb: competitors.livery_argb(index),
        });
    }
    Ok(batch)
}

/// Decode a LapData packet into a race-order snapshot, updating lap state.
pub fn decode_lap_data(
    raw: &[u8],
    competitors: &mut CompetitorStore,
) -> Result<Vec<RaceOrderEntry>> {
    ensure_len(raw, MIN_LAP_DATA_PACKET_SIZE, "LapData")?;

    let mut batch = Vec::with_capacity(MAX_CARS);
    for index in 0..MAX_CARS {
        let base = HEADER_SIZE + index * LAP_DATA_ENTRY_SIZE;
        let mut r = ByteReader::at(raw, base + LAP_LAST_LAP_TIME_OFFSET);
        let last_lap_ms = r.u32_le()?; // 0-3
        r.skip(LAP_GAP_LEADER_FRACTION_OFFSET - 4)?; // sector times etc. (4-16)
        let gap_fraction_ms = r.u16_le()?; // 17-18
        let gap_minutes = r.u8()?; // 19
        r.skip(LAP_CAR_POSITION_OFFSET - LAP_GAP_LEADER_MINUTES_OFFSET - 1)?; // (20-31)
        let position = r.u8()?; // 32
        let current_lap = r.u8()?; // 33

        competitors.record_lap(index, last_lap_ms, current_lap);

        let gap_to_leader_ms = (gap_minutes != GAP_MINUTES_SENTINEL)
            .then(|| u32::from(gap_minutes) * 60_000 + u32::from(gap_fraction_ms));

        batch.push(RaceOrderEntry {
            car_index: index as u8,
            position,
            driver_code: competitors.driver_code(index),
            lap: current_lap,
            last_lap_ms: (last_lap_ms > 0).then_some(last_lap_ms),
            best_lap_ms: competitors.best_lap_ms(index),
            gap_to_leader_ms,
        });
    }
    Ok(batch)
}

/// Decode an Event packet. Only the fastest-lap (`FTLP`) code produces an
/// event; every other code is ignored.
pub fn decode_event(raw: &[u8], competitors: &mut CompetitorStore) -> Result<Option<FastestLap>> {
    ensure_len(raw, MIN_EVENT_PACKET_SIZE, "Event")?;

    let mut r = ByteReader::at(raw, HEADER_SIZE);
    let code: [u8; EVENT_CODE_LEN] = r.array()?;
    if code != EVENT_CODE_FASTEST_LAP {
        debug!(
            code = %String::from_utf8_lossy(&code),
            "ignoring unhandled event code"
        );
        return Ok(None);
    }

    ensure_len(raw, MIN_FASTEST_LAP_PACKET_SIZE, "FastestLap event")?;
    let vehicle_index = usize::from(r.u8()?);
    let lap_time_sec = r.f32_le()?;
    let lap_time_ms = (f64::from(lap_time_sec) * 1000.0).round() as u32;

    if vehicle_index >= MAX_CARS {
        debug!(vehicle_index, "fastest-lap event for out-of-range vehicle");
        return Ok(None);
    }

    competitors.record_fastest_lap(vehicle_index, lap_time_ms);

    Ok(Some(FastestLap {
        car_index: vehicle_index as u8,
        driver_code: competitors.driver_code(vehicle_index),
        // A fastest lap cannot refer to lap 0.
        lap_number: competitors.last_seen_lap(vehicle_index).max(1),
        lap_time_ms,
    }))
}

/// Decode a Participants packet into the competitor store.
///
/// Produces no event; names and livery colors only enrich later packets.
pub fn decode_participants(raw: &[u8], competitors: &mut CompetitorStore) -> Result<()> {
    ensure_len(raw, MIN_PARTICIPANTS_PACKET_SIZE, "Participants")?;

    // The active-competitor count byte precedes the array, but the array is
    // always transmitted in full; inactive slots decode uniformly.
    let array_base = HEADER_SIZE + 1;
    for index in 0..MAX_CARS {
        let mut r = ByteReader::at(raw, array_base + index * PARTICIPANT_ENTRY_SIZE);
        r.skip(PARTICIPANT_NAME_OFFSET)?;
        let name = decode_fixed_name(r.slice(PARTICIPANT_NAME_LEN)?);
        r.skip(PARTICIPANT_POST_NAME_SKIP)?;

        let num_colors = r.u8()?;
        let mut rgb = PARTICIPANT_FALLBACK_RGB;
        let mut color_bytes_left = PARTICIPANT_COLOR_TABLE_LEN;
        if num_colors > 0 && r.remaining() >= 3 {
            rgb = r.array::<3>()?;
            color_bytes_left -= 3;
        }
        r.skip(color_bytes_left)?;

        competitors.set_participant(index, &name, rgb);
    }
    Ok(())
}

/// NUL-terminated UTF-8 in a fixed-width field, trimmed of whitespace.
fn decode_fixed_name(field: &[u8]) -> String {
    let terminated = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..terminated]).trim().to_string()
}

// ── Decoder facade ───────────────────────────────────────────────────────────

/// Stateful F1 25 packet decoder.
///
/// The sole per-datagram entry point for the receive loop: classifies the
/// buffer, routes to the matching frame decoder, and maintains the
/// [`CompetitorStore`] used to enrich events. Malformed input of any kind
/// degrades to "no event"; nothing a datagram contains can make `decode`
/// fail or panic.
#[derive(Debug, Default)]
pub struct F1TelemetryDecoder {
    competitors: CompetitorStore,
}

impl F1TelemetryDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one raw datagram, updating internal state as a side effect.
    pub fn decode(&mut self, raw: &[u8]) -> Option<TelemetryEvent> {
        let decoded = match classify(raw)? {
            PacketId::Motion => {
                decode_motion(raw, &self.competitors).map(|b| Some(TelemetryEvent::WorldPositions(b)))
            }
            PacketId::LapData => decode_lap_data(raw, &mut self.competitors)
                .map(|b| Some(TelemetryEvent::RaceOrder(b))),
            PacketId::Event => decode_event(raw, &mut self.competitors)
                .map(|e| e.map(TelemetryEvent::FastestLap)),
            PacketId::Participants => {
                decode_participants(raw, &mut self.competitors).map(|()| None)
            }
        };

        match decoded {
            Ok(event) => event,
            Err(err) => {
                debug!(error = %err, len = raw.len(), "discarding undecodable frame");
                None
            }
        }
    }

    /// Read access to the accumulated per-competitor state.
    pub fn competitors(&self) -> &CompetitorStore {
        &self.competitors
    }

    /// Reset all per-competitor state; reconnecting is the only caller.
    pub fn reset(&mut self) {
        self.competitors.reset();
    }
}

// ── Synthetic packet builders (pub for integration tests) ────────────────────

/// Build a 29-byte F1 25 packet header carrying `packet_id`.
pub fn build_header_bytes(packet_id: u8) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE);
    buf.extend_from_slice(&2025u16.to_le_bytes()); // packetFormat (0-1)
    buf.push(25); // gameYear (2)
    buf.push(1); // gameMajorVersion (3)
    buf.push(0); // gameMinorVersion (4)
    buf.push(1); // packetVersion (5)
    buf.push(packet_id); // 6
    buf.extend_from_slice(&0u64.to_le_bytes()); // sessionUID (7-14)
    buf.extend_from_slice(&0.0f32.to_le_bytes()); // sessionTime (15-18)
    buf.extend_from_slice(&0u32.to_le_bytes()); // frameIdentifier (19-22)
    buf.extend_from_slice(&0u32.to_le_bytes()); // overallFrameIdentifier (23-26)
    buf.push(0); // playerCarIndex (27)
    buf.push(255); // secondaryPlayerCarIndex (28)
    buf
}

/// Build a Motion packet with `(slot, world_x, world_z)` entries; all other
/// slots stay zeroed.
pub fn build_motion_packet(cars: &[(usize, f32, f32)]) -> Vec<u8> {
    let mut buf = build_header_bytes(PACKET_ID_MOTION);
    buf.resize(MIN_MOTION_PACKET_SIZE, 0);
    for &(index, world_x, world_z) in cars {
        let base = HEADER_SIZE + index * MOTION_ENTRY_SIZE;
        buf[base..base + 4].copy_from_slice(&world_x.to_le_bytes());
        buf[base + MOTION_WORLD_Z_OFFSET..base + MOTION_WORLD_Z_OFFSET + 4]
            .copy_from_slice(&world_z.to_le_bytes());
    }
    buf
}

/// One synthetic LapData record for [`build_lap_data_packet`].
#[derive(Debug, Clone, Copy)]
pub struct LapDataRecord {
    pub last_lap_ms: u32,
    pub gap_fraction_ms: u16,
    pub gap_minutes: u8,
    pub position: u8,
    pub current_lap: u8,
}

/// Build a LapData packet with the given `(slot, record)` entries; all other
/// slots stay zeroed (no completed lap, zero gap).
pub fn build_lap_data_packet(cars: &[(usize, LapDataRecord)]) -> Vec<u8> {
    let mut buf = build_header_bytes(PACKET_ID_LAP_DATA);
    buf.resize(MIN_LAP_DATA_PACKET_SIZE, 0);
    for &(index, record) in cars {
        let base = HEADER_SIZE + index * LAP_DATA_ENTRY_SIZE;
        buf[base..base + 4].copy_from_slice(&record.last_lap_ms.to_le_bytes());
        buf[base + LAP_GAP_LEADER_FRACTION_OFFSET..base + LAP_GAP_LEADER_FRACTION_OFFSET + 2]
            .copy_from_slice(&record.gap_fraction_ms.to_le_bytes());
        buf[base + LAP_GAP_LEADER_MINUTES_OFFSET] = record.gap_minutes;
        buf[base + LAP_CAR_POSITION_OFFSET] = record.position;
        buf[base + LAP_CURRENT_LAP_OFFSET] = record.current_lap;
    }
    buf
}

/// Build an Event packet carrying only a 4-byte code.
pub fn build_event_packet(code: [u8; EVENT_CODE_LEN]) -> Vec<u8> {
    let mut buf = build_header_bytes(PACKET_ID_EVENT);
    buf.extend_from_slice(&code);
    buf
}

/// Build a fastest-lap (`FTLP`) event packet.
pub fn build_fastest_lap_packet(vehicle_index: u8, lap_time_sec: f32) -> Vec<u8> {
    let mut buf = build_event_packet(EVENT_CODE_FASTEST_LAP);
    buf.push(vehicle_index);
    buf.extend_from_slice(&lap_time_sec.to_le_bytes());
    buf
}

/// Build a Participants packet with `(slot, name, primary_rgb)` entries.
///
/// `None` for the color leaves the record's color count at zero, exercising
/// the fallback livery path.
pub fn build_participants_packet(cars: &[(usize, &str, Option<[u8; 3]>)]) -> Vec<u8> {
    let mut buf = build_header_bytes(PACKET_ID_PARTICIPANTS);
    buf.push(cars.len() as u8); // numActiveCars
    buf.resize(MIN_PARTICIPANTS_PACKET_SIZE, 0);
    for &(index, name, rgb) in cars {
        let base = HEADER_SIZE + 1 + index * PARTICIPANT_ENTRY_SIZE;
        let name_field = base + PARTICIPANT_NAME_OFFSET;
        let name_bytes = name.as_bytes();
        let len = name_bytes.len().min(PARTICIPANT_NAME_LEN - 1);
        buf[name_field..name_field + len].copy_from_slice(&name_bytes[..len]);
        if let Some(rgb) = rgb {
            let colors = name_field + PARTICIPANT_NAME_LEN + PARTICIPANT_POST_NAME_SKIP;
            buf[colors] = 1; // numColours
            buf[colors + 1..colors + 4].copy_from_slice(&rgb);
        }
    }
    buf
}

// ── Tests ────────────────────────────────────────────────────────────────────
