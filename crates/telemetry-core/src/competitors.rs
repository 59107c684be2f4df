//! Per-competitor state accumulated across packets.
//!
//! The store is the single place cross-packet knowledge lives: LapData
//! packets feed lap bests, Participants packets feed names and livery
//! colors, and fastest-lap events feed bests out of band. Decoders read it
//! to enrich later packets. It is owned by exactly one decoding context and
//! needs no synchronization.

use serde::{Deserialize, Serialize};

/// Fixed competitor slot count. The game always transmits arrays of this
/// size, active or not.
pub const MAX_CARS: usize = 22;

/// Livery color used until a Participants packet supplies the real one.
pub const PLACEHOLDER_LIVERY_ARGB: u32 = 0xFFCC_3333;

/// Derive the stable 3-character driver code shown in every emitted event.
///
/// The rules, in order:
/// 1. Trim; an empty name yields `C` plus the zero-padded 2-digit slot index.
/// 2. Take the letters of the last whitespace-separated token (the surname),
///    uppercased; if that gives at least 3 letters, use the first 3.
/// 3. Otherwise take the letters of the whole name, uppercased; if at least
///    3, use the first 3.
/// 4. Otherwise right-pad with `X` to exactly 3 characters.
pub fn derive_driver_code(name: &str, car_index: usize) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return format!("C{car_index:02}");
    }

    let surname = trimmed.split_whitespace().next_back().unwrap_or(trimmed);
    let surname_letters = uppercase_letters(surname);
    if surname_letters.chars().count() >= 3 {
        return surname_letters.chars().take(3).collect();
    }

    let all_letters = uppercase_letters(trimmed);
    if all_letters.chars().count() >= 3 {
        return all_letters.chars().take(3).collect();
    }

    let mut code: String = all_letters;
    while code.chars().count() < 3 {
        code.push('X');
    }
    code
}

fn uppercase_letters(source: &str) -> String {
    source
        .chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(char::to_uppercase)
        .collect()
}

/// State for one competitor slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CompetitorSlot {
    full_name: String,
    driver_code: String,
    livery_argb: u32,
    last_lap_ms: u32,
    best_lap_ms: Option<u32>,
    last_seen_lap: u8,
}

impl Default for CompetitorSlot {
    fn default() -> Self {
        Self {
            full_name: String::new(),
            driver_code: String::new(),
            livery_argb: PLACEHOLDER_LIVERY_ARGB,
            last_lap_ms: 0,
            best_lap_ms: None,
            last_seen_lap: 0,
        }
    }
}

/// Mutable per-competitor state for the lifetime of one connection.
///
/// Every index-taking method tolerates out-of-range indices: updates become
/// no-ops and reads return the slot defaults, so a corrupt record can never
/// cause an out-of-bounds access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitorStore {
    slots: Vec<CompetitorSlot>,
}

impl Default for CompetitorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CompetitorStore {
    /// Create a store with all 22 slots in their pristine state.
    pub fn new() -> Self {
        Self {
            slots: vec![CompetitorSlot::default(); MAX_CARS],
        }
    }

    /// Apply one LapData record.
    ///
    /// A strictly positive lap time that differs from the previously stored
    /// one and beats the current best becomes the new best. The last-lap time
    /// and lap counter are refreshed unconditionally.
    pub fn record_lap(&mut self, index: usize, last_lap_ms: u32, lap_number: u8) {
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        if last_lap_ms > 0
            && last_lap_ms != slot.last_lap_ms
            && slot.best_lap_ms.is_none_or(|best| last_lap_ms < best)
        {
            slot.best_lap_ms = Some(last_lap_ms);
        }
        slot.last_lap_ms = last_lap_ms;
        slot.last_seen_lap = lap_number;
    }

    /// Apply an out-of-band fastest-lap report: the best only ever shrinks.
    pub fn record_fastest_lap(&mut self, index: usize, lap_time_ms: u32) {
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        if slot.best_lap_ms.is_none_or(|best| lap_time_ms < best) {
            slot.best_lap_ms = Some(lap_time_ms);
        }
    }

    /// Store a competitor's name and primary livery color from a
    /// Participants record. The driver code is derived once, here.
    pub fn set_participant(&mut self, index: usize, name: &str, rgb: [u8; 3]) {
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        slot.full_name = name.to_string();
        slot.driver_code = derive_driver_code(name, index);
        slot.livery_argb = 0xFF00_0000
            | (u32::from(rgb[0]) << 16)
            | (u32::from(rgb[1]) << 8)
            | u32::from(rgb[2]);
    }

    /// The display code for a slot, never empty.
    ///
    /// Falls back from the stored code, to a fresh derivation from the stored
    /// name, to a `CAR {n}` placeholder. The placeholder is computed at call
    /// time and never written back.
    pub fn driver_code(&self, index: usize) -> String {
        let Some(slot) = self.slots.get(index) else {
            return format!("CAR {index}");
        };
        if !slot.driver_code.trim().is_empty() {
            return slot.driver_code.clone();
        }
        if !slot.full_name.trim().is_empty() {
            return derive_driver_code(&slot.full_name, index);
        }
        format!("CAR {index}")
    }

    /// Best lap recorded so far, if any.
    pub fn best_lap_ms(&self, index: usize) -> Option<u32> {
        self.slots.get(index).and_then(|slot| slot.best_lap_ms)
    }

    /// Raw last-lap value from the most recent LapData record; 0 means no
    /// completed lap yet.
    pub fn last_lap_ms(&self, index: usize) -> u32 {
        self.slots.get(index).map_or(0, |slot| slot.last_lap_ms)
    }

    /// Latest lap-in-progress counter seen for this competitor.
    pub fn last_seen_lap(&self, index: usize) -> u8 {
        self.slots.get(index).map_or(0, |slot| slot.last_seen_lap)
    }

    /// Primary livery color, placeholder until Participants data arrives.
    pub fn livery_argb(&self, index: usize) -> u32 {
        self.slots
            .get(index)
            .map_or(PLACEHOLDER_LIVERY_ARGB, |slot| slot.livery_argb)
    }

    /// Raw competitor name as received, empty until known.
    pub fn full_name(&self, index: usize) -> &str {
        self.slots.get(index).map_or("", |slot| &slot.full_name)
    }

    /// Wholesale reset to the pristine state. Reconnect is the only caller.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn driver_code_takes_first_three_surname_letters() {
        assert_eq!(derive_driver_code("Max Verstappen", 0), "VER");
        assert_eq!(derive_driver_code("Lewis Hamilton", 3), "HAM");
        assert_eq!(derive_driver_code("Charles Leclerc", 9), "LEC");
    }

    #[test]
    fn driver_code_blank_name_uses_slot_index() {
        assert_eq!(derive_driver_code("  ", 7), "C07");
        assert_eq!(derive_driver_code("", 21), "C21");
    }

    #[test]
    fn driver_code_short_name_pads_with_x() {
        assert_eq!(derive_driver_code("Al", 0), "ALX");
        assert_eq!(derive_driver_code("J", 5), "JXX");
    }

    #[test]
    fn driver_code_short_surname_falls_back_to_full_name() {
        // Surname "Na" has only 2 letters; the whole name has enough.
        assert_eq!(derive_driver_code("Carlos Na", 0), "CAR");
    }

    #[test]
    fn driver_code_strips_non_letters() {
        assert_eq!(derive_driver_code("Jean-Eric Vergne2", 0), "VER");
    }

    #[test]
    fn record_lap_sets_first_best() {
        let mut store = CompetitorStore::new();
        store.record_lap(4, 92_500, 2);
        assert_eq!(store.best_lap_ms(4), Some(92_500));
        assert_eq!(store.last_lap_ms(4), 92_500);
        assert_eq!(store.last_seen_lap(4), 2);
    }

    #[test]
    fn record_lap_repeated_value_does_not_touch_best() {
        let mut store = CompetitorStore::new();
        store.record_lap(0, 90_000, 2);
        store.record_lap(0, 90_000, 3);
        assert_eq!(store.best_lap_ms(0), Some(90_000));
        assert_eq!(store.last_seen_lap(0), 3);
    }

    #[test]
    fn record_lap_slower_lap_keeps_best() {
        let mut store = CompetitorStore::new();
        store.record_lap(0, 88_000, 2);
        store.record_lap(0, 95_000, 3);
        assert_eq!(store.best_lap_ms(0), Some(88_000));
        assert_eq!(store.last_lap_ms(0), 95_000);
    }

    #[test]
    fn record_lap_zero_means_no_lap_completed() {
        let mut store = CompetitorStore::new();
        store.record_lap(0, 0, 1);
        assert_eq!(store.best_lap_ms(0), None);
        assert_eq!(store.last_lap_ms(0), 0);
    }

    #[test]
    fn fastest_lap_only_shrinks_best() {
        let mut store = CompetitorStore::new();
        store.record_lap(2, 90_000, 4);
        store.record_fastest_lap(2, 89_000);
        assert_eq!(store.best_lap_ms(2), Some(89_000));
        store.record_fastest_lap(2, 91_000);
        assert_eq!(store.best_lap_ms(2), Some(89_000));
    }

    #[test]
    fn participant_sets_name_code_and_color() {
        let mut store = CompetitorStore::new();
        store.set_participant(3, "Lewis Hamilton", [0, 210, 190]);
        assert_eq!(store.full_name(3), "Lewis Hamilton");
        assert_eq!(store.driver_code(3), "HAM");
        assert_eq!(store.livery_argb(3), 0xFF00_D2BE);
    }

    #[test]
    fn driver_code_placeholder_until_participants() {
        let store = CompetitorStore::new();
        assert_eq!(store.driver_code(5), "CAR 5");
        assert_eq!(store.livery_argb(5), PLACEHOLDER_LIVERY_ARGB);
    }

    #[test]
    fn out_of_range_index_is_ignored() {
        let mut store = CompetitorStore::new();
        store.record_lap(MAX_CARS, 80_000, 1);
        store.record_fastest_lap(99, 80_000);
        store.set_participant(MAX_CARS, "Ghost", [1, 2, 3]);
        assert_eq!(store.best_lap_ms(MAX_CARS), None);
        assert_eq!(store.driver_code(99), "CAR 99");
    }

    #[test]
    fn reset_restores_pristine_state() {
        let mut store = CompetitorStore::new();
        store.record_lap(1, 90_000, 5);
        store.set_participant(1, "Oscar Piastri", [255, 128, 0]);
        store.reset();
        assert_eq!(store.best_lap_ms(1), None);
        assert_eq!(store.full_name(1), "");
        assert_eq!(store.livery_argb(1), PLACEHOLDER_LIVERY_ARGB);
    }

    proptest! {
        /// Once set, the best lap never increases, whatever LapData reports.
        #[test]
        fn prop_best_lap_is_monotonically_non_increasing(
            laps in proptest::collection::vec(any::<u32>(), 1..64)
        ) {
            let mut store = CompetitorStore::new();
            let mut previous_best = None;
            for (i, lap) in laps.into_iter().enumerate() {
                store.record_lap(0, lap, (i % 256) as u8);
                let best = store.best_lap_ms(0);
                if let (Some(prev), Some(now)) = (previous_best, best) {
                    prop_assert!(now <= prev);
                }
                prop_assert!(previous_best.is_none() || best.is_some());
                previous_best = best;
            }
        }

        /// The derived code is always exactly 3 characters for non-blank
        /// names, and never empty otherwise.
        #[test]
        fn prop_driver_code_never_empty(name in ".{0,48}", index in 0usize..MAX_CARS) {
            let code = derive_driver_code(&name, index);
            prop_assert!(!code.is_empty());
            prop_assert!(code.chars().count() == 3);
        }
    }
}
