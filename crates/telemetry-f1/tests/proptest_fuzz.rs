//! Property-based fuzz tests for F1 25 packet decoding.
//!
//! The decoder fronts a raw UDP socket: whatever arrives, it must never
//! panic, and undecodable input must degrade to "no event".

use gridline_telemetry_f1::{
    F1TelemetryDecoder, MIN_LAP_DATA_PACKET_SIZE, MIN_MOTION_PACKET_SIZE,
    MIN_PARTICIPANTS_PACKET_SIZE, PACKET_ID_EVENT, PACKET_ID_LAP_DATA, PACKET_ID_MOTION,
    PACKET_ID_PARTICIPANTS,
};
use proptest::prelude::*;

const MAX_DATAGRAM: usize = 2048;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Arbitrary random bytes of any length must never cause a panic.
    #[test]
    fn prop_random_bytes_no_panic(
        data in proptest::collection::vec(any::<u8>(), 0..MAX_DATAGRAM)
    ) {
        let mut decoder = F1TelemetryDecoder::new();
        let _ = decoder.decode(&data);
    }

    /// Correctly-sized frames with random content must decode without
    /// panicking for every supported packet type.
    #[test]
    fn prop_valid_size_random_content_no_panic(
        packet_id in prop_oneof![
            Just(PACKET_ID_MOTION),
            Just(PACKET_ID_LAP_DATA),
            Just(PACKET_ID_EVENT),
            Just(PACKET_ID_PARTICIPANTS),
        ],
        data in proptest::collection::vec(any::<u8>(), MIN_MOTION_PACKET_SIZE..=MIN_MOTION_PACKET_SIZE)
    ) {
        let mut data = data;
        data[6] = packet_id;
        let mut decoder = F1TelemetryDecoder::new();
        let _ = decoder.decode(&data);
    }

    /// Repeated random traffic keeps the decoder usable: a well-formed
    /// frame afterwards still decodes.
    #[test]
    fn prop_noise_does_not_poison_state(
        frames in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 0..128),
            0..16,
        )
    ) {
        let mut decoder = F1TelemetryDecoder::new();
        for frame in &frames {
            let _ = decoder.decode(frame);
        }
        let packet = gridline_telemetry_f1::build_motion_packet(&[(0, 1.0, 2.0)]);
        prop_assert!(decoder.decode(&packet).is_some());
    }
}

#[test]
fn min_sizes_are_consistent() {
    // Motion is the largest fixed layout; the valid-size fuzz above relies
    // on that to cover every packet type's full array region.
    assert!(MIN_MOTION_PACKET_SIZE >= MIN_LAP_DATA_PACKET_SIZE);
    assert!(MIN_MOTION_PACKET_SIZE >= MIN_PARTICIPANTS_PACKET_SIZE);
}
