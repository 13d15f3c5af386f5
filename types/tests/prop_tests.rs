use proptest::prelude::*;

use peg_types::amount::{apply_bps_haircut, mul_div_floor};
use peg_types::{Address, Timestamp};

proptest! {
    /// mul_div_floor agrees with plain integer math when nothing overflows.
    #[test]
    fn mul_div_floor_matches_integer_math(
        value in 0u128..1_000_000_000_000,
        num in 1u128..1_000_000,
        den in 1u128..1_000_000,
    ) {
        prop_assert_eq!(mul_div_floor(value, num, den), Some(value * num / den));
    }

    /// Scaling down never produces more than the input.
    #[test]
    fn scaling_by_ratio_below_one_shrinks(value in 0u128..u128::MAX / 4, num in 1u128..4, extra in 1u128..4) {
        let scaled = mul_div_floor(value, num, num + extra).unwrap();
        prop_assert!(scaled <= value);
    }

    /// A haircut is bounded by the original amount and by the tolerance.
    #[test]
    fn haircut_bounds(value in 0u128..1_000_000_000_000, bps in 0u32..=500) {
        let min = apply_bps_haircut(value, bps).unwrap();
        prop_assert!(min <= value);
        prop_assert!(value - min <= value * u128::from(bps) / 10_000 + 1);
    }

    /// Only the all-zero address reports zero.
    #[test]
    fn address_zero_detection(bytes in prop::array::uniform20(0u8..)) {
        prop_assert_eq!(Address::new(bytes).is_zero(), bytes == [0u8; 20]);
    }

    /// Timestamp elapsed_since saturates to 0 when now < self.
    #[test]
    fn timestamp_elapsed_since_saturates(base in 1u64..1_000_000, deficit in 1u64..1_000_000) {
        let later = Timestamp::new(base + deficit);
        let earlier = Timestamp::new(base);
        prop_assert_eq!(later.elapsed_since(earlier), 0);
    }

    /// Address bincode encoding is the raw 20 bytes.
    #[test]
    fn address_bincode_is_fixed_width(bytes in prop::array::uniform20(0u8..)) {
        let encoded = bincode::serialize(&Address::new(bytes)).unwrap();
        prop_assert_eq!(encoded.len(), 20);
    }
}
