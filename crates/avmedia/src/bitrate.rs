//! Size-capped bitrate selection.
//!
//! Projections use `tier * seconds / 8`, where `seconds` is the probed
//! duration rounded to the nearest whole second. Probed durations can be
//! off for variable bitrate sources, so the caller must still check the
//! real size of the produced file.

use std::fmt;
use std::time::Duration;

/// Candidate opus bitrates, in bits per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BitrateTier {
    Low,
    Medium,
    High,
}

impl BitrateTier {
    /// Every tier, highest first. Selection walks this order.
    pub const DESCENDING: [BitrateTier; 3] = [Self::High, Self::Medium, Self::Low];

    pub const fn as_bps(self) -> u64 {
        match self {
            Self::High => 48_000,
            Self::Medium => 24_000,
            Self::Low => 12_000,
        }
    }

    /// Value for ffmpeg's `-b:a`.
    pub const fn ffmpeg_arg(self) -> &'static str {
        match self {
            Self::High => "48k",
            Self::Medium => "24k",
            Self::Low => "12k",
        }
    }

    /// Projected output size in bytes for `seconds` of audio.
    pub const fn projected_size(self, seconds: u64) -> u64 {
        self.as_bps().saturating_mul(seconds) / 8
    }
}

impl fmt::Display for BitrateTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ffmpeg_arg())
    }
}

/// Choose the highest tier that neither upsamples the source nor is
/// projected to reach `size_cap`.
///
/// An unknown (zero) bitrate or duration makes every projection
/// meaningless, so the lowest tier is returned. The lowest tier is also the
/// unconditional fallback when nothing qualifies; its projection is never
/// checked.
pub fn select_bitrate(bitrate: u64, duration: Duration, size_cap: u64) -> BitrateTier {
    let seconds = duration.as_secs_f64().round() as u64;
    if bitrate == 0 || seconds == 0 {
        return BitrateTier::Low;
    }

    // Highest first: a tier is only considered when the source is strictly
    // above it.
    for tier in [BitrateTier::High, BitrateTier::Medium] {
        if bitrate > tier.as_bps() && tier.projected_size(seconds) < size_cap {
            return tier;
        }
    }

    BitrateTier::Low
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_signal_sample_selects_medium() {
        // 36,981 bps for 432 s: 48k projects 2,592,000 bytes, 24k 1,296,000.
        assert_eq!(BitrateTier::High.projected_size(432), 2_592_000);
        assert_eq!(BitrateTier::Medium.projected_size(432), 1_296_000);
        assert_eq!(
            select_bitrate(36_981, secs(432), 2_000_000),
            BitrateTier::Medium
        );
    }

    #[test]
    fn test_unknown_values_select_low() {
        assert_eq!(select_bitrate(0, secs(600), u64::MAX), BitrateTier::Low);
        assert_eq!(select_bitrate(256_000, secs(0), u64::MAX), BitrateTier::Low);
        // Rounds down to zero seconds
        assert_eq!(
            select_bitrate(256_000, Duration::from_millis(400), u64::MAX),
            BitrateTier::Low
        );
    }

    #[test]
    fn test_projection_equal_to_cap_is_rejected() {
        let cap = BitrateTier::High.projected_size(100);
        assert_eq!(select_bitrate(112_000, secs(100), cap), BitrateTier::Medium);
        assert_eq!(select_bitrate(112_000, secs(100), cap + 1), BitrateTier::High);
    }

    #[test]
    fn test_never_upsamples() {
        // Exactly 48k is not strictly above the high tier.
        assert_eq!(select_bitrate(48_000, secs(10), u64::MAX), BitrateTier::Medium);
        assert_eq!(select_bitrate(24_000, secs(10), u64::MAX), BitrateTier::Low);
        assert_eq!(select_bitrate(8_000, secs(10), u64::MAX), BitrateTier::Low);
    }

    #[test]
    fn test_low_is_unchecked_fallback() {
        // Even 12k projects above a 1 byte cap, but is still returned.
        assert_eq!(select_bitrate(256_000, secs(2_705), 1), BitrateTier::Low);
    }

    #[test]
    fn test_duration_is_rounded() {
        // 99.6 s rounds to 100 s, which makes 48k exactly hit the cap.
        let cap = BitrateTier::High.projected_size(100);
        assert_eq!(
            select_bitrate(112_000, Duration::from_millis(99_600), cap),
            BitrateTier::Medium
        );
        assert_eq!(
            select_bitrate(112_000, Duration::from_millis(99_400), cap),
            BitrateTier::High
        );
    }

    #[test]
    fn test_display_matches_ffmpeg_arg() {
        for tier in BitrateTier::DESCENDING {
            assert_eq!(tier.to_string(), tier.ffmpeg_arg());
        }
        assert!(BitrateTier::High > BitrateTier::Medium);
        assert!(BitrateTier::Medium > BitrateTier::Low);
    }

    proptest! {
        #[test]
        fn prop_selects_highest_qualifying_tier(
            bitrate in 1u64..512_000,
            seconds in 1u64..20_000,
            cap in 1u64..200_000_000,
        ) {
            let expected = BitrateTier::DESCENDING
                .into_iter()
                .find(|t| bitrate > t.as_bps() && t.projected_size(seconds) < cap)
                .unwrap_or(BitrateTier::Low);
            prop_assert_eq!(select_bitrate(bitrate, secs(seconds), cap), expected);
        }

        #[test]
        fn prop_unknown_input_is_always_low(
            value in 0u64..1_000_000,
            cap in any::<u64>(),
        ) {
            prop_assert_eq!(select_bitrate(0, secs(value), cap), BitrateTier::Low);
            prop_assert_eq!(select_bitrate(value, Duration::ZERO, cap), BitrateTier::Low);
        }

        #[test]
        fn prop_only_the_fallback_may_reach_source_bitrate(
            bitrate in 0u64..512_000,
            millis in 0u64..20_000_000,
            cap in any::<u64>(),
        ) {
            let tier = select_bitrate(bitrate, Duration::from_millis(millis), cap);
            prop_assert!(tier == BitrateTier::Low || tier.as_bps() < bitrate);
        }

        #[test]
        fn prop_chosen_tier_fits_unless_fallback(
            bitrate in 1u64..512_000,
            seconds in 1u64..20_000,
            cap in 1u64..200_000_000,
        ) {
            let tier = select_bitrate(bitrate, secs(seconds), cap);
            prop_assert!(tier == BitrateTier::Low || tier.projected_size(seconds) < cap);
        }
    }
}
