//! Period <-> frequency conversion for both XM frequency-type modes.
//!
//! Linear mode treats `period` as 1/64-semitone units and derives
//! frequency through an exp2 lookup table (matches FT2's linear
//! frequency table). Amiga mode treats `period` as a real Amiga
//! hardware period and derives frequency from the PAL clock constant.

use xm_ir::FrequencyType;

/// Linear-mode period clamp (engine limit, not an XM file field).
pub const LINEAR_PERIOD_MIN: i32 = 1;
pub const LINEAR_PERIOD_MAX: i32 = 7680;

/// Amiga-mode period clamp.
pub const AMIGA_PERIOD_MIN: i32 = 107;
pub const AMIGA_PERIOD_MAX: i32 = 7040;

const AMIGA_PAL_CLOCK: f64 = 7_093_789.2;

/// Microstep fixed-point bits, mirrored from `xm_ir::channel::MICROSTEP_BITS`
/// so frequency math and position math agree on scale.
pub const MICROSTEP_BITS: u32 = xm_ir::MICROSTEP_BITS;

/// Table of `2^(i/768)` for `i` in `0..768`, covering one octave at
/// 1/64-semitone resolution (12 semitones * 64 = 768 steps).
fn exp2_fraction(steps: i32) -> f64 {
    let normalized = steps.rem_euclid(768) as f64 / 768.0;
    libm::exp2(normalized)
}

/// Convert a linear-mode period (1/64-semitone units, higher = higher
/// pitch relative to the 7680 origin) to frequency in Hz.
///
/// Matches FT2's linear frequency formula:
/// `freq = 8363 * 2^((4608 - period) / 768)`.
pub fn linear_period_to_frequency(period: i32) -> f64 {
    let exponent = 4608 - period;
    let octaves = exponent.div_euclid(768);
    let frac = exp2_fraction(exponent);
    8363.0 * frac * libm::exp2(octaves as f64)
}

/// Convert an Amiga period to frequency in Hz via the PAL clock constant.
pub fn amiga_period_to_frequency(period: i32) -> f64 {
    if period <= 0 {
        return 0.0;
    }
    AMIGA_PAL_CLOCK / (period as f64 * 2.0)
}

/// Convert a period to frequency according to the module's frequency type.
pub fn period_to_frequency(frequency_type: FrequencyType, period: i32) -> f64 {
    match frequency_type {
        FrequencyType::Linear => linear_period_to_frequency(period),
        FrequencyType::Amiga => amiga_period_to_frequency(period),
    }
}

/// Clamp a period to the engine's representable range for its frequency type.
pub fn clamp_period(frequency_type: FrequencyType, period: f32) -> f32 {
    match frequency_type {
        FrequencyType::Linear => period.clamp(LINEAR_PERIOD_MIN as f32, LINEAR_PERIOD_MAX as f32),
        FrequencyType::Amiga => period.clamp(AMIGA_PERIOD_MIN as f32, AMIGA_PERIOD_MAX as f32),
    }
}

/// Compute the per-output-frame microstep increment ("step") for a
/// sample given its period, the module's frequency type, and the
/// output sample rate.
///
/// `step` is in units of `2^MICROSTEP_BITS` per output frame, so that
/// `ChannelState::sample_position` can be advanced by plain integer
/// addition each frame.
pub fn period_to_step(frequency_type: FrequencyType, period: f32, sample_rate: u32) -> u32 {
    if sample_rate == 0 {
        return 0;
    }
    let freq = period_to_frequency(frequency_type, period as i32);
    let microsteps_per_second = freq * (1u64 << MICROSTEP_BITS) as f64;
    (microsteps_per_second / sample_rate as f64).max(0.0) as u32
}

/// Convert a linear-mode note number (12 semitones/octave, 64 units
/// per semitone, relative_note + finetune already folded in) into the
/// corresponding period.
pub fn note_to_linear_period(note: f32, relative_note: i8, finetune: i8) -> f32 {
    let semitone = note + relative_note as f32;
    7680.0 - semitone * 64.0 - finetune as f32 / 2.0
}

/// Amiga base periods for the twelve semitones of octave 0 in FT2's
/// finetune-scaled table, scaled here to the finetune-free case; exact
/// finetune interpolation is handled by callers via 1/8-semitone
/// interpolation between adjacent table entries when needed.
const AMIGA_BASE_PERIODS: [f32; 12] = [
    1712.0, 1616.0, 1525.0, 1440.0, 1357.0, 1281.0, 1209.0, 1141.0, 1077.0, 1017.0, 961.0, 907.0,
];

/// Convert a note number to an Amiga period using octave doubling from
/// the base-octave table (relative_note folded into `note` by caller).
pub fn note_to_amiga_period(note: f32, relative_note: i8) -> f32 {
    let absolute = note + relative_note as f32;
    let octave = (absolute / 12.0).floor() as i32;
    let semitone = (absolute - (octave * 12) as f32).clamp(0.0, 11.0) as usize;
    let base = AMIGA_BASE_PERIODS[semitone];
    if octave >= 0 {
        base / libm::exp2(octave as f64) as f32
    } else {
        base * libm::exp2((-octave) as f64) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_period_at_c4_is_8363hz() {
        let freq = linear_period_to_frequency(4608 - 48 * 64);
        assert!((freq - 8363.0).abs() < 1.0, "got {freq}");
    }

    #[test]
    fn linear_period_one_octave_lower_halves_frequency() {
        let base = linear_period_to_frequency(4608 - 48 * 64);
        let lower = linear_period_to_frequency(4608 - 36 * 64);
        assert!((lower - base / 2.0).abs() < 1.0, "base={base} lower={lower}");
    }

    #[test]
    fn amiga_period_reference_matches_known_value() {
        let freq = amiga_period_to_frequency(428);
        assert!((freq - 8287.0).abs() < 10.0, "got {freq}");
    }

    #[test]
    fn amiga_period_zero_is_silent() {
        assert_eq!(amiga_period_to_frequency(0), 0.0);
    }

    #[test]
    fn clamp_period_respects_mode_specific_bounds() {
        assert_eq!(clamp_period(FrequencyType::Amiga, 50.0), AMIGA_PERIOD_MIN as f32);
        assert_eq!(clamp_period(FrequencyType::Linear, 99999.0), LINEAR_PERIOD_MAX as f32);
    }

    #[test]
    fn period_to_step_scales_with_sample_rate() {
        let period = 4608.0 - 48.0 * 64.0;
        let step_44100 = period_to_step(FrequencyType::Linear, period, 44_100);
        let step_88200 = period_to_step(FrequencyType::Linear, period, 88_200);
        assert!(step_44100 > 0);
        assert!((step_88200 as i64 - step_44100 as i64 * 2).unsigned_abs() <= 2);
    }

    #[test]
    fn period_to_step_zero_sample_rate_is_zero() {
        assert_eq!(period_to_step(FrequencyType::Linear, 428.0, 0), 0);
    }

    #[test]
    fn note_to_amiga_period_octave_doubling() {
        let c4 = note_to_amiga_period(48.0, 0);
        let c5 = note_to_amiga_period(60.0, 0);
        assert!((c5 - c4 / 2.0).abs() < 1.0, "c4={c4} c5={c5}");
    }
}
