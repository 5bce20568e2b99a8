//! Tempo math: mapping between musical fractions and wall-clock durations.

use super::fraction::Fraction;
use std::time::Duration;

/// Wall-clock length of a whole note at the given tempo.
///
/// One beat is a quarter note, so a whole note spans four beats:
/// 240_000 ms / bpm. Callers validate the tempo upstream; a non-positive bpm
/// is a programming error here.
pub fn whole_note_duration(bpm: f64) -> Duration {
    debug_assert!(bpm > 0.0, "tempo must be positive, got {bpm}");
    Duration::from_secs_f64(240.0 / bpm)
}

/// Wall-clock length of one fraction at the given tempo.
pub fn fraction_to_duration(fraction: Fraction, bpm: f64) -> Duration {
    whole_note_duration(bpm).mul_f64(fraction.factor())
}

/// Snap an elapsed wall-clock time to the nearest supported fraction at the
/// given tempo. The inverse of [`fraction_to_duration`] up to quantization:
/// this reconstructs what a human played, not what a sequencer emitted.
pub fn duration_to_fraction(bpm: f64, elapsed: Duration) -> Fraction {
    let whole = whole_note_duration(bpm);
    Fraction::nearest(elapsed.as_secs_f64() / whole.as_secs_f64())
}
