//! Musical note durations as rational fractions of a whole note.
//!
//! A quarter note is 1/4, a dotted eighth is 3/16, an eighth triplet is 1/12.
//! Exact ratios are kept all the way to the point where a wall-clock duration
//! is needed; only `factor()` leaves the rational domain.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A note duration relative to a whole note.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct Fraction {
    /// Numerator: how many parts
    pub numerator: u32,
    /// Denominator: of what size (4 = quarter, 8 = eighth, etc.)
    pub denominator: u32,
}

/// Quantization targets for echoing played notes, coarse to fine.
///
/// Each supported plain value plus its dotted and triplet variants, ordered by
/// descending factor. `Fraction::nearest` scans this table front to back with a
/// strict improvement test, so an exact tie keeps the earlier (coarser) entry.
/// The second element is the echo prefix; a plain quarter prints as nothing
/// because it is the default duration in the note literal syntax.
const SNAP_TABLE: &[(Fraction, &str)] = &[
    (Fraction::WHOLE.dotted(), "1."),
    (Fraction::WHOLE, "1"),
    (Fraction::HALF.dotted(), "2."),
    (Fraction::WHOLE.triplet(), "1t"),
    (Fraction::HALF, "2"),
    (Fraction::QUARTER.dotted(), "4."),
    (Fraction::HALF.triplet(), "2t"),
    (Fraction::QUARTER, ""),
    (Fraction::EIGHTH.dotted(), "8."),
    (Fraction::QUARTER.triplet(), "4t"),
    (Fraction::EIGHTH, "8"),
    (Fraction::SIXTEENTH.dotted(), "16."),
    (Fraction::EIGHTH.triplet(), "8t"),
    (Fraction::SIXTEENTH, "16"),
    (Fraction::SIXTEENTH.triplet(), "16t"),
];

impl Fraction {
    // Standard note values
    pub const WHOLE: Fraction = Fraction {
        numerator: 1,
        denominator: 1,
    };
    pub const HALF: Fraction = Fraction {
        numerator: 1,
        denominator: 2,
    };
    pub const QUARTER: Fraction = Fraction {
        numerator: 1,
        denominator: 4,
    };
    pub const EIGHTH: Fraction = Fraction {
        numerator: 1,
        denominator: 8,
    };
    pub const SIXTEENTH: Fraction = Fraction {
        numerator: 1,
        denominator: 16,
    };

    /// Apply a dot: multiply duration by 3/2 (increases by 50%)
    pub const fn dotted(self) -> Self {
        Fraction {
            numerator: self.numerator * 3,
            denominator: self.denominator * 2,
        }
    }

    /// Create a triplet: multiply duration by 2/3
    /// (three notes in the time of two)
    pub const fn triplet(self) -> Self {
        Fraction {
            numerator: self.numerator * 2,
            denominator: self.denominator * 3,
        }
    }

    /// Reduce the fraction to lowest terms using GCD
    pub const fn reduce(self) -> Self {
        let gcd = const_gcd(self.numerator, self.denominator);
        Fraction {
            numerator: self.numerator / gcd,
            denominator: self.denominator / gcd,
        }
    }

    /// The fraction as a float multiplier of the whole-note duration.
    pub fn factor(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Snap a whole-note multiplier to the nearest supported fraction.
    ///
    /// Lossy by design: this approximates human timing, so ties between two
    /// table entries resolve to the coarser one.
    pub fn nearest(factor: f64) -> Fraction {
        let mut best = SNAP_TABLE[0].0;
        let mut best_distance = (best.factor() - factor).abs();
        for (candidate, _) in &SNAP_TABLE[1..] {
            let distance = (candidate.factor() - factor).abs();
            if distance < best_distance {
                best = *candidate;
                best_distance = distance;
            }
        }
        best
    }
}

impl PartialEq for Fraction {
    /// Compare by value, not representation: 2/24 (an eighth triplet before
    /// reduction) equals 1/12.
    fn eq(&self, other: &Self) -> bool {
        self.numerator as u64 * other.denominator as u64
            == other.numerator as u64 * self.denominator as u64
    }
}

impl Eq for Fraction {}

impl std::fmt::Display for Fraction {
    /// The duration prefix of a note literal ("8" for an eighth, "4." for a
    /// dotted quarter, empty for a plain quarter). Fractions outside the
    /// supported table print as "n/d".
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (fraction, prefix) in SNAP_TABLE {
            if self == fraction {
                return write!(f, "{prefix}");
            }
        }
        let reduced = self.reduce();
        write!(f, "{}/{}", reduced.numerator, reduced.denominator)
    }
}

/// Compute greatest common divisor (Euclidean algorithm)
const fn const_gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let temp = b;
        b = a % b;
        a = temp;
    }
    a
}
