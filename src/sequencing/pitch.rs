//! MIDI pitch numbers and their display names.
//!
//! Middle C (C4) = MIDI note 60. The formula: note = 12 * (octave + 1) + semitone,
//! with semitone C=0, C#=1, ... B=11. Sharps are used for display; the handful
//! of constants below cover what the demo binary and tests reach for.

const NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Display name for a MIDI pitch number, e.g. 61 -> "C#4".
pub fn note_name(pitch: u8) -> String {
    let name = NAMES[(pitch % 12) as usize];
    let octave = (pitch / 12) as i8 - 1;
    format!("{name}{octave}")
}

pub const C2: u8 = 36;
pub const G2: u8 = 43;
pub const C3: u8 = 48;
pub const E3: u8 = 52;
pub const G3: u8 = 55;
pub const C4: u8 = 60;
pub const D4: u8 = 62;
pub const E4: u8 = 64;
pub const F4: u8 = 65;
pub const G4: u8 = 67;
pub const A4: u8 = 69; // A440 tuning reference
pub const B4: u8 = 71;
pub const C5: u8 = 72;
