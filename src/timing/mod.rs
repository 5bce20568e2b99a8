pub mod fraction;
pub mod tempo;

pub use fraction::Fraction;
pub use tempo::{duration_to_fraction, fraction_to_duration, whole_note_duration};
