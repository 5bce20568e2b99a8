pub mod device;
pub mod event;
pub mod listen;
pub mod notify;
pub mod player;
pub mod sequencing; // Musical data model produced by the DSL layer
pub mod timeline;
pub mod timing; // Fraction <-> wall-clock calculus

/// MIDI output channel used when a sequence does not pick its own.
pub const DEFAULT_CHANNEL: u8 = 1;
