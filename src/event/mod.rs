//! Schedulable events and their MIDI wire encoding.
//!
//! Every event fires as one or more 3-byte MIDI messages through a
//! [`MidiSink`]. A chord is a single event and fires all its pitches as one
//! burst, so concurrent producers can never interleave half a chord with
//! something else.

use thiserror::Error;

// MIDI voice-message status nibbles.
// https://www.midi.org/specifications-old/item/table-1-summary-of-midi-message
pub const NOTE_ON: u8 = 0x90;
pub const NOTE_OFF: u8 = 0x80;
pub const CONTROL_CHANGE: u8 = 0xB0;

/// Controller number for the all-notes-off channel mode message.
pub const ALL_NOTES_OFF: u8 = 123;
/// Controller number for the sustain pedal (value 127 = down, 0 = up).
pub const SUSTAIN_PEDAL: u8 = 64;

/// Status byte for a message kind on a channel (1-16).
pub const fn channel_status(kind: u8, channel: u8) -> u8 {
    kind | (channel - 1)
}

#[derive(Debug, Error)]
#[error("midi write failed: {0}")]
pub struct SinkError(pub String);

/// Where protocol bytes go. Implemented by `midir::MidiOutputConnection` in
/// the device layer and by recording fakes in tests.
///
/// The timeline dispatch loop is the only caller during playback; producers
/// never write directly.
pub trait MidiSink: Send {
    fn write_short(&mut self, status: u8, data1: u8, data2: u8) -> Result<(), SinkError>;
}

/// An event the timeline can fire.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEvent {
    /// One or more simultaneous pitches, on or off.
    Notes {
        pitches: Vec<u8>,
        /// Output channel (1-16)
        channel: u8,
        velocity: u8,
        on: bool,
        /// Console literal; echoed on note-on only.
        echo: String,
    },
    /// Silence; produces no bytes, only an echo.
    Rest { echo: String },
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
}

impl TimelineEvent {
    /// The note-off counterpart of a note-on event.
    pub fn as_note_off(&self) -> TimelineEvent {
        match self {
            TimelineEvent::Notes {
                pitches,
                channel,
                velocity,
                ..
            } => TimelineEvent::Notes {
                pitches: pitches.clone(),
                channel: *channel,
                velocity: *velocity,
                on: false,
                echo: String::new(),
            },
            other => other.clone(),
        }
    }

    /// All-notes-off for one channel, used by the reset silence burst.
    pub fn all_notes_off(channel: u8) -> TimelineEvent {
        TimelineEvent::ControlChange {
            channel,
            controller: ALL_NOTES_OFF,
            value: 0,
        }
    }

    /// Write the event's protocol bytes; returns the echo text to surface, if
    /// any.
    pub fn fire(&self, sink: &mut dyn MidiSink) -> Result<Option<&str>, SinkError> {
        match self {
            TimelineEvent::Notes {
                pitches,
                channel,
                velocity,
                on,
                echo,
            } => {
                let status = channel_status(if *on { NOTE_ON } else { NOTE_OFF }, *channel);
                for &pitch in pitches {
                    // note-off always carries velocity 0
                    let data2 = if *on { *velocity } else { 0 };
                    sink.write_short(status, pitch, data2)?;
                }
                Ok(if *on { Some(echo) } else { None })
            }
            TimelineEvent::Rest { echo } => Ok(Some(echo)),
            TimelineEvent::ControlChange {
                channel,
                controller,
                value,
            } => {
                sink.write_short(channel_status(CONTROL_CHANGE, *channel), *controller, *value)?;
                Ok(None)
            }
        }
    }
}
