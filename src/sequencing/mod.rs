/*
Sequencing data model
=====================

What the DSL/eval layer hands to the playback translator: an ordered list of
note groups. A group is either one-or-more simultaneous notes (a chord, sharing
the first note's duration and velocity), a rest, or a sustain-pedal marker that
consumes no musical time.

The model carries no wall-clock times. Durations are musical fractions (or an
explicit fixed hold), and the translator turns them into scheduled instants at
a given tempo.

Echo text: `Display` on notes and groups produces the literal a live-coding
console prints back, e.g. "8C#3" for an eighth C#3, "(C4 E4 G4)" for a chord,
"2=" for a half rest.
*/

pub mod pitch;

use crate::timing::Fraction;
use std::fmt;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Velocity used when the DSL does not say otherwise, and the substitute for
/// under-range velocities after the global offset is applied.
pub const NORMAL_VELOCITY: u8 = 72;

/// How long a note sounds: a musical fraction, or an explicit wall-clock hold
/// that ignores the tempo.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteDuration {
    Fraction(Fraction),
    Fixed(Duration),
}

/// A single pitched note.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    /// MIDI note number (0-127)
    pub pitch: u8,
    /// MIDI velocity (1-127)
    pub velocity: u8,
    pub duration: NoteDuration,
}

impl Note {
    pub fn new(pitch: u8, duration: Fraction) -> Self {
        Self {
            pitch,
            velocity: NORMAL_VELOCITY,
            duration: NoteDuration::Fraction(duration),
        }
    }

    /// A note held for an explicit wall-clock duration.
    pub fn held(pitch: u8, length: Duration) -> Self {
        Self {
            pitch,
            velocity: NORMAL_VELOCITY,
            duration: NoteDuration::Fixed(length),
        }
    }

    pub fn with_velocity(mut self, velocity: u8) -> Self {
        self.velocity = velocity;
        self
    }
}

/// Sustain pedal position.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pedal {
    Down,
    Up,
}

/// One step of a sequence.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Group {
    /// Simultaneous notes; the first one carries the group's duration and
    /// velocity.
    Notes(Vec<Note>),
    /// Silence for the given duration.
    Rest { duration: NoteDuration },
    /// Pedal change; occupies no musical time.
    Pedal(Pedal),
}

/// An ordered run of note groups, optionally pinned to an output channel.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sequence {
    pub groups: Vec<Group>,
    /// Preferred output channel (1-16); `None` means the device default.
    pub channel: Option<u8>,
}

impl Sequence {
    pub fn builder() -> SequenceBuilder {
        SequenceBuilder::default()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Builder for constructing sequences with a fluent API
#[derive(Debug, Default)]
pub struct SequenceBuilder {
    groups: Vec<Group>,
    channel: Option<u8>,
    velocity: u8,
}

impl SequenceBuilder {
    /// Pin the sequence to an output channel (1-16).
    pub fn channel(mut self, channel: u8) -> Self {
        debug_assert!((1..=16).contains(&channel), "channel must be in [1..16]");
        self.channel = Some(channel);
        self
    }

    /// Default velocity for notes added after this call.
    pub fn velocity(mut self, velocity: u8) -> Self {
        self.velocity = velocity;
        self
    }

    /// Add a single note with the specified duration
    pub fn note(mut self, pitch: u8, duration: Fraction) -> Self {
        let velocity = self.current_velocity();
        self.groups
            .push(Group::Notes(vec![Note::new(pitch, duration).with_velocity(velocity)]));
        self
    }

    /// Add a note held for an explicit wall-clock duration
    pub fn held_note(mut self, pitch: u8, length: Duration) -> Self {
        let velocity = self.current_velocity();
        self.groups
            .push(Group::Notes(vec![Note::held(pitch, length).with_velocity(velocity)]));
        self
    }

    /// Add a chord; every pitch sounds for the same duration at the same
    /// velocity.
    pub fn chord(mut self, pitches: &[u8], duration: Fraction) -> Self {
        let velocity = self.current_velocity();
        let notes = pitches
            .iter()
            .map(|&pitch| Note::new(pitch, duration).with_velocity(velocity))
            .collect();
        self.groups.push(Group::Notes(notes));
        self
    }

    /// Add a rest (silence) with the specified duration
    pub fn rest(mut self, duration: Fraction) -> Self {
        self.groups.push(Group::Rest {
            duration: NoteDuration::Fraction(duration),
        });
        self
    }

    pub fn pedal_down(mut self) -> Self {
        self.groups.push(Group::Pedal(Pedal::Down));
        self
    }

    pub fn pedal_up(mut self) -> Self {
        self.groups.push(Group::Pedal(Pedal::Up));
        self
    }

    pub fn build(self) -> Sequence {
        Sequence {
            groups: self.groups,
            channel: self.channel,
        }
    }

    fn current_velocity(&self) -> u8 {
        if self.velocity == 0 {
            NORMAL_VELOCITY
        } else {
            self.velocity
        }
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.duration {
            NoteDuration::Fraction(fraction) => {
                write!(f, "{fraction}{}", pitch::note_name(self.pitch))
            }
            NoteDuration::Fixed(length) => {
                write!(f, "{}[{}ms]", pitch::note_name(self.pitch), length.as_millis())
            }
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Group::Notes(notes) if notes.len() == 1 => notes[0].fmt(f),
            Group::Notes(notes) => {
                write!(f, "(")?;
                for (i, note) in notes.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    note.fmt(f)?;
                }
                write!(f, ")")
            }
            Group::Rest { duration } => match duration {
                NoteDuration::Fraction(fraction) => write!(f, "{fraction}="),
                NoteDuration::Fixed(length) => write!(f, "=[{}ms]", length.as_millis()),
            },
            Group::Pedal(Pedal::Down) => write!(f, ">"),
            Group::Pedal(Pedal::Up) => write!(f, "<"),
        }
    }
}
