//! Playback translation: a musical sequence plus a tempo and a start instant
//! become note-on/note-off pairs on the timeline.
//!
//! The translator walks the sequence's groups with a running cursor. Chords
//! become one combined event (first note carries duration and velocity),
//! rests occupy time without producing bytes, pedal changes fire at the
//! cursor without consuming any. A schedule failure is a warning, not an
//! abort: the remaining groups still play.

use crate::event::{TimelineEvent, SUSTAIN_PEDAL};
use crate::notify::Notifier;
use crate::sequencing::{Group, Note, NoteDuration, Pedal, Sequence, NORMAL_VELOCITY};
use crate::timeline::Timeline;
use crate::timing::whole_note_duration;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Session-scoped playback adjustments, passed in explicitly so multiple
/// devices (and tests) run independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerConfig {
    /// Added to every note's velocity before clamping to [1, 127].
    pub velocity_offset: i16,
    /// Humanization shift applied to every note-on, in milliseconds.
    pub note_on_shift_ms: i64,
    /// Humanization shift applied to every note-off, in milliseconds.
    pub note_off_shift_ms: i64,
}

/// Translates sequences into scheduled timeline events.
pub struct Player {
    timeline: Arc<Timeline>,
    notifier: Arc<Notifier>,
    config: PlayerConfig,
    default_channel: u8,
}

impl Player {
    pub fn new(
        timeline: Arc<Timeline>,
        notifier: Arc<Notifier>,
        config: PlayerConfig,
        default_channel: u8,
    ) -> Self {
        Self {
            timeline,
            notifier,
            config,
            default_channel,
        }
    }

    /// Schedule the whole sequence starting at `begin_at`; returns the end
    /// time of the last event so callers can chain playback.
    ///
    /// The tempo is fixed for the duration of this call.
    pub fn play(&self, sequence: &Sequence, bpm: f64, begin_at: Instant) -> Instant {
        let channel = sequence.channel.unwrap_or(self.default_channel);
        let whole = whole_note_duration(bpm);
        let mut moment = begin_at;

        for group in &sequence.groups {
            match group {
                Group::Pedal(pedal) => {
                    let value = match pedal {
                        Pedal::Down => 127,
                        Pedal::Up => 0,
                    };
                    self.schedule(
                        TimelineEvent::ControlChange {
                            channel,
                            controller: SUSTAIN_PEDAL,
                            value,
                        },
                        moment,
                    );
                    // pedal changes consume no musical time
                }
                Group::Rest { duration } => {
                    self.schedule(
                        TimelineEvent::Rest {
                            echo: group.to_string(),
                        },
                        moment,
                    );
                    moment += nominal_duration(duration, whole);
                }
                Group::Notes(notes) => {
                    let Some(first) = notes.first() else {
                        continue;
                    };
                    let nominal = nominal_duration(&first.duration, whole);
                    let event = self.combined_event(channel, notes, group.to_string());
                    let off = event.as_note_off();
                    self.schedule(event, shift(moment, self.config.note_on_shift_ms));
                    moment += nominal;
                    self.schedule(off, shift(moment, self.config.note_off_shift_ms));
                }
            }
        }
        moment
    }

    /// One event for the whole group; the first note decides velocity.
    fn combined_event(&self, channel: u8, notes: &[Note], echo: String) -> TimelineEvent {
        let mut velocity = notes[0].velocity as i16 + self.config.velocity_offset;
        if velocity > 127 {
            velocity = 127;
        }
        let velocity = if velocity < 1 {
            NORMAL_VELOCITY
        } else {
            velocity as u8
        };
        TimelineEvent::Notes {
            pitches: notes.iter().map(|note| note.pitch).collect(),
            channel,
            velocity,
            on: true,
            echo,
        }
    }

    fn schedule(&self, event: TimelineEvent, fire_at: Instant) {
        if let Err(err) = self.timeline.schedule(event, fire_at) {
            log::warn!("schedule failed: {err}");
            self.notifier.warning(format!("schedule failed: {err}"));
        }
    }
}

/// Wall-clock length of one group: fraction at the session tempo, unless the
/// note declares a fixed hold.
fn nominal_duration(duration: &NoteDuration, whole: Duration) -> Duration {
    match duration {
        NoteDuration::Fraction(fraction) => whole.mul_f64(fraction.factor()),
        NoteDuration::Fixed(fixed) => *fixed,
    }
}

fn shift(moment: Instant, millis: i64) -> Instant {
    if millis >= 0 {
        moment + Duration::from_millis(millis as u64)
    } else {
        moment
            .checked_sub(Duration::from_millis(millis.unsigned_abs()))
            .unwrap_or(moment)
    }
}
