//! Input correlation: raw MIDI bytes from a keyboard become notes with
//! measured durations.
//!
//! The correlator pairs each note-on with its matching note-off by pitch and
//! snaps the elapsed wall time to the nearest musical fraction at the current
//! tempo. The listener owns the thread that drains a raw event channel and
//! reports reconstructed notes through the notifier.

use crate::event::{NOTE_OFF, NOTE_ON};
use crate::notify::Notifier;
use crate::sequencing::{Note, NoteDuration};
use crate::timing::duration_to_fraction;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

/// One short message as delivered by the input port callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMidiEvent {
    /// Port-relative timestamp in microseconds.
    pub timestamp_us: u64,
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

#[derive(Debug, Clone, Copy)]
struct OpenNote {
    timestamp_us: u64,
    velocity: u8,
}

/// Pairs note-ons with note-offs and measures what was played.
///
/// State is only the set of currently held pitches, so a stuck or dropped
/// note-off leaks at most one entry per pitch and `clear` recovers.
#[derive(Debug, Default)]
pub struct Correlator {
    open: HashMap<u8, OpenNote>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw event; returns a reconstructed note when this event
    /// closes a held pitch.
    ///
    /// A note-on with velocity zero counts as a note-off, per common MIDI
    /// practice. A duplicate note-on for a held pitch and a note-off for an
    /// unheld pitch are both ignored.
    pub fn handle(&mut self, event: RawMidiEvent, bpm: f64) -> Option<Note> {
        let kind = event.status & 0xF0;
        let pitch = event.data1;
        let is_on = kind == NOTE_ON && event.data2 > 0;
        let is_off = kind == NOTE_OFF || (kind == NOTE_ON && event.data2 == 0);

        if is_on {
            if let Entry::Vacant(slot) = self.open.entry(pitch) {
                slot.insert(OpenNote {
                    timestamp_us: event.timestamp_us,
                    velocity: event.data2,
                });
            }
            return None;
        }
        if !is_off {
            return None;
        }

        let opened = self.open.remove(&pitch)?;
        let elapsed = Duration::from_micros(event.timestamp_us.saturating_sub(opened.timestamp_us));
        let fraction = duration_to_fraction(bpm, elapsed);
        Some(Note {
            pitch,
            velocity: opened.velocity,
            duration: NoteDuration::Fraction(fraction),
        })
    }

    /// Forget all held pitches, e.g. after switching input ports.
    pub fn clear(&mut self) {
        self.open.clear();
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}

/// Thread that correlates an input port's raw events and echoes the result.
pub struct Listener {
    stop: Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Listener {
    /// Spawn the correlation thread. It runs until `stop` is called or the
    /// raw event channel closes.
    pub fn spawn(
        events: Receiver<RawMidiEvent>,
        tempo: Arc<RwLock<f64>>,
        notifier: Arc<Notifier>,
    ) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("midi-listener".into())
            .spawn(move || {
                let mut correlator = Correlator::new();
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(events) -> raw => {
                            let Ok(raw) = raw else { break };
                            let bpm = *tempo.read().unwrap();
                            if let Some(note) = correlator.handle(raw, bpm) {
                                notifier.note_heard(&note.to_string());
                            }
                        }
                    }
                }
            })
            .expect("spawn midi-listener thread");
        Self {
            stop: stop_tx,
            handle: Some(handle),
        }
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.stop.try_send(());
            let _ = handle.join();
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.shutdown();
    }
}
