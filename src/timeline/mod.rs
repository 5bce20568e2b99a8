/*
Timeline scheduler
==================

A time-ordered event dispatcher: producers schedule events tagged with an
absolute fire time from any thread, one long-lived consumer runs the dispatch
loop and is the single writer to the MIDI sink.

Concurrency discipline (the whole reason this type exists):
- the pending set is the only shared structure, guarded by one mutex;
- `schedule` and `reset` mutate it and return, they never wait on the loop;
- the loop sleeps on a condvar for min(time-to-next-event, check interval),
  so a newly inserted earlier event wakes it immediately and nothing spins;
- equal fire times dispatch in submission order via a monotone sequence
  number in the ordering key.

A write failure during dispatch drops that one event and keeps the loop
alive — retrying is unsafe for time-sensitive note-offs, which could
otherwise stick.
*/

use crate::event::{MidiSink, TimelineEvent};
use crate::notify::Notifier;
use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Upper bound on one dispatch wait. Keeps the loop responsive to `close`
/// even when the next event is far away.
const CHECK_INTERVAL: Duration = Duration::from_millis(25);

/// Clock abstraction so dispatch order is testable against a fake clock.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// The real clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("timeline is closed")]
    Closed,
}

struct Pending {
    /// Keyed by (fire time, submission sequence): BTreeMap iteration order is
    /// exactly dispatch order.
    events: BTreeMap<(Instant, u64), TimelineEvent>,
    next_seq: u64,
    closed: bool,
}

/// One per open output device; create with [`Timeline::new`], hand the sink to
/// [`Timeline::run`] on a dedicated thread, schedule from anywhere.
pub struct Timeline {
    pending: Mutex<Pending>,
    wakeup: Condvar,
    clock: Arc<dyn TimeSource>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn TimeSource>) -> Self {
        Self {
            pending: Mutex::new(Pending {
                events: BTreeMap::new(),
                next_seq: 0,
                closed: false,
            }),
            wakeup: Condvar::new(),
            clock,
        }
    }

    /// Insert an event to fire at `fire_at`. A fire time in the past is fine:
    /// the event fires on the next loop pass — callers rely on this for
    /// near-immediate events.
    pub fn schedule(
        &self,
        event: TimelineEvent,
        fire_at: Instant,
    ) -> Result<(), ScheduleError> {
        let mut pending = self.pending.lock().unwrap();
        if pending.closed {
            return Err(ScheduleError::Closed);
        }
        let seq = pending.next_seq;
        pending.next_seq += 1;
        pending.events.insert((fire_at, seq), event);
        self.wakeup.notify_one();
        Ok(())
    }

    /// Number of not-yet-fired events.
    pub fn len(&self) -> usize {
        self.pending.lock().unwrap().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard every pending event unfired, then schedule the silence burst:
    /// all-notes-off on all 16 channels at "now". The burst goes through the
    /// queue so the dispatch loop stays the only writer to the sink.
    pub fn reset(&self) {
        let mut pending = self.pending.lock().unwrap();
        pending.events.clear();
        if pending.closed {
            return;
        }
        let now = self.clock.now();
        for channel in 1..=16u8 {
            let seq = pending.next_seq;
            pending.next_seq += 1;
            pending
                .events
                .insert((now, seq), TimelineEvent::all_notes_off(channel));
        }
        self.wakeup.notify_one();
    }

    /// Stop the dispatch loop; subsequent `schedule` calls fail. Idempotent.
    pub fn close(&self) {
        let mut pending = self.pending.lock().unwrap();
        pending.closed = true;
        pending.events.clear();
        self.wakeup.notify_all();
    }

    /// The dispatch loop. Blocking; run on a dedicated thread for the
    /// lifetime of the device. `sink` is owned here — nothing else writes.
    pub fn run(&self, sink: &mut dyn MidiSink, notifier: &Notifier) {
        let mut pending = self.pending.lock().unwrap();
        loop {
            if pending.closed {
                return;
            }
            let now = self.clock.now();
            let next = pending.events.iter().next().map(|(&key, _)| key);
            match next {
                Some(key) if key.0 <= now => {
                    let event = pending
                        .events
                        .remove(&key)
                        .expect("key observed under the same lock");
                    // fire outside the lock so producers never wait on I/O
                    drop(pending);
                    match event.fire(sink) {
                        Ok(Some(echo)) => notifier.note_played(echo),
                        Ok(None) => {}
                        Err(err) => {
                            log::warn!("event dropped after write failure: {err}");
                            notifier.warning(format!("{err}"));
                        }
                    }
                    pending = self.pending.lock().unwrap();
                }
                Some((fire_at, _)) => {
                    let wait = (fire_at - now).min(CHECK_INTERVAL);
                    pending = self.wakeup.wait_timeout(pending, wait).unwrap().0;
                }
                None => {
                    pending = self
                        .wakeup
                        .wait_timeout(pending, CHECK_INTERVAL)
                        .unwrap()
                        .0;
                }
            }
        }
    }

    /// Pending events in dispatch order, for inspection by in-crate tests.
    #[doc(hidden)]
    pub fn pending_snapshot(&self) -> Vec<(Instant, TimelineEvent)> {
        self.pending
            .lock()
            .unwrap()
            .events
            .iter()
            .map(|(&(fire_at, _), event)| (fire_at, event.clone()))
            .collect()
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SinkError;
    use crate::notify::Notification;
    use std::sync::Mutex as StdMutex;
    use std::thread;

    /// A clock that only moves when told to.
    struct ManualClock {
        origin: Instant,
        offset: StdMutex<Duration>,
    }

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                origin: Instant::now(),
                offset: StdMutex::new(Duration::ZERO),
            })
        }

        fn advance(&self, by: Duration) {
            *self.offset.lock().unwrap() += by;
        }
    }

    impl TimeSource for ManualClock {
        fn now(&self) -> Instant {
            self.origin + *self.offset.lock().unwrap()
        }
    }

    #[derive(Clone, Default)]
    struct SharedSink(Arc<StdMutex<Vec<(u8, u8, u8)>>>);

    impl SharedSink {
        fn writes(&self) -> Vec<(u8, u8, u8)> {
            self.0.lock().unwrap().clone()
        }

        fn wait_for(&self, count: usize) {
            let deadline = Instant::now() + Duration::from_secs(2);
            while self.0.lock().unwrap().len() < count {
                assert!(Instant::now() < deadline, "timed out waiting for writes");
                thread::sleep(Duration::from_millis(2));
            }
        }
    }

    impl MidiSink for SharedSink {
        fn write_short(&mut self, status: u8, data1: u8, data2: u8) -> Result<(), SinkError> {
            self.0.lock().unwrap().push((status, data1, data2));
            Ok(())
        }
    }

    fn note_on(pitch: u8) -> TimelineEvent {
        TimelineEvent::Notes {
            pitches: vec![pitch],
            channel: 1,
            velocity: 80,
            on: true,
            echo: String::new(),
        }
    }

    fn run_until(timeline: Arc<Timeline>, sink: SharedSink, writes: usize) -> Vec<(u8, u8, u8)> {
        let (notifier, _receiver) = Notifier::new();
        let loop_timeline = Arc::clone(&timeline);
        let mut loop_sink = sink.clone();
        let handle = thread::spawn(move || loop_timeline.run(&mut loop_sink, &notifier));
        sink.wait_for(writes);
        timeline.close();
        handle.join().unwrap();
        sink.writes()
    }

    #[test]
    fn test_fires_in_fire_time_order() {
        let clock = ManualClock::new();
        let base = clock.now();
        let timeline = Arc::new(Timeline::with_clock(clock.clone()));

        // Inserted out of order on purpose
        timeline
            .schedule(note_on(64), base + Duration::from_millis(20))
            .unwrap();
        timeline
            .schedule(note_on(60), base + Duration::from_millis(5))
            .unwrap();
        timeline
            .schedule(note_on(67), base + Duration::from_millis(40))
            .unwrap();

        clock.advance(Duration::from_millis(100));
        let writes = run_until(timeline, SharedSink::default(), 3);
        let pitches: Vec<u8> = writes.iter().map(|w| w.1).collect();
        assert_eq!(pitches, vec![60, 64, 67]);
    }

    #[test]
    fn test_equal_fire_times_keep_submission_order() {
        let clock = ManualClock::new();
        let at = clock.now();
        let timeline = Arc::new(Timeline::with_clock(clock.clone()));

        for pitch in [71, 60, 67] {
            timeline.schedule(note_on(pitch), at).unwrap();
        }

        let writes = run_until(timeline, SharedSink::default(), 3);
        let pitches: Vec<u8> = writes.iter().map(|w| w.1).collect();
        assert_eq!(pitches, vec![71, 60, 67]);
    }

    #[test]
    fn test_past_fire_time_is_accepted() {
        let clock = ManualClock::new();
        let timeline = Arc::new(Timeline::with_clock(clock.clone()));
        clock.advance(Duration::from_secs(10));

        let long_ago = clock.now() - Duration::from_secs(5);
        timeline.schedule(note_on(60), long_ago).unwrap();

        let writes = run_until(timeline, SharedSink::default(), 1);
        assert_eq!(writes.len(), 1);
    }

    #[test]
    fn test_reset_discards_pending_and_emits_silence() {
        let clock = ManualClock::new();
        let timeline = Arc::new(Timeline::with_clock(clock.clone()));

        timeline
            .schedule(note_on(60), clock.now() + Duration::from_secs(60))
            .unwrap();
        timeline.reset();

        let writes = run_until(timeline, SharedSink::default(), 16);
        assert_eq!(writes.len(), 16, "only the silence burst, no note");
        for (channel, write) in (1..=16u8).zip(&writes) {
            assert_eq!(*write, (0xB0 | (channel - 1), 123, 0));
        }
    }

    #[test]
    fn test_reset_on_empty_timeline_is_quiet() {
        let clock = ManualClock::new();
        let timeline = Arc::new(Timeline::with_clock(clock.clone()));
        let sink = SharedSink::default();

        let (notifier, receiver) = Notifier::new();
        notifier.set_echo(true);
        timeline.reset();

        let loop_timeline = Arc::clone(&timeline);
        let mut loop_sink = sink.clone();
        let handle = thread::spawn(move || loop_timeline.run(&mut loop_sink, &notifier));
        sink.wait_for(16);
        timeline.close();
        handle.join().unwrap();

        // The silence burst went out, but produced no echo or warning
        assert_eq!(sink.writes().len(), 16);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_schedule_after_close_fails() {
        let timeline = Timeline::new();
        timeline.close();
        assert_eq!(
            timeline.schedule(note_on(60), Instant::now()),
            Err(ScheduleError::Closed)
        );
    }

    #[test]
    fn test_write_failure_does_not_stop_dispatch() {
        struct FlakySink {
            failures_left: u32,
            good: Vec<(u8, u8, u8)>,
        }

        impl MidiSink for FlakySink {
            fn write_short(&mut self, status: u8, data1: u8, data2: u8) -> Result<(), SinkError> {
                if self.failures_left > 0 {
                    self.failures_left -= 1;
                    return Err(SinkError("transient".into()));
                }
                self.good.push((status, data1, data2));
                Ok(())
            }
        }

        let clock = ManualClock::new();
        let at = clock.now();
        let timeline = Arc::new(Timeline::with_clock(clock.clone()));
        timeline.schedule(note_on(60), at).unwrap();
        timeline.schedule(note_on(64), at).unwrap();

        let (notifier, receiver) = Notifier::new();
        let mut sink = FlakySink {
            failures_left: 1,
            good: Vec::new(),
        };
        let loop_timeline = Arc::clone(&timeline);
        let handle = thread::spawn(move || {
            loop_timeline.run(&mut sink, &notifier);
            sink.good
        });

        let deadline = Instant::now() + Duration::from_secs(2);
        while timeline.len() > 0 {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(2));
        }
        timeline.close();
        let good = handle.join().unwrap();

        // First event dropped with a warning, second still went out
        assert_eq!(good, vec![(0x90, 64, 80)]);
        assert!(matches!(
            receiver.try_recv(),
            Ok(Notification::Warning(_))
        ));
    }

    #[test]
    fn test_waiting_loop_wakes_for_earlier_insertion() {
        let timeline = Arc::new(Timeline::new());
        let sink = SharedSink::default();

        // Real clock: a far-future event parks the loop, then a due event
        // must still come out promptly.
        timeline
            .schedule(note_on(64), Instant::now() + Duration::from_secs(60))
            .unwrap();

        let (notifier, _receiver) = Notifier::new();
        let loop_timeline = Arc::clone(&timeline);
        let mut loop_sink = sink.clone();
        let handle = thread::spawn(move || loop_timeline.run(&mut loop_sink, &notifier));

        thread::sleep(Duration::from_millis(20));
        timeline.schedule(note_on(60), Instant::now()).unwrap();
        sink.wait_for(1);
        timeline.close();
        handle.join().unwrap();

        assert_eq!(sink.writes()[0].1, 60);
    }
}
