//! End-to-end playback: a sequence goes through the player onto a timeline,
//! the dispatch loop drains it into a recording sink, and the bytes come out
//! in musical order.

use fermata::event::{MidiSink, SinkError};
use fermata::notify::{Notification, Notifier};
use fermata::player::{Player, PlayerConfig};
use fermata::sequencing::pitch::*;
use fermata::sequencing::Sequence;
use fermata::timeline::{TimeSource, Timeline};
use fermata::timing::Fraction;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
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
struct RecordingSink(Arc<Mutex<Vec<(u8, u8, u8)>>>);

impl RecordingSink {
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

impl MidiSink for RecordingSink {
    fn write_short(&mut self, status: u8, data1: u8, data2: u8) -> Result<(), SinkError> {
        self.0.lock().unwrap().push((status, data1, data2));
        Ok(())
    }
}

// Eighth arpeggio note, chord, rest, closing note:
// at 120 bpm that is 250 + 500 + 500 + 500 = 1750ms of music.
fn phrase() -> Sequence {
    Sequence::builder()
        .velocity(80)
        .note(C4, Fraction::EIGHTH)
        .chord(&[C4, E4, G4], Fraction::QUARTER)
        .rest(Fraction::QUARTER)
        .note(G4, Fraction::QUARTER)
        .build()
}

#[test]
fn test_phrase_plays_in_order_with_correct_bytes() {
    let clock = ManualClock::new();
    let begin = clock.now();
    let timeline = Arc::new(Timeline::with_clock(clock.clone()));
    let (notifier, notifications) = Notifier::new();
    notifier.set_echo(true);
    let notifier = Arc::new(notifier);

    let player = Player::new(
        Arc::clone(&timeline),
        Arc::clone(&notifier),
        PlayerConfig::default(),
        1,
    );
    let end = player.play(&phrase(), 120.0, begin);
    assert_eq!(end, begin + Duration::from_millis(1750));

    let sink = RecordingSink::default();
    let loop_timeline = Arc::clone(&timeline);
    let loop_notifier = Arc::clone(&notifier);
    let mut loop_sink = sink.clone();
    let dispatch =
        thread::spawn(move || loop_timeline.run(&mut loop_sink, &loop_notifier));

    // Everything due at once: submission order must still hold.
    clock.advance(Duration::from_secs(2));
    // 2 writes for the solo notes' on/off each, 3 per chord on/off burst.
    sink.wait_for(2 + 6 + 2);
    timeline.close();
    dispatch.join().unwrap();

    let writes = sink.writes();
    assert_eq!(
        writes,
        vec![
            (0x90, 60, 80), // arpeggio note on
            (0x80, 60, 0),  // arpeggio note off
            (0x90, 60, 80), // chord on burst, low to high in group order
            (0x90, 64, 80),
            (0x90, 67, 80),
            (0x80, 60, 0), // chord off burst
            (0x80, 64, 0),
            (0x80, 67, 0),
            (0x90, 67, 80), // closing note after the rest
            (0x80, 67, 0),
        ]
    );

    // Echo notifications follow dispatch order; the rest echoes too.
    let echoes: Vec<String> = notifications.try_iter().map(|n| n.to_string()).collect();
    assert_eq!(echoes, vec!["8C4", "(C4 E4 G4)", "=", "G4"]);
}

#[test]
fn test_reset_mid_phrase_cuts_playback() {
    let clock = ManualClock::new();
    let begin = clock.now();
    let timeline = Arc::new(Timeline::with_clock(clock.clone()));
    let (notifier, _notifications) = Notifier::new();
    let notifier = Arc::new(notifier);

    let player = Player::new(
        Arc::clone(&timeline),
        Arc::clone(&notifier),
        PlayerConfig::default(),
        1,
    );
    player.play(&phrase(), 120.0, begin);
    assert!(!timeline.is_empty());

    timeline.reset();

    let sink = RecordingSink::default();
    let loop_timeline = Arc::clone(&timeline);
    let loop_notifier = Arc::clone(&notifier);
    let mut loop_sink = sink.clone();
    let dispatch =
        thread::spawn(move || loop_timeline.run(&mut loop_sink, &loop_notifier));

    sink.wait_for(16);
    timeline.close();
    dispatch.join().unwrap();

    // Only the all-notes-off burst reached the sink.
    let writes = sink.writes();
    assert_eq!(writes.len(), 16);
    assert!(writes.iter().all(|w| w.0 & 0xF0 == 0xB0 && w.1 == 123));
}

#[test]
fn test_two_sequences_chained_back_to_back() {
    let clock = ManualClock::new();
    let begin = clock.now();
    let timeline = Arc::new(Timeline::with_clock(clock.clone()));
    let (notifier, _notifications) = Notifier::new();
    let notifier = Arc::new(notifier);

    let player = Player::new(
        Arc::clone(&timeline),
        Arc::clone(&notifier),
        PlayerConfig::default(),
        1,
    );
    let first = Sequence::builder().note(C4, Fraction::QUARTER).build();
    let second = Sequence::builder().note(E4, Fraction::QUARTER).build();

    let middle = player.play(&first, 120.0, begin);
    let end = player.play(&second, 120.0, middle);
    assert_eq!(middle, begin + Duration::from_millis(500));
    assert_eq!(end, begin + Duration::from_millis(1000));

    let sink = RecordingSink::default();
    let loop_timeline = Arc::clone(&timeline);
    let loop_notifier = Arc::clone(&notifier);
    let mut loop_sink = sink.clone();
    let dispatch =
        thread::spawn(move || loop_timeline.run(&mut loop_sink, &loop_notifier));

    clock.advance(Duration::from_secs(2));
    sink.wait_for(4);
    timeline.close();
    dispatch.join().unwrap();

    let pitches: Vec<u8> = sink.writes().iter().map(|w| w.1).collect();
    assert_eq!(pitches, vec![60, 60, 64, 64]);
}
