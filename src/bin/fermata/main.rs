//! fermata - play a short demo phrase on the first MIDI output port
//!
//! Run with: cargo run
//!
//! Connect a software synth (or hardware) to the first output port first;
//! notes played on a connected input port are echoed back as note literals.

use fermata::device::{list_ports, MidiDevice};
use fermata::notify::Notifier;
use fermata::sequencing::pitch::*;
use fermata::sequencing::Sequence;
use fermata::timing::Fraction;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    env_logger::init();

    for port in list_ports()? {
        println!("{port}");
    }

    let (notifier, notifications) = Notifier::new();
    notifier.set_echo(true);
    let notifier = Arc::new(notifier);

    let printer = thread::spawn(move || {
        for notification in notifications {
            println!("{notification}");
        }
    });

    let mut device = MidiDevice::open(Arc::clone(&notifier))?;
    println!("playing on \"{}\"", device.output_name());

    let phrase = demo_phrase();
    let begin = Instant::now();
    let end = device.play(&phrase, 120.0, begin);

    thread::sleep(end.saturating_duration_since(Instant::now()) + Duration::from_millis(200));

    device.close();
    drop(device);
    drop(notifier);
    printer.join().ok();
    Ok(())
}

/// Arpeggio up, chord, and a resolving cadence.
fn demo_phrase() -> Sequence {
    Sequence::builder()
        .velocity(80)
        .note(C4, Fraction::EIGHTH)
        .note(E4, Fraction::EIGHTH)
        .note(G4, Fraction::EIGHTH)
        .note(C5, Fraction::EIGHTH)
        .chord(&[C4, E4, G4], Fraction::QUARTER)
        .rest(Fraction::EIGHTH)
        .pedal_down()
        .note(F4, Fraction::QUARTER.dotted())
        .note(D4, Fraction::EIGHTH)
        .pedal_up()
        .chord(&[C4, G4, C5], Fraction::HALF)
        .build()
}
