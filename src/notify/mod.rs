//! Discrete text notifications for the console/UI layer.
//!
//! Scheduling failures, device warnings, and note echoes are delivered as
//! messages over a channel rather than as errors unwinding a call stack, so
//! any front end can render them without touching the playback path.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Info(String),
    Warning(String),
    Error(String),
    /// Outbound echo: the literal of a note the engine just sent.
    NotePlayed(String),
    /// Inbound echo: the literal reconstructed from what the player played.
    NoteHeard(String),
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::Info(msg) => write!(f, "info: {msg}"),
            Notification::Warning(msg) => write!(f, "warning: {msg}"),
            Notification::Error(msg) => write!(f, "error: {msg}"),
            Notification::NotePlayed(echo) => write!(f, "{echo}"),
            Notification::NoteHeard(echo) => write!(f, " {echo}"),
        }
    }
}

/// Sending half of the notification stream, shared by the dispatch loop, the
/// playback translator, and the input listener.
///
/// Outbound note echoes are gated by a toggle; everything else always goes
/// through. A dropped receiver silently discards messages — the engine never
/// depends on anyone listening.
#[derive(Debug)]
pub struct Notifier {
    sender: Sender<Notification>,
    echo_enabled: AtomicBool,
}

impl Notifier {
    pub fn new() -> (Notifier, Receiver<Notification>) {
        let (sender, receiver) = unbounded();
        let notifier = Notifier {
            sender,
            echo_enabled: AtomicBool::new(false),
        };
        (notifier, receiver)
    }

    pub fn info(&self, msg: impl Into<String>) {
        let _ = self.sender.send(Notification::Info(msg.into()));
    }

    pub fn warning(&self, msg: impl Into<String>) {
        let _ = self.sender.send(Notification::Warning(msg.into()));
    }

    pub fn error(&self, msg: impl Into<String>) {
        let _ = self.sender.send(Notification::Error(msg.into()));
    }

    /// Outbound echo; dropped unless echoing is enabled.
    pub fn note_played(&self, echo: &str) {
        if self.echo_enabled() {
            let _ = self.sender.send(Notification::NotePlayed(echo.to_owned()));
        }
    }

    /// Inbound echo from the listener; always delivered.
    pub fn note_heard(&self, echo: &str) {
        let _ = self.sender.send(Notification::NoteHeard(echo.to_owned()));
    }

    pub fn echo_enabled(&self) -> bool {
        self.echo_enabled.load(Ordering::Relaxed)
    }

    pub fn set_echo(&self, enabled: bool) {
        self.echo_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Flips the outbound echo toggle and returns the new state.
    pub fn toggle_echo(&self) -> bool {
        !self.echo_enabled.fetch_xor(true, Ordering::Relaxed)
    }
}
