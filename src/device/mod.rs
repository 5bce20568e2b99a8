//! The hardware edge: real MIDI ports via midir, the dispatch thread that
//! owns the output connection, and the text command surface for switching
//! ports, channels and echo at a live session.

use crate::event::{MidiSink, SinkError};
use crate::listen::{Listener, RawMidiEvent};
use crate::notify::{Notification, Notifier};
use crate::player::{Player, PlayerConfig};
use crate::sequencing::Sequence;
use crate::timeline::Timeline;
use crate::DEFAULT_CHANNEL;
use crossbeam_channel::unbounded;
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

const CLIENT_NAME: &str = "fermata";

/// Deadline for the silence burst to drain before a connection is torn down.
const DRAIN_DEADLINE: Duration = Duration::from_millis(250);

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no MIDI output port available")]
    NoOutputPort,
    #[error("no MIDI port with id {0}")]
    UnknownPort(usize),
    #[error("MIDI backend failure: {0}")]
    Backend(String),
}

fn backend(err: impl fmt::Display) -> DeviceError {
    DeviceError::Backend(err.to_string())
}

/// A real output connection is a sink: one short message per write.
impl MidiSink for MidiOutputConnection {
    fn write_short(&mut self, status: u8, data1: u8, data2: u8) -> Result<(), SinkError> {
        self.send(&[status, data1, data2])
            .map_err(|err| SinkError(err.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

/// One enumerated port, as shown to the user by the `in`/`out` commands.
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub id: usize,
    pub name: String,
    pub direction: PortDirection,
}

impl fmt::Display for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.direction {
            PortDirection::Input => "in",
            PortDirection::Output => "out",
        };
        write!(f, "[{}] {} ({})", self.id, self.name, direction)
    }
}

/// Enumerate the system's MIDI ports, outputs first.
pub fn list_ports() -> Result<Vec<PortInfo>, DeviceError> {
    let mut ports = Vec::new();
    let output = MidiOutput::new(CLIENT_NAME).map_err(backend)?;
    for (id, port) in output.ports().iter().enumerate() {
        ports.push(PortInfo {
            id,
            name: output.port_name(port).map_err(backend)?,
            direction: PortDirection::Output,
        });
    }
    let input = MidiInput::new(CLIENT_NAME).map_err(backend)?;
    for (id, port) in input.ports().iter().enumerate() {
        ports.push(PortInfo {
            id,
            name: input.port_name(port).map_err(backend)?,
            direction: PortDirection::Input,
        });
    }
    Ok(ports)
}

struct InputSide {
    name: String,
    listener: Listener,
    // kept alive for the duration of listening; dropping it closes the port
    _connection: MidiInputConnection<()>,
}

/// One open MIDI device: an output connection fed by a dedicated dispatch
/// thread, and optionally an input connection feeding the listener.
///
/// All playback for this device goes through one [`Timeline`], so the
/// dispatch thread is the only writer to the output port.
pub struct MidiDevice {
    timeline: Arc<Timeline>,
    dispatch: Option<thread::JoinHandle<()>>,
    notifier: Arc<Notifier>,
    tempo: Arc<RwLock<f64>>,
    config: PlayerConfig,
    default_channel: u8,
    output_name: String,
    input: Option<InputSide>,
}

impl MidiDevice {
    /// Open the first available output port and start its dispatch thread.
    pub fn open(notifier: Arc<Notifier>) -> Result<Self, DeviceError> {
        let output = MidiOutput::new(CLIENT_NAME).map_err(backend)?;
        let ports = output.ports();
        let port = ports.first().ok_or(DeviceError::NoOutputPort)?;
        let output_name = output.port_name(port).map_err(backend)?;
        let connection = output.connect(port, CLIENT_NAME).map_err(backend)?;

        let timeline = Arc::new(Timeline::new());
        let dispatch = spawn_dispatch(Arc::clone(&timeline), connection, Arc::clone(&notifier));
        log::info!("opened MIDI output \"{output_name}\"");

        Ok(Self {
            timeline,
            dispatch: Some(dispatch),
            notifier,
            tempo: Arc::new(RwLock::new(120.0)),
            config: PlayerConfig::default(),
            default_channel: DEFAULT_CHANNEL,
            output_name,
            input: None,
        })
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    pub fn config_mut(&mut self) -> &mut PlayerConfig {
        &mut self.config
    }

    /// Schedule a sequence at `bpm`, starting at `begin_at`; returns the end
    /// time of the last note so callers can chain playback.
    pub fn play(&self, sequence: &Sequence, bpm: f64, begin_at: Instant) -> Instant {
        *self.tempo.write().unwrap() = bpm;
        let player = Player::new(
            Arc::clone(&self.timeline),
            Arc::clone(&self.notifier),
            self.config,
            self.default_channel,
        );
        player.play(sequence, bpm, begin_at)
    }

    /// Drop everything pending and silence all channels.
    pub fn reset(&self) {
        self.timeline.reset();
    }

    /// Switch to the output port with the given id. Pending events on the old
    /// port are discarded and the old port is silenced before close.
    pub fn set_output(&mut self, id: usize) -> Result<(), DeviceError> {
        let output = MidiOutput::new(CLIENT_NAME).map_err(backend)?;
        let ports = output.ports();
        let port = ports.get(id).ok_or(DeviceError::UnknownPort(id))?;
        let name = output.port_name(port).map_err(backend)?;
        let connection = output.connect(port, CLIENT_NAME).map_err(backend)?;

        self.stop_dispatch();
        self.timeline = Arc::new(Timeline::new());
        self.dispatch = Some(spawn_dispatch(
            Arc::clone(&self.timeline),
            connection,
            Arc::clone(&self.notifier),
        ));
        log::info!("switched MIDI output to \"{name}\"");
        self.output_name = name;
        Ok(())
    }

    /// Start listening on the input port with the given id, replacing any
    /// previous input. Raw short messages flow through a channel into the
    /// listener thread, which correlates them at the current tempo.
    pub fn set_input(&mut self, id: usize) -> Result<(), DeviceError> {
        let mut input = MidiInput::new(CLIENT_NAME).map_err(backend)?;
        input.ignore(Ignore::None);
        let ports = input.ports();
        let port = ports.get(id).ok_or(DeviceError::UnknownPort(id))?;
        let name = input.port_name(port).map_err(backend)?;

        let (raw_tx, raw_rx) = unbounded::<RawMidiEvent>();
        let connection = input
            .connect(
                port,
                CLIENT_NAME,
                move |timestamp_us, message, _| {
                    if let [status, data1, data2] = *message {
                        let _ = raw_tx.send(RawMidiEvent {
                            timestamp_us,
                            status,
                            data1,
                            data2,
                        });
                    }
                },
                (),
            )
            .map_err(backend)?;

        let listener = Listener::spawn(
            raw_rx,
            Arc::clone(&self.tempo),
            Arc::clone(&self.notifier),
        );
        log::info!("listening on MIDI input \"{name}\"");
        self.input = Some(InputSide {
            name,
            listener,
            _connection: connection,
        });
        Ok(())
    }

    /// Silence the device and stop both threads. Idempotent.
    pub fn close(&mut self) {
        if let Some(input) = self.input.take() {
            // dropping the connection stops the callback before the listener
            drop(input._connection);
            input.listener.stop();
        }
        self.stop_dispatch();
    }

    fn stop_dispatch(&mut self) {
        if let Some(handle) = self.dispatch.take() {
            self.timeline.reset();
            wait_until_drained(&self.timeline, DRAIN_DEADLINE);
            self.timeline.close();
            let _ = handle.join();
        }
    }

    /// The `:m` command surface. Always answers with a notification; state
    /// changes also log.
    pub fn command(&mut self, args: &[&str]) -> Notification {
        match args {
            [] => Notification::Info(self.status_text()),
            ["echo"] => {
                let enabled = self.notifier.toggle_echo();
                Notification::Info(format!("echo notes is {enabled}"))
            }
            ["channel"] => Notification::Error("missing channel number".into()),
            ["channel", arg] => match parse_channel(arg) {
                Ok(channel) => {
                    self.default_channel = channel;
                    Notification::Info(format!("default channel is {channel}"))
                }
                Err(msg) => Notification::Error(msg),
            },
            ["in", arg] => match parse_port_id(arg) {
                Ok(id) => match self.set_input(id) {
                    Ok(()) => Notification::Info(format!(
                        "listening on \"{}\"",
                        self.input.as_ref().map(|i| i.name.as_str()).unwrap_or("")
                    )),
                    Err(err) => Notification::Error(err.to_string()),
                },
                Err(msg) => Notification::Error(msg),
            },
            ["out", arg] => match parse_port_id(arg) {
                Ok(id) => match self.set_output(id) {
                    Ok(()) => Notification::Info(format!("playing on \"{}\"", self.output_name)),
                    Err(err) => Notification::Error(err.to_string()),
                },
                Err(msg) => Notification::Error(msg),
            },
            ["reset"] => {
                self.reset();
                Notification::Info("all channels silenced".into())
            }
            _ => Notification::Warning(format!("unknown device command: {}", args.join(" "))),
        }
    }

    fn status_text(&self) -> String {
        let mut text = format!(
            "output \"{}\", channel {}, echo {}",
            self.output_name,
            self.default_channel,
            self.notifier.echo_enabled()
        );
        if let Some(input) = &self.input {
            text.push_str(&format!(", input \"{}\"", input.name));
        }
        match list_ports() {
            Ok(ports) => {
                for port in ports {
                    text.push_str(&format!("\n{port}"));
                }
            }
            Err(err) => log::warn!("port enumeration failed: {err}"),
        }
        text
    }
}

impl Drop for MidiDevice {
    fn drop(&mut self) {
        self.close();
    }
}

fn spawn_dispatch(
    timeline: Arc<Timeline>,
    mut connection: MidiOutputConnection,
    notifier: Arc<Notifier>,
) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("midi-dispatch".into())
        .spawn(move || timeline.run(&mut connection, &notifier))
        .expect("spawn midi-dispatch thread")
}

/// Block until the timeline has dispatched everything pending, or the
/// deadline passes. Close must not race the reset silence burst, so this
/// polls instead of sleeping a fixed grace period.
fn wait_until_drained(timeline: &Timeline, deadline: Duration) {
    let give_up = Instant::now() + deadline;
    while !timeline.is_empty() && Instant::now() < give_up {
        thread::sleep(Duration::from_millis(2));
    }
}

fn parse_channel(arg: &str) -> Result<u8, String> {
    match arg.parse::<u8>() {
        Ok(channel @ 1..=16) => Ok(channel),
        Ok(other) => Err(format!("channel must be in 1..16, got {other}")),
        Err(_) => Err(format!("not a channel number: {arg}")),
    }
}

fn parse_port_id(arg: &str) -> Result<usize, String> {
    arg.parse::<usize>()
        .map_err(|_| format!("not a port id: {arg}"))
}
