// src/comms/mod.rs - Wire framing and transports for the host link.
//
// The engine emits semantic `Event`s; this module turns them into the byte
// protocol the host visualizer speaks and pushes them out over a serial
// port or stdout. An async drain task owns the receiving end of the event
// channel so a stalled link never touches the stepping loop.
use serial2_tokio::SerialPort;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::events::{Event, InitFrame};

/// Single-byte opcodes of the host protocol. Values below 100 flow from the
/// machine; 100 and up belong to the host-side handshake.
mod wire {
    pub const PUSH_LEFT: u8 = 0;
    pub const PULL_LEFT: u8 = 1;
    pub const PUSH_RIGHT: u8 = 2;
    pub const PULL_RIGHT: u8 = 3;
    pub const WRITING: u8 = 4;
    pub const MOVING: u8 = 5;
    pub const START_MESSAGE: u8 = 6;
    pub const END_MESSAGE: u8 = 7;
    pub const ENABLE_MOTORS: u8 = 8;
    pub const DISABLE_MOTORS: u8 = 9;
    pub const END_DRAWING: u8 = 12;
    pub const WARNING: u8 = 13;
    pub const END_WARNING: u8 = 14;
    pub const ERROR: u8 = 15;
    pub const END_ERROR: u8 = 16;
    pub const START_INSTRUCTIONS: u8 = 101;
    pub const END_INSTRUCTIONS: u8 = 102;
}

/// Frame one event into protocol bytes.
///
/// Step pulses, pen transitions and motor power are bare opcodes; messages,
/// warnings and errors are bracketed blocks; the init frame is one numeric
/// line per field between its brackets.
pub fn encode(event: &Event) -> Vec<u8> {
    match event {
        Event::PushLeft => vec![wire::PUSH_LEFT],
        Event::PullLeft => vec![wire::PULL_LEFT],
        Event::PushRight => vec![wire::PUSH_RIGHT],
        Event::PullRight => vec![wire::PULL_RIGHT],
        Event::PenDown => vec![wire::WRITING],
        Event::PenUp => vec![wire::MOVING],
        Event::MotorsOn => vec![wire::ENABLE_MOTORS],
        Event::MotorsOff => vec![wire::DISABLE_MOTORS],
        Event::DrawingStarted => block(wire::START_MESSAGE, "drawing started", wire::END_MESSAGE),
        Event::DrawingEnded => vec![wire::END_DRAWING],
        Event::Message(text) => block(wire::START_MESSAGE, text, wire::END_MESSAGE),
        Event::Warning { code, detail } => {
            coded_block(wire::WARNING, *code as u8, detail, wire::END_WARNING)
        }
        Event::Error { code, detail } => {
            coded_block(wire::ERROR, *code as u8, detail, wire::END_ERROR)
        }
        Event::Init(frame) => encode_init(frame),
    }
}

fn block(start: u8, text: &str, end: u8) -> Vec<u8> {
    let mut out = vec![start];
    out.extend_from_slice(text.as_bytes());
    out.extend_from_slice(b"\r\n");
    out.push(end);
    out
}

fn coded_block(start: u8, code: u8, text: &str, end: u8) -> Vec<u8> {
    let mut out = vec![start, code];
    out.extend_from_slice(text.as_bytes());
    out.extend_from_slice(b"\r\n");
    out.push(end);
    out
}

fn encode_init(frame: &InitFrame) -> Vec<u8> {
    let mut out = vec![wire::START_INSTRUCTIONS];
    for value in [
        frame.span,
        frame.sheet_position_x,
        frame.sheet_position_y,
        frame.sheet_width,
        frame.sheet_height,
        frame.left_length,
        frame.right_length,
    ] {
        out.extend_from_slice(format!("{}\r\n", value).as_bytes());
    }
    out.extend_from_slice(format!("{:.2}\r\n", frame.step_length_um).as_bytes());
    out.push(wire::END_INSTRUCTIONS);
    out
}

/// Outbound byte sink: real serial link or stdout for simulated jobs.
pub enum WireSink {
    Serial(SerialPort),
    Stdout(tokio::io::Stdout),
}

impl WireSink {
    pub fn serial(path: &str, baud: u32) -> std::io::Result<Self> {
        let port = SerialPort::open(path, baud)?;
        tracing::info!(path, baud, "host link on serial port");
        Ok(Self::Serial(port))
    }

    pub fn stdout() -> Self {
        Self::Stdout(tokio::io::stdout())
    }

    async fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        match self {
            Self::Serial(port) => {
                let mut written = 0;
                while written < bytes.len() {
                    written += port.write(&bytes[written..]).await?;
                }
                Ok(())
            }
            Self::Stdout(out) => {
                out.write_all(bytes).await?;
                out.flush().await
            }
        }
    }
}

/// Drain the event channel into the wire until every sender is gone. Write
/// failures are logged and the event dropped; the channel must keep moving.
pub async fn drain(mut rx: mpsc::Receiver<Event>, mut sink: WireSink) {
    while let Some(event) = rx.recv().await {
        let bytes = encode(&event);
        if let Err(err) = sink.send(&bytes).await {
            tracing::warn!(%err, "host link write failed, event dropped");
        }
    }
    tracing::debug!("event channel closed, host link drain finished");
}
