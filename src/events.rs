// src/events.rs - Semantic events emitted by the core toward the host.
//
// The engine only emits these; byte framing for the wire lives in `comms`.
// Delivery is fire-and-forget: a slow or disconnected receiver can lose
// visualization data but can never stall the stepping loop.
use tokio::sync::mpsc;

/// Numeric codes shared with the host visualizer.
///
/// Values below 100 are fatal errors; 100 and above are warnings that never
/// abort a drawing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCode {
    // Fatal errors.
    StorageNotFound = 0,
    FileNotFound = 1,
    FileNotReadable = 2,
    TooShortSpan = 3,
    SvgIncomplete = 11,
    NotSvgFile = 12,
    NoPathData = 13,

    // Warnings.
    UnknownSerialCode = 100,
    WrongConfigLine = 101,
    TooLongConfigLine = 102,
    UnknownConfigKey = 103,
    UnknownGcodeFunction = 104,
    UnknownGcodeParameter = 105,
    WrongGcodeParameter = 106,
    UnsupportedPathCommand = 107,
    MalformedPathData = 108,
}

impl DeviceCode {
    pub fn is_fatal(self) -> bool {
        (self as u8) < 100
    }
}

/// Initialization block sent once at startup so the host can mirror the
/// machine geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct InitFrame {
    pub span: u32,
    pub sheet_position_x: u32,
    pub sheet_position_y: u32,
    pub sheet_width: u32,
    pub sheet_height: u32,
    pub left_length: u32,
    pub right_length: u32,
    /// Step length in micrometers (mm x 1000, the resolution the host expects).
    pub step_length_um: f64,
}

/// One discrete notification to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Left cable lengthened by one step.
    PushLeft,
    /// Left cable shortened by one step.
    PullLeft,
    PushRight,
    PullRight,
    PenDown,
    PenUp,
    MotorsOn,
    MotorsOff,
    DrawingStarted,
    DrawingEnded,
    Message(String),
    Warning { code: DeviceCode, detail: String },
    Error { code: DeviceCode, detail: String },
    Init(InitFrame),
}

/// Write-only handle to the host notification channel.
///
/// Cloneable and cheap; `emit` never blocks. When the channel is full or the
/// receiver is gone the event is dropped.
#[derive(Clone)]
pub struct EventSink {
    tx: Option<mpsc::Sender<Event>>,
}

impl EventSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// Sink that discards everything, for jobs without a host link.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: Event) {
        if let Some(tx) = &self.tx {
            if tx.try_send(event).is_err() {
                tracing::trace!("host event dropped (receiver slow or gone)");
            }
        }
    }

    pub fn warn(&self, code: DeviceCode, detail: impl Into<String>) {
        let detail = detail.into();
        tracing::warn!(code = code as u8, "{}", detail);
        self.emit(Event::Warning { code, detail });
    }

    pub fn error(&self, code: DeviceCode, detail: impl Into<String>) {
        let detail = detail.into();
        tracing::error!(code = code as u8, "{}", detail);
        self.emit(Event::Error { code, detail });
    }
}
