// src/svg/mod.rs - SVG path front-end.
//
// Not an XML parser: a forward-only byte scanner locates the `<svg` tag, the
// first `<path` tag and every `d="..."` attribute after it, and a small
// machine interprets the path data. This is enough for the plotter's input
// files and never buffers the whole document.
use std::io::Read;
use thiserror::Error;

use crate::clock::Clock;
use crate::events::{DeviceCode, EventSink};
use crate::hardware::PlotterIo;
use crate::motion::Planner;

/// Longest numeric token kept intact; the rest is dropped with a warning.
const MAX_NUMBER_LEN: usize = 32;

/// Longest `<svg ...>` start tag inspected for width/height attributes.
const MAX_TAG_LEN: usize = 4096;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SvgError {
    #[error("svg document ended inside path data")]
    Incomplete,
    #[error("no <svg> start tag found")]
    NotSvg,
    #[error("no <path> element found")]
    NoPathData,
}

impl SvgError {
    pub fn device_code(&self) -> DeviceCode {
        match self {
            SvgError::Incomplete => DeviceCode::SvgIncomplete,
            SvgError::NotSvg => DeviceCode::NotSvgFile,
            SvgError::NoPathData => DeviceCode::NoPathData,
        }
    }
}

/// Interpret an SVG byte stream against the planner.
///
/// The drawing is fitted onto the sheet when the root tag carries usable
/// width/height attributes; every path element after the first is drawn too.
pub fn draw<R, IO, C>(reader: R, planner: &mut Planner<IO, C>) -> Result<(), SvgError>
where
    R: Read,
    IO: PlotterIo,
    C: Clock,
{
    let events = planner.scheduler().events().clone();
    let mut parser = Parser {
        scanner: ByteScanner::new(reader),
        events,
    };

    if !parser.scanner.find(b"<svg") {
        return Err(SvgError::NotSvg);
    }

    let tag = parser.scanner.read_until(b'>', MAX_TAG_LEN);
    let width = attribute(&tag, "width").and_then(parse_length);
    let height = attribute(&tag, "height").and_then(parse_length);
    if let (Some(w), Some(h)) = (width, height) {
        tracing::debug!(w, h, "fitting drawing onto sheet");
        planner.scheduler_mut().fit_drawing(w, h);
    }

    if !parser.scanner.find(b"<path") {
        return Err(SvgError::NoPathData);
    }

    while parser.scanner.find(b"d=\"") {
        parser.draw_path_data(planner)?;
    }
    Ok(())
}

struct Parser<R: Read> {
    scanner: ByteScanner<R>,
    events: EventSink,
}

impl<R: Read> Parser<R> {
    /// One `d` attribute: command letters dispatched until the closing quote.
    fn draw_path_data<IO, C>(&mut self, planner: &mut Planner<IO, C>) -> Result<(), SvgError>
    where
        IO: PlotterIo,
        C: Clock,
    {
        loop {
            let Some(byte) = self.scanner.next_byte() else {
                return Err(SvgError::Incomplete);
            };

            match byte {
                b'"' => return Ok(()),
                b'M' => self.repeat(planner, |p, n| p.move_abs(n[0], n[1]), 2)?,
                b'm' => self.repeat(planner, |p, n| p.move_rel(n[0], n[1]), 2)?,
                b'Z' | b'z' => planner.close_path(),
                b'L' => self.repeat(planner, |p, n| p.line_abs(n[0], n[1]), 2)?,
                b'l' => self.repeat(planner, |p, n| p.line_rel(n[0], n[1]), 2)?,
                b'H' => self.repeat(planner, |p, n| p.horizontal_abs(n[0]), 1)?,
                b'h' => self.repeat(planner, |p, n| p.horizontal_rel(n[0]), 1)?,
                b'V' => self.repeat(planner, |p, n| p.vertical_abs(n[0]), 1)?,
                b'v' => self.repeat(planner, |p, n| p.vertical_rel(n[0]), 1)?,
                b'C' => self.repeat(
                    planner,
                    |p, n| p.cubic_abs(n[0], n[1], n[2], n[3], n[4], n[5]),
                    6,
                )?,
                b'c' => self.repeat(
                    planner,
                    |p, n| p.cubic_rel(n[0], n[1], n[2], n[3], n[4], n[5]),
                    6,
                )?,
                b'S' => self.repeat(planner, |p, n| p.smooth_cubic_abs(n[0], n[1], n[2], n[3]), 4)?,
                b's' => self.repeat(planner, |p, n| p.smooth_cubic_rel(n[0], n[1], n[2], n[3]), 4)?,
                b'Q' => self.repeat(planner, |p, n| p.quadratic_abs(n[0], n[1], n[2], n[3]), 4)?,
                b'q' => self.repeat(planner, |p, n| p.quadratic_rel(n[0], n[1], n[2], n[3]), 4)?,
                b'T' => self.repeat(planner, |p, n| p.smooth_quadratic_abs(n[0], n[1]), 2)?,
                b't' => self.repeat(planner, |p, n| p.smooth_quadratic_rel(n[0], n[1]), 2)?,
                // Elliptical arcs are recognized but not drawn; the
                // parameters are consumed so the rest of the path survives.
                b'A' | b'a' => {
                    self.events.warn(
                        DeviceCode::UnsupportedPathCommand,
                        "elliptical arc command skipped",
                    );
                    self.repeat(planner, |_, _| {}, 7)?;
                }
                _ => {}
            }
        }
    }

    /// Consume coordinate groups while the stream keeps producing numbers:
    /// SVG's implicit-repeat grammar.
    fn repeat<IO, C, F>(
        &mut self,
        planner: &mut Planner<IO, C>,
        op: F,
        arity: usize,
    ) -> Result<(), SvgError>
    where
        IO: PlotterIo,
        C: Clock,
        F: Fn(&mut Planner<IO, C>, &[f64]),
    {
        let mut numbers = [0.0; 7];
        loop {
            for slot in numbers.iter_mut().take(arity) {
                *slot = self.read_number()?;
            }
            op(planner, &numbers[..arity]);

            self.skip_separators();
            match self.scanner.peek() {
                Some(b) if is_numeric_byte(b) => continue,
                _ => return Ok(()),
            }
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.scanner.peek(), Some(b' ' | b',' | b'\t' | b'\r' | b'\n')) {
            self.scanner.next_byte();
        }
    }

    /// Read one bounded numeric token. Unparseable tokens degrade to zero
    /// with a warning so the rest of the path still draws.
    fn read_number(&mut self) -> Result<f64, SvgError> {
        self.skip_separators();

        let mut buf = [0u8; MAX_NUMBER_LEN];
        let mut len = 0;
        let mut truncated = false;

        loop {
            match self.scanner.peek() {
                Some(b) if is_numeric_byte(b) => {
                    self.scanner.next_byte();
                    if len < MAX_NUMBER_LEN {
                        buf[len] = b;
                        len += 1;
                    } else {
                        truncated = true;
                    }
                }
                Some(_) => break,
                None => return Err(SvgError::Incomplete),
            }
        }

        if truncated {
            self.events.warn(
                DeviceCode::MalformedPathData,
                "numeric token truncated in path data",
            );
        }
        if len == 0 {
            self.events
                .warn(DeviceCode::MalformedPathData, "expected a number in path data");
            return Ok(0.0);
        }

        match std::str::from_utf8(&buf[..len]).ok().and_then(|s| s.parse().ok()) {
            Some(value) => Ok(value),
            None => {
                self.events.warn(
                    DeviceCode::MalformedPathData,
                    "unparseable number in path data",
                );
                Ok(0.0)
            }
        }
    }
}

/// The byte classes the path grammar treats as part of a number.
fn is_numeric_byte(byte: u8) -> bool {
    byte.is_ascii_digit() || byte == b'-' || byte == b'.'
}

/// Forward-only reader with one byte of lookahead. A read error is treated
/// as end of data.
struct ByteScanner<R: Read> {
    reader: R,
    peeked: Option<u8>,
}

impl<R: Read> ByteScanner<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            peeked: None,
        }
    }

    fn next_byte(&mut self) -> Option<u8> {
        if let Some(byte) = self.peeked.take() {
            return Some(byte);
        }
        let mut buf = [0u8; 1];
        match self.reader.read(&mut buf) {
            Ok(1) => Some(buf[0]),
            _ => None,
        }
    }

    fn peek(&mut self) -> Option<u8> {
        if self.peeked.is_none() {
            self.peeked = self.next_byte();
        }
        self.peeked
    }

    /// Advance until the byte sequence has been consumed. False at end of
    /// data.
    fn find(&mut self, word: &[u8]) -> bool {
        let mut matched = 0;
        while let Some(byte) = self.next_byte() {
            if byte == word[matched] {
                matched += 1;
                if matched == word.len() {
                    return true;
                }
            } else {
                matched = if byte == word[0] { 1 } else { 0 };
            }
        }
        false
    }

    /// Collect up to `limit` bytes until the terminator (consumed, excluded).
    fn read_until(&mut self, terminator: u8, limit: usize) -> String {
        let mut out = Vec::new();
        while let Some(byte) = self.next_byte() {
            if byte == terminator {
                break;
            }
            if out.len() < limit {
                out.push(byte);
            }
        }
        String::from_utf8_lossy(&out).into_owned()
    }
}

/// Extract `name="value"` from a start tag body.
fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let pattern = format!("{}=\"", name);
    let start = tag.find(&pattern)? + pattern.len();
    let end = tag[start..].find('"')? + start;
    Some(&tag[start..end])
}

/// SVG length with optional unit suffix, converted to user units (px).
fn parse_length(value: &str) -> Option<f64> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit() && c != '.' && c != '-')
        .unwrap_or(value.len());
    let number: f64 = value[..split].parse().ok()?;

    let factor = match value[split..].trim() {
        "" | "px" => 1.0,
        "pt" => 1.25,
        "pc" => 15.0,
        "mm" => 3.543307,
        "cm" => 35.43307,
        "in" => 90.0,
        _ => 1.0,
    };
    Some(number * factor)
}
