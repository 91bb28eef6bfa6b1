// src/gcode/mod.rs - Line-oriented G-code interpreter.
//
// Forward-only: every line is consumed once, interpreted, and forgotten. A
// read failure is treated as end of data. Any malformed instruction is
// reported as a warning and skipped; a job never aborts on bad G-code.
use std::io::BufRead;

use crate::clock::Clock;
use crate::config::DrawingConfig;
use crate::events::{DeviceCode, Event, EventSink};
use crate::hardware::PlotterIo;
use crate::motion::Planner;

const MM_PER_INCH: f64 = 25.4;

/// Interpreter state that persists for a whole job and resets from the
/// configured defaults at job start.
pub struct GcodeInterpreter {
    metric: bool,
    absolute: bool,
    display_comments: bool,
}

/// Axis words parsed from one instruction line.
#[derive(Debug, Default, Clone, Copy)]
struct Words {
    x: Option<f64>,
    y: Option<f64>,
    p: Option<f64>,
}

impl GcodeInterpreter {
    pub fn new(drawing: &DrawingConfig) -> Self {
        Self {
            metric: drawing.metric_unit,
            absolute: drawing.absolute_position,
            display_comments: drawing.display_comments,
        }
    }

    /// Interpret an instruction stream against the planner. Returns when the
    /// stream ends, a read fails, or an `M02` end-of-program is reached.
    pub fn run<R, IO, C>(&mut self, reader: R, planner: &mut Planner<IO, C>)
    where
        R: BufRead,
        IO: PlotterIo,
        C: Clock,
    {
        let events = planner.scheduler().events().clone();

        for line in reader.lines() {
            let Ok(line) = line else {
                tracing::debug!("instruction stream read failed, treating as end of data");
                break;
            };
            if !self.process_line(&line, planner, &events) {
                break;
            }
        }
    }

    /// Interpret one line; returns false on end-of-program.
    fn process_line<IO, C>(
        &mut self,
        line: &str,
        planner: &mut Planner<IO, C>,
        events: &EventSink,
    ) -> bool
    where
        IO: PlotterIo,
        C: Clock,
    {
        let line = match line.split_once(';') {
            Some((code, comment)) => {
                if self.display_comments && !comment.trim().is_empty() {
                    events.emit(Event::Message(comment.trim().to_string()));
                }
                code
            }
            None => line,
        };

        let mut tokens = line.split_whitespace();
        let Some(opcode) = tokens.next() else {
            return true; // blank line
        };

        let Some((letter, number)) = parse_word(opcode) else {
            events.warn(
                DeviceCode::UnknownGcodeFunction,
                format!("unparseable instruction '{}'", opcode),
            );
            return true;
        };

        let words = self.parse_words(tokens, events);

        match (letter, number as u32) {
            ('G', 0) => {
                let (x, y) = self.target(words, planner);
                planner.move_abs(x, y);
            }
            ('G', 1) => {
                let (x, y) = self.target(words, planner);
                planner.line_abs(x, y);
            }
            ('G', 4) => {
                let seconds = words.p.unwrap_or(0.0).max(0.0);
                tracing::debug!(seconds, "dwell");
                planner.scheduler().clock().sleep_ms((seconds * 1000.0) as u64);
            }
            ('G', 20) => self.metric = false,
            ('G', 21) => self.metric = true,
            ('G', 90) => self.absolute = true,
            ('G', 91) => self.absolute = false,
            ('M', 2) => return false,
            _ => {
                events.warn(
                    DeviceCode::UnknownGcodeFunction,
                    format!("unknown instruction '{}'", opcode),
                );
            }
        }
        true
    }

    fn parse_words<'a>(
        &self,
        tokens: impl Iterator<Item = &'a str>,
        events: &EventSink,
    ) -> Words {
        let mut words = Words::default();

        for token in tokens {
            let Some((letter, value)) = parse_word(token) else {
                events.warn(
                    DeviceCode::WrongGcodeParameter,
                    format!("bad parameter '{}'", token),
                );
                continue;
            };
            match letter {
                'X' => words.x = Some(self.to_mm(value)),
                'Y' => words.y = Some(self.to_mm(value)),
                // The pen axis has no depth control on this machine.
                'Z' => {}
                'P' => words.p = Some(value),
                _ => {
                    events.warn(
                        DeviceCode::UnknownGcodeParameter,
                        format!("unknown parameter '{}'", token),
                    );
                }
            }
        }
        words
    }

    fn to_mm(&self, value: f64) -> f64 {
        if self.metric { value } else { value * MM_PER_INCH }
    }

    /// Resolve the axis words into an absolute drawing-space target. A
    /// missing word leaves that axis where it is.
    fn target<IO, C>(&self, words: Words, planner: &Planner<IO, C>) -> (f64, f64)
    where
        IO: PlotterIo,
        C: Clock,
    {
        let (cx, cy) = planner.position();
        if self.absolute {
            (words.x.unwrap_or(cx), words.y.unwrap_or(cy))
        } else {
            (cx + words.x.unwrap_or(0.0), cy + words.y.unwrap_or(0.0))
        }
    }
}

/// Split a token like `G01` or `X-12.5` into its letter and numeric value.
fn parse_word(token: &str) -> Option<(char, f64)> {
    let mut chars = token.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    if !letter.is_ascii_alphabetic() {
        return None;
    }
    let value: f64 = chars.as_str().parse().ok()?;
    Some((letter, value))
}
