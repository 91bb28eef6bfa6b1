// src/pen.rs - Pen servo actuator.
//
// Raising and lowering the pen is slow compared to stepping, so both
// transitions settle twice: once before the servo write so the carriage is
// still, once after so ink does not smear on the first step. Redundant
// requests are ignored to keep those delays off the hot path.
use crate::clock::Clock;
use crate::config::PenConfig;
use crate::events::{Event, EventSink};
use crate::hardware::PlotterIo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenState {
    Up,
    Down,
}

pub struct PenActuator {
    state: PenState,
    down_angle: u16,
    up_angle: u16,
    pre_delay_ms: u64,
    post_delay_ms: u64,
}

impl PenActuator {
    /// Starts in the `Up` state; the servo itself is not driven until the
    /// first transition.
    pub fn new(config: &PenConfig) -> Self {
        Self {
            state: PenState::Up,
            down_angle: config.min_servo_angle,
            up_angle: config.max_servo_angle,
            pre_delay_ms: config.pre_servo_delay_ms,
            post_delay_ms: config.post_servo_delay_ms,
        }
    }

    pub fn state(&self) -> PenState {
        self.state
    }

    /// Startup write: drive the servo to the up angle unconditionally. The
    /// carriage may have been left with the pen resting on the sheet, so the
    /// usual no-op shortcut must not apply here.
    pub fn initialize<IO: PlotterIo, C: Clock>(
        &mut self,
        io: &mut IO,
        clock: &C,
        events: &EventSink,
    ) {
        self.state = PenState::Down;
        self.set(PenState::Up, io, clock, events);
    }

    pub fn set<IO: PlotterIo, C: Clock>(
        &mut self,
        target: PenState,
        io: &mut IO,
        clock: &C,
        events: &EventSink,
    ) {
        if self.state == target {
            return;
        }

        clock.sleep_ms(self.pre_delay_ms);
        let angle = match target {
            PenState::Down => self.down_angle,
            PenState::Up => self.up_angle,
        };
        io.set_pen_angle(angle);
        clock.sleep_ms(self.post_delay_ms);

        self.state = target;
        events.emit(match target {
            PenState::Down => Event::PenDown,
            PenState::Up => Event::PenUp,
        });
    }
}
