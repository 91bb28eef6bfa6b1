// src/motion/scheduler.rs - Dual-axis step scheduler.
//
// One move = one blocking run of the timed stepping loop. The two motor
// channels step at independent rates chosen so both finish together; the
// path between endpoints is therefore not a Cartesian straight line, which
// is why the planner bounds segment length before calling in.
use crate::clock::Clock;
use crate::config::Config;
use crate::events::{Event, EventSink, InitFrame};
use crate::hardware::{Axis, PlotterIo};
use crate::motion::kinematics::{DrawingTransform, Kinematics, SheetGeometry};
use crate::pen::{PenActuator, PenState};

/// Authoritative physical state: both cable lengths in steps. Always equals
/// the kinematics of the current position under the current transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CableLengths {
    pub left: u64,
    pub right: u64,
}

pub struct MotionScheduler<IO, C> {
    io: IO,
    clock: C,
    events: EventSink,
    kinematics: Kinematics,
    transform: DrawingTransform,
    pen: PenActuator,
    /// Current position in drawing space (pre-transform).
    position: (f64, f64),
    lengths: CableLengths,
    base_delay_us: f64,
    left_pull_level: bool,
    right_pull_level: bool,
}

impl<IO: PlotterIo, C: Clock> MotionScheduler<IO, C> {
    pub fn new(io: IO, clock: C, config: &Config, events: EventSink) -> Self {
        let geometry = SheetGeometry::new(&config.sheet);
        let kinematics = Kinematics::new(geometry, &config.motors);
        let transform = DrawingTransform::new(
            config.drawing.scale_x,
            config.drawing.scale_y,
            config.drawing.offset_x,
            config.drawing.offset_y,
        );

        let position = geometry.named_position(config.drawing.default_position);
        let (sx, sy) = transform.apply(position.0, position.1);
        let lengths = CableLengths {
            left: kinematics.left_steps(sx, sy),
            right: kinematics.right_steps(sx, sy),
        };

        let mut scheduler = Self {
            io,
            clock,
            events,
            kinematics,
            transform,
            pen: PenActuator::new(&config.pen),
            position,
            lengths,
            base_delay_us: 0.0,
            left_pull_level: config.motors.left_direction,
            right_pull_level: config.motors.right_direction,
        };
        scheduler.set_speed(config.drawing.default_speed);
        scheduler
    }

    pub fn position(&self) -> (f64, f64) {
        self.position
    }

    pub fn lengths(&self) -> CableLengths {
        self.lengths
    }

    pub fn kinematics(&self) -> &Kinematics {
        &self.kinematics
    }

    pub fn pen_state(&self) -> PenState {
        self.pen.state()
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn io(&self) -> &IO {
        &self.io
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Cable speed of the faster axis, in mm/s.
    pub fn set_speed(&mut self, speed: f64) {
        self.base_delay_us = 1_000_000.0 * self.kinematics.step_length() / speed;
    }

    pub fn set_pen(&mut self, state: PenState) {
        self.pen
            .set(state, &mut self.io, &self.clock, &self.events);
    }

    /// Drive the servo to the up angle regardless of tracked state.
    pub fn initialize_pen(&mut self) {
        self.pen
            .initialize(&mut self.io, &self.clock, &self.events);
    }

    /// De-powering lifts the pen first so it cannot rest on the sheet.
    pub fn set_motor_power(&mut self, on: bool) {
        if !on {
            self.set_pen(PenState::Up);
        }
        self.io.set_motor_power(on);
        self.events.emit(if on {
            Event::MotorsOn
        } else {
            Event::MotorsOff
        });
    }

    pub fn reset_job_transform(&mut self) {
        self.transform.reset_job();
    }

    /// Fit the current job's drawing extent onto the sheet.
    pub fn fit_drawing(&mut self, width: f64, height: f64) {
        let geometry = *self.kinematics.geometry();
        self.transform.fit(&geometry, width, height);
    }

    /// Startup frame for the host visualizer.
    pub fn init_frame(&self) -> InitFrame {
        let geometry = self.kinematics.geometry();
        InitFrame {
            span: geometry.span as u32,
            sheet_position_x: geometry.sheet_position_x as u32,
            sheet_position_y: geometry.sheet_position_y as u32,
            sheet_width: geometry.sheet_width as u32,
            sheet_height: geometry.sheet_height as u32,
            left_length: self.lengths.left as u32,
            right_length: self.lengths.right as u32,
            step_length_um: self.kinematics.step_length() * 1000.0,
        }
    }

    /// Execute one point-to-point move in drawing space.
    ///
    /// Sets the pen, computes signed step deltas for both cables, then runs
    /// the dual-channel timed loop until both deltas are spent. A move to the
    /// current position only touches pen state.
    pub fn move_to(&mut self, x: f64, y: f64, pen_down: bool) {
        self.set_pen(if pen_down { PenState::Down } else { PenState::Up });

        let (sx, sy) = self.transform.apply(x, y);
        let target = CableLengths {
            left: self.kinematics.left_steps(sx, sy),
            right: self.kinematics.right_steps(sx, sy),
        };

        let delta_left = target.left as i64 - self.lengths.left as i64;
        let delta_right = target.right as i64 - self.lengths.right as i64;

        // Negative delta shortens the cable: pull.
        let pull_left = delta_left < 0;
        let pull_right = delta_right < 0;
        let mut remaining_left = delta_left.unsigned_abs();
        let mut remaining_right = delta_right.unsigned_abs();

        let (delay_left, delay_right) =
            axis_delays(remaining_left, remaining_right, self.base_delay_us);

        self.io.set_direction(
            Axis::Left,
            if pull_left {
                self.left_pull_level
            } else {
                !self.left_pull_level
            },
        );
        self.io.set_direction(
            Axis::Right,
            if pull_right {
                self.right_pull_level
            } else {
                !self.right_pull_level
            },
        );

        let mut last_left = self.clock.now_micros();
        let mut last_right = last_left;

        while remaining_left > 0 || remaining_right > 0 {
            let now = self.clock.now_micros();

            if remaining_left > 0 && (now - last_left) as f64 >= delay_left {
                last_left = now;
                self.fire(Axis::Left, pull_left);
                remaining_left -= 1;
            }

            if remaining_right > 0 && (now - last_right) as f64 >= delay_right {
                last_right = now;
                self.fire(Axis::Right, pull_right);
                remaining_right -= 1;
            }
        }

        self.position = (x, y);
        self.lengths = target;
    }

    fn fire(&mut self, axis: Axis, pull: bool) {
        self.io.step(axis);
        self.events.emit(match (axis, pull) {
            (Axis::Left, true) => Event::PullLeft,
            (Axis::Left, false) => Event::PushLeft,
            (Axis::Right, true) => Event::PullRight,
            (Axis::Right, false) => Event::PushRight,
        });
    }
}

/// Per-axis step intervals: the axis with more steps runs at the base delay,
/// the other is stretched by the count ratio so both finish together. An
/// idle axis never gets a ratio computed; its delay is never read.
fn axis_delays(left_count: u64, right_count: u64, base_delay_us: f64) -> (f64, f64) {
    if left_count > right_count {
        let right = if right_count == 0 {
            0.0
        } else {
            base_delay_us * left_count as f64 / right_count as f64
        };
        (base_delay_us, right)
    } else {
        let left = if left_count == 0 {
            0.0
        } else {
            base_delay_us * right_count as f64 / left_count as f64
        };
        (left, base_delay_us)
    }
}
