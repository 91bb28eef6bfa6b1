// src/hardware/mod.rs - Peripheral port for the plotter.
//
// The core never touches pins directly; everything physical goes through
// `PlotterIo`. Direction polarity is resolved by the caller, so `set_direction`
// receives the level to drive on the DIR line, exactly as the firmware would.

/// The two stepper channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Left,
    Right,
}

/// Narrow hardware interface: two step/dir motor channels, a motor power
/// line and the pen servo.
pub trait PlotterIo: Send {
    /// Drive the DIR line of one motor channel.
    fn set_direction(&mut self, axis: Axis, level: bool);

    /// Emit one step pulse on a motor channel.
    fn step(&mut self, axis: Axis);

    /// Power or de-power both motors.
    fn set_motor_power(&mut self, on: bool);

    /// Move the pen servo to the given angle in degrees.
    fn set_pen_angle(&mut self, angle: u16);
}

/// Backend that records what the core asked for, used for simulated jobs
/// and tests. Real machine backends implement `PlotterIo` out of crate.
#[derive(Debug, Default)]
pub struct SimulatorIo {
    pub steps_left: u64,
    pub steps_right: u64,
    pub dir_left: bool,
    pub dir_right: bool,
    pub powered: bool,
    pub pen_angle: u16,
    pub pen_writes: u64,
}

impl SimulatorIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_steps(&self) -> u64 {
        self.steps_left + self.steps_right
    }
}

impl PlotterIo for SimulatorIo {
    fn set_direction(&mut self, axis: Axis, level: bool) {
        match axis {
            Axis::Left => self.dir_left = level,
            Axis::Right => self.dir_right = level,
        }
    }

    fn step(&mut self, axis: Axis) {
        match axis {
            Axis::Left => self.steps_left += 1,
            Axis::Right => self.steps_right += 1,
        }
    }

    fn set_motor_power(&mut self, on: bool) {
        self.powered = on;
    }

    fn set_pen_angle(&mut self, angle: u16) {
        self.pen_angle = angle;
        self.pen_writes += 1;
    }
}
