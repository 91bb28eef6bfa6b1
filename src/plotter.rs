// src/plotter.rs - Job orchestration: startup sequence, drawing-file
// dispatch and the terminal sequences.
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use thiserror::Error;

use crate::clock::Clock;
use crate::config::{Config, ConfigError};
use crate::events::{DeviceCode, Event, EventSink};
use crate::gcode::GcodeInterpreter;
use crate::hardware::PlotterIo;
use crate::motion::{MotionScheduler, Planner};
use crate::svg::{self, SvgError};

#[derive(Debug, Error)]
pub enum PlotterError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot open drawing file {path}: {source}")]
    FileNotFound {
        path: String,
        source: std::io::Error,
    },
    #[error("drawing file {path}: {source}")]
    Svg { path: String, source: SvgError },
}

impl PlotterError {
    pub fn device_code(&self) -> DeviceCode {
        match self {
            PlotterError::Config(err) => err.device_code(),
            PlotterError::FileNotFound { .. } => DeviceCode::FileNotFound,
            PlotterError::Svg { source, .. } => source.device_code(),
        }
    }
}

pub struct Plotter<IO, C> {
    planner: Planner<IO, C>,
    config: Config,
}

impl<IO: PlotterIo, C: Clock> Plotter<IO, C> {
    /// Validate the geometry, bring the machine up and tell the host about
    /// it: init frame, motor power, initial settle delay, servo to a known
    /// state.
    pub fn new(io: IO, clock: C, config: Config, events: EventSink) -> Result<Self, PlotterError> {
        config.validate()?;

        let scheduler = MotionScheduler::new(io, clock, &config, events);
        tracing::info!(
            position = ?scheduler.position(),
            left = scheduler.lengths().left,
            right = scheduler.lengths().right,
            "plotter initialized"
        );

        scheduler.events().emit(Event::Init(scheduler.init_frame()));

        let mut plotter = Self {
            planner: Planner::new(scheduler),
            config,
        };

        let scheduler = plotter.planner.scheduler_mut();
        scheduler.set_motor_power(true);
        scheduler.clock().sleep_ms(plotter.config.drawing.initial_delay_ms);
        scheduler.initialize_pen();

        Ok(plotter)
    }

    pub fn planner(&self) -> &Planner<IO, C> {
        &self.planner
    }

    pub fn planner_mut(&mut self) -> &mut Planner<IO, C> {
        &mut self.planner
    }

    /// Draw one file, dispatched on its extension: `.svg` goes to the SVG
    /// front-end, everything else is read as an instruction stream.
    pub fn draw_file(&mut self, path: &str) -> Result<(), PlotterError> {
        tracing::info!(path, "drawing");
        let events = self.planner.scheduler().events().clone();
        events.emit(Event::DrawingStarted);

        self.planner.begin_job();

        let file = File::open(path).map_err(|source| PlotterError::FileNotFound {
            path: path.to_string(),
            source,
        })?;
        let reader = BufReader::new(file);

        let is_svg = Path::new(path)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"));

        if is_svg {
            svg::draw(reader, &mut self.planner).map_err(|source| PlotterError::Svg {
                path: path.to_string(),
                source,
            })?;
        } else {
            let mut interpreter = GcodeInterpreter::new(&self.config.drawing);
            interpreter.run(reader, &mut self.planner);
        }

        self.planner.pen_up();
        events.emit(Event::DrawingEnded);
        Ok(())
    }

    /// Normal completion: park at the configured end position, de-power.
    pub fn end(&mut self) {
        let geometry = *self.planner.scheduler().kinematics().geometry();
        let (x, y) = geometry.named_position(self.config.drawing.end_position);
        self.planner.move_abs(x, y);
        self.planner.scheduler_mut().set_motor_power(false);
        tracing::info!("plotter parked");
    }

    /// Fatal error sequence: notify the host, give it a moment to settle,
    /// lift the pen and de-power. The caller terminates the process.
    pub fn fail(&mut self, error: &PlotterError) {
        let events = self.planner.scheduler().events().clone();
        events.error(error.device_code(), error.to_string());
        self.planner.scheduler().clock().sleep_ms(1000);
        self.planner.scheduler_mut().set_motor_power(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimClock;
    use crate::config::NamedPosition;
    use crate::hardware::SimulatorIo;
    use crate::pen::PenState;
    use std::io::Write;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.drawing.offset_x = 0.0;
        config.drawing.offset_y = 0.0;
        config.drawing.initial_delay_ms = 0;
        config.drawing.default_position = NamedPosition::UpperLeft;
        config
    }

    fn test_plotter(config: Config) -> Plotter<SimulatorIo, SimClock> {
        Plotter::new(
            SimulatorIo::new(),
            SimClock::new(1),
            config,
            EventSink::disabled(),
        )
        .unwrap()
    }

    #[test]
    fn short_span_is_fatal_at_startup() {
        let mut config = test_config();
        config.sheet.span = 700;
        match Plotter::new(
            SimulatorIo::new(),
            SimClock::new(1),
            config,
            EventSink::disabled(),
        ) {
            Err(err) => assert_eq!(err.device_code(), DeviceCode::TooShortSpan),
            Ok(_) => panic!("short span must fail startup"),
        }
    }

    #[test]
    fn startup_powers_motors_and_emits_init() {
        let (sink, mut rx) = EventSink::channel(16);
        let plotter =
            Plotter::new(SimulatorIo::new(), SimClock::new(1), test_config(), sink).unwrap();
        assert!(plotter.planner().scheduler().io().powered);

        match rx.try_recv().unwrap() {
            Event::Init(frame) => {
                assert_eq!(frame.span, 1000);
                assert_eq!(frame.sheet_width, 650);
                assert!((frame.step_length_um - 34.38).abs() < 0.01);
            }
            other => panic!("expected init frame, got {:?}", other),
        }
        assert_eq!(rx.try_recv().unwrap(), Event::MotorsOn);
        assert_eq!(rx.try_recv().unwrap(), Event::PenUp);
    }

    #[test]
    fn startup_drives_the_servo_to_the_up_angle() {
        let plotter = test_plotter(test_config());
        let io = plotter.planner().scheduler().io();
        // The physical pen may have been left down; startup must write the
        // up angle even though the tracked state already says Up.
        assert!(io.pen_writes >= 1);
        assert_eq!(io.pen_angle, 50);
        assert_eq!(plotter.planner().scheduler().pen_state(), PenState::Up);
    }

    #[test]
    fn draws_a_gcode_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "G01 X10 Y10").unwrap();
        writeln!(file, "G01 X20 Y10").unwrap();
        file.flush().unwrap();

        let mut plotter = test_plotter(test_config());
        plotter
            .draw_file(file.path().to_str().unwrap())
            .unwrap();
        assert_eq!(plotter.planner().position(), (20.0, 10.0));
    }

    #[test]
    fn dispatches_svg_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drawing.svg");
        std::fs::write(&path, r#"<svg><path d="M 5 5 L 9 5"/></svg>"#).unwrap();

        let mut plotter = test_plotter(test_config());
        plotter.draw_file(path.to_str().unwrap()).unwrap();
        assert_eq!(plotter.planner().position(), (9.0, 5.0));
    }

    #[test]
    fn missing_file_maps_to_device_code() {
        let mut plotter = test_plotter(test_config());
        let err = plotter.draw_file("/no/such/file.ngc").unwrap_err();
        assert_eq!(err.device_code(), DeviceCode::FileNotFound);
    }

    #[test]
    fn end_parks_at_configured_position() {
        let mut config = test_config();
        config.drawing.end_position = NamedPosition::LowerCenter;
        let mut plotter = test_plotter(config);
        plotter.end();
        assert_eq!(plotter.planner().position(), (325.0, 500.0));
        assert!(!plotter.planner().scheduler().io().powered);
        assert_eq!(plotter.planner().scheduler().pen_state(), PenState::Up);
    }

    #[test]
    fn fail_lifts_pen_and_depowers() {
        let mut plotter = test_plotter(test_config());
        plotter.planner_mut().scheduler_mut().set_pen(PenState::Down);

        let err = PlotterError::FileNotFound {
            path: "x".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        plotter.fail(&err);
        assert_eq!(plotter.planner().scheduler().pen_state(), PenState::Up);
        assert!(!plotter.planner().scheduler().io().powered);
    }
}
