// tests/drawing_jobs.rs - End-to-end drawing jobs through the public API,
// running against the simulated backend and clock.
use std::io::Write;

use cabledraw::clock::SimClock;
use cabledraw::config::{Config, NamedPosition};
use cabledraw::events::{DeviceCode, Event, EventSink};
use cabledraw::hardware::SimulatorIo;
use cabledraw::plotter::Plotter;

fn test_config() -> Config {
    let mut config = Config::default();
    config.drawing.offset_x = 0.0;
    config.drawing.offset_y = 0.0;
    config.drawing.initial_delay_ms = 0;
    config.drawing.default_position = NamedPosition::Center;
    config.drawing.end_position = NamedPosition::Center;
    config
}

fn drain(rx: &mut tokio::sync::mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn gcode_job_end_to_end() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "G00 X100 Y100").unwrap();
    writeln!(file, "G01 X110 Y100 ; first stroke").unwrap();
    writeln!(file, "G91").unwrap();
    writeln!(file, "G01 X0 Y10").unwrap();
    writeln!(file, "M02").unwrap();
    file.flush().unwrap();

    let (sink, mut rx) = EventSink::channel(1 << 20);
    let mut plotter =
        Plotter::new(SimulatorIo::new(), SimClock::new(1), test_config(), sink).unwrap();

    plotter.draw_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(plotter.planner().position(), (110.0, 110.0));

    plotter.end();
    // Parked at the configured end position, de-powered.
    assert_eq!(plotter.planner().position(), (325.0, 250.0));
    assert!(!plotter.planner().scheduler().io().powered);

    let events = drain(&mut rx);
    assert!(matches!(events[0], Event::Init(_)));
    assert_eq!(events[1], Event::MotorsOn);
    assert!(events.contains(&Event::DrawingStarted));
    assert!(events.contains(&Event::PenDown));
    assert!(events.contains(&Event::DrawingEnded));
    assert_eq!(*events.last().unwrap(), Event::MotorsOff);
}

#[test]
fn svg_job_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("square.svg");
    std::fs::write(
        &path,
        r#"<svg width="650" height="500">
  <path d="M 100 100 h 20 v 20 h -20 z"/>
</svg>"#,
    )
    .unwrap();

    let mut plotter = Plotter::new(
        SimulatorIo::new(),
        SimClock::new(1),
        test_config(),
        EventSink::disabled(),
    )
    .unwrap();

    plotter.draw_file(path.to_str().unwrap()).unwrap();
    assert_eq!(plotter.planner().position(), (100.0, 100.0));
    assert!(plotter.planner().scheduler().io().total_steps() > 0);
}

#[test]
fn invalid_svg_runs_the_fatal_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.svg");
    std::fs::write(&path, "<html>not a drawing</html>").unwrap();

    let (sink, mut rx) = EventSink::channel(1 << 16);
    let mut plotter =
        Plotter::new(SimulatorIo::new(), SimClock::new(1), test_config(), sink).unwrap();

    let err = plotter.draw_file(path.to_str().unwrap()).unwrap_err();
    assert_eq!(err.device_code(), DeviceCode::NotSvgFile);
    plotter.fail(&err);

    assert!(!plotter.planner().scheduler().io().powered);
    let events = drain(&mut rx);
    assert!(events.iter().any(|event| matches!(
        event,
        Event::Error {
            code: DeviceCode::NotSvgFile,
            ..
        }
    )));
}

#[test]
fn warnings_never_abort_a_job() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "G42 X1").unwrap(); // unknown function
    writeln!(file, "G01 Xbroken Y50").unwrap(); // bad parameter
    writeln!(file, "G01 X50 Y50").unwrap();
    file.flush().unwrap();

    let (sink, mut rx) = EventSink::channel(1 << 20);
    let mut plotter =
        Plotter::new(SimulatorIo::new(), SimClock::new(1), test_config(), sink).unwrap();

    plotter.draw_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(plotter.planner().position(), (50.0, 50.0));

    let events = drain(&mut rx);
    let warnings: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            Event::Warning { code, .. } => Some(*code),
            _ => None,
        })
        .collect();
    assert!(warnings.contains(&DeviceCode::UnknownGcodeFunction));
    assert!(warnings.contains(&DeviceCode::WrongGcodeParameter));
    assert!(events.contains(&Event::DrawingEnded));
}

#[test]
fn legacy_and_toml_configs_agree() {
    let dir = tempfile::tempdir().unwrap();

    let legacy_path = dir.path().join("plotter.conf");
    std::fs::write(
        &legacy_path,
        "# machine\n\
         span 1200\n\
         sheetWidth 700\n\
         steps 400\n\
         diameter 12.0\n\
         defaultSpeed 35\n\
         offsetX -64\n",
    )
    .unwrap();

    let toml_path = dir.path().join("plotter.toml");
    std::fs::write(
        &toml_path,
        "[sheet]\n\
         span = 1200\n\
         sheet_width = 700\n\
         \n\
         [motors]\n\
         steps = 400\n\
         diameter = 12.0\n\
         \n\
         [drawing]\n\
         default_speed = 35.0\n\
         offset_x = -64.0\n",
    )
    .unwrap();

    let sink = EventSink::disabled();
    let legacy = Config::load(legacy_path.to_str().unwrap(), &sink).unwrap();
    let toml = Config::load(toml_path.to_str().unwrap(), &sink).unwrap();

    assert_eq!(legacy.sheet.span, toml.sheet.span);
    assert_eq!(legacy.sheet.sheet_width, toml.sheet.sheet_width);
    assert_eq!(legacy.motors.steps, toml.motors.steps);
    assert_eq!(legacy.motors.diameter, toml.motors.diameter);
    assert_eq!(legacy.drawing.default_speed, toml.drawing.default_speed);
    assert_eq!(legacy.drawing.offset_x, toml.drawing.offset_x);
}
