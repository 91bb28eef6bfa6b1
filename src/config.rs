// src/config.rs - Plotter configuration.
//
// Two formats are accepted: TOML, and the legacy line-oriented `key value`
// format used by the machine's SD-card config files. The loader tries TOML
// first and falls back to the legacy parser. Legacy warnings (unknown key,
// malformed line, over-length line) are reported to the host with the line
// number and never abort loading.
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::events::{DeviceCode, EventSink};

/// Longest legacy config line kept intact; anything longer is truncated and
/// reported as a warning.
const MAX_LINE_LEN: usize = 96;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("motor span {span} mm is shorter than sheet width {sheet_width} mm + sheet offset {sheet_position_x} mm")]
    TooShortSpan {
        span: u32,
        sheet_width: u32,
        sheet_position_x: u32,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn device_code(&self) -> DeviceCode {
        match self {
            ConfigError::Io(_) => DeviceCode::FileNotReadable,
            ConfigError::TooShortSpan { .. } => DeviceCode::TooShortSpan,
            ConfigError::Invalid(_) => DeviceCode::FileNotReadable,
        }
    }
}

/// Quick-access sheet positions, the eight compass points plus the center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NamedPosition {
    #[default]
    Center,
    UpperCenter,
    LowerCenter,
    LeftCenter,
    RightCenter,
    UpperLeft,
    UpperRight,
    LowerLeft,
    LowerRight,
}

impl FromStr for NamedPosition {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        Ok(match s {
            "center" => Self::Center,
            "upper-center" => Self::UpperCenter,
            "lower-center" => Self::LowerCenter,
            "left-center" => Self::LeftCenter,
            "right-center" => Self::RightCenter,
            "upper-left" => Self::UpperLeft,
            "upper-right" => Self::UpperRight,
            "lower-left" => Self::LowerLeft,
            "lower-right" => Self::LowerRight,
            _ => return Err(()),
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub sheet: SheetConfig,

    #[serde(default)]
    pub pen: PenConfig,

    #[serde(default)]
    pub motors: MotorConfig,

    #[serde(default)]
    pub drawing: DrawingConfig,

    #[serde(default)]
    pub comms: CommsConfig,
}

/// Machine geometry: motor span and sheet placement, all in millimeters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SheetConfig {
    #[serde(default = "default_span")]
    pub span: u32,
    #[serde(default = "default_sheet_width")]
    pub sheet_width: u32,
    #[serde(default = "default_sheet_height")]
    pub sheet_height: u32,
    #[serde(default = "default_sheet_position_x")]
    pub sheet_position_x: u32,
    #[serde(default = "default_sheet_position_y")]
    pub sheet_position_y: u32,
}

/// Pen servo angles and settle delays.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PenConfig {
    /// Servo angle with the pen on the sheet.
    #[serde(default = "default_min_servo_angle")]
    pub min_servo_angle: u16,
    /// Servo angle with the pen lifted.
    #[serde(default = "default_max_servo_angle")]
    pub max_servo_angle: u16,
    #[serde(default = "default_pre_servo_delay")]
    pub pre_servo_delay_ms: u64,
    #[serde(default = "default_post_servo_delay")]
    pub post_servo_delay_ms: u64,
    /// Pen travel limits in mm, reserved for depth-controlled pen carriages.
    #[serde(default = "default_min_pen")]
    pub min_pen: i32,
    #[serde(default = "default_max_pen")]
    pub max_pen: i32,
}

/// Stepper geometry and wiring polarity.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MotorConfig {
    /// Steps per revolution, micro-stepping included.
    #[serde(default = "default_steps")]
    pub steps: u32,
    /// Pulley diameter in mm.
    #[serde(default = "default_diameter")]
    pub diameter: f64,
    /// DIR level that shortens the left cable.
    #[serde(default)]
    pub left_direction: bool,
    /// DIR level that shortens the right cable.
    #[serde(default = "default_true")]
    pub right_direction: bool,
}

/// Job defaults: calibration transform, speed, interpreter modes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DrawingConfig {
    /// Input file drawn when none is given on the command line.
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_scale")]
    pub scale_x: f64,
    #[serde(default = "default_scale")]
    pub scale_y: f64,
    #[serde(default = "default_offset_x")]
    pub offset_x: f64,
    #[serde(default = "default_offset_y")]
    pub offset_y: f64,
    /// Cable speed on the faster axis, in mm/s.
    #[serde(default = "default_speed")]
    pub default_speed: f64,
    /// Millimeters when true, inches when false.
    #[serde(default = "default_true")]
    pub metric_unit: bool,
    #[serde(default = "default_true")]
    pub absolute_position: bool,
    /// Forward drawing-file comments to the host as messages.
    #[serde(default)]
    pub display_comments: bool,
    #[serde(default)]
    pub default_position: NamedPosition,
    #[serde(default)]
    pub end_position: NamedPosition,
}

/// Host link settings. With no port configured, events go to stdout.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommsConfig {
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_baud")]
    pub baud: u32,
}

fn default_span() -> u32 {
    1000
}
fn default_sheet_width() -> u32 {
    650
}
fn default_sheet_height() -> u32 {
    500
}
fn default_sheet_position_x() -> u32 {
    175
}
fn default_sheet_position_y() -> u32 {
    250
}
fn default_min_servo_angle() -> u16 {
    36
}
fn default_max_servo_angle() -> u16 {
    50
}
fn default_pre_servo_delay() -> u64 {
    100
}
fn default_post_servo_delay() -> u64 {
    500
}
fn default_min_pen() -> i32 {
    -10
}
fn default_max_pen() -> i32 {
    10
}
fn default_steps() -> u32 {
    800
}
fn default_diameter() -> f64 {
    17.51
}
fn default_initial_delay() -> u64 {
    5000
}
fn default_scale() -> f64 {
    1.0
}
fn default_offset_x() -> f64 {
    -64.0
}
fn default_offset_y() -> f64 {
    3.0
}
fn default_speed() -> f64 {
    20.0
}
fn default_baud() -> u32 {
    57600
}
fn default_true() -> bool {
    true
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            span: default_span(),
            sheet_width: default_sheet_width(),
            sheet_height: default_sheet_height(),
            sheet_position_x: default_sheet_position_x(),
            sheet_position_y: default_sheet_position_y(),
        }
    }
}

impl Default for PenConfig {
    fn default() -> Self {
        Self {
            min_servo_angle: default_min_servo_angle(),
            max_servo_angle: default_max_servo_angle(),
            pre_servo_delay_ms: default_pre_servo_delay(),
            post_servo_delay_ms: default_post_servo_delay(),
            min_pen: default_min_pen(),
            max_pen: default_max_pen(),
        }
    }
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            diameter: default_diameter(),
            left_direction: false,
            right_direction: default_true(),
        }
    }
}

impl Default for DrawingConfig {
    fn default() -> Self {
        Self {
            file_name: None,
            initial_delay_ms: default_initial_delay(),
            scale_x: default_scale(),
            scale_y: default_scale(),
            offset_x: default_offset_x(),
            offset_y: default_offset_y(),
            default_speed: default_speed(),
            metric_unit: default_true(),
            absolute_position: default_true(),
            display_comments: false,
            default_position: NamedPosition::default(),
            end_position: NamedPosition::default(),
        }
    }
}

impl Default for CommsConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: default_baud(),
        }
    }
}

impl Config {
    /// Load configuration from a file, trying TOML first and then the
    /// legacy `key value` format.
    pub fn load(path: &str, events: &EventSink) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;

        if let Ok(config) = toml::from_str::<Config>(&contents) {
            tracing::info!("loaded TOML configuration from {}", path);
            return Ok(config);
        }

        tracing::info!("loading legacy configuration from {}", path);
        Ok(Self::parse_legacy(&contents, events))
    }

    /// Parse the legacy line-oriented format: one `key value` pair per line,
    /// whitespace-separated, `#` comments and blank lines ignored.
    pub fn parse_legacy(contents: &str, events: &EventSink) -> Self {
        let mut config = Config::default();

        for (idx, raw_line) in contents.lines().enumerate() {
            let line_no = idx + 1;

            let line = if raw_line.len() > MAX_LINE_LEN {
                events.warn(
                    DeviceCode::TooLongConfigLine,
                    format!("config line {} truncated", line_no),
                );
                let mut end = MAX_LINE_LEN;
                while !raw_line.is_char_boundary(end) {
                    end -= 1;
                }
                &raw_line[..end]
            } else {
                raw_line
            };

            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once(char::is_whitespace) else {
                events.warn(
                    DeviceCode::WrongConfigLine,
                    format!("config line {} has no value", line_no),
                );
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                events.warn(
                    DeviceCode::WrongConfigLine,
                    format!("config line {} has no value", line_no),
                );
                continue;
            }

            config.apply_legacy_key(key, value, line_no, events);
        }

        config
    }

    fn apply_legacy_key(&mut self, key: &str, value: &str, line_no: usize, events: &EventSink) {
        // One closure per value shape; a parse failure warns and leaves the
        // default in place, mirroring the unknown-key policy.
        let bad = |events: &EventSink| {
            events.warn(
                DeviceCode::WrongConfigLine,
                format!("config line {}: bad value '{}' for {}", line_no, value, key),
            );
        };

        macro_rules! num {
            ($field:expr) => {
                match value.parse() {
                    Ok(v) => $field = v,
                    Err(_) => bad(events),
                }
            };
        }

        match key {
            "fileName" => self.drawing.file_name = Some(value.to_string()),
            "span" => num!(self.sheet.span),
            "sheetWidth" => num!(self.sheet.sheet_width),
            "sheetHeight" => num!(self.sheet.sheet_height),
            "sheetPositionX" => num!(self.sheet.sheet_position_x),
            "sheetPositionY" => num!(self.sheet.sheet_position_y),
            "minServoAngle" => num!(self.pen.min_servo_angle),
            "maxServoAngle" => num!(self.pen.max_servo_angle),
            // Accepted for depth-controlled pen carriages; no consumer yet.
            "minPen" => num!(self.pen.min_pen),
            "maxPen" => num!(self.pen.max_pen),
            "preServoDelay" => num!(self.pen.pre_servo_delay_ms),
            "postServoDelay" => num!(self.pen.post_servo_delay_ms),
            "steps" => num!(self.motors.steps),
            "diameter" => num!(self.motors.diameter),
            "leftDirection" => self.motors.left_direction = parse_bool(value),
            "rightDirection" => self.motors.right_direction = parse_bool(value),
            "initialDelay" => num!(self.drawing.initial_delay_ms),
            "scaleX" => num!(self.drawing.scale_x),
            "scaleY" => num!(self.drawing.scale_y),
            "offsetX" => num!(self.drawing.offset_x),
            "offsetY" => num!(self.drawing.offset_y),
            "defaultSpeed" => num!(self.drawing.default_speed),
            "metricUnit" => self.drawing.metric_unit = parse_bool(value),
            "absolutePosition" => self.drawing.absolute_position = parse_bool(value),
            "displayComments" => self.drawing.display_comments = parse_bool(value),
            "defaultPosition" => match value.parse() {
                Ok(p) => self.drawing.default_position = p,
                Err(()) => bad(events),
            },
            "endPosition" => match value.parse() {
                Ok(p) => self.drawing.end_position = p,
                Err(()) => bad(events),
            },
            "serialPort" => self.comms.port = Some(value.to_string()),
            "serialBauds" => num!(self.comms.baud),
            _ => events.warn(
                DeviceCode::UnknownConfigKey,
                format!("unknown config key '{}' at line {}", key, line_no),
            ),
        }
    }

    /// Startup validation. A span shorter than the sheet plus its offset
    /// means the geometry cannot exist; that is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sheet.span < self.sheet.sheet_width + self.sheet.sheet_position_x {
            return Err(ConfigError::TooShortSpan {
                span: self.sheet.span,
                sheet_width: self.sheet.sheet_width,
                sheet_position_x: self.sheet.sheet_position_x,
            });
        }
        if self.motors.steps == 0 {
            return Err(ConfigError::Invalid("steps must be positive".into()));
        }
        if self.motors.diameter <= 0.0 {
            return Err(ConfigError::Invalid("diameter must be positive".into()));
        }
        if self.drawing.default_speed <= 0.0 {
            return Err(ConfigError::Invalid(
                "defaultSpeed must be positive".into(),
            ));
        }
        if self.drawing.scale_x == 0.0 || self.drawing.scale_y == 0.0 {
            return Err(ConfigError::Invalid("drawing scale must be nonzero".into()));
        }
        Ok(())
    }
}

/// Legacy boolean: "true" and "yes" are true, anything else is false.
fn parse_bool(value: &str) -> bool {
    value == "true" || value == "yes"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;

    #[test]
    fn default_config_matches_machine_defaults() {
        let config = Config::default();
        assert_eq!(config.sheet.span, 1000);
        assert_eq!(config.sheet.sheet_width, 650);
        assert_eq!(config.sheet.sheet_height, 500);
        assert_eq!(config.sheet.sheet_position_x, 175);
        assert_eq!(config.sheet.sheet_position_y, 250);
        assert_eq!(config.motors.steps, 800);
        assert_eq!(config.motors.diameter, 17.51);
        assert!(!config.motors.left_direction);
        assert!(config.motors.right_direction);
        assert_eq!(config.pen.min_servo_angle, 36);
        assert_eq!(config.pen.max_servo_angle, 50);
        assert_eq!(config.drawing.default_speed, 20.0);
        assert_eq!(config.drawing.offset_x, -64.0);
        assert_eq!(config.drawing.offset_y, 3.0);
        assert!(config.drawing.metric_unit);
        assert!(config.drawing.absolute_position);
        assert_eq!(config.comms.baud, 57600);
    }

    #[test]
    fn legacy_offset_passes_through_without_warning() {
        let (sink, mut rx) = EventSink::channel(16);
        let config = Config::parse_legacy("offsetX -64\n", &sink);
        assert_eq!(config.drawing.offset_x, -64.0);
        assert!(rx.try_recv().is_err(), "no warning expected");
    }

    #[test]
    fn legacy_full_file() {
        let contents = "\
# Machine geometry
span 1200
sheetWidth 700
sheetHeight 550
sheetPositionX 200
sheetPositionY 260

steps 400
diameter 12.0
leftDirection yes
rightDirection false
defaultSpeed 35
metricUnit true
absolutePosition false
defaultPosition upper-left
";
        let config = Config::parse_legacy(contents, &EventSink::disabled());
        assert_eq!(config.sheet.span, 1200);
        assert_eq!(config.sheet.sheet_width, 700);
        assert_eq!(config.motors.steps, 400);
        assert!(config.motors.left_direction);
        assert!(!config.motors.right_direction);
        assert_eq!(config.drawing.default_speed, 35.0);
        assert!(!config.drawing.absolute_position);
        assert_eq!(config.drawing.default_position, NamedPosition::UpperLeft);
    }

    #[test]
    fn legacy_pen_travel_keys_parse_without_warning() {
        let (sink, mut rx) = EventSink::channel(16);
        let config = Config::parse_legacy("minPen -5\nmaxPen 5\n", &sink);
        assert_eq!(config.pen.min_pen, -5);
        assert_eq!(config.pen.max_pen, 5);
        assert!(rx.try_recv().is_err(), "no warning expected");
    }

    #[test]
    fn legacy_unknown_key_warns_with_line_number() {
        let (sink, mut rx) = EventSink::channel(16);
        Config::parse_legacy("span 1000\nfrobnicate 12\n", &sink);
        match rx.try_recv().unwrap() {
            Event::Warning { code, detail } => {
                assert_eq!(code, DeviceCode::UnknownConfigKey);
                assert!(detail.contains("line 2"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn legacy_malformed_line_warns_and_continues() {
        let (sink, mut rx) = EventSink::channel(16);
        let config = Config::parse_legacy("span\nsheetWidth 600\n", &sink);
        match rx.try_recv().unwrap() {
            Event::Warning { code, .. } => assert_eq!(code, DeviceCode::WrongConfigLine),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(config.sheet.span, 1000); // default kept
        assert_eq!(config.sheet.sheet_width, 600); // later lines still applied
    }

    #[test]
    fn legacy_overlong_line_truncates_and_warns() {
        let (sink, mut rx) = EventSink::channel(16);
        let long = format!("span 1100{}\n", " ".repeat(200));
        let config = Config::parse_legacy(&long, &sink);
        match rx.try_recv().unwrap() {
            Event::Warning { code, .. } => assert_eq!(code, DeviceCode::TooLongConfigLine),
            other => panic!("unexpected event {:?}", other),
        }
        // The key/value survived the truncation.
        assert_eq!(config.sheet.span, 1100);
    }

    #[test]
    fn legacy_bad_number_warns_and_keeps_default() {
        let (sink, mut rx) = EventSink::channel(16);
        let config = Config::parse_legacy("steps eight-hundred\n", &sink);
        match rx.try_recv().unwrap() {
            Event::Warning { code, .. } => assert_eq!(code, DeviceCode::WrongConfigLine),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(config.motors.steps, 800);
    }

    #[test]
    fn toml_config_parses() {
        let contents = r#"
[sheet]
span = 1500
sheet_width = 800

[motors]
steps = 1600
diameter = 20.0

[drawing]
default_speed = 50.0
default_position = "lower-right"
"#;
        let config: Config = toml::from_str(contents).unwrap();
        assert_eq!(config.sheet.span, 1500);
        assert_eq!(config.sheet.sheet_height, 500); // default
        assert_eq!(config.motors.steps, 1600);
        assert_eq!(config.drawing.default_speed, 50.0);
        assert_eq!(config.drawing.default_position, NamedPosition::LowerRight);
    }

    #[test]
    fn validate_rejects_short_span() {
        let mut config = Config::default();
        config.sheet.span = 700; // 650 + 175 > 700
        match config.validate() {
            Err(ConfigError::TooShortSpan { span, .. }) => assert_eq!(span, 700),
            other => panic!("expected TooShortSpan, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(Config::default().validate().is_ok());
    }
}
