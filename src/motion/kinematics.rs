// src/motion/kinematics.rs - Planar trilateration between sheet coordinates
// and the two cable lengths.
//
// The carriage hangs from two cables anchored at (0,0) and (span,0) in motor
// space; the sheet sits at (sheet_position_x, sheet_position_y) below the
// left anchor. All inputs are millimeters, all outputs integer step counts.
use crate::config::{MotorConfig, NamedPosition, SheetConfig};

/// Machine geometry in millimeters, fixed for the life of the process.
#[derive(Debug, Clone, Copy)]
pub struct SheetGeometry {
    pub span: f64,
    pub sheet_width: f64,
    pub sheet_height: f64,
    pub sheet_position_x: f64,
    pub sheet_position_y: f64,
}

impl SheetGeometry {
    pub fn new(config: &SheetConfig) -> Self {
        Self {
            span: config.span as f64,
            sheet_width: config.sheet_width as f64,
            sheet_height: config.sheet_height as f64,
            sheet_position_x: config.sheet_position_x as f64,
            sheet_position_y: config.sheet_position_y as f64,
        }
    }

    /// Sheet coordinates of a named quick-access position.
    pub fn named_position(&self, position: NamedPosition) -> (f64, f64) {
        use NamedPosition::*;
        let x = match position {
            UpperLeft | LeftCenter | LowerLeft => 0.0,
            UpperCenter | Center | LowerCenter => self.sheet_width / 2.0,
            UpperRight | RightCenter | LowerRight => self.sheet_width,
        };
        let y = match position {
            UpperLeft | UpperCenter | UpperRight => 0.0,
            LeftCenter | Center | RightCenter => self.sheet_height / 2.0,
            LowerLeft | LowerCenter | LowerRight => self.sheet_height,
        };
        (x, y)
    }
}

/// Position -> cable lengths. Pure, no failure mode inside the sheet.
#[derive(Debug, Clone, Copy)]
pub struct Kinematics {
    geometry: SheetGeometry,
    step_length: f64,
}

impl Kinematics {
    pub fn new(geometry: SheetGeometry, motors: &MotorConfig) -> Self {
        // Only one pulse edge per step drives the motor, hence steps * 2.
        let step_length =
            (std::f64::consts::PI * motors.diameter) / (motors.steps as f64 * 2.0);
        Self {
            geometry,
            step_length,
        }
    }

    pub fn geometry(&self) -> &SheetGeometry {
        &self.geometry
    }

    /// Cable resolution in millimeters per step.
    pub fn step_length(&self) -> f64 {
        self.step_length
    }

    /// Left cable length in steps for a sheet-space position.
    pub fn left_steps(&self, x: f64, y: f64) -> u64 {
        let w = (self.geometry.sheet_position_x + x) / self.step_length;
        let h = (self.geometry.sheet_position_y + y) / self.step_length;
        (w * w + h * h).sqrt().round() as u64
    }

    /// Right cable length in steps for a sheet-space position.
    pub fn right_steps(&self, x: f64, y: f64) -> u64 {
        let w = (self.geometry.span - self.geometry.sheet_position_x - x) / self.step_length;
        let h = (self.geometry.sheet_position_y + y) / self.step_length;
        (w * w + h * h).sqrt().round() as u64
    }
}

/// Calibration scale/offset from config, composed with a per-job fit that
/// scales an input drawing onto the sheet and centers it along the tighter
/// axis. The job part resets to identity at the start of every job.
#[derive(Debug, Clone, Copy)]
pub struct DrawingTransform {
    pub scale_x: f64,
    pub scale_y: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    job_scale: f64,
    job_offset_x: f64,
    job_offset_y: f64,
}

impl DrawingTransform {
    pub fn new(scale_x: f64, scale_y: f64, offset_x: f64, offset_y: f64) -> Self {
        Self {
            scale_x,
            scale_y,
            offset_x,
            offset_y,
            job_scale: 1.0,
            job_offset_x: 0.0,
            job_offset_y: 0.0,
        }
    }

    pub fn reset_job(&mut self) {
        self.job_scale = 1.0;
        self.job_offset_x = 0.0;
        self.job_offset_y = 0.0;
    }

    /// Fit a drawing of the given extent onto the sheet, preserving aspect
    /// ratio and centering along the axis with slack.
    pub fn fit(&mut self, geometry: &SheetGeometry, width: f64, height: f64) {
        if width <= 0.0 || height <= 0.0 {
            self.reset_job();
            return;
        }
        let scale_x = geometry.sheet_width / width;
        let scale_y = geometry.sheet_height / height;

        if scale_x > scale_y {
            self.job_scale = scale_y;
            self.job_offset_x = geometry.sheet_width / 2.0 - width * scale_y / 2.0;
            self.job_offset_y = 0.0;
        } else {
            self.job_scale = scale_x;
            self.job_offset_x = 0.0;
            self.job_offset_y = geometry.sheet_height / 2.0 - height * scale_x / 2.0;
        }
    }

    /// Drawing-space position -> sheet-space position.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x * self.scale_x * self.job_scale + self.offset_x + self.job_offset_x,
            y * self.scale_y * self.job_scale + self.offset_y + self.job_offset_y,
        )
    }
}

impl Default for DrawingTransform {
    fn default() -> Self {
        Self::new(1.0, 1.0, 0.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_geometry() -> SheetGeometry {
        SheetGeometry {
            span: 1000.0,
            sheet_width: 650.0,
            sheet_height: 500.0,
            sheet_position_x: 175.0,
            sheet_position_y: 250.0,
        }
    }

    fn test_kinematics() -> Kinematics {
        let motors = MotorConfig {
            steps: 800,
            diameter: 17.51,
            left_direction: false,
            right_direction: true,
        };
        Kinematics::new(test_geometry(), &motors)
    }

    #[test]
    fn step_length_accounts_for_driving_edge() {
        let kin = test_kinematics();
        // pi * 17.51 / 1600
        assert!((kin.step_length() - 0.034_381).abs() < 1e-4);
    }

    #[test]
    fn moving_toward_a_motor_shortens_its_cable() {
        let kin = test_kinematics();
        // Center of the sheet vs its upper-left corner.
        assert!(kin.left_steps(0.0, 0.0) < kin.left_steps(325.0, 250.0));
        assert!(kin.right_steps(0.0, 0.0) > kin.right_steps(325.0, 250.0));
    }

    #[test]
    fn lengths_are_monotonic_across_the_sheet() {
        let kin = test_kinematics();
        let geom = test_geometry();
        let stride = 50.0;

        let mut y = 0.0;
        while y < geom.sheet_height {
            let mut x = 0.0;
            while x + stride <= geom.sheet_width {
                // Left cable grows with x, right cable shrinks.
                assert!(kin.left_steps(x, y) < kin.left_steps(x + stride, y));
                assert!(kin.right_steps(x, y) > kin.right_steps(x + stride, y));
                // Both grow with y (the carriage drops away from both anchors).
                assert!(kin.left_steps(x, y) < kin.left_steps(x, y + stride));
                assert!(kin.right_steps(x, y) < kin.right_steps(x, y + stride));
                x += stride;
            }
            y += stride;
        }
    }

    #[test]
    fn named_positions_cover_the_sheet() {
        let geom = test_geometry();
        assert_eq!(geom.named_position(NamedPosition::Center), (325.0, 250.0));
        assert_eq!(geom.named_position(NamedPosition::UpperLeft), (0.0, 0.0));
        assert_eq!(
            geom.named_position(NamedPosition::LowerRight),
            (650.0, 500.0)
        );
        assert_eq!(
            geom.named_position(NamedPosition::LeftCenter),
            (0.0, 250.0)
        );
    }

    #[test]
    fn identity_transform_passes_through() {
        let t = DrawingTransform::default();
        assert_eq!(t.apply(12.5, -3.0), (12.5, -3.0));
    }

    #[test]
    fn fit_centers_wide_drawing_vertically() {
        let geom = test_geometry();
        let mut t = DrawingTransform::default();
        // 1300x500 drawing: width-bound, scale 0.5, vertical slack 250.
        t.fit(&geom, 1300.0, 500.0);
        assert_eq!(t.apply(0.0, 0.0), (0.0, 125.0));
        assert_eq!(t.apply(1300.0, 500.0), (650.0, 375.0));
    }

    #[test]
    fn fit_centers_tall_drawing_horizontally() {
        let geom = test_geometry();
        let mut t = DrawingTransform::default();
        // 325x1000 drawing: height-bound, scale 0.5, horizontal slack 487.5.
        t.fit(&geom, 325.0, 1000.0);
        let (x0, y0) = t.apply(0.0, 0.0);
        let (x1, y1) = t.apply(325.0, 1000.0);
        assert_eq!((x0, y0), (243.75, 0.0));
        assert_eq!((x1, y1), (406.25, 500.0));
    }

    #[test]
    fn calibration_composes_with_job_fit() {
        let geom = test_geometry();
        let mut t = DrawingTransform::new(1.0, 1.0, -64.0, 3.0);
        t.fit(&geom, 650.0, 500.0); // exact fit, scale 1
        assert_eq!(t.apply(100.0, 100.0), (36.0, 103.0));
        t.reset_job();
        assert_eq!(t.apply(100.0, 100.0), (36.0, 103.0));
    }
}
