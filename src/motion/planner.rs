// src/motion/planner.rs - Path planner: bounded-length line subdivision and
// curve flattening on top of the scheduler.
//
// The scheduler does not interpolate in Cartesian space, so the trajectory
// of a long segment can bow away from the chord when the two cable deltas
// differ. Splitting every line into sub-segments of at most MAX_SEGMENT_MM
// keeps that deviation to roughly one segment length.
use crate::clock::Clock;
use crate::hardware::PlotterIo;
use crate::motion::scheduler::MotionScheduler;
use crate::pen::PenState;

/// Longest axis displacement handed to the scheduler in one call, mm.
const MAX_SEGMENT_MM: f64 = 5.0;

/// Bezier flattening resolution: samples at t = 0.00, 0.01, ..., 1.00.
const CURVE_SAMPLES: u32 = 100;

/// Control-point distance ratio for the four-arc ellipse approximation.
const ELLIPSE_K: f64 = 0.551915;

pub struct Planner<IO, C> {
    scheduler: MotionScheduler<IO, C>,
    /// Trailing control point of the last cubic, for `S`/`s` reflection.
    last_cubic_control: Option<(f64, f64)>,
    /// Control point of the last quadratic, for `T`/`t` reflection.
    last_quad_control: Option<(f64, f64)>,
    subpath_start: (f64, f64),
}

impl<IO: PlotterIo, C: Clock> Planner<IO, C> {
    pub fn new(scheduler: MotionScheduler<IO, C>) -> Self {
        let subpath_start = scheduler.position();
        Self {
            scheduler,
            last_cubic_control: None,
            last_quad_control: None,
            subpath_start,
        }
    }

    pub fn scheduler(&self) -> &MotionScheduler<IO, C> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut MotionScheduler<IO, C> {
        &mut self.scheduler
    }

    pub fn position(&self) -> (f64, f64) {
        self.scheduler.position()
    }

    /// Reset per-job state: the fitted transform and the curve memory.
    pub fn begin_job(&mut self) {
        self.scheduler.reset_job_transform();
        self.last_cubic_control = None;
        self.last_quad_control = None;
        self.subpath_start = self.scheduler.position();
    }

    /// Pen-up traversal; starts a new subpath.
    pub fn move_abs(&mut self, x: f64, y: f64) {
        self.clear_curve_memory();
        self.scheduler.move_to(x, y, false);
        self.subpath_start = (x, y);
    }

    pub fn move_rel(&mut self, dx: f64, dy: f64) {
        let (x, y) = self.scheduler.position();
        self.move_abs(x + dx, y + dy);
    }

    /// Pen-down straight line, subdivided.
    pub fn line_abs(&mut self, x: f64, y: f64) {
        self.clear_curve_memory();
        self.draw_line(x, y);
    }

    pub fn line_rel(&mut self, dx: f64, dy: f64) {
        let (x, y) = self.scheduler.position();
        self.line_abs(x + dx, y + dy);
    }

    pub fn horizontal_abs(&mut self, x: f64) {
        let (_, y) = self.scheduler.position();
        self.line_abs(x, y);
    }

    pub fn horizontal_rel(&mut self, dx: f64) {
        let (x, y) = self.scheduler.position();
        self.line_abs(x + dx, y);
    }

    pub fn vertical_abs(&mut self, y: f64) {
        let (x, _) = self.scheduler.position();
        self.line_abs(x, y);
    }

    pub fn vertical_rel(&mut self, dy: f64) {
        let (x, y) = self.scheduler.position();
        self.line_abs(x, y + dy);
    }

    /// Pen-down line back to the start of the current subpath.
    pub fn close_path(&mut self) {
        let (x, y) = self.subpath_start;
        self.line_abs(x, y);
    }

    pub fn cubic_abs(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, x: f64, y: f64) {
        let p0 = self.scheduler.position();
        for i in 0..=CURVE_SAMPLES {
            let t = i as f64 / CURVE_SAMPLES as f64;
            let (px, py) = cubic_point(p0, (x1, y1), (x2, y2), (x, y), t);
            self.draw_line(px, py);
        }
        // Exact tail, in case the samples do not land on the endpoint.
        self.draw_line(x, y);

        self.last_cubic_control = Some((x2, y2));
        self.last_quad_control = None;
    }

    pub fn cubic_rel(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, x: f64, y: f64) {
        let (cx, cy) = self.scheduler.position();
        self.cubic_abs(cx + x1, cy + y1, cx + x2, cy + y2, cx + x, cy + y);
    }

    /// Cubic with the leading control point reflected from the previous
    /// cubic's trailing control point.
    pub fn smooth_cubic_abs(&mut self, x2: f64, y2: f64, x: f64, y: f64) {
        let (x1, y1) = self.reflected_cubic_control();
        self.cubic_abs(x1, y1, x2, y2, x, y);
    }

    pub fn smooth_cubic_rel(&mut self, x2: f64, y2: f64, x: f64, y: f64) {
        let (cx, cy) = self.scheduler.position();
        self.smooth_cubic_abs(cx + x2, cy + y2, cx + x, cy + y);
    }

    pub fn quadratic_abs(&mut self, x1: f64, y1: f64, x: f64, y: f64) {
        let p0 = self.scheduler.position();
        for i in 0..=CURVE_SAMPLES {
            let t = i as f64 / CURVE_SAMPLES as f64;
            let (px, py) = quadratic_point(p0, (x1, y1), (x, y), t);
            self.draw_line(px, py);
        }
        self.draw_line(x, y);

        self.last_quad_control = Some((x1, y1));
        self.last_cubic_control = None;
    }

    pub fn quadratic_rel(&mut self, x1: f64, y1: f64, x: f64, y: f64) {
        let (cx, cy) = self.scheduler.position();
        self.quadratic_abs(cx + x1, cy + y1, cx + x, cy + y);
    }

    pub fn smooth_quadratic_abs(&mut self, x: f64, y: f64) {
        let (x1, y1) = self.reflected_quad_control();
        self.quadratic_abs(x1, y1, x, y);
    }

    pub fn smooth_quadratic_rel(&mut self, x: f64, y: f64) {
        let (cx, cy) = self.scheduler.position();
        self.smooth_quadratic_abs(cx + x, cy + y);
    }

    /// Axis-aligned ellipse centered on the current position, drawn as four
    /// cubic arcs left -> top -> right -> bottom -> left, then back to the
    /// center pen-up.
    pub fn ellipse(&mut self, rx: f64, ry: f64) {
        let (x, y) = self.scheduler.position();
        let k = ELLIPSE_K;

        self.scheduler.move_to(x - rx, y, false);
        self.cubic_abs(x - rx, y - ry * k, x - rx * k, y - ry, x, y - ry);
        self.smooth_cubic_abs(x + rx, y - ry * k, x + rx, y);
        self.smooth_cubic_abs(x + rx * k, y + ry, x, y + ry);
        self.smooth_cubic_abs(x - rx, y + ry * k, x - rx, y);
        self.scheduler.move_to(x, y, false);
    }

    pub fn circle(&mut self, r: f64) {
        self.ellipse(r, r);
    }

    pub fn pen_up(&mut self) {
        self.scheduler.set_pen(PenState::Up);
    }

    fn clear_curve_memory(&mut self) {
        self.last_cubic_control = None;
        self.last_quad_control = None;
    }

    /// Implicit leading control for a smooth cubic: the previous trailing
    /// control mirrored through the current point, or the current point
    /// itself when no cubic precedes (a zero-length starting tangent).
    pub(crate) fn reflected_cubic_control(&self) -> (f64, f64) {
        reflect(self.scheduler.position(), self.last_cubic_control)
    }

    pub(crate) fn reflected_quad_control(&self) -> (f64, f64) {
        reflect(self.scheduler.position(), self.last_quad_control)
    }

    /// Subdivided pen-down line: N equal sub-segments below the length
    /// bound, then one exact final move that absorbs accumulated rounding.
    fn draw_line(&mut self, x: f64, y: f64) {
        let (cx, cy) = self.scheduler.position();
        let span_x = (x - cx).abs();
        let span_y = (y - cy).abs();

        if span_x > MAX_SEGMENT_MM || span_y > MAX_SEGMENT_MM {
            let n = subdivision_count(span_x, span_y);
            let step_x = (x - cx) / n as f64;
            let step_y = (y - cy) / n as f64;
            for _ in 0..n {
                let (px, py) = self.scheduler.position();
                self.scheduler.move_to(px + step_x, py + step_y, true);
            }
        }
        self.scheduler.move_to(x, y, true);
    }
}

fn subdivision_count(span_x: f64, span_y: f64) -> u32 {
    (span_x.max(span_y) / MAX_SEGMENT_MM).ceil() as u32
}

fn reflect(current: (f64, f64), last_control: Option<(f64, f64)>) -> (f64, f64) {
    match last_control {
        Some((lx, ly)) => (2.0 * current.0 - lx, 2.0 * current.1 - ly),
        None => current,
    }
}

/// Cubic Bernstein polynomial, per axis.
pub(crate) fn cubic_point(
    p0: (f64, f64),
    p1: (f64, f64),
    p2: (f64, f64),
    p3: (f64, f64),
    t: f64,
) -> (f64, f64) {
    let u = 1.0 - t;
    let b0 = u * u * u;
    let b1 = 3.0 * t * u * u;
    let b2 = 3.0 * t * t * u;
    let b3 = t * t * t;
    (
        b0 * p0.0 + b1 * p1.0 + b2 * p2.0 + b3 * p3.0,
        b0 * p0.1 + b1 * p1.1 + b2 * p2.1 + b3 * p3.1,
    )
}

/// Quadratic Bernstein polynomial, per axis.
pub(crate) fn quadratic_point(p0: (f64, f64), p1: (f64, f64), p2: (f64, f64), t: f64) -> (f64, f64) {
    let u = 1.0 - t;
    let b0 = u * u;
    let b1 = 2.0 * t * u;
    let b2 = t * t;
    (
        b0 * p0.0 + b1 * p1.0 + b2 * p2.0,
        b0 * p0.1 + b1 * p1.1 + b2 * p2.1,
    )
}
