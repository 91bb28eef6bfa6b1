// src/motion/mod.rs - Motion pipeline: kinematics, the dual-axis step
// scheduler and the path planner feeding it.
pub mod kinematics;
pub mod planner;
pub mod scheduler;

pub use kinematics::{DrawingTransform, Kinematics, SheetGeometry};
pub use planner::Planner;
pub use scheduler::{CableLengths, MotionScheduler};
