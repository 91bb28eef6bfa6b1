// src/lib.rs - Motion-control core for a suspended two-motor drawing robot
pub mod clock;
pub mod comms;
pub mod config;
pub mod events;
pub mod gcode;
pub mod hardware;
pub mod motion;
pub mod pen;
pub mod plotter;
pub mod svg;
