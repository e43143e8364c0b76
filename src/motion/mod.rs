// src/motion/mod.rs - Door motion control
pub mod controller;

pub use controller::{ControlError, ControllerSettings, MotionController, OperationResult};
