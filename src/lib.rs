//! pulse-gate: journaled open/close control for a pulse-counted gate motor.
//!
//! The door status lives in a one-line journal file. Every transition is
//! written there, so an interrupted run can be resumed from the persisted
//! remaining pulse count or reported as failed.

pub mod config;
pub mod hardware;
pub mod journal;
pub mod motion;
pub mod status;
pub mod web;

pub use config::{Config, ConfigError, load_config};
pub use hardware::{DriverError, DriverTiming, MotorDriver, SimulatedMotor};
pub use journal::{JournalError, JournalStore, JournalWriter};
pub use motion::{ControlError, ControllerSettings, MotionController, OperationResult};
pub use status::{Status, Travel};
