// src/hardware/mod.rs - Motor driver contract shared by the GPIO and simulated drivers
pub mod gpio;
pub mod simulated;

pub use gpio::{GpioMotor, GpioPins, SysfsPins};
pub use simulated::{OutputEvent, SimulatedMotor};

use crate::config::Config;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("GPIO error on {path}: {source}")]
    Gpio {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unexpected GPIO value {value:?} read from {path}")]
    InvalidLevel { path: PathBuf, value: String },
}

/// Logic level of a GPIO line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// One of the two relay outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Forward,
    Reverse,
}

/// Fixed delays used by every driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverTiming {
    /// Feedback sampling cadence (physical) or pulse period (simulated).
    pub poll_interval: Duration,
    /// Delay after deasserting outputs before the motor may be redriven.
    pub settle_delay: Duration,
}

impl Default for DriverTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            settle_delay: Duration::from_millis(250),
        }
    }
}

/// Receives progress from [`MotorDriver::wait_pulses`].
pub trait PulseObserver {
    /// Called once per feedback sample, before sleeping.
    fn on_tick(&mut self) {}
    /// Called after each confirmed pulse with the pulses still needed.
    fn on_pulse(&mut self, remaining: u32);
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl PulseObserver for NoopObserver {
    fn on_pulse(&mut self, _remaining: u32) {}
}

/// Two mutually exclusive outputs plus one pulse feedback input.
///
/// Drivers are shared across threads; the busy token inside each driver is
/// what makes "already driving" a hard refusal rather than a race.
pub trait MotorDriver: Send + Sync {
    /// Start driving forward. `Ok(false)` means the motor is busy and nothing
    /// was touched.
    fn drive_forward(&self) -> Result<bool, DriverError>;

    /// Start driving in reverse. `Ok(false)` means the motor is busy.
    fn drive_reverse(&self) -> Result<bool, DriverError>;

    /// Deassert both outputs, wait the settle delay, then release the motor.
    /// On error the motor may still be powered and stays busy.
    fn stop_and_settle(&self) -> Result<(), DriverError>;

    /// Block until `target` pulses are seen or `max_time` elapses.
    /// Returns `true` only if the full count was reached in time.
    fn wait_pulses(
        &self,
        target: u32,
        max_time: Duration,
        observer: &mut dyn PulseObserver,
    ) -> Result<bool, DriverError>;

    fn is_busy(&self) -> bool;
}

/// Atomic "motor is driving" flag.
#[derive(Debug, Default)]
pub struct BusyToken(AtomicBool);

impl BusyToken {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Set the flag if it was clear. Returns `false` if already busy.
    pub fn try_acquire(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Counts low to high transitions. The first sample only sets the baseline,
/// so a line that is already high at start does not count as a pulse.
#[derive(Debug, Default)]
pub struct EdgeCounter {
    last: Option<Level>,
    seen: u32,
}

impl EdgeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one sample; returns `true` if it completed a pulse.
    pub fn sample(&mut self, level: Level) -> bool {
        let rising = matches!((self.last, level), (Some(Level::Low), Level::High));
        self.last = Some(level);
        if rising {
            self.seen += 1;
        }
        rising
    }

    pub fn seen(&self) -> u32 {
        self.seen
    }
}

/// Shared pulse wait loop. `poll` is invoked after each `period` sleep and
/// reports whether that sample completed a pulse.
pub(crate) fn pulse_loop<F>(
    target: u32,
    max_time: Duration,
    period: Duration,
    observer: &mut dyn PulseObserver,
    mut poll: F,
) -> Result<bool, DriverError>
where
    F: FnMut() -> Result<bool, DriverError>,
{
    let start = Instant::now();
    let mut seen = 0u32;
    while seen < target && start.elapsed() < max_time {
        observer.on_tick();
        std::thread::sleep(period);
        if poll()? {
            seen += 1;
            tracing::debug!("Pulse seen. Now {}/{}", seen, target);
            observer.on_pulse(target - seen);
        }
    }
    if seen < target {
        tracing::warn!(
            "Hit max runtime of {:?} after {}/{} pulses",
            max_time,
            seen,
            target
        );
    }
    Ok(seen >= target)
}

/// Build the driver selected by the configuration.
pub fn driver_from_config(config: &Config) -> Result<Arc<dyn MotorDriver>, DriverError> {
    let timing = config.driver.timing();
    if config.driver.simulated {
        tracing::info!("Using simulated motor; no GPIO will be touched");
        let motor: Arc<dyn MotorDriver> = Arc::new(
            SimulatedMotor::new(timing)
                .with_pulse_period(Duration::from_millis(config.driver.simulated_pulse_ms)),
        );
        Ok(motor)
    } else {
        tracing::info!(
            "Using GPIO motor: forward={} reverse={} feedback={}",
            config.gpio.forward_pin,
            config.gpio.reverse_pin,
            config.gpio.feedback_pin
        );
        let pins = SysfsPins::open(&config.gpio)?;
        let motor: Arc<dyn MotorDriver> = Arc::new(GpioMotor::new(pins, timing)?);
        Ok(motor)
    }
}
