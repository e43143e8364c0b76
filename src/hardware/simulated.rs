// src/hardware/simulated.rs - Motor stand-in for running without GPIO
use super::{BusyToken, DriverError, DriverTiming, MotorDriver, PulseObserver, pulse_loop};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Output state change recorded by the simulated motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEvent {
    Idle,
    Forward,
    Reverse,
}

/// Simulated motor: one pulse per `pulse_period` while driving.
///
/// Follows the same busy and settle rules as the GPIO driver. It can be told
/// to stall after a number of pulses to stand in for a stuck motor or a
/// broken sensor.
#[derive(Debug)]
pub struct SimulatedMotor {
    busy: BusyToken,
    timing: DriverTiming,
    pulse_period: Duration,
    stall_after: Option<u32>,
    outputs: Mutex<Vec<OutputEvent>>,
    pulses_delivered: AtomicU32,
}

impl SimulatedMotor {
    pub fn new(timing: DriverTiming) -> Self {
        Self {
            busy: BusyToken::new(),
            timing,
            pulse_period: Duration::from_secs(1),
            stall_after: None,
            outputs: Mutex::new(Vec::new()),
            pulses_delivered: AtomicU32::new(0),
        }
    }

    pub fn with_pulse_period(mut self, period: Duration) -> Self {
        self.pulse_period = period;
        self
    }

    /// Stop producing feedback after `pulses` pulses within one wait.
    pub fn stall_after(mut self, pulses: u32) -> Self {
        self.stall_after = Some(pulses);
        self
    }

    /// Every output change so far, oldest first.
    pub fn output_events(&self) -> Vec<OutputEvent> {
        self.outputs().clone()
    }

    /// Total pulses produced across all waits.
    pub fn pulses_delivered(&self) -> u32 {
        self.pulses_delivered.load(Ordering::Acquire)
    }

    fn outputs(&self) -> MutexGuard<'_, Vec<OutputEvent>> {
        self.outputs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn drive(&self, event: OutputEvent) -> bool {
        if !self.busy.try_acquire() {
            return false;
        }
        self.outputs().push(OutputEvent::Idle);
        std::thread::sleep(self.timing.settle_delay);
        self.outputs().push(event);
        tracing::debug!("Simulated motor driving {:?}", event);
        true
    }
}

impl MotorDriver for SimulatedMotor {
    fn drive_forward(&self) -> Result<bool, DriverError> {
        Ok(self.drive(OutputEvent::Forward))
    }

    fn drive_reverse(&self) -> Result<bool, DriverError> {
        Ok(self.drive(OutputEvent::Reverse))
    }

    fn stop_and_settle(&self) -> Result<(), DriverError> {
        self.outputs().push(OutputEvent::Idle);
        std::thread::sleep(self.timing.settle_delay);
        self.busy.release();
        Ok(())
    }

    fn wait_pulses(
        &self,
        target: u32,
        max_time: Duration,
        observer: &mut dyn PulseObserver,
    ) -> Result<bool, DriverError> {
        let mut produced = 0u32;
        pulse_loop(target, max_time, self.pulse_period, observer, || {
            if self.stall_after.is_some_and(|limit| produced >= limit) {
                return Ok(false);
            }
            produced += 1;
            self.pulses_delivered.fetch_add(1, Ordering::AcqRel);
            Ok(true)
        })
    }

    fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }
}
