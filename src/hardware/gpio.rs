//! Relay-driven motor on Linux GPIO.
//!
//! Wiring: each motor lead goes through a relay. Driving a relay line LOW
//! energizes it and sends power; HIGH releases it and grounds the lead.
//! Both lines HIGH is the idle state, which is also what the relays fall
//! back to if the outputs are left floating at power loss.

use super::{
    BusyToken, Channel, DriverError, DriverTiming, EdgeCounter, Level, MotorDriver,
    PulseObserver, pulse_loop,
};
use crate::config::GpioConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Raw access to the two relay outputs and the feedback input.
pub trait GpioPins: Send {
    fn set_level(&mut self, channel: Channel, level: Level) -> Result<(), DriverError>;
    fn read_feedback(&mut self) -> Result<Level, DriverError>;
}

/// GPIO lines through the sysfs interface (`/sys/class/gpio`).
///
/// The kernel has deprecated this ABI in favour of the GPIO character
/// device. A chardev backend only needs to implement [`GpioPins`].
#[derive(Debug)]
pub struct SysfsPins {
    root: PathBuf,
    forward: u32,
    reverse: u32,
    feedback: u32,
}

impl SysfsPins {
    /// Export the configured pins and set their directions. Outputs start
    /// HIGH so the relays stay released.
    pub fn open(config: &GpioConfig) -> Result<Self, DriverError> {
        let pins = Self {
            root: config.sysfs_root.clone(),
            forward: config.forward_pin,
            reverse: config.reverse_pin,
            feedback: config.feedback_pin,
        };
        pins.setup_pin(pins.forward, "high")?;
        pins.setup_pin(pins.reverse, "high")?;
        pins.setup_pin(pins.feedback, "in")?;
        tracing::debug!("GPIO setup complete under {}", pins.root.display());
        Ok(pins)
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{}", pin))
    }

    fn setup_pin(&self, pin: u32, direction: &str) -> Result<(), DriverError> {
        let dir = self.pin_dir(pin);
        if !dir.exists() {
            write_attr(&self.root.join("export"), &pin.to_string())?;
            // udev may take a moment to create the node and fix permissions.
            for _ in 0..20 {
                if dir.join("direction").exists() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
        }
        write_attr(&dir.join("direction"), direction)
    }

    fn channel_pin(&self, channel: Channel) -> u32 {
        match channel {
            Channel::Forward => self.forward,
            Channel::Reverse => self.reverse,
        }
    }
}

impl GpioPins for SysfsPins {
    fn set_level(&mut self, channel: Channel, level: Level) -> Result<(), DriverError> {
        let value = match level {
            Level::Low => "0",
            Level::High => "1",
        };
        let path = self.pin_dir(self.channel_pin(channel)).join("value");
        write_attr(&path, value)
    }

    fn read_feedback(&mut self) -> Result<Level, DriverError> {
        let path = self.pin_dir(self.feedback).join("value");
        let raw = fs::read_to_string(&path).map_err(|source| DriverError::Gpio {
            path: path.clone(),
            source,
        })?;
        match raw.trim() {
            "0" => Ok(Level::Low),
            "1" => Ok(Level::High),
            other => Err(DriverError::InvalidLevel {
                path,
                value: other.to_string(),
            }),
        }
    }
}

fn write_attr(path: &Path, value: &str) -> Result<(), DriverError> {
    fs::write(path, value).map_err(|source| DriverError::Gpio {
        path: path.to_path_buf(),
        source,
    })
}

/// Physical motor driver over any [`GpioPins`] backend.
pub struct GpioMotor<P: GpioPins> {
    pins: Mutex<P>,
    busy: BusyToken,
    timing: DriverTiming,
}

impl<P: GpioPins> GpioMotor<P> {
    /// Wrap `pins`, forcing both outputs to the idle state.
    pub fn new(mut pins: P, timing: DriverTiming) -> Result<Self, DriverError> {
        pins.set_level(Channel::Forward, Level::High)?;
        pins.set_level(Channel::Reverse, Level::High)?;
        Ok(Self {
            pins: Mutex::new(pins),
            busy: BusyToken::new(),
            timing,
        })
    }

    fn pins(&self) -> MutexGuard<'_, P> {
        self.pins.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn idle_outputs(&self) -> Result<(), DriverError> {
        let mut pins = self.pins();
        pins.set_level(Channel::Forward, Level::High)?;
        pins.set_level(Channel::Reverse, Level::High)
    }

    fn drive(&self, channel: Channel) -> Result<bool, DriverError> {
        if !self.busy.try_acquire() {
            return Ok(false);
        }
        let started = self.idle_outputs().and_then(|()| {
            std::thread::sleep(self.timing.settle_delay);
            self.pins().set_level(channel, Level::Low)
        });
        if let Err(e) = started {
            if self.idle_outputs().is_ok() {
                self.busy.release();
            }
            return Err(e);
        }
        tracing::debug!("Motor driving {:?}", channel);
        Ok(true)
    }

    /// Access the backend, mainly for inspection in tests.
    pub fn with_pins<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        f(&mut self.pins())
    }
}

impl<P: GpioPins> MotorDriver for GpioMotor<P> {
    fn drive_forward(&self) -> Result<bool, DriverError> {
        self.drive(Channel::Forward)
    }

    fn drive_reverse(&self) -> Result<bool, DriverError> {
        self.drive(Channel::Reverse)
    }

    /// If the outputs cannot be idled the busy token stays held, so every
    /// later drive is refused until the process restarts.
    fn stop_and_settle(&self) -> Result<(), DriverError> {
        if let Err(e) = self.idle_outputs() {
            tracing::error!("Could not idle motor outputs, driver left busy: {}", e);
            return Err(e);
        }
        std::thread::sleep(self.timing.settle_delay);
        self.busy.release();
        tracing::debug!("Motor stopped and settled");
        Ok(())
    }

    fn wait_pulses(
        &self,
        target: u32,
        max_time: Duration,
        observer: &mut dyn PulseObserver,
    ) -> Result<bool, DriverError> {
        let mut edges = EdgeCounter::new();
        pulse_loop(target, max_time, self.timing.poll_interval, observer, || {
            let level = self.pins().read_feedback()?;
            Ok(edges.sample(level))
        })
    }

    fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }
}
