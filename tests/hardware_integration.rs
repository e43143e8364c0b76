// Hardware-level integration tests: pulse counting, GPIO path, power loss mid-drive

use pulse_gate::hardware::{
    Channel, DriverError, DriverTiming, GpioMotor, GpioPins, Level, MotorDriver, PulseObserver,
    SimulatedMotor,
};
use pulse_gate::{ControlError, ControllerSettings, MotionController, OperationResult, Status};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn fast_timing() -> DriverTiming {
    DriverTiming {
        poll_interval: Duration::from_millis(1),
        settle_delay: Duration::from_millis(1),
    }
}

#[derive(Default)]
struct Remaining(Vec<u32>);

impl PulseObserver for Remaining {
    fn on_pulse(&mut self, remaining: u32) {
        self.0.push(remaining);
    }
}

#[test]
fn test_wait_pulses_reaches_zero_remaining() {
    let motor = SimulatedMotor::new(fast_timing()).with_pulse_period(Duration::from_millis(2));
    let mut seen = Remaining::default();
    assert!(motor.wait_pulses(4, Duration::from_secs(1), &mut seen).unwrap());
    assert_eq!(seen.0, vec![3, 2, 1, 0]);
}

#[test]
fn test_wait_pulses_partial_progress_on_timeout() {
    let motor = SimulatedMotor::new(fast_timing())
        .with_pulse_period(Duration::from_millis(2))
        .stall_after(3);
    let mut seen = Remaining::default();
    assert!(!motor.wait_pulses(7, Duration::from_millis(60), &mut seen).unwrap());
    // remaining == k - observed
    assert_eq!(seen.0.last(), Some(&4));
}

/// Square-wave feedback shared with the test so writes can be inspected.
#[derive(Clone, Default)]
struct BenchPins {
    state: Arc<Mutex<BenchState>>,
}

#[derive(Default)]
struct BenchState {
    samples: u32,
    half_period: u32,
    start_high: bool,
    writes: Vec<(Channel, Level)>,
    /// 1-based `set_level` call that fails.
    fail_write: Option<usize>,
    /// 1-based feedback read that fails.
    fail_read: Option<u32>,
}

fn bench_fault(what: &str) -> DriverError {
    DriverError::Gpio {
        path: format!("/bench/{what}").into(),
        source: io::Error::other("bench fault"),
    }
}

impl GpioPins for BenchPins {
    fn set_level(&mut self, channel: Channel, level: Level) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_write == Some(state.writes.len() + 1) {
            state.fail_write = None;
            return Err(bench_fault("value"));
        }
        state.writes.push((channel, level));
        Ok(())
    }

    fn read_feedback(&mut self) -> Result<Level, DriverError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_read == Some(state.samples + 1) {
            return Err(bench_fault("feedback"));
        }
        let phase = (state.samples / state.half_period) % 2 == 0;
        state.samples += 1;
        Ok(if phase == state.start_high { Level::High } else { Level::Low })
    }
}

fn write_journal(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("pimc_status");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_gpio_motor_drives_controller() {
    let dir = tempfile::tempdir().unwrap();
    let pins = BenchPins::default();
    pins.state.lock().unwrap().half_period = 2;
    let motor = Arc::new(GpioMotor::new(pins.clone(), fast_timing()).unwrap());
    let settings = ControllerSettings {
        journal_path: write_journal(dir.path(), "open"),
        open_pulses: 3,
        close_pulses: 3,
        max_time: Duration::from_secs(2),
    };
    let controller = MotionController::new(settings, motor).unwrap();

    assert_eq!(controller.close().unwrap(), OperationResult::Closed);
    assert_eq!(fs::read_to_string(dir.path().join("pimc_status")).unwrap(), "closed");

    let writes = pins.state.lock().unwrap().writes.clone();
    assert!(writes.contains(&(Channel::Reverse, Level::Low)));
    assert!(!writes.contains(&(Channel::Forward, Level::Low)));
    assert_eq!(
        &writes[writes.len() - 2..],
        &[(Channel::Forward, Level::High), (Channel::Reverse, Level::High)]
    );
}

fn gpio_rig(
    pins: &BenchPins,
    initial: &str,
    open_pulses: u32,
) -> (tempfile::TempDir, Arc<GpioMotor<BenchPins>>, MotionController) {
    let dir = tempfile::tempdir().unwrap();
    let motor = Arc::new(GpioMotor::new(pins.clone(), fast_timing()).unwrap());
    let settings = ControllerSettings {
        journal_path: write_journal(dir.path(), initial),
        open_pulses,
        close_pulses: open_pulses,
        max_time: Duration::from_secs(2),
    };
    let controller = MotionController::new(settings, motor.clone()).unwrap();
    (dir, motor, controller)
}

#[test]
fn test_feedback_read_failure_journals_failed_state() {
    let pins = BenchPins::default();
    {
        let mut state = pins.state.lock().unwrap();
        state.half_period = 1;
        state.fail_read = Some(3);
    }
    let (dir, motor, controller) = gpio_rig(&pins, "closed", 5);

    let err = controller.open().unwrap_err();
    assert!(matches!(err, ControlError::Driver(DriverError::Gpio { .. })), "{err}");
    assert_eq!(controller.status(), Status::FailedOpening);
    assert_eq!(fs::read_to_string(dir.path().join("pimc_status")).unwrap(), "failed opening");

    // The stop still went through, so the motor is released and idle.
    assert!(!motor.is_busy());
    let writes = pins.state.lock().unwrap().writes.clone();
    assert_eq!(
        &writes[writes.len() - 2..],
        &[(Channel::Forward, Level::High), (Channel::Reverse, Level::High)]
    );
}

#[test]
fn test_stop_failure_after_target_is_not_journaled_as_done() {
    let pins = BenchPins::default();
    {
        let mut state = pins.state.lock().unwrap();
        state.half_period = 1;
        // Two idle writes at construction, two idle writes plus the drive
        // write at start; the sixth is the first write of the stop.
        state.fail_write = Some(6);
    }
    let (dir, motor, controller) = gpio_rig(&pins, "closed", 2);

    let err = controller.open().unwrap_err();
    assert!(matches!(err, ControlError::Driver(_)), "{err}");
    assert_eq!(controller.status(), Status::FailedOpening);
    assert_eq!(fs::read_to_string(dir.path().join("pimc_status")).unwrap(), "failed opening");

    // Outputs were never idled: the driver stays busy and refuses new drives.
    assert!(motor.is_busy());
    assert!(controller.is_busy());
    assert!(!motor.drive_reverse().unwrap());
    assert_eq!(pins.state.lock().unwrap().writes.last(), Some(&(Channel::Forward, Level::Low)));
}

#[test]
fn test_feedback_high_at_start_is_not_counted() {
    let pins = BenchPins::default();
    {
        let mut state = pins.state.lock().unwrap();
        state.half_period = 3;
        state.start_high = true;
    }
    let motor = GpioMotor::new(pins.clone(), fast_timing()).unwrap();
    let mut seen = Remaining::default();
    // Samples: H H H L L L H ... the first rising edge is at sample 7.
    assert!(motor.wait_pulses(1, Duration::from_secs(1), &mut seen).unwrap());
    assert_eq!(seen.0, vec![0]);
    assert_eq!(pins.state.lock().unwrap().samples, 7);
}

/// Dies partway through a drive, as if power were cut.
struct PowerCutMotor {
    inner: SimulatedMotor,
    cut_after: u32,
}

struct CutObserver<'a> {
    inner: &'a mut dyn PulseObserver,
    left: u32,
}

impl PulseObserver for CutObserver<'_> {
    fn on_tick(&mut self) {
        self.inner.on_tick();
    }

    fn on_pulse(&mut self, remaining: u32) {
        self.inner.on_pulse(remaining);
        self.left -= 1;
        if self.left == 0 {
            panic!("simulated power cut");
        }
    }
}

impl MotorDriver for PowerCutMotor {
    fn drive_forward(&self) -> Result<bool, DriverError> {
        self.inner.drive_forward()
    }

    fn drive_reverse(&self) -> Result<bool, DriverError> {
        self.inner.drive_reverse()
    }

    fn stop_and_settle(&self) -> Result<(), DriverError> {
        self.inner.stop_and_settle()
    }

    fn wait_pulses(
        &self,
        target: u32,
        max_time: Duration,
        observer: &mut dyn PulseObserver,
    ) -> Result<bool, DriverError> {
        let mut cut = CutObserver {
            inner: observer,
            left: self.cut_after,
        };
        self.inner.wait_pulses(target, max_time, &mut cut)
    }

    fn is_busy(&self) -> bool {
        self.inner.is_busy()
    }
}

fn settings(journal_path: std::path::PathBuf) -> ControllerSettings {
    ControllerSettings {
        journal_path,
        open_pulses: 5,
        close_pulses: 5,
        max_time: Duration::from_secs(2),
    }
}

fn simulated() -> Arc<SimulatedMotor> {
    Arc::new(SimulatedMotor::new(fast_timing()).with_pulse_period(Duration::from_millis(2)))
}

#[test]
fn test_power_cut_then_resume_matches_uninterrupted_run() {
    let crashed = tempfile::tempdir().unwrap();
    let crashed_path = write_journal(crashed.path(), "closed");

    let cut = Arc::new(PowerCutMotor {
        inner: SimulatedMotor::new(fast_timing()).with_pulse_period(Duration::from_millis(2)),
        cut_after: 2,
    });
    let controller = MotionController::new(settings(crashed_path.clone()), cut).unwrap();
    // The controller is dropped while unwinding, which flushes queued writes.
    let run = std::thread::spawn(move || controller.open());
    assert!(run.join().is_err());
    assert_eq!(fs::read_to_string(&crashed_path).unwrap(), "opening 3");

    // Restart from the crashed journal.
    let after_crash = simulated();
    let restarted = MotionController::new(settings(crashed_path.clone()), after_crash.clone()).unwrap();
    assert_eq!(restarted.status(), Status::Opening(3));
    assert!(restarted.resume().unwrap());

    // Reference: a clean run with the same remaining count.
    let clean = tempfile::tempdir().unwrap();
    let clean_path = write_journal(clean.path(), "opening 3");
    let reference = simulated();
    let uninterrupted = MotionController::new(settings(clean_path.clone()), reference.clone()).unwrap();
    assert!(uninterrupted.resume().unwrap());

    assert_eq!(fs::read_to_string(&crashed_path).unwrap(), "open");
    assert_eq!(fs::read_to_string(&clean_path).unwrap(), "open");
    assert_eq!(after_crash.pulses_delivered(), reference.pulses_delivered());
    assert_eq!(after_crash.output_events(), reference.output_events());
}
