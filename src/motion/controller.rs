// src/motion/controller.rs - Journaled open/close state machine
use crate::config::Config;
use crate::hardware::{DriverError, MotorDriver, PulseObserver};
use crate::journal::{JournalError, JournalStore, JournalWriter};
use crate::status::{Status, Travel};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock, TryLockError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
    #[error("cannot resume from status '{status}'; manual intervention is needed")]
    ResumeRefused { status: Status },
}

/// What happened to an `open`/`close` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationResult {
    Opened,
    Closed,
    /// The pulse target was not reached within the maximum runtime.
    FailedTimeout,
    /// The door was not in the required end state; nothing changed.
    PreconditionViolation,
    /// Another operation holds the motor; nothing changed.
    MotorBusy,
}

impl OperationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Opened | OperationResult::Closed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    pub journal_path: PathBuf,
    pub open_pulses: u32,
    pub close_pulses: u32,
    pub max_time: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ControllerSettings {
    fn from(config: &Config) -> Self {
        Self {
            journal_path: config.controller.journal_path.clone(),
            open_pulses: config.controller.open_pulses,
            close_pulses: config.controller.close_pulses,
            max_time: config.controller.max_time(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Durability {
    /// Queued on the journal writer; used inside the pulse loop.
    Background,
    /// Written and synced before returning.
    Synced,
}

/// Owns the door status, its journal and the motor.
///
/// Only one `open`/`close`/`resume` runs at a time; a concurrent request is
/// answered with [`OperationResult::MotorBusy`]. `status()` stays readable
/// while an operation is in flight.
pub struct MotionController {
    settings: ControllerSettings,
    status: RwLock<Status>,
    journal: JournalStore,
    writer: JournalWriter,
    driver: Arc<dyn MotorDriver>,
    operation: Mutex<()>,
}

impl MotionController {
    /// Load the journal and take ownership of the motor. Fails if the journal
    /// is missing or empty.
    pub fn new(
        settings: ControllerSettings,
        driver: Arc<dyn MotorDriver>,
    ) -> Result<Self, ControlError> {
        let journal = JournalStore::new(&settings.journal_path);
        let status = journal.load()?;
        let writer = JournalWriter::spawn(journal.clone())?;
        tracing::info!(
            "Controller ready: status '{}', journal {}, open={} close={} pulses, max runtime {:?}",
            status,
            journal.path().display(),
            settings.open_pulses,
            settings.close_pulses,
            settings.max_time
        );
        if status.in_progress().is_some() {
            tracing::warn!("Journal shows an interrupted operation: '{}'", status);
        }
        Ok(Self {
            settings,
            status: RwLock::new(status),
            journal,
            writer,
            driver,
            operation: Mutex::new(()),
        })
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Current in-memory status.
    pub fn status(&self) -> Status {
        self.status
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_busy(&self) -> bool {
        self.driver.is_busy()
    }

    /// Open fully from `closed`.
    pub fn open(&self) -> Result<OperationResult, ControlError> {
        self.open_with(self.settings.open_pulses, false)
    }

    /// Close fully from `open`.
    pub fn close(&self) -> Result<OperationResult, ControlError> {
        self.close_with(self.settings.close_pulses, false)
    }

    /// Open for `pulses` pulses. When `resuming`, the `closed` precondition
    /// is skipped and the journal is assumed to already say `opening`.
    pub fn open_with(&self, pulses: u32, resuming: bool) -> Result<OperationResult, ControlError> {
        self.run(Travel::Opening, pulses, resuming)
    }

    pub fn close_with(&self, pulses: u32, resuming: bool) -> Result<OperationResult, ControlError> {
        self.run(Travel::Closing, pulses, resuming)
    }

    /// Continue an interrupted `opening`/`closing` from its journaled
    /// remaining count.
    ///
    /// Returns `Ok(false)` when there is nothing to resume or another
    /// operation holds the motor. Failed and unrecognized statuses are
    /// refused: the physical position is unknown and the motor must not move.
    pub fn resume(&self) -> Result<bool, ControlError> {
        Ok(self.resume_outcome()?.is_some())
    }

    /// Like [`resume`](Self::resume), but reports how the resumed operation
    /// ended. `None` means nothing was driven.
    pub fn resume_outcome(&self) -> Result<Option<OperationResult>, ControlError> {
        let status = self.status();
        match status.in_progress() {
            Some((travel, remaining)) => {
                tracing::info!("Resuming interrupted '{}' action, {} pulses remaining", travel.as_str(), remaining);
                let result = self.run(travel, remaining, true)?;
                if result == OperationResult::MotorBusy {
                    tracing::warn!("Resume skipped: motor busy");
                    return Ok(None);
                }
                tracing::info!("Resume complete: {:?}, status now '{}'", result, self.status());
                Ok(Some(result))
            }
            None if status.is_end_state() => {
                tracing::info!("Nothing to resume, current status: {}", status);
                Ok(None)
            }
            None => {
                tracing::error!("Cannot resume from status '{}'", status);
                Err(ControlError::ResumeRefused { status })
            }
        }
    }

    /// Resume at startup if requested. Failures are logged, not returned, so
    /// the caller can keep serving `status`.
    pub fn resume_on_start(&self) {
        match self.resume_outcome() {
            Ok(Some(result)) if !result.is_success() => tracing::error!(
                "Resumed operation did not complete ({:?}), manual intervention is needed. Current status: {}",
                result,
                self.status()
            ),
            Ok(_) => {}
            Err(e) => tracing::error!(
                "Resume failed, manual intervention is needed. Current status: {} ({})",
                self.status(),
                e
            ),
        }
    }

    fn run(&self, travel: Travel, pulses: u32, resuming: bool) -> Result<OperationResult, ControlError> {
        let _operation = match self.operation.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                tracing::warn!("Aborted {}: another operation is in progress", travel.as_str());
                return Ok(OperationResult::MotorBusy);
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        if !resuming {
            let current = self.status();
            if current != travel.start_state() {
                tracing::warn!(
                    "Journal says status is '{}', not {}",
                    current,
                    travel.as_str()
                );
                return Ok(OperationResult::PreconditionViolation);
            }
        }

        tracing::info!("{} for {} pulses...", capitalize(travel.as_str()), pulses);
        let acquired = match travel {
            Travel::Opening => self.driver.drive_forward()?,
            Travel::Closing => self.driver.drive_reverse()?,
        };
        if !acquired {
            tracing::warn!("Aborted {}: motor busy", travel.as_str());
            self.writer.drain_all();
            return Ok(OperationResult::MotorBusy);
        }

        let outcome = self.drive(travel, pulses, resuming);
        let settled = self.driver.stop_and_settle();

        let reached = match (outcome, settled) {
            (Ok(reached), Ok(())) => reached,
            (Err(e), settled) => {
                tracing::error!("FAILED during {}: {}", travel.as_str(), e);
                if let Err(stop_err) = settled {
                    tracing::error!("Motor stop also failed: {}", stop_err);
                }
                self.journal_failure(travel);
                return Err(e);
            }
            (Ok(_), Err(stop_err)) => {
                tracing::error!("FAILED to stop motor after {}: {}", travel.as_str(), stop_err);
                self.journal_failure(travel);
                return Err(stop_err.into());
            }
        };

        if reached {
            self.update_status(travel.done_state(), Durability::Synced)?;
            tracing::info!("{}", capitalize(&travel.done_state().to_string()));
            Ok(match travel {
                Travel::Opening => OperationResult::Opened,
                Travel::Closing => OperationResult::Closed,
            })
        } else {
            self.update_status(travel.failed_state(), Durability::Synced)?;
            tracing::error!("FAILED during {}, hit max runtime", travel.as_str());
            Ok(OperationResult::FailedTimeout)
        }
    }

    /// Best effort: the caller is already returning an error.
    fn journal_failure(&self, travel: Travel) {
        if let Err(write_err) = self.update_status(travel.failed_state(), Durability::Synced) {
            tracing::error!("Could not journal failure: {}", write_err);
        }
    }

    fn drive(&self, travel: Travel, pulses: u32, resuming: bool) -> Result<bool, ControlError> {
        if !resuming {
            self.update_status(travel.in_progress(pulses), Durability::Background)?;
        }
        let mut observer = JournalingObserver {
            controller: self,
            travel,
        };
        let reached = self
            .driver
            .wait_pulses(pulses, self.settings.max_time, &mut observer)?;
        Ok(reached)
    }

    /// Single entry point for status changes. A synced write first drains
    /// every queued background write so the journal ends on this value.
    fn update_status(&self, status: Status, durability: Durability) -> Result<(), ControlError> {
        *self
            .status
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = status.clone();
        match durability {
            Durability::Background => {
                self.writer.submit(status)?;
            }
            Durability::Synced => {
                self.writer.drain_all();
                self.journal.write(&status)?;
            }
        }
        Ok(())
    }
}

/// Journals `"<travel> <remaining>"` after each pulse and reaps finished
/// writes at the poll cadence.
struct JournalingObserver<'a> {
    controller: &'a MotionController,
    travel: Travel,
}

impl PulseObserver for JournalingObserver<'_> {
    fn on_tick(&mut self) {
        self.controller.writer.reap_completed();
    }

    fn on_pulse(&mut self, remaining: u32) {
        let status = self.travel.in_progress(remaining);
        if let Err(e) = self.controller.update_status(status, Durability::Background) {
            tracing::error!("Could not queue journal update: {}", e);
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
