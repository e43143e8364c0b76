//! Durable single-line journal holding the door status.
//!
//! [`JournalStore`] does blocking, synced writes; [`writer::JournalWriter`]
//! moves them off the caller's thread for the pulse-counting loop.

pub mod writer;

use crate::status::Status;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use writer::{DrainReport, JournalWriter, WriteId};

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal file {0} does not exist; it must hold the current system status")]
    Missing(PathBuf),
    #[error("journal file {0} is empty; it must hold the current system status")]
    Empty(PathBuf),
    #[error("IO error on journal {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("journal writer has shut down")]
    WriterClosed,
    #[error("failed to start journal writer: {0}")]
    Spawn(#[source] io::Error),
}

/// Stateless access to the journal file.
#[derive(Debug, Clone)]
pub struct JournalStore {
    path: PathBuf,
}

impl JournalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted status. A missing or blank file is a provisioning
    /// error and is never papered over with a default.
    pub fn load(&self) -> Result<Status, JournalError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::error!("Journal file {} does not exist", self.path.display());
                return Err(JournalError::Missing(self.path.clone()));
            }
            Err(e) => return Err(self.io_error(e)),
        };
        if content.trim().is_empty() {
            tracing::error!("Journal file {} is empty", self.path.display());
            return Err(JournalError::Empty(self.path.clone()));
        }
        let status = Status::parse(&content);
        tracing::debug!("Loaded journal {}: {}", self.path.display(), status);
        Ok(status)
    }

    /// Replace the journal content and sync it to storage before returning.
    ///
    /// The line is written to a sibling temp file which is synced and renamed
    /// over the journal, so a crash mid-write leaves either the old or the new
    /// line, never a truncated file. A symlinked journal is followed and its
    /// target replaced, leaving the link in place.
    pub fn write(&self, status: &Status) -> Result<(), JournalError> {
        let result = (|| {
            let target = self.resolve_target()?;
            let tmp = tmp_path(&target);
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(status.to_string().as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, &target)?;
            sync_parent_dir(&target)
        })();
        result.map_err(|e| self.io_error(e))?;
        tracing::debug!("Journal written and synced: {}", status);
        Ok(())
    }

    fn resolve_target(&self) -> io::Result<PathBuf> {
        match fs::canonicalize(&self.path) {
            Ok(target) => Ok(target),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(self.path.clone()),
            Err(e) => Err(e),
        }
    }

    fn io_error(&self, source: io::Error) -> JournalError {
        JournalError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn tmp_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}
