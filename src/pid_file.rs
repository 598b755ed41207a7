//! The PID file at `<project>/run/server.pid`.
//!
//! Its presence is the only record that a background server was started by
//! qgmcp. Writes go through a temporary file and a rename so a concurrent
//! `stop` or `status` sees either the previous contents or the new PID, never a
//! partial write. Anything unreadable is treated as absent.

use crate::Result;
use crate::error::FileError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const RUN_DIR: &str = "run";
pub const PID_FILE_NAME: &str = "server.pid";

#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn for_project(project_dir: &Path) -> Self {
        Self::new(project_dir.join(RUN_DIR).join(PID_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Returns the recorded PID, or `None` if the file is missing, unreadable, or
    /// does not hold a positive integer.
    pub fn read(&self) -> Option<u32> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read PID file {}: {e}", self.path.display());
                return None;
            }
        };
        match raw.trim().parse::<u32>() {
            Ok(0) | Err(_) => {
                warn!(
                    "Ignoring PID file {} with invalid contents {:?}",
                    self.path.display(),
                    raw.trim()
                );
                None
            }
            Ok(pid) => Some(pid),
        }
    }

    pub fn write(&self, pid: u32) -> std::result::Result<(), FileError> {
        let write_error = |source| FileError::WriteError {
            path: self.path.clone(),
            source,
        };
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(write_error)?;
        }
        let tmp = self.path.with_extension("pid.tmp");
        let result = fs::File::create(&tmp)
            .and_then(|mut f| {
                f.write_all(pid.to_string().as_bytes())?;
                f.sync_all()
            })
            .and_then(|_| fs::rename(&tmp, &self.path));
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(write_error(e));
        }
        debug!("wrote pid {pid} to {}", self.path.display());
        Ok(())
    }

    /// Removes the file. Returns whether there was anything to remove.
    pub fn delete(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(FileError::RemoveError {
                path: self.path.clone(),
                source,
            }
            .into()),
        }
    }
}
