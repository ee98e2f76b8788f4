//! Execution sessions.
//!
//! An [`ExecutionSession`] is one run of one compiled program: an isolated
//! build directory, the supervised process, and the input request currently
//! pending, if any. It is created at the start of a submission and torn
//! down at the end through the lifecycle guard. Dropping a session that
//! still holds a process terminates it.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::Result;
use crate::lifecycle::LifecycleGuard;
use crate::relay::RequestId;
use crate::supervisor::Supervisor;

/// One end-to-end run of one compiled program.
pub struct ExecutionSession {
    build_dir: Option<TempDir>,
    build_path: PathBuf,
    supervisor: Option<Supervisor>,
    pending_request: Option<RequestId>,
}

impl ExecutionSession {
    /// Create a session with a fresh build directory under the system
    /// temp dir.
    pub fn create() -> Result<Self> {
        let build_dir = tempfile::Builder::new().prefix("ceres-").tempdir()?;
        Ok(Self::with_build_dir(build_dir))
    }

    /// Create a session with a fresh build directory under `parent`.
    pub fn create_in(parent: &Path) -> Result<Self> {
        let build_dir = tempfile::Builder::new().prefix("ceres-").tempdir_in(parent)?;
        Ok(Self::with_build_dir(build_dir))
    }

    fn with_build_dir(build_dir: TempDir) -> Self {
        Self {
            build_path: build_dir.path().to_path_buf(),
            build_dir: Some(build_dir),
            supervisor: None,
            pending_request: None,
        }
    }

    /// Path of the isolated build directory.
    pub fn build_dir(&self) -> &Path {
        &self.build_path
    }

    /// Attach the supervised program.
    pub fn attach(&mut self, supervisor: Supervisor) {
        self.supervisor = Some(supervisor);
    }

    /// The supervised program, if running.
    pub fn supervisor_mut(&mut self) -> Option<&mut Supervisor> {
        self.supervisor.as_mut()
    }

    /// Take the supervised program out of the session.
    pub(crate) fn detach(&mut self) -> Option<Supervisor> {
        self.supervisor.take()
    }

    /// The input request awaiting an answer.
    pub fn pending_request(&self) -> Option<RequestId> {
        self.pending_request
    }

    pub(crate) fn set_pending_request(&mut self, request: Option<RequestId>) {
        self.pending_request = request;
    }

    /// Remove the build directory, best effort.
    pub(crate) fn remove_build_dir(&mut self) {
        let Some(dir) = self.build_dir.take() else {
            return;
        };
        if let Err(e) = dir.close() {
            // Typically a file still locked by the OS; it goes with the temp dir.
            tracing::debug!("Could not remove {}: {}", self.build_path.display(), e);
        }
    }
}

impl Drop for ExecutionSession {
    fn drop(&mut self) {
        if self.supervisor.is_some() {
            LifecycleGuard::default().terminate(self);
        }
    }
}
