//! Escalating termination and build-directory cleanup.
//!
//! Termination walks three steps, independent of the OS process API:
//!
//! ```text
//! RequestTermination ──► Wait { deadline } ──► KillTree ──► Done
//!                              │ exited
//!                              └──────────────────────────► Done
//! ```
//!
//! The platform-specific signals live behind [`ProcessTree`].
//!
//! Exit is detected with [`peek_exit`], which leaves the leader unreaped.
//! While the zombie exists its pid, and so its process group id, cannot be
//! reused, so the group sweep never reaches an unrelated group.

use std::io;
use std::process::{Child, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use crate::session::ExecutionSession;

/// How long to wait for the output reader after the tree is gone.
const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How a termination ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// No process was running.
    NotRunning,
    /// The program had already exited.
    AlreadyExited,
    /// The program exited after the graceful request.
    Graceful,
    /// The process tree had to be killed.
    Forced,
}

/// Platform mechanism for signalling a program and its descendants.
pub trait ProcessTree: Send + Sync {
    /// Ask the program to exit.
    fn request_termination(&self, child: &mut Child);

    /// Forcefully kill the program and every descendant.
    fn kill_tree(&self, child: &mut Child);
}

/// Process-group signals on Unix, `taskkill /T` on Windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformTree;

#[cfg(unix)]
impl PlatformTree {
    fn signal_group(child: &Child, signal: libc::c_int) {
        // The supervisor spawns each program as the leader of its own group.
        let pgid = child.id() as libc::pid_t;
        // SAFETY: kill(2) has no memory-safety preconditions; a stale group
        // id yields ESRCH.
        let rc = unsafe { libc::kill(-pgid, signal) };
        if rc != 0 {
            tracing::debug!(
                "kill(-{}, {}) failed: {}",
                pgid,
                signal,
                std::io::Error::last_os_error()
            );
        }
    }
}

#[cfg(unix)]
impl ProcessTree for PlatformTree {
    fn request_termination(&self, child: &mut Child) {
        Self::signal_group(child, libc::SIGTERM);
    }

    fn kill_tree(&self, child: &mut Child) {
        Self::signal_group(child, libc::SIGKILL);
    }
}

#[cfg(windows)]
impl ProcessTree for PlatformTree {
    fn request_termination(&self, child: &mut Child) {
        let _ = child.kill();
    }

    fn kill_tree(&self, child: &mut Child) {
        let _ = std::process::Command::new("taskkill")
            .args(["/F", "/T", "/PID", &child.id().to_string()])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status();
        let _ = child.kill();
    }
}

/// State of a program's leader process.
enum Leader {
    Running,
    /// Exited; on Linux still unreaped, so its id is reserved.
    Exited(ExitStatus),
    /// Already reaped by someone else.
    Reaped,
}

#[cfg(target_os = "linux")]
fn leader_state(child: &mut Child) -> io::Result<Leader> {
    use std::os::unix::process::ExitStatusExt;

    // SAFETY: siginfo_t is a plain C struct; all-zero is a valid value.
    let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
    // SAFETY: `info` is a valid, writable siginfo_t for the duration of the call.
    let rc = unsafe {
        libc::waitid(
            libc::P_PID,
            child.id() as libc::id_t,
            &mut info,
            libc::WEXITED | libc::WNOHANG | libc::WNOWAIT,
        )
    };
    if rc != 0 {
        let err = io::Error::last_os_error();
        return match err.raw_os_error() {
            Some(libc::ECHILD) => Ok(Leader::Reaped),
            _ => Err(err),
        };
    }

    // SAFETY: waitid either filled `info` for an exited child or left it zeroed.
    let (pid, status) = unsafe { (info.si_pid(), info.si_status()) };
    if pid == 0 {
        return Ok(Leader::Running);
    }

    let raw = match info.si_code {
        libc::CLD_EXITED => (status & 0xff) << 8,
        libc::CLD_KILLED => status & 0x7f,
        libc::CLD_DUMPED => (status & 0x7f) | 0x80,
        _ => return Ok(Leader::Running),
    };
    Ok(Leader::Exited(ExitStatus::from_raw(raw)))
}

// Without `WNOWAIT` detection reaps the leader.
#[cfg(not(target_os = "linux"))]
fn leader_state(child: &mut Child) -> io::Result<Leader> {
    Ok(match child.try_wait()? {
        Some(status) => Leader::Exited(status),
        None => Leader::Running,
    })
}

/// Exit status of `child` if it has exited.
///
/// On Linux the child is left unreaped; the lifecycle guard reaps it after
/// sweeping its process group.
pub fn peek_exit(child: &mut Child) -> io::Result<Option<ExitStatus>> {
    match leader_state(child)? {
        Leader::Running => Ok(None),
        Leader::Exited(status) => Ok(Some(status)),
        Leader::Reaped => child.try_wait(),
    }
}

fn reap(child: &mut Child) {
    if let Err(e) = child.wait() {
        tracing::debug!("Failed to reap pid {}: {}", child.id(), e);
    }
}

enum Step {
    RequestTermination,
    Wait { deadline: Instant },
    KillTree,
    Done(Termination),
}

/// Guarantees no process, thread or build directory outlives a submission.
pub struct LifecycleGuard<T: ProcessTree = PlatformTree> {
    grace: Duration,
    poll_interval: Duration,
    tree: T,
}

impl LifecycleGuard<PlatformTree> {
    /// Create a guard using the platform's process-tree mechanism.
    pub fn new(grace: Duration) -> Self {
        Self::with_tree(grace, PlatformTree)
    }
}

impl Default for LifecycleGuard<PlatformTree> {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}

impl<T: ProcessTree> LifecycleGuard<T> {
    /// Create a guard with a custom process-tree mechanism.
    pub fn with_tree(grace: Duration, tree: T) -> Self {
        Self {
            grace,
            poll_interval: Duration::from_millis(10),
            tree,
        }
    }

    /// Terminate the session's program, if any.
    ///
    /// Idempotent: later calls find nothing running.
    pub fn terminate(&self, session: &mut ExecutionSession) -> Termination {
        let Some(mut supervisor) = session.detach() else {
            return Termination::NotRunning;
        };

        let pid = supervisor.pid();
        let termination = self.escalate(supervisor.child_mut());
        supervisor.shutdown_reader(READER_JOIN_TIMEOUT);

        tracing::debug!("Terminated pid {}: {:?}", pid, termination);
        termination
    }

    /// Run the escalation steps against one child.
    pub fn escalate(&self, child: &mut Child) -> Termination {
        let mut step = match leader_state(child) {
            Ok(Leader::Exited(_)) => {
                // Descendants may outlive the program; sweep the group while
                // the unreaped leader still reserves its id.
                self.tree.kill_tree(child);
                reap(child);
                Step::Done(Termination::AlreadyExited)
            }
            // The group id may already belong to someone else.
            Ok(Leader::Reaped) => Step::Done(Termination::AlreadyExited),
            Ok(Leader::Running) | Err(_) => Step::RequestTermination,
        };

        loop {
            step = match step {
                Step::RequestTermination => {
                    self.tree.request_termination(child);
                    Step::Wait {
                        deadline: Instant::now() + self.grace,
                    }
                }
                Step::Wait { deadline } => match leader_state(child) {
                    Ok(Leader::Exited(_)) => {
                        self.tree.kill_tree(child);
                        reap(child);
                        Step::Done(Termination::Graceful)
                    }
                    Ok(Leader::Reaped) => Step::Done(Termination::Graceful),
                    Ok(Leader::Running) if Instant::now() < deadline => {
                        thread::sleep(self.poll_interval);
                        Step::Wait { deadline }
                    }
                    _ => Step::KillTree,
                },
                Step::KillTree => {
                    self.tree.kill_tree(child);
                    reap(child);
                    Step::Done(Termination::Forced)
                }
                Step::Done(termination) => return termination,
            };
        }
    }

    /// Remove the session's build directory. Failures are ignored.
    pub fn cleanup(&self, session: &mut ExecutionSession) {
        session.remove_build_dir();
    }
}
