//! Execution controller: one submission end to end.
//!
//! ```text
//! source ──► Instrumenter ──► Compiler ──► Supervisor ─┬─► output ──► sink
//!                                              ▲        │
//!                                              │        └─► marker ──► affordance
//!                                              │                          │
//!                                              └──── value ◄── RelayTable ◄┘
//! ```
//!
//! Whatever happens, the lifecycle guard terminates the program and removes
//! the build directory before [`ExecutionController::execute`] returns.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::abort::AbortHandle;
use crate::colors::{RED, RESET};
use crate::compile::{CCompiler, CompileOutcome, CompileRequest, Compiler, colorize_diagnostics};
use crate::config::ExecutionConfig;
use crate::display::{DisplaySink, InputAffordance, Transcript};
use crate::error::{Error, Result};
use crate::instrument::Instrumenter;
use crate::lifecycle::LifecycleGuard;
use crate::relay::{AwaitOutcome, RelayTable, WaitPolicy};
use crate::session::ExecutionSession;
use crate::supervisor::{Pump, Supervisor};

/// Notice appended when the user aborts a submission.
pub const INTERRUPTED_NOTICE: &str = "\n\x1b[31m> Execution interrupted by user.\x1b[0m\n";

/// Terminal status of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The program ran and exited.
    Ok,
    /// Build or launch failed; the transcript explains why.
    Failed,
    /// The user aborted the submission.
    Aborted,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

/// Summary of one submission.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub status: ExecutionStatus,
    /// Exit code of the program, when it exited normally.
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

enum Finished {
    Exited(Option<i32>),
    BuildFailed,
}

/// Drives submissions through build, run and input relay.
pub struct ExecutionController<C: Compiler = CCompiler> {
    compiler: C,
    instrumenter: Instrumenter,
    config: ExecutionConfig,
    relay: RelayTable,
    relay_url: Option<String>,
    guard: LifecycleGuard,
}

impl<C: Compiler> ExecutionController<C> {
    /// Create a controller answering input requests from `relay`.
    pub fn new(compiler: C, relay: RelayTable, config: ExecutionConfig) -> Result<Self> {
        let instrumenter = Instrumenter::new(config.marker.clone(), compiler.source_name())?;
        let guard = LifecycleGuard::new(config.termination_grace);

        Ok(Self {
            compiler,
            instrumenter,
            config,
            relay,
            relay_url: None,
            guard,
        })
    }

    /// Advertise `url` as the relay address in input affordances.
    pub fn with_relay_url(mut self, url: impl Into<String>) -> Self {
        self.relay_url = Some(url.into());
        self
    }

    /// The compiler collaborator.
    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    /// The relay table answers are read from.
    pub fn relay(&self) -> &RelayTable {
        &self.relay
    }

    /// The execution configuration.
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// The source instrumenter.
    pub fn instrumenter(&self) -> &Instrumenter {
        &self.instrumenter
    }

    /// Run one submission. Never fails: errors end up in the transcript and
    /// the returned status.
    pub fn execute(
        &self,
        source: &str,
        sink: &mut dyn DisplaySink,
        abort: &AbortHandle,
    ) -> ExecutionReport {
        let start = Instant::now();
        let mut transcript = Transcript::new(sink);

        let result = match ExecutionSession::create() {
            Ok(mut session) => {
                tracing::info!("Starting submission in {}", session.build_dir().display());
                let result = self.drive(source, &mut session, &mut transcript, abort);

                if let Some(request) = session.pending_request() {
                    self.relay.withdraw(request);
                    session.set_pending_request(None);
                }
                self.guard.terminate(&mut session);
                self.guard.cleanup(&mut session);
                result
            }
            Err(e) => Err(e),
        };

        let (status, exit_code) = match result {
            Ok(Finished::Exited(code)) => (ExecutionStatus::Ok, code),
            Ok(Finished::BuildFailed) => (ExecutionStatus::Failed, None),
            Err(Error::Aborted) => {
                transcript.append(INTERRUPTED_NOTICE);
                (ExecutionStatus::Aborted, None)
            }
            Err(e) => {
                transcript.append(&format!("{RED}Error: {e}{RESET}\n"));
                (ExecutionStatus::Failed, None)
            }
        };

        tracing::info!("Submission finished: {}", status.as_str());
        ExecutionReport {
            status,
            exit_code,
            duration: start.elapsed(),
        }
    }

    fn drive(
        &self,
        source: &str,
        session: &mut ExecutionSession,
        transcript: &mut Transcript<'_>,
        abort: &AbortHandle,
    ) -> Result<Finished> {
        check_abort(abort)?;

        let instrumented = self.instrumenter.instrument(source);
        let outcome = self.compiler.compile(&CompileRequest {
            source: &instrumented.text,
            work_dir: session.build_dir(),
            extra_flags: &instrumented.extra_flags,
        })?;

        let source_name = self.compiler.source_name();
        let executable = match outcome {
            CompileOutcome::Failed { diagnostics } => {
                transcript.append(&colorize_diagnostics(&diagnostics, source_name));
                return Ok(Finished::BuildFailed);
            }
            CompileOutcome::Success {
                executable,
                diagnostics,
            } => {
                if !diagnostics.trim().is_empty() {
                    transcript.append(&colorize_diagnostics(&diagnostics, source_name));
                }
                executable
            }
        };

        check_abort(abort)?;
        if !executable.exists() {
            return Err(Error::Launch {
                path: executable,
                message: "executable not found".to_string(),
            });
        }

        let supervisor = Supervisor::spawn(&executable, session.build_dir(), &self.config)?;
        session.attach(supervisor);

        loop {
            let Some(supervisor) = session.supervisor_mut() else {
                return Ok(Finished::Exited(None));
            };

            match supervisor.pump(&mut |text: &str| transcript.append(text), abort) {
                Pump::Exited(status) => {
                    return Ok(Finished::Exited(status.and_then(|s| s.code())));
                }
                Pump::Aborted => return Err(Error::Aborted),
                Pump::InputRequested => {
                    let value = self.solicit_input(session, transcript, abort)?;
                    if let Some(supervisor) = session.supervisor_mut() {
                        supervisor.provide_input(&value);
                    }
                }
            }
        }
    }

    /// Show an affordance and wait for the answer.
    fn solicit_input(
        &self,
        session: &mut ExecutionSession,
        transcript: &mut Transcript<'_>,
        abort: &AbortHandle,
    ) -> Result<String> {
        let request_id = self.relay.open();
        session.set_pending_request(Some(request_id));

        transcript.show_input(&InputAffordance {
            request_id,
            relay_url: self.relay_url.clone(),
        });

        let policy = WaitPolicy {
            poll_interval: self.config.input_poll_interval,
            timeout: self.config.input_timeout,
        };
        let outcome = self.relay.await_value(request_id, &policy, abort);
        session.set_pending_request(None);

        let value = match outcome {
            AwaitOutcome::Value(value) => value,
            AwaitOutcome::Cancelled | AwaitOutcome::TimedOut => {
                check_abort(abort)?;
                tracing::debug!(
                    "No input for request {}; using {:?}",
                    request_id,
                    self.config.default_input
                );
                self.config.default_input.clone()
            }
        };

        transcript.clear(true);
        transcript.echo_input(&value);
        Ok(value)
    }
}

fn check_abort(abort: &AbortHandle) -> Result<()> {
    if abort.is_aborted() {
        Err(Error::Aborted)
    } else {
        Ok(())
    }
}
