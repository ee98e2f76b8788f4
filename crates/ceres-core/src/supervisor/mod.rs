//! Process supervisor for compiled programs.
//!
//! Spawns the artifact with piped stdin and a single pipe shared by stdout
//! and stderr, so interleaving is preserved as the program produced it. A
//! reader thread forwards output chunks into a bounded queue; [`Supervisor::pump`]
//! consumes the queue, flushes text to the caller and stops when the marker
//! token shows the program is about to block on input.
//!
//! ```text
//! Starting ──► Streaming ──► AwaitingInput ──► Streaming ──► … ──► Exited
//!                  ▲               │
//!                  └─ provide_input┘
//! ```

mod buffer;

use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use os_pipe::PipeReader;

use crate::abort::AbortHandle;
use crate::config::ExecutionConfig;
use crate::error::{Error, Result};
use crate::lifecycle::peek_exit;

pub use buffer::{BufferEvent, OutputBuffer};

/// Maximum bytes forwarded per output chunk.
const READ_CHUNK: usize = 64;

/// Supervisor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Streaming,
    AwaitingInput,
    Exited,
}

/// Why [`Supervisor::pump`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pump {
    /// The program wrote the marker and is about to read stdin.
    InputRequested,
    /// Output is drained and the program has exited.
    Exited(Option<ExitStatus>),
    /// The abort handle fired.
    Aborted,
}

/// Supervises one running program.
pub struct Supervisor {
    child: Child,
    stdin: Option<ChildStdin>,
    chunks: Receiver<Vec<u8>>,
    reader: Option<JoinHandle<()>>,
    buffer: OutputBuffer,
    state: SupervisorState,
    exit_status: Option<ExitStatus>,
    poll_interval: Duration,
}

impl Supervisor {
    /// Spawn `executable` with `work_dir` as its working directory.
    ///
    /// On Unix the program leads its own process group so the whole tree
    /// can be signalled at once.
    pub fn spawn(executable: &Path, work_dir: &Path, config: &ExecutionConfig) -> Result<Self> {
        let launch_error = |e: std::io::Error| Error::Launch {
            path: executable.to_path_buf(),
            message: e.to_string(),
        };

        let (reader, writer) = os_pipe::pipe()?;
        let stderr_writer = writer.try_clone()?;

        // The command owns the parent's copies of the write end; it must be
        // dropped right after spawning or the reader never sees EOF.
        let mut child = {
            let mut command = Command::new(executable);
            command
                .current_dir(work_dir)
                .stdin(Stdio::piped())
                .stdout(writer)
                .stderr(stderr_writer);

            #[cfg(unix)]
            {
                use std::os::unix::process::CommandExt;
                command.process_group(0);
            }

            command.spawn().map_err(launch_error)?
        };

        tracing::info!("Started {} (pid {})", executable.display(), child.id());

        let stdin = child.stdin.take();
        let (tx, chunks) = mpsc::sync_channel(config.queue_capacity.max(1));

        let reader = thread::Builder::new()
            .name("ceres-output-reader".to_string())
            .spawn(move || read_output(reader, tx));

        let reader = match reader {
            Ok(handle) => handle,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Io(e));
            }
        };

        Ok(Self {
            child,
            stdin,
            chunks,
            reader: Some(reader),
            buffer: OutputBuffer::new(&config.marker, config.flush_threshold),
            state: SupervisorState::Starting,
            exit_status: None,
            poll_interval: config.poll_interval,
        })
    }

    /// Current state.
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Process id of the program (and of its process group on Unix).
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Stream output to `out` until input is requested, the program exits,
    /// or `abort` fires.
    ///
    /// Must not be called while [`SupervisorState::AwaitingInput`]; answer
    /// with [`Supervisor::provide_input`] first.
    pub fn pump(&mut self, out: &mut dyn FnMut(&str), abort: &AbortHandle) -> Pump {
        match self.state {
            SupervisorState::AwaitingInput => return Pump::InputRequested,
            SupervisorState::Exited => return Pump::Exited(self.exit_status),
            SupervisorState::Starting | SupervisorState::Streaming => {}
        }
        self.state = SupervisorState::Streaming;

        loop {
            while let Some(event) = self.buffer.next_event() {
                match event {
                    BufferEvent::Flush(text) => out(&text),
                    BufferEvent::Marker { before } => {
                        if !before.is_empty() {
                            out(&before);
                        }
                        self.state = SupervisorState::AwaitingInput;
                        return Pump::InputRequested;
                    }
                }
            }

            if abort.is_aborted() {
                return Pump::Aborted;
            }

            match self.chunks.recv_timeout(self.poll_interval) {
                Ok(chunk) => self.buffer.push(&chunk),
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(text) = self.buffer.flush_idle() {
                        out(&text);
                    }
                    if self.exit_status.is_some() {
                        // Exited a full poll ago and the pipe is still open:
                        // a descendant holds it. The lifecycle guard sweeps it.
                        tracing::debug!("Program exited but output pipe is still open");
                        return self.finish(out);
                    }
                    if let Ok(Some(status)) = peek_exit(&mut self.child) {
                        self.exit_status = Some(status);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    while self.exit_status.is_none() {
                        match peek_exit(&mut self.child) {
                            Ok(Some(status)) => self.exit_status = Some(status),
                            Ok(None) if abort.is_aborted() => return Pump::Aborted,
                            Ok(None) => thread::sleep(self.poll_interval),
                            Err(e) => {
                                tracing::debug!("Failed to wait for program: {}", e);
                                break;
                            }
                        }
                    }
                    return self.finish(out);
                }
            }
        }
    }

    fn finish(&mut self, out: &mut dyn FnMut(&str)) -> Pump {
        if let Some(text) = self.buffer.finish() {
            out(&text);
        }
        self.state = SupervisorState::Exited;
        tracing::info!("Program exited with {:?}", self.exit_status);
        Pump::Exited(self.exit_status)
    }

    /// Write `value` and a newline to the program's stdin and resume streaming.
    ///
    /// Write failures mean the program already exited; exit detection in
    /// [`Supervisor::pump`] reports that, so they are only logged.
    pub fn provide_input(&mut self, value: &str) {
        if let Some(stdin) = self.stdin.as_mut() {
            let result = stdin
                .write_all(value.as_bytes())
                .and_then(|()| stdin.write_all(b"\n"))
                .and_then(|()| stdin.flush());
            if let Err(e) = result {
                tracing::debug!("Ignoring stdin write failure: {}", e);
            }
        }
        if self.state == SupervisorState::AwaitingInput {
            self.state = SupervisorState::Streaming;
        }
    }

    /// Mutable access to the child for the lifecycle guard.
    pub(crate) fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    /// Close stdin, drain the queue and join the reader thread.
    ///
    /// Returns `false` if the reader is still blocked after `timeout`, which
    /// happens only if a process outside the program's group holds the pipe.
    pub(crate) fn shutdown_reader(&mut self, timeout: Duration) -> bool {
        self.stdin = None;
        let deadline = Instant::now() + timeout;

        loop {
            loop {
                match self.chunks.try_recv() {
                    Ok(_) => continue,
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            }

            let finished = self.reader.as_ref().is_none_or(JoinHandle::is_finished);
            if finished {
                if let Some(reader) = self.reader.take() {
                    let _ = reader.join();
                }
                return true;
            }

            if Instant::now() >= deadline {
                tracing::warn!("Output reader for pid {} did not stop", self.child.id());
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }
}

/// Reader thread body: forward output chunks until EOF.
fn read_output(mut pipe: PipeReader, tx: SyncSender<Vec<u8>>) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match pipe.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!("Output reader stopped: {}", e);
                break;
            }
        }
    }
}
