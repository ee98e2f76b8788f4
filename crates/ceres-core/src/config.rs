//! Configuration for compilation and execution.

use std::path::PathBuf;
use std::time::Duration;

use crate::instrument::DEFAULT_MARKER;

/// Environment variable overriding the C compiler program.
pub const COMPILER_ENV: &str = "CERES_CC";

/// Configuration for the C compiler collaborator.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Compiler program, resolved through `PATH` when not absolute.
    pub program: PathBuf,

    /// Flags passed on every invocation, before per-submission flags.
    pub base_flags: Vec<String>,

    /// File name of the instrumented source inside the build directory.
    pub source_name: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        let program = std::env::var_os(COMPILER_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("gcc"));

        Self {
            program,
            base_flags: vec!["-fexec-charset=UTF-8".to_string()],
            source_name: "source.c".to_string(),
        }
    }
}

impl CompilerConfig {
    /// Use a specific compiler program.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Name of the executable produced next to the source.
    pub fn executable_name(&self) -> String {
        let stem = self
            .source_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.source_name);

        if cfg!(windows) {
            format!("{stem}.exe")
        } else {
            stem.to_string()
        }
    }
}

/// Configuration for one execution of a submission.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Marker token written by instrumented programs before blocking reads.
    pub marker: String,

    /// Poll interval of the output consumer loop.
    pub poll_interval: Duration,

    /// Poll interval while waiting on the input relay.
    pub input_poll_interval: Duration,

    /// Give up waiting for input after this long. `None` waits until
    /// a value arrives or the submission is aborted.
    pub input_timeout: Option<Duration>,

    /// Time between the graceful termination request and the tree kill.
    pub termination_grace: Duration,

    /// Flush buffered output once it grows past this many bytes.
    pub flush_threshold: usize,

    /// Capacity of the queue between the reader thread and the consumer.
    pub queue_capacity: usize,

    /// Value written to the program when input times out.
    pub default_input: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            poll_interval: Duration::from_millis(50),
            input_poll_interval: Duration::from_millis(100),
            input_timeout: None,
            termination_grace: Duration::from_millis(200),
            flush_threshold: 200,
            queue_capacity: 1024,
            default_input: "0".to_string(),
        }
    }
}
