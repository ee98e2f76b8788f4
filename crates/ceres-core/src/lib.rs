//! Core engine for Ceres interactive C notebooks.
//!
//! This crate provides the interactive process execution bridge:
//! - Source instrumentation that makes blocking reads observable
//! - Compilation through an external C compiler
//! - Process supervision with incremental output streaming
//! - An input relay table correlating remote answers with pending reads
//! - Escalating termination and build-directory cleanup

pub mod abort;
pub mod colors;
pub mod compile;
pub mod config;
pub mod controller;
pub mod display;
pub mod error;
pub mod instrument;
pub mod lifecycle;
pub mod relay;
pub mod session;
pub mod supervisor;

pub use abort::AbortHandle;
pub use compile::{CCompiler, CompileOutcome, CompileRequest, Compiler};
pub use config::{CompilerConfig, ExecutionConfig};
pub use controller::{ExecutionController, ExecutionReport, ExecutionStatus, INTERRUPTED_NOTICE};
pub use display::{DisplayEvent, DisplaySink, InputAffordance, RecordingSink};
pub use error::{Error, Result};
pub use instrument::{Instrumenter, InstrumentedSource, extract_cflags};
pub use lifecycle::{LifecycleGuard, ProcessTree, Termination};
pub use relay::{AwaitOutcome, RelayTable, RequestId, SubmitOutcome, WaitPolicy};
pub use session::ExecutionSession;
pub use supervisor::{Pump, Supervisor, SupervisorState};
