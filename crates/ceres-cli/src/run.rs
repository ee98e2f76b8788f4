//! Run command implementation for Ceres CLI.
//!
//! Compiles and runs a C file with output streamed to the terminal and
//! input requests answered from stdin or the relay endpoint.

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use ceres_core::colors;
use ceres_core::{
    AbortHandle, CCompiler, CompilerConfig, ExecutionConfig, ExecutionController,
    ExecutionStatus, RelayTable,
};
use ceres_server::RelayServer;

use crate::terminal::{StdinForwarder, TerminalSink};

/// Options of the run command.
pub struct RunOptions {
    pub cc: Option<String>,
    pub input_timeout: Option<u64>,
    pub relay_port: u16,
}

/// Run a C file and return the submission status.
pub async fn execute(file: &str, options: RunOptions) -> anyhow::Result<ExecutionStatus> {
    let path = Path::new(file);
    if !path.exists() {
        anyhow::bail!("Source file not found: {}", file);
    }
    let source =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", file))?;

    let mut compiler = CompilerConfig::default();
    if let Some(cc) = options.cc {
        compiler = compiler.with_program(cc);
    }
    let config = ExecutionConfig {
        input_timeout: options.input_timeout.map(Duration::from_secs),
        ..ExecutionConfig::default()
    };

    let table = RelayTable::new();
    let relay_addr = SocketAddr::from(([127, 0, 0, 1], options.relay_port));
    let relay = RelayServer::spawn(table.clone(), relay_addr).await?;

    eprintln!(
        "{}  ◆ Input relay:{} {}",
        colors::CYAN,
        colors::RESET,
        relay.url()
    );

    let stdin = StdinForwarder::start(table.clone(), config.default_input.clone());
    let controller = ExecutionController::new(CCompiler::new(compiler), table, config)?
        .with_relay_url(relay.url());

    let abort = AbortHandle::new();
    let ctrl_c = {
        let abort = abort.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received interrupt");
                abort.abort();
            }
        })
    };

    let report = tokio::task::spawn_blocking(move || {
        let mut sink = TerminalSink::new(stdin);
        controller.execute(&source, &mut sink, &abort)
    })
    .await?;

    ctrl_c.abort();
    relay.shutdown().await;

    let (color, label) = match report.status {
        ExecutionStatus::Ok => (colors::GREEN, "Finished"),
        ExecutionStatus::Failed => (colors::RED, "Failed"),
        ExecutionStatus::Aborted => (colors::YELLOW, "Aborted"),
    };
    let exit = report
        .exit_code
        .map(|code| format!(", exit code {code}"))
        .unwrap_or_default();
    eprintln!(
        "{}{}{} in {:.2}s{}",
        color,
        label,
        colors::RESET,
        report.duration.as_secs_f64(),
        exit
    );

    Ok(report.status)
}

/// Process exit code for a submission status.
pub fn exit_code(status: ExecutionStatus) -> ExitCode {
    match status {
        ExecutionStatus::Ok => ExitCode::SUCCESS,
        ExecutionStatus::Failed => ExitCode::from(1),
        ExecutionStatus::Aborted => ExitCode::from(130),
    }
}
