//! Integration tests for the shared kernel session.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;

use ceres_core::{
    CompileOutcome, CompileRequest, Compiler, ExecutionConfig, ExecutionController,
    ExecutionStatus, RelayTable, Result,
};
use ceres_server::{KernelSession, ServerError, ServerMessage};
use tokio::sync::mpsc;

/// Writes a shell script in place of a compiled program.
struct ScriptCompiler(&'static str);

impl Compiler for ScriptCompiler {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<CompileOutcome> {
        let executable = request.work_dir.join("source");
        fs::write(&executable, format!("#!/bin/sh\n{}\n", self.0))?;
        fs::set_permissions(&executable, fs::Permissions::from_mode(0o755))?;
        Ok(CompileOutcome::Success {
            executable,
            diagnostics: String::new(),
        })
    }
}

fn session(script: &'static str, relay: &RelayTable) -> Arc<KernelSession> {
    let config = ExecutionConfig {
        poll_interval: Duration::from_millis(20),
        input_poll_interval: Duration::from_millis(20),
        termination_grace: Duration::from_millis(100),
        ..ExecutionConfig::default()
    };
    let compiler: Arc<dyn Compiler> = Arc::new(ScriptCompiler(script));
    let controller = ExecutionController::new(compiler, relay.clone(), config)
        .unwrap()
        .with_relay_url("http://127.0.0.1:9/");
    Arc::new(KernelSession::new(controller))
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        messages.push(msg);
    }
    messages
}

fn streamed(messages: &[ServerMessage]) -> String {
    messages
        .iter()
        .filter_map(|msg| match msg {
            ServerMessage::Stream { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_execute_streams_and_replies() {
    let relay = RelayTable::new();
    let session = session("echo hello\necho world", &relay);
    let mut rx = session.subscribe();

    let report = session
        .start_execution("int main(void) {}".to_string())
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.status, ExecutionStatus::Ok);
    let messages = drain(&mut rx);
    assert_eq!(streamed(&messages), "hello\nworld\n");
    assert!(matches!(
        messages.last(),
        Some(ServerMessage::ExecuteReply {
            status: ExecutionStatus::Ok,
            execution_count: 1,
            ..
        })
    ));
    assert!(!session.is_busy());
}

#[tokio::test]
async fn test_slow_subscriber_receives_all_output() {
    let relay = RelayTable::new();
    let session = session("seq 1 20000", &relay);
    let mut rx = session.subscribe();

    // Nothing is read until the submission has finished.
    let report = session
        .start_execution(String::new())
        .unwrap()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.status, ExecutionStatus::Ok);

    let messages = drain(&mut rx);
    assert!(messages.len() > 1024);
    let expected: String = (1..=20000).map(|i| format!("{i}\n")).collect();
    assert_eq!(streamed(&messages), expected);
    assert!(matches!(
        messages.last(),
        Some(ServerMessage::ExecuteReply { .. })
    ));
}

#[tokio::test]
async fn test_dropped_subscriber_does_not_block_others() {
    let relay = RelayTable::new();
    let session = session("echo still here", &relay);
    drop(session.subscribe());
    let mut rx = session.subscribe();

    session
        .start_execution(String::new())
        .unwrap()
        .await
        .unwrap();

    assert_eq!(streamed(&drain(&mut rx)), "still here\n");
}

#[tokio::test]
async fn test_input_round_trip_through_relay() {
    let relay = RelayTable::new();
    let session = session("printf 'n? '\nprintf '<<__REQ__>>'\nread n\necho \"n=$n\"", &relay);
    let mut rx = session.subscribe();

    let task = session.start_execution(String::new()).unwrap();

    let request_id = loop {
        match rx.recv().await.unwrap() {
            ServerMessage::DisplayInput {
                request_id,
                relay_url,
                html,
            } => {
                assert_eq!(relay_url.as_deref(), Some("http://127.0.0.1:9/"));
                assert!(html.contains(&request_id.to_string()));
                break request_id;
            }
            ServerMessage::ExecuteReply { .. } => panic!("finished without requesting input"),
            _ => {}
        }
    };
    relay.submit(request_id, "5");

    let report = task.await.unwrap().unwrap();
    assert_eq!(report.status, ExecutionStatus::Ok);

    let messages = drain(&mut rx);
    assert!(matches!(
        messages.first(),
        Some(ServerMessage::ClearOutput { wait: true })
    ));
    assert_eq!(streamed(&messages), "\n5\nn=5\n");
}

#[tokio::test]
async fn test_second_execute_while_busy_is_rejected() {
    let relay = RelayTable::new();
    let session = session("sleep 30", &relay);

    let task = session.start_execution(String::new()).unwrap();
    assert!(session.is_busy());
    assert!(matches!(
        session.start_execution(String::new()),
        Err(ServerError::ExecutionInProgress)
    ));

    session.interrupt().unwrap();
    let report = task.await.unwrap().unwrap();

    assert_eq!(report.status, ExecutionStatus::Aborted);
    assert_eq!(session.execution_count(), 1);
    assert!(!session.is_busy());
}

#[tokio::test]
async fn test_interrupt_with_nothing_running() {
    let session = session("true", &RelayTable::new());
    assert!(matches!(session.interrupt(), Err(ServerError::NothingRunning)));
}

#[tokio::test]
async fn test_execution_count_increments() {
    let session = session("true", &RelayTable::new());
    let mut rx = session.subscribe();

    for expected in 1..=2 {
        session
            .start_execution(String::new())
            .unwrap()
            .await
            .unwrap();
        let messages = drain(&mut rx);
        assert!(messages.iter().any(|msg| matches!(
            msg,
            ServerMessage::ExecuteReply { execution_count, .. } if *execution_count == expected
        )));
    }
}
