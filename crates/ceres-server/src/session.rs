//! Kernel session: one controller shared by every connected client.
//!
//! Display signals of the running submission are delivered to every
//! subscriber through its own unbounded queue, so a slow client delays its
//! own output but never loses any. Only one submission runs at a time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use ceres_core::{
    AbortHandle, Compiler, DisplaySink, ExecutionController, ExecutionReport, InputAffordance,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{ServerError, ServerResult};
use crate::protocol::ServerMessage;
use crate::widget;

/// Controller type shared by the server.
pub type SharedController = ExecutionController<Arc<dyn Compiler>>;

/// Per-client message queues.
#[derive(Clone, Default)]
struct Subscribers {
    queues: Arc<Mutex<Vec<mpsc::UnboundedSender<ServerMessage>>>>,
}

impl Subscribers {
    fn lock(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<ServerMessage>>> {
        self.queues
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    /// Queue `msg` for every subscriber, dropping disconnected ones.
    fn send(&self, msg: ServerMessage) {
        // No subscribers is fine: the submission still runs to completion.
        self.lock().retain(|tx| tx.send(msg.clone()).is_ok());
    }
}

/// Forwards display signals to WebSocket subscribers.
struct BroadcastSink {
    subscribers: Subscribers,
}

impl BroadcastSink {
    fn send(&self, msg: ServerMessage) {
        self.subscribers.send(msg);
    }
}

impl DisplaySink for BroadcastSink {
    fn append(&mut self, text: &str) {
        self.send(ServerMessage::Stream {
            text: text.to_string(),
        });
    }

    fn clear(&mut self, wait: bool) {
        self.send(ServerMessage::ClearOutput { wait });
    }

    fn show_input(&mut self, affordance: &InputAffordance) {
        self.send(ServerMessage::DisplayInput {
            request_id: affordance.request_id,
            relay_url: affordance.relay_url.clone(),
            html: widget::render_input(affordance),
        });
    }
}

/// Shared execution state behind the WebSocket front end.
pub struct KernelSession {
    controller: Arc<SharedController>,
    subscribers: Subscribers,
    running: Mutex<Option<AbortHandle>>,
    execution_count: AtomicU64,
}

impl KernelSession {
    /// Create a session around `controller`.
    pub fn new(controller: SharedController) -> Self {
        Self {
            controller: Arc::new(controller),
            subscribers: Subscribers::default(),
            running: Mutex::new(None),
            execution_count: AtomicU64::new(0),
        }
    }

    /// Subscribe to server messages sent from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ServerMessage> {
        self.subscribers.subscribe()
    }

    /// Broadcast a message to all subscribers.
    pub fn broadcast(&self, msg: ServerMessage) {
        self.subscribers.send(msg);
    }

    /// The controller.
    pub fn controller(&self) -> &SharedController {
        &self.controller
    }

    /// Number of submissions accepted so far.
    pub fn execution_count(&self) -> u64 {
        self.execution_count.load(Ordering::SeqCst)
    }

    /// Whether a submission is running.
    pub fn is_busy(&self) -> bool {
        self.running_lock().is_some()
    }

    fn running_lock(&self) -> MutexGuard<'_, Option<AbortHandle>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a submission in the background.
    ///
    /// The returned task resolves after the `execute_reply` was broadcast.
    pub fn start_execution(
        self: &Arc<Self>,
        code: String,
    ) -> ServerResult<JoinHandle<Option<ExecutionReport>>> {
        let abort = {
            let mut running = self.running_lock();
            if running.is_some() {
                return Err(ServerError::ExecutionInProgress);
            }
            let abort = AbortHandle::new();
            *running = Some(abort.clone());
            abort
        };
        let execution_count = self.execution_count.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!("Starting execution {}", execution_count);

        let session = Arc::clone(self);
        Ok(tokio::spawn(async move {
            // The controller blocks on pipes and the relay table.
            let controller = Arc::clone(&session.controller);
            let mut sink = BroadcastSink {
                subscribers: session.subscribers.clone(),
            };
            let result = tokio::task::spawn_blocking(move || {
                controller.execute(&code, &mut sink, &abort)
            })
            .await;

            *session.running_lock() = None;

            match result {
                Ok(report) => {
                    session.broadcast(ServerMessage::ExecuteReply {
                        status: report.status,
                        execution_count,
                        exit_code: report.exit_code,
                    });
                    Some(report)
                }
                Err(e) => {
                    tracing::error!("Task join error: {}", e);
                    session.broadcast(ServerMessage::Error {
                        message: format!("Execution failed: {e}"),
                    });
                    None
                }
            }
        }))
    }

    /// Abort the running submission.
    pub fn interrupt(&self) -> ServerResult<()> {
        match self.running_lock().as_ref() {
            Some(abort) => {
                tracing::info!("Interrupt requested");
                abort.abort();
                Ok(())
            }
            None => Err(ServerError::NothingRunning),
        }
    }
}
