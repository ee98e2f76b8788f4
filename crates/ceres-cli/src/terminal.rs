//! Terminal display sink and stdin forwarding.
//!
//! A background thread reads lines from stdin. Each line answers the input
//! request currently pending, or waits in a queue until one is shown. A line
//! whose request was already answered through the relay stays queued for
//! the next one. When stdin reaches EOF, later requests are answered with
//! the default value.

use std::collections::VecDeque;
use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use ceres_core::colors;
use ceres_core::{DisplaySink, InputAffordance, RelayTable, RequestId, SubmitOutcome};

#[derive(Default)]
struct InputState {
    pending: Option<RequestId>,
    buffered: VecDeque<String>,
    closed: bool,
}

/// Shares stdin lines with the relay table.
#[derive(Clone)]
pub struct StdinForwarder {
    relay: RelayTable,
    default_input: String,
    state: Arc<Mutex<InputState>>,
}

impl StdinForwarder {
    fn new(relay: RelayTable, default_input: String) -> Self {
        Self {
            relay,
            default_input,
            state: Arc::new(Mutex::new(InputState::default())),
        }
    }

    /// Start forwarding stdin lines to `relay`.
    pub fn start(relay: RelayTable, default_input: String) -> Self {
        let forwarder = Self::new(relay, default_input);

        let reader = forwarder.clone();
        let spawned = thread::Builder::new()
            .name("ceres-stdin".to_string())
            .spawn(move || reader.read_lines());
        if let Err(e) = spawned {
            tracing::warn!("Could not start stdin reader: {}", e);
            forwarder.close();
        }

        forwarder
    }

    fn lock(&self) -> MutexGuard<'_, InputState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_lines(&self) {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            self.accept_line(line);
        }

        tracing::debug!("stdin closed");
        self.close();
    }

    /// Answer the pending request with `line`, or queue it.
    fn accept_line(&self, line: String) {
        let mut state = self.lock();
        if let Some(id) = state.pending.take() {
            if self.relay.submit(id, line.as_str()) == SubmitOutcome::Accepted {
                return;
            }
            // Answered elsewhere in the meantime.
        }
        state.buffered.push_back(line);
    }

    /// Mark stdin as exhausted and answer the pending request, if any.
    fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        if let Some(id) = state.pending.take() {
            self.relay.submit(id, self.default_input.clone());
        }
    }

    /// Answer `id` from stdin as soon as a line is available.
    fn request(&self, id: RequestId) {
        let mut state = self.lock();
        if let Some(line) = state.buffered.pop_front() {
            if self.relay.submit(id, line.as_str()) == SubmitOutcome::Ignored {
                state.buffered.push_front(line);
            }
        } else if state.closed {
            self.relay.submit(id, self.default_input.clone());
        } else {
            state.pending = Some(id);
        }
    }
}

/// Where else the request can be answered, if a relay is listening.
fn relay_notice(affordance: &InputAffordance) -> Option<String> {
    let url = affordance.relay_url.as_ref()?;
    Some(format!("(input {} also accepted at {})", affordance.request_id, url))
}

/// Prints the transcript to stdout.
pub struct TerminalSink {
    stdin: StdinForwarder,
    interactive: bool,
}

impl TerminalSink {
    pub fn new(stdin: StdinForwarder) -> Self {
        Self {
            stdin,
            interactive: io::stdin().is_terminal(),
        }
    }
}

impl DisplaySink for TerminalSink {
    fn append(&mut self, text: &str) {
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    fn clear(&mut self, _wait: bool) {}

    fn show_input(&mut self, affordance: &InputAffordance) {
        if let Some(notice) = relay_notice(affordance) {
            tracing::debug!("Input {} requested", affordance.request_id);
            eprintln!("{}{}{}", colors::DIM, notice, colors::RESET);
        }
        self.stdin.request(affordance.request_id);
    }

    fn echo_input(&mut self, text: &str) {
        // A terminal already shows what was typed.
        if !self.interactive {
            self.append(text);
        }
    }
}
