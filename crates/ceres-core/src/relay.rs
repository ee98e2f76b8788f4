//! Input relay correlation table.
//!
//! Bridges an asynchronous answer from a remote client back into the
//! synchronous execution flow. The controller opens a slot for each
//! pending input request, the relay endpoint fills it, and the waiter pops
//! it. A table is an explicit object: each relay endpoint owns one and hands
//! clones to the sessions it serves.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::abort::AbortHandle;

/// Correlation id of a pending input request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an id received over the wire.
    pub fn parse(text: &str) -> Option<Self> {
        Uuid::parse_str(text.trim()).ok().map(Self)
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A pending input request: created when the marker is seen, resolved at
/// most once, discarded when consumed.
#[derive(Debug, Clone)]
struct PendingInput {
    created_at: Instant,
    value: Option<String>,
}

/// Result of a submission to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The value was stored for a pending request.
    Accepted,
    /// No request with this id is pending (unknown or already consumed).
    Ignored,
}

/// Result of waiting for a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwaitOutcome {
    /// The value submitted for the request.
    Value(String),
    /// The abort handle fired while waiting.
    Cancelled,
    /// The wait deadline passed.
    TimedOut,
}

/// How long and how often to poll for a value.
#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    /// Maximum time between abort checks.
    pub poll_interval: Duration,
    /// Give up after this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            timeout: None,
        }
    }
}

struct TableInner {
    pending: Mutex<HashMap<RequestId, PendingInput>>,
    wake: Condvar,
}

/// Shared map from request id to submitted value, plus a wake signal.
///
/// Cloning yields another handle to the same table.
#[derive(Clone)]
pub struct RelayTable {
    inner: Arc<TableInner>,
}

impl RelayTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TableInner {
                pending: Mutex::new(HashMap::new()),
                wake: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, PendingInput>> {
        // A panicking holder cannot leave the map half-updated.
        self.inner
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open a new pending request and return its id.
    pub fn open(&self) -> RequestId {
        let id = RequestId::new();
        self.lock().insert(
            id,
            PendingInput {
                created_at: Instant::now(),
                value: None,
            },
        );
        tracing::debug!("Opened input request {}", id);
        id
    }

    /// Store a value for a pending request.
    ///
    /// A later submission for the same unconsumed request overwrites the
    /// earlier value. Submissions for unknown or consumed ids are ignored.
    pub fn submit(&self, id: RequestId, value: impl Into<String>) -> SubmitOutcome {
        let mut pending = self.lock();
        match pending.get_mut(&id) {
            Some(slot) => {
                slot.value = Some(value.into());
                drop(pending);
                self.inner.wake.notify_all();
                tracing::debug!("Accepted input for request {}", id);
                SubmitOutcome::Accepted
            }
            None => {
                tracing::debug!("Ignored input for unknown request {}", id);
                SubmitOutcome::Ignored
            }
        }
    }

    /// Pop the value for `id` if one has been submitted.
    pub fn try_take(&self, id: RequestId) -> Option<String> {
        let mut pending = self.lock();
        Self::take_resolved(&mut pending, id)
    }

    fn take_resolved(
        pending: &mut HashMap<RequestId, PendingInput>,
        id: RequestId,
    ) -> Option<String> {
        if pending.get(&id)?.value.is_none() {
            return None;
        }
        pending.remove(&id).and_then(|slot| {
            tracing::debug!(
                "Resolved input request {} after {:?}",
                id,
                slot.created_at.elapsed()
            );
            slot.value
        })
    }

    /// Block until a value for `id` arrives, the abort handle fires, or the
    /// policy's timeout passes.
    ///
    /// The pending request is withdrawn on cancellation or timeout, so a late
    /// submission is ignored.
    pub fn await_value(&self, id: RequestId, policy: &WaitPolicy, abort: &AbortHandle) -> AwaitOutcome {
        let deadline = policy.timeout.map(|timeout| Instant::now() + timeout);
        let mut pending = self.lock();

        loop {
            if let Some(value) = Self::take_resolved(&mut pending, id) {
                return AwaitOutcome::Value(value);
            }
            if !pending.contains_key(&id) {
                // Withdrawn by someone else; nothing will arrive.
                return AwaitOutcome::Cancelled;
            }
            if abort.is_aborted() {
                pending.remove(&id);
                return AwaitOutcome::Cancelled;
            }

            let mut wait = policy.poll_interval;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    pending.remove(&id);
                    return AwaitOutcome::TimedOut;
                }
                wait = wait.min(deadline - now);
            }

            pending = self
                .inner
                .wake
                .wait_timeout(pending, wait)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    /// Withdraw a pending request without consuming it.
    pub fn withdraw(&self, id: RequestId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            self.inner.wake.notify_all();
        }
        removed
    }

    /// Number of requests awaiting consumption.
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }
}

impl Default for RelayTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RelayTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayTable")
            .field("pending", &self.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    fn quick() -> WaitPolicy {
        WaitPolicy {
            poll_interval: Duration::from_millis(10),
            timeout: Some(Duration::from_millis(300)),
        }
    }

    #[test]
    fn test_submit_then_await() {
        let table = RelayTable::new();
        let id = table.open();

        assert_eq!(table.submit(id, "42"), SubmitOutcome::Accepted);
        assert_eq!(
            table.await_value(id, &quick(), &AbortHandle::new()),
            AwaitOutcome::Value("42".to_string())
        );
        assert_eq!(table.pending_count(), 0);
    }

    #[test]
    fn test_await_wakes_on_later_submit() {
        let table = RelayTable::new();
        let id = table.open();

        let submitter = {
            let table = table.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                table.submit(id, "late")
            })
        };

        let policy = WaitPolicy {
            poll_interval: Duration::from_secs(5),
            timeout: None,
        };
        let start = Instant::now();
        let outcome = table.await_value(id, &policy, &AbortHandle::new());

        assert_eq!(outcome, AwaitOutcome::Value("late".to_string()));
        assert!(start.elapsed() < Duration::from_secs(2), "condvar did not wake the waiter");
        assert_eq!(submitter.join().unwrap(), SubmitOutcome::Accepted);
    }

    #[test]
    fn test_empty_value_is_accepted() {
        let table = RelayTable::new();
        let id = table.open();
        table.submit(id, "");
        assert_eq!(table.try_take(id), Some(String::new()));
    }

    #[test]
    fn test_resubmit_overwrites_unconsumed_value() {
        let table = RelayTable::new();
        let id = table.open();

        table.submit(id, "first");
        table.submit(id, "second");
        assert_eq!(table.try_take(id), Some("second".to_string()));
    }

    #[test]
    fn test_unknown_and_consumed_ids_are_ignored() {
        let table = RelayTable::new();
        assert_eq!(table.submit(RequestId::new(), "x"), SubmitOutcome::Ignored);

        let id = table.open();
        table.submit(id, "once");
        assert_eq!(table.try_take(id), Some("once".to_string()));

        assert_eq!(table.submit(id, "twice"), SubmitOutcome::Ignored);
        assert_eq!(table.try_take(id), None);
        assert_eq!(table.pending_count(), 0);
    }

    #[test]
    fn test_value_delivered_to_exactly_one_waiter() {
        let table = RelayTable::new();
        let id = table.open();
        let winners = Arc::new(AtomicUsize::new(0));

        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let table = table.clone();
                let winners = winners.clone();
                thread::spawn(move || {
                    if let AwaitOutcome::Value(_) = table.await_value(id, &quick(), &AbortHandle::new()) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(30));
        table.submit(id, "only-one");

        for waiter in waiters {
            waiter.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_abort_cancels_wait_and_withdraws() {
        let table = RelayTable::new();
        let id = table.open();
        let abort = AbortHandle::new();

        let trigger = {
            let abort = abort.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(40));
                abort.abort();
            })
        };

        let policy = WaitPolicy {
            poll_interval: Duration::from_millis(10),
            timeout: None,
        };
        assert_eq!(table.await_value(id, &policy, &abort), AwaitOutcome::Cancelled);
        trigger.join().unwrap();

        assert_eq!(table.submit(id, "too late"), SubmitOutcome::Ignored);
    }

    #[test]
    fn test_timeout() {
        let table = RelayTable::new();
        let id = table.open();

        let policy = WaitPolicy {
            poll_interval: Duration::from_millis(10),
            timeout: Some(Duration::from_millis(50)),
        };
        assert_eq!(
            table.await_value(id, &policy, &AbortHandle::new()),
            AwaitOutcome::TimedOut
        );
        assert_eq!(table.pending_count(), 0);
    }

    #[test]
    fn test_request_id_parse() {
        let id = RequestId::new();
        assert_eq!(RequestId::parse(&id.to_string()), Some(id));
        assert_eq!(RequestId::parse("not-a-uuid"), None);
    }
}
