//! Attempt lifecycle shared by the poller and the stream session
//!
//! An attempt is one spawned task plus the state its caller can see: a
//! cancellation token and a settle-once outcome slot. Whoever settles
//! first (the task on a terminal event, or `cancel()`) wins; later
//! settlements are ignored. Terminal sink events are emitted only by the
//! winner, so the sink and the completion always agree.
//!
//! Sink delivery and settlement share one per-attempt gate: once
//! `cancel()` returns, no event of that attempt is being delivered and
//! none will be. A sink may cancel its own attempt from inside `emit`.

use std::cell::RefCell;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::event::{EventSink, OperationOutcome, ParsedEvent};

/// What an attempt task hands back when it ends on its own.
pub(crate) struct Finish {
    pub outcome: OperationOutcome,
    /// Terminal event as received from the server. When absent, one is
    /// derived from the outcome.
    pub event: Option<ParsedEvent>,
}

impl Finish {
    pub fn outcome(outcome: OperationOutcome) -> Self {
        Self {
            outcome,
            event: None,
        }
    }

    pub fn with_event(outcome: OperationOutcome, event: ParsedEvent) -> Self {
        Self {
            outcome,
            event: Some(event),
        }
    }
}

thread_local! {
    /// Attempts whose gate is held by this thread
    static HOLDING: RefCell<Vec<usize>> = RefCell::new(Vec::new());
}

/// Marks the current thread as holding an attempt's gate until dropped.
struct Holding(usize);

impl Holding {
    fn enter(id: usize) -> Self {
        HOLDING.with(|held| held.borrow_mut().push(id));
        Holding(id)
    }

    fn is_held(id: usize) -> bool {
        HOLDING.with(|held| held.borrow().contains(&id))
    }
}

impl Drop for Holding {
    fn drop(&mut self) {
        HOLDING.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|id| *id == self.0) {
                held.remove(pos);
            }
        });
    }
}

pub(crate) struct Attempt {
    strategy: &'static str,
    token: CancellationToken,
    outcome: watch::Sender<Option<OperationOutcome>>,
    sink: Arc<dyn EventSink>,
    gate: Mutex<()>,
}

impl Attempt {
    pub fn new(strategy: &'static str, sink: Arc<dyn EventSink>) -> Arc<Self> {
        let (outcome, _) = watch::channel(None);
        Arc::new(Self {
            strategy,
            token: CancellationToken::new(),
            outcome,
            sink,
            gate: Mutex::new(()),
        })
    }

    /// Run `f` with the gate held. Re-entering from the thread that already
    /// holds it (a sink reacting to its own event) runs `f` directly.
    fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        let id = self as *const Self as usize;
        if Holding::is_held(id) {
            return f();
        }
        // a panicking sink must not wedge the attempt
        let _guard = self.gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let _holding = Holding::enter(id);
        f()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_settled(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Forward a non-terminal event. Dropped once the attempt is settled.
    pub fn emit(&self, event: ParsedEvent) -> bool {
        self.exclusive(|| {
            if self.is_settled() || self.token.is_cancelled() {
                debug!(event = %event.name, "Attempt settled, dropping event");
                return false;
            }
            self.sink.emit(event);
            true
        })
    }

    /// Settle with the task's own result and emit the matching terminal event.
    pub fn finish(&self, finish: Finish) -> bool {
        let event = finish
            .event
            .or_else(|| finish.outcome.terminal_event());
        self.exclusive(|| {
            if !self.settle(finish.outcome) {
                return false;
            }
            if let Some(event) = event {
                self.sink.emit(event);
            }
            true
        })
    }

    /// Abort the attempt. Idempotent, and a no-op once settled.
    ///
    /// Waits for an event delivery already in progress on another thread.
    pub fn cancel(&self) {
        self.token.cancel();
        self.exclusive(|| self.settle(OperationOutcome::Cancelled));
    }

    fn settle(&self, outcome: OperationOutcome) -> bool {
        let label = outcome.label();
        let won = self.outcome.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        });
        if won {
            info!(strategy = self.strategy, outcome = label, "Attempt settled");
            crate::metrics::record_outcome(self.strategy, label);
            // release timers and connections still held by the task
            self.token.cancel();
        }
        won
    }

    /// Run `body` on its own task and settle with whatever it returns.
    ///
    /// A panicking body settles as `INTERNAL_ERROR` instead of leaving the
    /// completion pending forever.
    pub fn spawn<F>(self: &Arc<Self>, body: F) -> OperationHandle
    where
        F: Future<Output = Finish> + Send + 'static,
    {
        let attempt = Arc::clone(self);
        tokio::spawn(async move {
            match tokio::spawn(body).await {
                Ok(finish) => {
                    attempt.finish(finish);
                }
                Err(e) => {
                    error!(strategy = attempt.strategy, error = %e, "Attempt task failed");
                    attempt.finish(Finish::outcome(OperationOutcome::domain_error(
                        "INTERNAL_ERROR",
                        e.to_string(),
                    )));
                }
            }
        });

        OperationHandle {
            completion: self.outcome.subscribe(),
            attempt: Arc::clone(self),
        }
    }
}

/// Caller-side handle of a running attempt.
///
/// Cloning is cheap; all clones observe the same outcome.
#[derive(Clone)]
pub struct OperationHandle {
    attempt: Arc<Attempt>,
    completion: watch::Receiver<Option<OperationOutcome>>,
}

impl OperationHandle {
    /// Cancel the attempt.
    ///
    /// The outcome is `Cancelled` as soon as this returns unless the
    /// attempt had already settled. The underlying connection or timer may
    /// take a little longer to be released.
    pub fn cancel(&self) {
        self.attempt.cancel();
    }

    pub fn is_settled(&self) -> bool {
        self.attempt.is_settled()
    }

    /// The outcome if the attempt has settled.
    pub fn outcome(&self) -> Option<OperationOutcome> {
        self.completion.borrow().clone()
    }

    /// Wait for the terminal outcome.
    pub async fn completion(&self) -> OperationOutcome {
        let mut rx = self.completion.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(settled) => settled.clone().unwrap_or(OperationOutcome::Cancelled),
            // unreachable while `self.attempt` keeps the sender alive
            Err(_) => OperationOutcome::Cancelled,
        };
        outcome
    }
}

impl std::fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationHandle")
            .field("strategy", &self.attempt.strategy)
            .field("outcome", &*self.completion.borrow())
            .finish()
    }
}
