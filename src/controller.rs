//! Slot-keyed operation controller
//!
//! Each slot (a UI concern such as "impact graph for KPI X") runs at most
//! one attempt. Starting a new attempt cancels the occupant first, and a
//! generation check drops any event that a superseded attempt still
//! manages to produce.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::attempt::OperationHandle;
use crate::event::{EventSink, OperationOutcome, ParsedEvent};
use crate::poll::{JobPoller, PollPolicy};
use crate::stream::{StreamOptions, StreamSession};
use crate::transport::{JobApi, StreamRequest, StreamTransport};

/// Capacity of the outcome notification channel
const NOTICE_CAPACITY: usize = 256;

/// How an operation reaches its result
#[derive(Clone)]
pub enum Strategy {
    /// Submit, then poll a status endpoint
    Poll {
        api: Arc<dyn JobApi>,
        policy: PollPolicy,
    },
    /// Read an SSE or NDJSON response
    Stream {
        transport: Arc<dyn StreamTransport>,
        request: StreamRequest,
        options: StreamOptions,
    },
}

impl Strategy {
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::Poll { .. } => "poll",
            Strategy::Stream { .. } => "stream",
        }
    }

    fn start(self, sink: Arc<dyn EventSink>) -> OperationHandle {
        match self {
            Strategy::Poll { api, policy } => JobPoller::new(api, policy).run(sink),
            Strategy::Stream {
                transport,
                request,
                options,
            } => StreamSession::new(transport, options).open(request, sink),
        }
    }
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Poll { policy, .. } => f.debug_struct("Poll").field("policy", policy).finish(),
            Strategy::Stream { request, options, .. } => f
                .debug_struct("Stream")
                .field("url", &request.url)
                .field("format", &options.parser.format())
                .finish(),
        }
    }
}

/// Published on the notice channel whenever an attempt settles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationNotice {
    pub slot: String,
    pub generation: u64,
    pub outcome: OperationOutcome,
}

struct SlotEntry {
    generation: u64,
    /// `None` between registration and the attempt being started
    handle: Option<OperationHandle>,
}

type SlotMap = HashMap<String, SlotEntry>;

struct Shared {
    slots: Mutex<SlotMap>,
    notices: broadcast::Sender<OperationNotice>,
}

impl Shared {
    fn slots(&self) -> MutexGuard<'_, SlotMap> {
        // a panicking sink must not wedge every slot
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A newer attempt owns the slot. An empty slot supersedes nobody: the
    /// attempt that settled there may still be emitting its terminal event.
    fn is_superseded(&self, slot: &str, generation: u64) -> bool {
        self.slots()
            .get(slot)
            .map(|entry| entry.generation != generation)
            .unwrap_or(false)
    }
}

/// Sink wrapper that only lets the slot's current generation through.
///
/// The check and the delivery both run under the attempt's gate, which
/// `start` waits on when it cancels the occupant.
struct GenerationSink {
    shared: Arc<Shared>,
    slot: String,
    generation: u64,
    inner: Arc<dyn EventSink>,
}

impl EventSink for GenerationSink {
    fn emit(&self, event: ParsedEvent) {
        if self.shared.is_superseded(&self.slot, self.generation) {
            debug!(
                slot = %self.slot,
                generation = self.generation,
                event = %event.name,
                "Discarding event from superseded attempt"
            );
            return;
        }
        self.inner.emit(event);
    }
}

/// Runs operations with single-flight semantics per slot.
pub struct OperationController {
    shared: Arc<Shared>,
    next_generation: AtomicU64,
}

impl OperationController {
    pub fn new() -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                slots: Mutex::new(HashMap::new()),
                notices,
            }),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Start an operation on `slot`, cancelling whatever ran there before.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        &self,
        slot: impl Into<String>,
        strategy: Strategy,
        sink: Arc<dyn EventSink>,
    ) -> OperationHandle {
        let slot = slot.into();
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let label = strategy.label();

        let previous = self.shared.slots().insert(
            slot.clone(),
            SlotEntry {
                generation,
                handle: None,
            },
        );

        if let Some(handle) = previous.and_then(|entry| entry.handle) {
            info!(slot = %slot, generation, "Superseding running attempt");
            handle.cancel();
            crate::metrics::record_superseded();
        }

        let filtered: Arc<dyn EventSink> = Arc::new(GenerationSink {
            shared: Arc::clone(&self.shared),
            slot: slot.clone(),
            generation,
            inner: sink,
        });
        let handle = strategy.start(filtered);
        debug!(slot = %slot, generation, strategy = label, "Attempt started");

        let registered = match self.shared.slots().get_mut(&slot) {
            Some(entry) if entry.generation == generation => {
                entry.handle = Some(handle.clone());
                true
            }
            _ => false,
        };
        // superseded or torn down while starting; cancelling waits on the
        // sink, so the slot lock must already be released
        if !registered {
            handle.cancel();
        }

        self.watch(slot, generation, handle.clone());
        handle
    }

    /// Start an operation on `slot` and wait for its outcome.
    pub async fn run(
        &self,
        slot: impl Into<String>,
        strategy: Strategy,
        sink: Arc<dyn EventSink>,
    ) -> OperationOutcome {
        self.start(slot, strategy, sink).completion().await
    }

    /// Cancel and forget the attempt on `slot`. Returns `false` if the slot
    /// was empty.
    pub fn cancel_slot(&self, slot: &str) -> bool {
        let removed = self.shared.slots().remove(slot);
        match removed {
            Some(entry) => {
                info!(slot = %slot, generation = entry.generation, "Slot torn down");
                if let Some(handle) = entry.handle {
                    handle.cancel();
                }
                true
            }
            None => false,
        }
    }

    /// Cancel every slot.
    pub fn cancel_all(&self) {
        let drained: Vec<(String, SlotEntry)> = self.shared.slots().drain().collect();
        for (slot, entry) in drained {
            debug!(slot = %slot, "Cancelling slot");
            if let Some(handle) = entry.handle {
                handle.cancel();
            }
        }
    }

    /// Slots with a live attempt.
    pub fn active_slots(&self) -> Vec<String> {
        let mut slots: Vec<String> = self.shared.slots().keys().cloned().collect();
        slots.sort();
        slots
    }

    /// Current generation of `slot`, if occupied.
    pub fn generation(&self, slot: &str) -> Option<u64> {
        self.shared.slots().get(slot).map(|entry| entry.generation)
    }

    /// Subscribe to settled outcomes of all slots.
    pub fn subscribe(&self) -> broadcast::Receiver<OperationNotice> {
        self.shared.notices.subscribe()
    }

    /// Publish the outcome and free the slot once the attempt settles.
    fn watch(&self, slot: String, generation: u64, handle: OperationHandle) {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let outcome = handle.completion().await;
            {
                let mut slots = shared.slots();
                if slots.get(&slot).map(|e| e.generation) == Some(generation) {
                    slots.remove(&slot);
                }
            }
            debug!(slot = %slot, generation, outcome = outcome.label(), "Attempt finished");
            // no subscribers is fine
            let _ = shared.notices.send(OperationNotice {
                slot,
                generation,
                outcome,
            });
        });
    }
}

impl Default for OperationController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for OperationController {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
