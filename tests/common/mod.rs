//! Common test utilities for opflow

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use opflow::{AnalysisApi, Config, EventKind, EventSink, ParsedEvent, PollPolicy};

/// Poll policy fast enough for real-time tests
pub fn fast_policy() -> PollPolicy {
    PollPolicy {
        default_interval: Duration::from_millis(10),
        multiplier: 1.5,
        max_interval: Duration::from_millis(40),
        max_attempts: 10,
        max_elapsed: Duration::from_secs(5),
    }
}

/// Config pointing at a mock server, with fast polling
pub fn test_config(base_url: &str) -> Config {
    let mut config = Config::for_base_url(base_url);
    config.request_timeout = Duration::from_secs(5);
    config.poll = fast_policy();
    config
}

pub fn test_api(base_url: &str) -> AnalysisApi {
    AnalysisApi::new(test_config(base_url)).expect("client builds")
}

/// Sink that records everything it receives
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<ParsedEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(&self) -> Arc<dyn EventSink> {
        Arc::new(self.clone())
    }

    pub fn events(&self) -> Vec<ParsedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.name).collect()
    }

    pub fn terminal_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e.kind, EventKind::Complete | EventKind::Error))
            .count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: ParsedEvent) {
        self.events.lock().unwrap().push(event);
    }
}
