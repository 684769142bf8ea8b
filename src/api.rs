//! Ready-made strategies for the analysis backend
//!
//! Three endpoint families: the impact graph is computed as a polled job,
//! metadata extraction streams SSE, and NL-to-SQL streams NDJSON steps.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

use crate::config::Config;
use crate::controller::Strategy;
use crate::event::EventVocabulary;
use crate::framing::NdjsonRecordParser;
use crate::poll::PollPolicy;
use crate::stream::StreamOptions;
use crate::transport::{HttpJobApi, HttpStreamTransport, StreamRequest, StreamTransport};

pub const SSE_ACCEPT: &str = "text/event-stream";
pub const NDJSON_ACCEPT: &str = "application/x-ndjson";

/// Strategy factory bound to one backend
#[derive(Clone)]
pub struct AnalysisApi {
    config: Config,
    /// Bounded by `request_timeout`; used for submit and status calls
    client: reqwest::Client,
    /// Connect timeout only, since a stream may legitimately run for minutes
    stream: Arc<dyn StreamTransport>,
}

impl AnalysisApi {
    pub fn new(config: Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let stream_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .context("Failed to create streaming HTTP client")?;

        info!(base_url = %config.base_url, "Analysis API configured");

        Ok(Self {
            config,
            client,
            stream: Arc::new(HttpStreamTransport::new(stream_client)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Impact graph computation: submit, then poll the job.
    pub fn impact_graph(&self, body: Value) -> Strategy {
        self.poll(&self.config.impact_path, &self.config.status_path, body)
    }

    /// Polled job at arbitrary paths, with the configured policy.
    pub fn poll(&self, submit_path: &str, status_path: &str, body: Value) -> Strategy {
        self.poll_with(submit_path, status_path, body, self.config.poll.clone())
    }

    pub fn poll_with(
        &self,
        submit_path: &str,
        status_path: &str,
        body: Value,
        policy: PollPolicy,
    ) -> Strategy {
        let api = HttpJobApi::new(
            self.client.clone(),
            self.config.url(submit_path),
            self.config.url(status_path),
            body,
        );
        Strategy::Poll {
            api: Arc::new(api),
            policy,
        }
    }

    /// Metadata extraction over SSE.
    pub fn extract_metadata(&self, body: Value) -> Strategy {
        self.sse(&self.config.extract_path, body, EventVocabulary::extraction())
    }

    pub fn sse(&self, path: &str, body: Value, vocabulary: EventVocabulary) -> Strategy {
        let request = StreamRequest::post(self.config.url(path), body).header("Accept", SSE_ACCEPT);
        Strategy::Stream {
            transport: Arc::clone(&self.stream),
            request,
            options: StreamOptions::sse(vocabulary),
        }
    }

    /// NL-to-SQL ReAct loop over NDJSON.
    pub fn react_sql(&self, body: Value) -> Strategy {
        self.ndjson(&self.config.react_path, body, NdjsonRecordParser::default())
    }

    pub fn ndjson(&self, path: &str, body: Value, parser: NdjsonRecordParser) -> Strategy {
        let request =
            StreamRequest::post(self.config.url(path), body).header("Accept", NDJSON_ACCEPT);
        Strategy::Stream {
            transport: Arc::clone(&self.stream),
            request,
            options: StreamOptions::ndjson(parser),
        }
    }
}
