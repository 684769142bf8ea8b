//! reqwest-backed transports
//!
//! Authentication and retry headers are expected to be configured on the
//! `reqwest::Client` handed in; these types only shape requests and
//! validate responses.

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use crate::error::{TransportError, TransportResult};

use super::{
    JobApi, JobStatusReport, StreamMethod, StreamRequest, StreamResponse, StreamTransport,
    SubmitResponse,
};

/// Request/poll endpoints over HTTP
///
/// `submit` POSTs `body` to `submit_url`; `status` GETs
/// `{status_url}/{job_id}`.
pub struct HttpJobApi {
    client: reqwest::Client,
    submit_url: String,
    status_url: String,
    body: Value,
}

impl HttpJobApi {
    pub fn new(
        client: reqwest::Client,
        submit_url: impl Into<String>,
        status_url: impl Into<String>,
        body: Value,
    ) -> Self {
        Self {
            client,
            submit_url: submit_url.into(),
            status_url: status_url.into().trim_end_matches('/').to_string(),
            body,
        }
    }

    /// Read a successful response body as JSON, or turn a failure status
    /// into a [`TransportError::Status`].
    async fn read_json(response: reqwest::Response, what: &str) -> TransportResult<(u16, Value)> {
        let status = response.status();
        debug!(status = %status, "{} response status", what);

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "{} request failed", what);
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let body = response.text().await?;
        debug!(body = %body, "{} response body", what);

        match serde_json::from_str(&body) {
            Ok(value) => Ok((status.as_u16(), value)),
            Err(e) => {
                error!(error = %e, body = %body, "Failed to parse {} response", what);
                Err(TransportError::InvalidResponse(format!(
                    "Failed to parse {} response: {}",
                    what, e
                )))
            }
        }
    }
}

#[async_trait]
impl JobApi for HttpJobApi {
    #[instrument(skip(self), fields(url = %self.submit_url))]
    async fn submit(&self) -> TransportResult<SubmitResponse> {
        debug!("Submitting analysis request");

        let response = self
            .client
            .post(&self.submit_url)
            .header(CONTENT_TYPE, "application/json")
            .json(&self.body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to send submit request");
                e
            })?;

        let (status, body) = Self::read_json(response, "Submit").await?;
        SubmitResponse::classify(status, body)
    }

    #[instrument(skip(self), fields(job_id = %job_id))]
    async fn status(&self, job_id: &str) -> TransportResult<JobStatusReport> {
        let url = format!("{}/{}", self.status_url, job_id);
        debug!(url = %url, "Polling job status");

        let response = self.client.get(&url).send().await?;
        let (_, body) = Self::read_json(response, "Status").await?;
        JobStatusReport::parse(body)
    }
}

/// Streaming exchanges over HTTP
#[derive(Clone)]
pub struct HttpStreamTransport {
    client: reqwest::Client,
}

impl HttpStreamTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn headers(request: &StreamRequest) -> TransportResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        if request.body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                TransportError::InvalidResponse(format!("Invalid header name {}: {}", name, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                TransportError::InvalidResponse(format!("Invalid header value: {}", e))
            })?;
            headers.insert(name, value);
        }
        if !headers.contains_key(ACCEPT) {
            headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        }
        Ok(headers)
    }
}

#[async_trait]
impl StreamTransport for HttpStreamTransport {
    #[instrument(skip(self, request), fields(url = %request.url, method = ?request.method))]
    async fn open(&self, request: &StreamRequest) -> TransportResult<StreamResponse> {
        let builder = match request.method {
            StreamMethod::Get => self.client.get(&request.url),
            StreamMethod::Post => self.client.post(&request.url),
        };
        let builder = builder.headers(Self::headers(request)?);
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| {
            warn!(error = %e, "Failed to open stream");
            e
        })?;

        let status = response.status().as_u16();
        debug!(status, "Stream opened");

        let body = response
            .bytes_stream()
            .map_err(|e| TransportError::Body(e.to_string()));

        Ok(StreamResponse {
            status,
            body: Box::pin(body),
        })
    }
}
