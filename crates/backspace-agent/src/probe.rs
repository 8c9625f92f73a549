//! Stream consumer for a running agent.
//!
//! Checks health, posts a request, decodes the SSE body and reconstructs the
//! outcome. A stream that ends without a terminal event counts as failed.

use anyhow::{bail, Context, Result};
use backspace_engine::events::{OutcomeTracker, ProgressEvent, SseDecoder, StreamOutcome};
use futures::StreamExt;
use serde_json::json;
use tracing::{info, warn};

/// What a consumed stream looked like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub outcome: StreamOutcome,
    pub events: usize,
    pub heartbeats: usize,
    /// Events seen after the terminal one. Always zero for a healthy server.
    pub after_terminal: usize,
}

pub struct Probe {
    http: reqwest::Client,
    base_url: String,
}

impl Probe {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `GET /healthz`.
    pub async fn health(&self) -> Result<serde_json::Value> {
        let url = format!("{}/healthz", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        if !response.status().is_success() {
            bail!("health check returned {}", response.status());
        }
        let body: serde_json::Value = response.json().await.context("health body")?;
        info!(body = %body, "Health check ok");
        Ok(body)
    }

    /// Post a request and follow its event stream to the end, passing each
    /// decoded event to `on_event`.
    pub async fn run<F>(&self, repo_url: &str, prompt: &str, mut on_event: F) -> Result<ProbeReport>
    where
        F: FnMut(&ProgressEvent),
    {
        let url = format!("{}/code", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "repoUrl": repo_url, "prompt": prompt }))
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("POST /code returned {status}: {body}");
        }

        let mut decoder = SseDecoder::new();
        let mut tracker = OutcomeTracker::default();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(error = %e, "Stream interrupted");
                    break;
                }
            };
            for decoded in decoder.push(&chunk) {
                handle(decoded, &mut tracker, &mut on_event);
            }
        }
        if let Some(decoded) = decoder.finish() {
            handle(decoded, &mut tracker, &mut on_event);
        }

        Ok(ProbeReport {
            events: tracker.events(),
            heartbeats: tracker.heartbeats(),
            after_terminal: tracker.after_terminal(),
            outcome: tracker.finish(),
        })
    }
}

fn handle<F, E>(decoded: Result<ProgressEvent, E>, tracker: &mut OutcomeTracker, on_event: &mut F)
where
    F: FnMut(&ProgressEvent),
    E: std::fmt::Display,
{
    match decoded {
        Ok(event) => {
            tracker.observe(&event);
            on_event(&event);
        }
        Err(e) => warn!(error = %e, "Skipping undecodable frame"),
    }
}
