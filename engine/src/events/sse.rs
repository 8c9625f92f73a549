//! Server-sent events framing.
//!
//! Producers write one `data: <json>\n\n` frame per event. [`SseDecoder`] is
//! the consumer side: it accepts arbitrary byte chunks (frames and even UTF-8
//! sequences may be split across chunks) and yields complete events.

use super::types::ProgressEvent;

/// Encode one event as an SSE frame.
pub fn encode_frame(event: &ProgressEvent) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(event)?;
    Ok(format!("data: {json}\n\n"))
}

#[derive(Debug, thiserror::Error)]
#[error("invalid event payload `{payload}`: {source}")]
pub struct SseDecodeError {
    pub payload: String,
    #[source]
    pub source: serde_json::Error,
}

/// Incremental SSE decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<ProgressEvent, SseDecodeError>> {
        self.pending.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();
            if let Some(result) = self.handle_line(&line) {
                out.push(result);
            }
        }
        out
    }

    /// Flush a final frame that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<Result<ProgressEvent, SseDecodeError>> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&rest).into_owned();
            if let Some(result) = self.handle_line(line.trim_end_matches('\r')) {
                return Some(result);
            }
        }
        self.dispatch()
    }

    fn handle_line(&mut self, line: &str) -> Option<Result<ProgressEvent, SseDecodeError>> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<Result<ProgressEvent, SseDecodeError>> {
        if self.data.is_empty() {
            return None;
        }
        let payload = std::mem::take(&mut self.data).join("\n");
        Some(
            serde_json::from_str(&payload)
                .map_err(|source| SseDecodeError { payload, source }),
        )
    }
}
