//! Progress event protocol.
//!
//! Every observable step of a run becomes a [`ProgressEvent`] on a single
//! ordered per-request stream that ends with exactly one `error` or
//! `complete` event.

pub mod emitter;
pub mod replay;
pub mod sse;
pub mod types;

pub use emitter::{EventEmitter, EventStream, StreamClosed, DEFAULT_HEARTBEAT_INTERVAL};
pub use replay::{OutcomeTracker, StreamOutcome, DISCONNECTED_MESSAGE};
pub use sse::{encode_frame, SseDecodeError, SseDecoder};
pub use types::{preview, ProgressEvent, PREVIEW_MAX_CHARS};
