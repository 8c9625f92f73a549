//! Backspace engine
//!
//! Deterministic core of the coding agent. Nothing in this crate talks to the
//! network; collaborators that do (the planner, source control, hosting) are
//! reached through traits implemented by the agent crate.
//!
//! # Components
//!
//! - [`plan`]: edit operations, change plans, the tolerant plan parser and the
//!   placeholder fallback
//! - [`workspace`]: request-scoped file tree with sandboxed path resolution
//! - [`patch`]: literal first-occurrence edit application
//! - [`validator`]: structural and compiler checks over the whole workspace
//! - [`retry`]: bounded apply/validate/fix state machine
//! - [`events`]: progress event schema, ordered emitter, SSE framing and
//!   outcome reconstruction
//! - [`observer`]: optional telemetry hooks

#![allow(clippy::uninlined_format_args)]

pub mod events;
pub mod observer;
pub mod patch;
pub mod plan;
pub mod planner;
pub mod retry;
pub mod validator;
pub mod workspace;

pub use events::{
    encode_frame, preview, EventEmitter, EventStream, OutcomeTracker, ProgressEvent, SseDecoder,
    StreamClosed, StreamOutcome,
};
pub use observer::{NoopObserver, RunSummary, SharedObserver, WorkflowObserver};
pub use patch::{AppliedEdit, EditAction, NotFoundPolicy, PatchApplier, PatchError};
pub use plan::{parse_plan, placeholder_plan, ChangePlan, EditOperation, PlanParseError};
pub use planner::{FileContents, Planner, PlanningError, SharedPlanner};
pub use retry::{
    EmptyPlanPolicy, RetryConfig, RetryCoordinator, RetryFailure, RetryReport, RetryState,
    RetryStatus,
};
pub use validator::{
    CompileCheck, CompileError, SyntaxCheck, Validate, ValidationResult, Validator,
    ValidatorConfig,
};
pub use workspace::{SourceFilter, Workspace, WorkspaceError};
