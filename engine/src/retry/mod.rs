//! Bounded apply/validate/fix loop.

pub mod coordinator;
pub mod state_machine;

pub use coordinator::{EmptyPlanPolicy, RetryConfig, RetryCoordinator, RetryFailure, RetryReport};
pub use state_machine::{IllegalTransition, RetryMachine, RetryState, RetryStatus, TransitionRecord};
