//! Resilience patterns for the CRM transport
//!
//! Retry with exponential backoff for transient upstream failures. The
//! batch orchestrator's windowing handles sustained-load protection; retry
//! here covers individual flaky calls.

mod retry;

pub use retry::{RetryConfig, RetryExecutor};
