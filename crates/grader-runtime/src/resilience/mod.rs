//! Resilience patterns for LLM calls.
//!
//! - Retry: bounded exponential backoff with a per-attempt timeout
//! - Usage: token and cost accounting per operation

mod retry;
mod usage;

pub use retry::RetryPolicy;
pub use usage::{LlmUsage, UsageTracker};
