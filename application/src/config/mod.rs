//! Application-level configuration.
//!
//! - [`ExecutionParams`]: per-query timeouts and agent loop limits
//! - [`RetryPolicy`]: tool server connection retry and backoff

pub mod execution_params;
pub mod retry_policy;

pub use execution_params::ExecutionParams;
pub use retry_policy::RetryPolicy;
