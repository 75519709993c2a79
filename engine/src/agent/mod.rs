//! Agent control loop
//!
//! [`AgentCore`] drives a single task; [`AgentService`] is the task control
//! API that starts loops on tokio tasks and routes operator calls.

pub mod core;
pub mod retry;
pub mod service;

pub use core::{AgentCore, RunOutcome};
pub use retry::RetryPolicy;
pub use service::AgentService;
