//! Chat connection management with backoff reconnects

pub mod manager;
pub mod retry;

pub use manager::{ConnectionManager, EXHAUSTED_MESSAGE};
pub use retry::{ConnectionState, RetryPolicy};
