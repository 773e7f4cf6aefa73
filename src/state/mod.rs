//! State module for tracking per-ID progress
//!
//! # Components
//!
//! - `FetchState`: the retry/backoff state machine of one page fetch
//! - `TaskStatus`: how one ID's task ended, as reported in progress lines

mod fetch_state;
mod task_status;

// Re-export main types
pub use fetch_state::{FetchEvent, FetchState};
pub use task_status::TaskStatus;
