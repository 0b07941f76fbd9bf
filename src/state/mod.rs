//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `TrackedState`: lifecycle of a single URL (pending, in flight, completed, failed)
//! - `RunStatus`: lifecycle of a whole run as written to the checkpoint

mod run_status;
mod tracked_state;

// Re-export main types
pub use run_status::RunStatus;
pub use tracked_state::TrackedState;
