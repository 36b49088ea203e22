//! Scheduling engine -- submission, dispatch and worker lifecycle.
//!
//! Split into focused submodules:
//! - `core`: Scheduler handle, shared state, submission and observation
//! - `dispatch`: the wake-driven dispatch loop and limiter admission
//! - `worker`: per-job dependency waiting, gating, execution and fan-out

mod core;
mod dispatch;
mod worker;

pub use self::core::Scheduler;
