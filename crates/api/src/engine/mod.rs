//! Job execution engine.
//!
//! Contains the dispatcher that runs accepted jobs on the analysis worker
//! and the startup recovery pass for jobs orphaned by a previous process.

pub mod dispatcher;
pub mod recovery;

pub use dispatcher::{DispatchHandle, DispatchSlot, JobDispatcher};
