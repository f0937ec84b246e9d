//! External analysis worker: process execution and result recording.

pub mod invoker;
pub mod subprocess;

pub use invoker::{DispatchedJob, WorkerCommand, WorkerFailure, WorkerInvoker};
