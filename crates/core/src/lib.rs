pub mod analysis;
pub mod artifact;
pub mod error;
pub mod job;
pub mod roles;
pub mod store;
pub mod types;
pub mod worker;
