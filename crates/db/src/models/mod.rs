//! Row structs for the `jobs` table and status lookups.

pub mod job;
pub mod status;
