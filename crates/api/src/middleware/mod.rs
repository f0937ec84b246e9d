//! Authentication and authorization middleware extractors.
//!
//! - [`auth::AuthUser`] -- Extracts the authenticated principal from a JWT Bearer token.
//! - [`rbac::RequireAuth`] -- Requires any authenticated principal.

pub mod auth;
pub mod rbac;
