//! Access-token verification.
//!
//! Tokens are issued by the account service; this server only validates
//! them and reads the principal id and role.

pub mod jwt;
