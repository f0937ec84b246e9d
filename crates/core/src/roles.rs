//! Role names carried in access tokens issued by the account service.

/// Elevated principal: may read any job.
pub const ROLE_ADMIN: &str = "admin";

/// Regular principal: sees only their own jobs.
pub const ROLE_USER: &str = "user";
