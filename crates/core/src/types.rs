/// Principal identifiers issued by the account service (JWT `sub`).
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Analysis job identifiers are UUID v7, so they sort by creation time.
pub type JobId = uuid::Uuid;

/// Generate a fresh job identifier.
pub fn new_job_id() -> JobId {
    uuid::Uuid::now_v7()
}

/// Parse a client-supplied job identifier.
///
/// Returns `None` for anything that is not a canonical UUID so callers can
/// reject the request before touching the store.
pub fn parse_job_id(raw: &str) -> Option<JobId> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    uuid::Uuid::parse_str(trimmed).ok()
}
