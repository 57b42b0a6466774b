/// Job identifiers are UUIDv7, so their natural order follows submission time.
pub type JobId = uuid::Uuid;

/// Agent task identifiers.
pub type TaskId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
