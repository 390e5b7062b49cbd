use sqlx::PgPool;

/// Target of every SQL [`kanau::processor::Processor`] in [`crate::entities`].
#[derive(Debug, Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}

/// How the store layer should treat a database error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbFailure {
    /// Worth retrying: connection loss, pool timeout, serialization failure.
    Transient,
    /// A concurrent writer won (unique violation on the offer ordinal).
    Conflict,
    Permanent,
}

const UNIQUE_VIOLATION: &str = "23505";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

pub fn classify(err: &sqlx::Error) -> DbFailure {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => DbFailure::Transient,
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some(UNIQUE_VIOLATION) => DbFailure::Conflict,
            Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => DbFailure::Transient,
            _ => DbFailure::Permanent,
        },
        _ => DbFailure::Permanent,
    }
}
