use thiserror::Error;

use crate::services::locks::LockError;

/// Failures surfaced by the exam core. Lock contention and empty leaderboards
/// are outcomes, not errors, so they never appear here.
#[derive(Debug, Error)]
pub(crate) enum ExamError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("lock service failure: {0}")]
    Lock(#[from] LockError),
    #[error("scheduler failure: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub(crate) enum SchedulerError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[cfg(test)]
    #[error("trigger {0} was rejected")]
    Rejected(String),
}

pub(crate) type ExamResult<T> = Result<T, ExamError>;

impl ExamError {
    pub(crate) fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }
}
