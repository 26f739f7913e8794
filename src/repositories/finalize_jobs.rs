use time::PrimitiveDateTime;

use crate::db::models::FinalizeJob;
use crate::db::types::FinalizeJobStatus;

pub(crate) const COLUMNS: &str = "\
    id, exam_id, run_at, status, attempts, last_error, started_at, finished_at, \
    created_at, updated_at";

pub(crate) async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    exam_id: &str,
    run_at: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> Result<FinalizeJob, sqlx::Error> {
    sqlx::query_as::<_, FinalizeJob>(&format!(
        "INSERT INTO exam_finalize_jobs (
            id, exam_id, run_at, status, attempts, created_at, updated_at
         )
         VALUES ($1, $2, $3, $4, 0, $5, $5)
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(exam_id)
    .bind(run_at)
    .bind(FinalizeJobStatus::Pending)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<FinalizeJob>, sqlx::Error> {
    sqlx::query_as::<_, FinalizeJob>(&format!(
        "SELECT {COLUMNS} FROM exam_finalize_jobs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Only pending jobs can be cancelled; returns whether one was.
pub(crate) async fn cancel_pending(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exam_finalize_jobs
         SET status = $1, finished_at = $2, updated_at = $2
         WHERE id = $3 AND status = $4",
    )
    .bind(FinalizeJobStatus::Cancelled)
    .bind(now)
    .bind(id)
    .bind(FinalizeJobStatus::Pending)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn claim_next_due(
    executor: impl sqlx::PgExecutor<'_>,
    now: PrimitiveDateTime,
) -> Result<Option<FinalizeJob>, sqlx::Error> {
    sqlx::query_as::<_, FinalizeJob>(&format!(
        "WITH candidate AS (
            SELECT id FROM exam_finalize_jobs
            WHERE status = $1 AND run_at <= $2
            ORDER BY run_at, created_at
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        UPDATE exam_finalize_jobs
        SET status = $3,
            attempts = exam_finalize_jobs.attempts + 1,
            started_at = $2,
            updated_at = $2
        FROM candidate
        WHERE exam_finalize_jobs.id = candidate.id
        RETURNING {}",
        qualified_columns()
    ))
    .bind(FinalizeJobStatus::Pending)
    .bind(now)
    .bind(FinalizeJobStatus::Running)
    .fetch_optional(executor)
    .await
}

fn qualified_columns() -> String {
    COLUMNS
        .split(',')
        .map(|column| format!("exam_finalize_jobs.{}", column.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) async fn mark_done(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE exam_finalize_jobs
         SET status = $1, last_error = NULL, finished_at = $2, updated_at = $2
         WHERE id = $3",
    )
    .bind(FinalizeJobStatus::Done)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn schedule_retry(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    error: &str,
    run_at: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE exam_finalize_jobs
         SET status = $1, last_error = $2, run_at = $3, started_at = NULL, updated_at = $4
         WHERE id = $5",
    )
    .bind(FinalizeJobStatus::Pending)
    .bind(error)
    .bind(run_at)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Puts a claimed job back to sleep without spending one of its retries.
pub(crate) async fn postpone(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    run_at: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE exam_finalize_jobs
         SET status = $1,
             attempts = GREATEST(attempts - 1, 0),
             last_error = NULL,
             run_at = $2,
             started_at = NULL,
             updated_at = $3
         WHERE id = $4",
    )
    .bind(FinalizeJobStatus::Pending)
    .bind(run_at)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn mark_failed(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    error: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE exam_finalize_jobs
         SET status = $1, last_error = $2, finished_at = $3, updated_at = $3
         WHERE id = $4",
    )
    .bind(FinalizeJobStatus::Failed)
    .bind(error)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Hands jobs whose worker vanished back to the queue.
pub(crate) async fn requeue_stale(
    executor: impl sqlx::PgExecutor<'_>,
    started_before: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exam_finalize_jobs
         SET status = $1,
             started_at = NULL,
             last_error = 'worker stopped before finishing',
             updated_at = $2
         WHERE status = $3 AND started_at < $4",
    )
    .bind(FinalizeJobStatus::Pending)
    .bind(now)
    .bind(FinalizeJobStatus::Running)
    .bind(started_before)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::qualified_columns;

    #[test]
    fn returning_columns_are_table_qualified() {
        let columns = qualified_columns();
        assert!(columns.starts_with("exam_finalize_jobs.id, exam_finalize_jobs.exam_id"));
        assert!(columns.ends_with("exam_finalize_jobs.updated_at"));
        assert!(!columns.contains(".."));
    }
}
