//! Postgres-backed delivery of finalize triggers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::config::FinalizeSettings;
use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc as now_primitive, seconds};
use crate::db::models::FinalizeJob;
use crate::repositories;
use crate::services::errors::{ExamError, SchedulerError};
use crate::services::finalize_schedule::{finalize_run_at, FinalizeScheduler};
use crate::services::leaderboard::{finalize_exam, FinalizeOutcome};

const MAX_RETRY_DELAY_SECONDS: u64 = 3600;

/// Triggers are rows in `exam_finalize_jobs`, written on the caller's
/// connection so they commit or roll back with the exam.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PgFinalizeQueue;

#[async_trait]
impl FinalizeScheduler for PgFinalizeQueue {
    async fn schedule_at(
        &self,
        conn: &mut PgConnection,
        exam_id: &str,
        run_at: PrimitiveDateTime,
    ) -> Result<String, SchedulerError> {
        let id = Uuid::new_v4().to_string();
        let job = repositories::finalize_jobs::insert(conn, &id, exam_id, run_at, now_primitive())
            .await?;
        Ok(job.id)
    }

    async fn cancel(&self, conn: &mut PgConnection, handle: &str) -> Result<bool, SchedulerError> {
        Ok(repositories::finalize_jobs::cancel_pending(conn, handle, now_primitive()).await?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureDisposition {
    Retry { run_at: PrimitiveDateTime },
    GiveUp,
}

/// Doubles per claim, capped at an hour.
pub(crate) fn retry_delay(backoff_seconds: u64, claims: i32) -> time::Duration {
    let exponent = claims.saturating_sub(1).clamp(0, 16) as u32;
    let delay = backoff_seconds.saturating_mul(1u64 << exponent);
    seconds(delay.min(MAX_RETRY_DELAY_SECONDS))
}

pub(crate) fn disposition_after_failure(
    job: &FinalizeJob,
    settings: &FinalizeSettings,
    error: &ExamError,
    now: PrimitiveDateTime,
) -> FailureDisposition {
    if matches!(error, ExamError::NotFound(_)) {
        return FailureDisposition::GiveUp;
    }
    if job.attempts >= settings.max_retries as i32 {
        return FailureDisposition::GiveUp;
    }
    let delay = retry_delay(settings.retry_backoff_seconds, job.attempts);
    FailureDisposition::Retry { run_at: now + delay }
}

pub(crate) async fn claim_next_job(pool: &PgPool) -> Result<Option<FinalizeJob>> {
    repositories::finalize_jobs::claim_next_due(pool, now_primitive())
        .await
        .context("Failed to claim finalize job")
}

pub(crate) async fn process_job(state: &AppState, job: &FinalizeJob) -> Result<()> {
    let result = finalize_exam(state, &job.exam_id).await;
    let now = now_primitive();

    match result {
        Ok(FinalizeOutcome::NotYetDue { end_time }) => {
            postpone_or_drop(state, job, end_time, now).await?;
        }
        Ok(outcome) => {
            repositories::finalize_jobs::mark_done(state.db(), &job.id, now)
                .await
                .context("Failed to mark finalize job done")?;
            if outcome == FinalizeOutcome::LockContention {
                tracing::info!(
                    job_id = %job.id,
                    exam_id = %job.exam_id,
                    "Another run owns the exam; trigger dropped"
                );
            }
            metrics::counter!("finalize_jobs_total", "status" => "done").increment(1);
        }
        Err(err) => {
            let message = err.to_string();
            match disposition_after_failure(job, state.settings().finalize(), &err, now) {
                FailureDisposition::Retry { run_at } => {
                    repositories::finalize_jobs::schedule_retry(
                        state.db(),
                        &job.id,
                        &message,
                        run_at,
                        now,
                    )
                    .await
                    .context("Failed to requeue finalize job")?;
                    tracing::warn!(
                        job_id = %job.id,
                        exam_id = %job.exam_id,
                        attempts = job.attempts,
                        retry_at = %run_at,
                        error = %message,
                        "Finalize failed; retrying"
                    );
                    metrics::counter!("finalize_jobs_total", "status" => "retry").increment(1);
                }
                FailureDisposition::GiveUp => {
                    repositories::finalize_jobs::mark_failed(state.db(), &job.id, &message, now)
                        .await
                        .context("Failed to mark finalize job failed")?;
                    tracing::error!(
                        job_id = %job.id,
                        exam_id = %job.exam_id,
                        attempts = job.attempts,
                        error = %message,
                        "Finalize failed permanently"
                    );
                    metrics::counter!("finalize_jobs_total", "status" => "failed").increment(1);
                }
            }
        }
    }

    Ok(())
}

/// A trigger that fires before its exam ends is either the exam's current
/// trigger, which sleeps until the end plus grace, or a leftover from an end
/// time that has since moved, which is dropped.
async fn postpone_or_drop(
    state: &AppState,
    job: &FinalizeJob,
    end_time: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> Result<()> {
    let current = repositories::exams::find_by_id(state.db(), &job.exam_id)
        .await
        .context("Failed to load exam for early finalize job")?
        .and_then(|exam| exam.finalize_job_id);

    if current.as_deref() == Some(job.id.as_str()) {
        let run_at = finalize_run_at(end_time, state.settings().finalize().grace_period());
        repositories::finalize_jobs::postpone(state.db(), &job.id, run_at, now)
            .await
            .context("Failed to postpone finalize job")?;
        tracing::info!(
            job_id = %job.id,
            exam_id = %job.exam_id,
            run_at = %run_at,
            "Exam still running; finalize postponed"
        );
        metrics::counter!("finalize_jobs_total", "status" => "postponed").increment(1);
    } else {
        repositories::finalize_jobs::mark_done(state.db(), &job.id, now)
            .await
            .context("Failed to mark finalize job done")?;
        tracing::info!(
            job_id = %job.id,
            exam_id = %job.exam_id,
            "Superseded trigger fired before the exam ended; dropped"
        );
        metrics::counter!("finalize_jobs_total", "status" => "superseded").increment(1);
    }

    Ok(())
}

pub(crate) async fn requeue_stale_jobs(state: &AppState) -> Result<()> {
    let now = now_primitive();
    let stale_before = now - seconds(state.settings().finalize().stale_after_seconds);

    let requeued = repositories::finalize_jobs::requeue_stale(state.db(), stale_before, now)
        .await
        .context("Failed to requeue stale finalize jobs")?;

    if requeued > 0 {
        tracing::warn!(requeued_jobs = requeued, "Requeued stale finalize jobs");
        metrics::counter!("finalize_jobs_total", "status" => "requeued").increment(requeued);
    }

    Ok(())
}
