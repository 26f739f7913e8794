//! Keeps each exam's finalize trigger in step with its end time.

use async_trait::async_trait;
use sqlx::{Connection, PgConnection};
use time::{Duration, PrimitiveDateTime};

use crate::services::errors::SchedulerError;

/// Delayed delivery of `finalize_exam` calls. Delivery is at-least-once.
///
/// Both calls run on the caller's connection, so a trigger is created or
/// cancelled in the same transaction as the exam write that asked for it.
#[async_trait]
pub(crate) trait FinalizeScheduler: Send + Sync {
    async fn schedule_at(
        &self,
        conn: &mut PgConnection,
        exam_id: &str,
        run_at: PrimitiveDateTime,
    ) -> Result<String, SchedulerError>;

    /// Best-effort; `Ok(false)` when the trigger already ran or was never pending.
    async fn cancel(&self, conn: &mut PgConnection, handle: &str) -> Result<bool, SchedulerError>;
}

pub(crate) fn finalize_run_at(end_time: PrimitiveDateTime, grace: Duration) -> PrimitiveDateTime {
    end_time + grace
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Reschedule {
    Unchanged,
    Scheduled { handle: String, run_at: PrimitiveDateTime },
}

/// What an end-time edit has to do to the trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReschedulePlan {
    pub(crate) cancel: Option<String>,
    pub(crate) run_at: PrimitiveDateTime,
}

pub(crate) fn plan_reschedule(
    previous_handle: Option<&str>,
    old_end: PrimitiveDateTime,
    new_end: PrimitiveDateTime,
    grace: Duration,
) -> Option<ReschedulePlan> {
    if old_end == new_end {
        return None;
    }
    Some(ReschedulePlan {
        cancel: previous_handle.map(str::to_string),
        run_at: finalize_run_at(new_end, grace),
    })
}

pub(crate) async fn schedule_finalization<S>(
    scheduler: &S,
    conn: &mut PgConnection,
    exam_id: &str,
    end_time: PrimitiveDateTime,
    grace: Duration,
) -> Result<String, SchedulerError>
where
    S: FinalizeScheduler + ?Sized,
{
    let run_at = finalize_run_at(end_time, grace);
    let handle = scheduler.schedule_at(conn, exam_id, run_at).await?;
    tracing::info!(exam_id, handle = %handle, run_at = %run_at, "Scheduled exam finalization");
    Ok(handle)
}

/// Moves the trigger when the end time changed. The cancel runs inside a
/// savepoint and a failure only logs: a leftover trigger that fires early is
/// dropped by the worker, and one that fires late finds the exam closed.
/// A scheduling failure is returned so the caller's transaction rolls back.
pub(crate) async fn reschedule_finalization<S>(
    scheduler: &S,
    conn: &mut PgConnection,
    exam_id: &str,
    previous_handle: Option<&str>,
    old_end: PrimitiveDateTime,
    new_end: PrimitiveDateTime,
    grace: Duration,
) -> Result<Reschedule, SchedulerError>
where
    S: FinalizeScheduler + ?Sized,
{
    let Some(plan) = plan_reschedule(previous_handle, old_end, new_end, grace) else {
        return Ok(Reschedule::Unchanged);
    };

    if let Some(handle) = plan.cancel.as_deref() {
        let mut savepoint = conn.begin().await?;
        match scheduler.cancel(&mut *savepoint, handle).await {
            Ok(cancelled) => {
                savepoint.commit().await?;
                tracing::debug!(exam_id, handle, cancelled, "Cancelled previous finalize trigger");
            }
            Err(err) => {
                savepoint.rollback().await?;
                tracing::warn!(
                    exam_id,
                    handle,
                    error = %err,
                    "Failed to cancel previous finalize trigger"
                );
            }
        }
    }

    let handle = schedule_finalization(scheduler, conn, exam_id, new_end, grace).await?;
    Ok(Reschedule::Scheduled { handle, run_at: plan.run_at })
}
