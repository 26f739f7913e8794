//! Exam administration. Creation schedules the finalize trigger; edits that
//! move the end time reschedule it explicitly. Both happen inside the exam's
//! transaction, so a trigger that cannot be written undoes the whole change.

use std::collections::BTreeSet;

use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::Exam;
use crate::db::types::ExamCategory;
use crate::repositories;
use crate::repositories::exams::UpdateExam;
use crate::services::errors::{ExamError, ExamResult};
use crate::services::finalize_schedule::{
    reschedule_finalization, schedule_finalization, Reschedule,
};

#[derive(Debug, Clone)]
pub(crate) struct NewExam {
    pub(crate) title: String,
    pub(crate) category: ExamCategory,
    pub(crate) year: i32,
    pub(crate) duration_minutes: i32,
    pub(crate) max_marks: i32,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) end_time: PrimitiveDateTime,
    pub(crate) topic_ids: Vec<String>,
    pub(crate) question_ids: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ExamChanges {
    pub(crate) title: Option<String>,
    pub(crate) duration_minutes: Option<i32>,
    pub(crate) max_marks: Option<i32>,
    pub(crate) start_time: Option<PrimitiveDateTime>,
    pub(crate) end_time: Option<PrimitiveDateTime>,
}

pub(crate) fn validate_window(
    start_time: PrimitiveDateTime,
    end_time: PrimitiveDateTime,
    duration_minutes: i32,
) -> ExamResult<()> {
    if end_time < start_time {
        return Err(ExamError::Validation("end_time must not be before start_time".to_string()));
    }
    if duration_minutes <= 0 {
        return Err(ExamError::Validation("duration_minutes must be positive".to_string()));
    }
    if start_time + time::Duration::minutes(i64::from(duration_minutes)) > end_time {
        return Err(ExamError::Validation(
            "duration_minutes must fit between start_time and end_time".to_string(),
        ));
    }
    Ok(())
}

fn dedupe_in_order(ids: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    ids.iter().filter(|id| seen.insert(id.as_str())).cloned().collect()
}

pub(crate) async fn create_exam(state: &AppState, draft: NewExam) -> ExamResult<Exam> {
    if draft.title.trim().is_empty() {
        return Err(ExamError::Validation("title must not be blank".to_string()));
    }
    validate_window(draft.start_time, draft.end_time, draft.duration_minutes)?;

    let question_ids = dedupe_in_order(&draft.question_ids);
    let active = repositories::questions::list_active_ids(state.db(), &question_ids).await?;
    if active.len() != question_ids.len() {
        return Err(ExamError::Validation("Unknown or inactive question ids".to_string()));
    }

    let mut topic_ids: BTreeSet<String> = draft.topic_ids.iter().cloned().collect();
    topic_ids.extend(repositories::questions::list_topic_ids(state.db(), &question_ids).await?);
    let topic_ids: Vec<String> = topic_ids.into_iter().collect();
    let known_topics = repositories::topics::list_by_ids(state.db(), &topic_ids).await?;
    if known_topics.len() != topic_ids.len() {
        return Err(ExamError::Validation("Unknown topic ids".to_string()));
    }

    let now = primitive_now_utc();
    let exam_id = Uuid::new_v4().to_string();

    let mut tx = state.db().begin().await?;
    let mut exam = repositories::exams::create(
        &mut *tx,
        repositories::exams::CreateExam {
            id: &exam_id,
            title: draft.title.trim(),
            category: draft.category,
            year: draft.year,
            duration_minutes: draft.duration_minutes,
            max_marks: draft.max_marks,
            start_time: draft.start_time,
            end_time: draft.end_time,
            created_at: now,
        },
    )
    .await?;
    repositories::exams::attach_topics(&mut *tx, &exam_id, &topic_ids, now).await?;
    repositories::exams::attach_questions(&mut *tx, &exam_id, &question_ids, now).await?;

    let grace = state.settings().finalize().grace_period();
    let handle =
        schedule_finalization(state.scheduler(), &mut *tx, &exam_id, exam.end_time, grace).await?;
    repositories::exams::set_finalize_job(&mut *tx, &exam_id, Some(&handle), now).await?;
    tx.commit().await?;
    exam.finalize_job_id = Some(handle);

    tracing::info!(
        exam_id = %exam.id,
        category = ?exam.category,
        questions = question_ids.len(),
        topics = topic_ids.len(),
        "Exam created"
    );

    Ok(exam)
}

pub(crate) async fn update_exam(
    state: &AppState,
    exam_id: &str,
    changes: ExamChanges,
) -> ExamResult<Exam> {
    if changes.title.as_deref().is_some_and(|title| title.trim().is_empty()) {
        return Err(ExamError::Validation("title must not be blank".to_string()));
    }

    let mut tx = state.db().begin().await?;
    let current = repositories::exams::find_for_update(&mut *tx, exam_id)
        .await?
        .ok_or_else(|| ExamError::not_found("Exam"))?;
    if current.closed {
        return Err(ExamError::Conflict("Exam is already closed".to_string()));
    }

    validate_window(
        changes.start_time.unwrap_or(current.start_time),
        changes.end_time.unwrap_or(current.end_time),
        changes.duration_minutes.unwrap_or(current.duration_minutes),
    )?;

    let now = primitive_now_utc();
    let mut updated = repositories::exams::update(
        &mut *tx,
        exam_id,
        UpdateExam {
            title: changes.title.map(|title| title.trim().to_string()),
            duration_minutes: changes.duration_minutes,
            max_marks: changes.max_marks,
            start_time: changes.start_time,
            end_time: changes.end_time,
        },
        now,
    )
    .await?
    .ok_or_else(|| ExamError::not_found("Exam"))?;

    let grace = state.settings().finalize().grace_period();
    let outcome = reschedule_finalization(
        state.scheduler(),
        &mut *tx,
        exam_id,
        current.finalize_job_id.as_deref(),
        current.end_time,
        updated.end_time,
        grace,
    )
    .await?;
    if let Reschedule::Scheduled { handle, .. } = outcome {
        repositories::exams::set_finalize_job(&mut *tx, exam_id, Some(&handle), now).await?;
        updated.finalize_job_id = Some(handle);
    }
    tx.commit().await?;

    tracing::info!(exam_id, "Exam updated");
    Ok(updated)
}
