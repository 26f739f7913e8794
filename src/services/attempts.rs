//! Attempt lifecycle: creation with seeding, answer submission, and the
//! one-time completion that triggers scoring.

use std::collections::BTreeSet;

use sqlx::PgPool;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::config::AttemptSettings;
use crate::core::time::{primitive_now_utc, seconds};
use crate::db::models::{AnsweredQuestion, Attempt, Exam};
use crate::db::types::QuestionType;
use crate::repositories;
use crate::repositories::answers::AnswerDetailRow;
use crate::services::errors::{ExamError, ExamResult};
use crate::services::scoring::{
    grade, score_answers, AnswerKey, AttemptScore, CategoryAggregate, GradedAnswer, Marking,
};

#[derive(Debug)]
pub(crate) struct AttemptHandle {
    pub(crate) attempt: Attempt,
    pub(crate) created: bool,
}

#[derive(Debug)]
pub(crate) struct AttemptDetail {
    pub(crate) attempt: Attempt,
    pub(crate) answers: Vec<AnswerDetailRow>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct AnswerSelection {
    pub(crate) selected_choice: Option<i16>,
    pub(crate) input_answer: Option<String>,
}

/// The attempt opens after a short delay and runs for the exam duration
/// plus slack, never leaving the exam window.
pub(crate) fn attempt_window(
    exam: &Exam,
    now: PrimitiveDateTime,
    settings: &AttemptSettings,
) -> (PrimitiveDateTime, PrimitiveDateTime) {
    let start = (now + seconds(settings.start_delay_seconds)).clamp(exam.start_time, exam.end_time);
    let planned_end = start
        + time::Duration::minutes(i64::from(exam.duration_minutes))
        + seconds(settings.end_slack_seconds);
    (start, planned_end.clamp(start, exam.end_time))
}

pub(crate) async fn create_or_get_attempt(
    pool: &PgPool,
    settings: &AttemptSettings,
    exam_id: &str,
    user_id: &str,
) -> ExamResult<AttemptHandle> {
    let exam = repositories::exams::find_by_id(pool, exam_id)
        .await?
        .ok_or_else(|| ExamError::not_found("Exam"))?;

    let now = primitive_now_utc();
    if exam.closed || exam.end_time <= now {
        return Err(ExamError::Validation(
            "Cannot start an attempt for a closed or expired exam".to_string(),
        ));
    }

    if let Some(attempt) =
        repositories::attempts::find_by_exam_and_user(pool, exam_id, user_id).await?
    {
        return Ok(AttemptHandle { attempt, created: false });
    }

    if repositories::users::find_by_id(pool, user_id).await?.is_none() {
        return Err(ExamError::not_found("User"));
    }

    let (start_time, end_time) = attempt_window(&exam, now, settings);
    let attempt_id = Uuid::new_v4().to_string();

    let mut tx = pool.begin().await?;
    let inserted = repositories::attempts::insert_if_absent(
        &mut *tx,
        repositories::attempts::CreateAttempt {
            id: &attempt_id,
            exam_id,
            user_id,
            start_time,
            end_time,
            created_at: now,
        },
    )
    .await?;

    let Some(attempt) = inserted else {
        tx.rollback().await?;
        let attempt = repositories::attempts::find_by_exam_and_user(pool, exam_id, user_id)
            .await?
            .ok_or_else(|| ExamError::not_found("Attempt"))?;
        return Ok(AttemptHandle { attempt, created: false });
    };

    let seeded = seed_attempt_questions(&mut tx, &exam, &attempt, now).await?;
    tx.commit().await?;

    tracing::info!(
        exam_id,
        user_id,
        attempt_id = %attempt.id,
        seeded_questions = seeded,
        "Attempt created"
    );

    Ok(AttemptHandle { attempt, created: true })
}

/// Materialises one unanswered row per exam question and zeroed aggregates
/// for the user, so later reads never miss a row.
pub(crate) async fn seed_attempt_questions(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    exam: &Exam,
    attempt: &Attempt,
    now: PrimitiveDateTime,
) -> ExamResult<u64> {
    let questions = repositories::questions::list_for_exam(&mut **tx, &exam.id).await?;
    let question_ids: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();

    let seeded =
        repositories::answers::seed_for_attempt(&mut **tx, &attempt.id, &question_ids, now).await?;

    repositories::stats::ensure_category_row(&mut **tx, &attempt.user_id, exam.category, now)
        .await?;

    let mut topic_ids: BTreeSet<String> =
        repositories::exams::list_topic_ids(&mut **tx, &exam.id).await?.into_iter().collect();
    topic_ids.extend(questions.into_iter().map(|q| q.topic_id));
    let topic_ids: Vec<String> = topic_ids.into_iter().collect();
    repositories::stats::ensure_topic_rows(&mut **tx, &attempt.user_id, &topic_ids, now).await?;

    Ok(seeded)
}

pub(crate) fn validate_selection(
    question_type: QuestionType,
    selection: &AnswerSelection,
) -> ExamResult<()> {
    match question_type {
        QuestionType::SingleChoice => match selection.selected_choice {
            None => Err(ExamError::Validation("Selected choice is required.".to_string())),
            Some(choice) if !(1..=4).contains(&choice) => Err(ExamError::Validation(
                "Selected choice must be between 1 and 4.".to_string(),
            )),
            Some(_) => Ok(()),
        },
        QuestionType::Puzzle => match selection.input_answer.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => Ok(()),
            _ => Err(ExamError::Validation("Answer text is required.".to_string())),
        },
    }
}

/// Runs under a share lock on the attempt, so completion either waits for
/// the answer or the answer sees the completed flag.
pub(crate) async fn submit_answer(
    pool: &PgPool,
    answer_id: &str,
    user_id: &str,
    selection: AnswerSelection,
) -> ExamResult<AnsweredQuestion> {
    let mut tx = pool.begin().await?;

    let answer = repositories::answers::find_by_id(&mut *tx, answer_id)
        .await?
        .ok_or_else(|| ExamError::not_found("Answer"))?;
    let attempt = repositories::attempts::find_for_share(&mut *tx, &answer.attempt_id)
        .await?
        .filter(|attempt| attempt.user_id == user_id)
        .ok_or_else(|| ExamError::not_found("Answer"))?;

    let now = primitive_now_utc();
    if attempt.completed || attempt.end_time <= now {
        return Err(closed_attempt());
    }

    let question = repositories::questions::find_by_id(&mut *tx, &answer.question_id)
        .await?
        .ok_or_else(|| ExamError::not_found("Question"))?;
    validate_selection(question.question_type, &selection)?;

    let (selected_choice, input_answer) = match question.question_type {
        QuestionType::SingleChoice => (selection.selected_choice, None),
        QuestionType::Puzzle => (None, selection.input_answer.as_deref()),
    };
    let key = AnswerKey {
        question_type: question.question_type,
        correct_choice: question.correct_choice,
        correct_puzzle_answer: question.correct_puzzle_answer.as_deref(),
    };
    let is_correct = grade(&key, selected_choice, input_answer);

    let recorded = repositories::answers::record(
        &mut *tx,
        answer_id,
        repositories::answers::RecordAnswer {
            selected_choice,
            input_puzzle_answer: input_answer,
            is_correct,
            completed_at: now,
        },
    )
    .await?
    .ok_or_else(closed_attempt)?;
    tx.commit().await?;

    tracing::debug!(attempt_id = %attempt.id, answer_id, "Answer recorded");
    Ok(recorded)
}

fn closed_attempt() -> ExamError {
    ExamError::Validation("Cannot submit answer for a completed or expired attempt.".to_string())
}

/// Flips the attempt to completed and scores it in the same transaction.
pub(crate) async fn complete_attempt(
    pool: &PgPool,
    attempt_id: &str,
    user_id: &str,
) -> ExamResult<Attempt> {
    let mut tx = pool.begin().await?;

    let attempt = repositories::attempts::find_by_id(&mut *tx, attempt_id)
        .await?
        .filter(|attempt| attempt.user_id == user_id)
        .ok_or_else(|| ExamError::not_found("Attempt"))?;
    if attempt.completed {
        return Err(ExamError::Conflict("Exam already marked as completed.".to_string()));
    }

    let now = primitive_now_utc();
    let completed = repositories::attempts::mark_completed(&mut *tx, attempt_id, now, now)
        .await?
        .ok_or_else(|| ExamError::Conflict("Exam already marked as completed.".to_string()))?;
    let exam = repositories::exams::find_by_id(&mut *tx, &completed.exam_id)
        .await?
        .ok_or_else(|| ExamError::not_found("Exam"))?;

    let score = score_attempt(&mut tx, &exam, &completed, now).await?;
    tx.commit().await?;

    tracing::info!(
        exam_id = %exam.id,
        attempt_id,
        user_id,
        total_score = score.total_score,
        "Attempt completed"
    );

    let mut attempt = completed;
    attempt.total_score = Some(score.total_score);
    attempt.subject_scores = sqlx::types::Json(score.subject_scores);
    Ok(attempt)
}

/// Scores a freshly completed attempt and folds it into the user's aggregates.
/// Callers invoke this exactly once per attempt, inside the transaction that
/// flipped `completed`.
pub(crate) async fn score_attempt(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    exam: &Exam,
    attempt: &Attempt,
    now: PrimitiveDateTime,
) -> ExamResult<AttemptScore> {
    let graded: Vec<GradedAnswer> =
        repositories::answers::list_graded_for_attempt(&mut **tx, &attempt.id)
            .await?
            .into_iter()
            .map(|row| GradedAnswer { topic_id: row.topic_id, is_correct: row.is_correct })
            .collect();
    let score = score_answers(&graded, Marking::for_category(exam.category));

    repositories::attempts::set_scores(
        &mut **tx,
        &attempt.id,
        &score.subject_scores,
        score.total_score,
        now,
    )
    .await?;

    for (topic_id, tally) in &score.tallies {
        repositories::stats::increment_topic(
            &mut **tx,
            &attempt.user_id,
            topic_id,
            tally.attempted(),
            tally.correct,
            now,
        )
        .await?;
    }

    repositories::stats::ensure_category_row(&mut **tx, &attempt.user_id, exam.category, now)
        .await?;
    let current =
        repositories::stats::lock_category_row(&mut **tx, &attempt.user_id, exam.category).await?;
    let aggregate = CategoryAggregate {
        tests_taken: current.tests_taken,
        average_score: current.average_score,
        highest_score: current.highest_score,
    }
    .record(score.total_score);
    repositories::stats::store_category_aggregate(
        &mut **tx,
        &attempt.user_id,
        exam.category,
        aggregate,
        now,
    )
    .await?;

    metrics::counter!("attempts_scored_total").increment(1);
    tracing::debug!(
        attempt_id = %attempt.id,
        total_score = score.total_score,
        topics = score.tallies.len(),
        "Attempt scored"
    );

    Ok(score)
}

pub(crate) async fn attempt_detail(
    pool: &PgPool,
    attempt_id: &str,
    user_id: &str,
) -> ExamResult<AttemptDetail> {
    let attempt = repositories::attempts::find_by_id(pool, attempt_id)
        .await?
        .filter(|attempt| attempt.user_id == user_id)
        .ok_or_else(|| ExamError::not_found("Attempt"))?;
    let answers = repositories::answers::list_details_for_attempt(pool, attempt_id).await?;
    Ok(AttemptDetail { attempt, answers })
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::db::types::ExamCategory;
    use crate::test_support;

    fn exam(start: PrimitiveDateTime, end: PrimitiveDateTime, duration_minutes: i32) -> Exam {
        Exam {
            id: "exam-1".to_string(),
            title: "Mock CAT".to_string(),
            category: ExamCategory::Cat,
            year: 2026,
            duration_minutes,
            max_marks: 100,
            start_time: start,
            end_time: end,
            closed: false,
            closed_at: None,
            finalize_job_id: None,
            created_at: start,
            updated_at: start,
        }
    }

    fn settings() -> AttemptSettings {
        AttemptSettings { start_delay_seconds: 60, end_slack_seconds: 30 }
    }

    #[test]
    fn window_starts_after_delay_and_adds_slack() {
        let exam = exam(datetime!(2026-04-01 09:00), datetime!(2026-04-01 18:00), 120);

        let (start, end) = attempt_window(&exam, datetime!(2026-04-01 10:00), &settings());

        assert_eq!(start, datetime!(2026-04-01 10:01));
        assert_eq!(end, datetime!(2026-04-01 12:01:30));
    }

    #[test]
    fn window_never_leaves_the_exam() {
        let exam = exam(datetime!(2026-04-01 09:00), datetime!(2026-04-01 11:00), 120);

        let (start, end) = attempt_window(&exam, datetime!(2026-04-01 08:00), &settings());
        assert_eq!(start, datetime!(2026-04-01 09:00));
        assert_eq!(end, datetime!(2026-04-01 11:00));

        let (start, end) = attempt_window(&exam, datetime!(2026-04-01 10:59:30), &settings());
        assert_eq!(start, datetime!(2026-04-01 11:00));
        assert_eq!(end, start);
    }

    #[test]
    fn single_choice_requires_a_choice_in_range() {
        let none = AnswerSelection::default();
        let out_of_range = AnswerSelection { selected_choice: Some(5), ..Default::default() };
        let valid = AnswerSelection { selected_choice: Some(2), ..Default::default() };

        assert!(matches!(
            validate_selection(QuestionType::SingleChoice, &none),
            Err(ExamError::Validation(_))
        ));
        assert!(matches!(
            validate_selection(QuestionType::SingleChoice, &out_of_range),
            Err(ExamError::Validation(_))
        ));
        assert!(validate_selection(QuestionType::SingleChoice, &valid).is_ok());
    }

    #[test]
    fn puzzle_requires_non_blank_text() {
        let blank = AnswerSelection { input_answer: Some("   ".to_string()), ..Default::default() };
        let text = AnswerSelection { input_answer: Some("42".to_string()), ..Default::default() };

        assert!(matches!(
            validate_selection(QuestionType::Puzzle, &blank),
            Err(ExamError::Validation(_))
        ));
        assert!(validate_selection(QuestionType::Puzzle, &text).is_ok());
    }

    #[tokio::test]
    async fn answers_are_frozen_once_the_attempt_completes() {
        let Some(ctx) = test_support::setup_test_context().await else {
            return;
        };
        let db = ctx.state.db();

        let topic = test_support::insert_topic(db, "Quant").await;
        let first = test_support::insert_choice_question(db, &topic.id, 2).await;
        let second = test_support::insert_choice_question(db, &topic.id, 4).await;
        let exam =
            test_support::create_open_exam(&ctx.state, ExamCategory::Cat, 2026, &[&first, &second])
                .await;
        let user = test_support::insert_user(db, "mira", "Mira").await;
        let handle =
            create_or_get_attempt(db, ctx.state.settings().attempt(), &exam.id, &user.id)
                .await
                .expect("attempt");
        let attempt_id = handle.attempt.id.clone();

        let detail = attempt_detail(db, &attempt_id, &user.id).await.expect("detail");
        let answered = detail.answers.iter().find(|row| row.question_id == first.id).expect("a1");
        let pending = detail.answers.iter().find(|row| row.question_id == second.id).expect("a2");

        let recorded = submit_answer(
            db,
            &answered.id,
            &user.id,
            AnswerSelection { selected_choice: Some(2), input_answer: None },
        )
        .await
        .expect("answer");
        assert_eq!(recorded.is_correct, Some(true));

        let completed = complete_attempt(db, &attempt_id, &user.id).await.expect("complete");

        let late = submit_answer(
            db,
            &pending.id,
            &user.id,
            AnswerSelection { selected_choice: Some(4), input_answer: None },
        )
        .await;
        assert!(matches!(late, Err(ExamError::Validation(_))), "{late:?}");

        // The write itself refuses too, for callers that read before completion.
        let direct = repositories::answers::record(
            db,
            &pending.id,
            repositories::answers::RecordAnswer {
                selected_choice: Some(4),
                input_puzzle_answer: None,
                is_correct: Some(true),
                completed_at: primitive_now_utc(),
            },
        )
        .await
        .expect("record");
        assert!(direct.is_none());

        let row = repositories::answers::find_by_id(db, &pending.id)
            .await
            .expect("query")
            .expect("answer row");
        assert!(!row.completed);
        assert_eq!(row.selected_choice, None);
        assert_eq!(row.is_correct, None);

        let stored = repositories::attempts::find_by_id(db, &attempt_id)
            .await
            .expect("query")
            .expect("attempt");
        assert_eq!(stored.total_score, completed.total_score);
    }
}
