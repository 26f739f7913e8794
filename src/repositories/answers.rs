use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::models::AnsweredQuestion;
use crate::db::types::QuestionType;

pub(crate) const COLUMNS: &str = "\
    id, attempt_id, question_id, selected_choice, input_puzzle_answer, is_correct, \
    completed, completed_at, created_at";

/// Completed answer joined with the topic it scores under.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct GradedRow {
    pub(crate) topic_id: String,
    pub(crate) is_correct: Option<bool>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct AnswerDetailRow {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) topic_id: String,
    pub(crate) question_type: QuestionType,
    pub(crate) selected_choice: Option<i16>,
    pub(crate) input_puzzle_answer: Option<String>,
    pub(crate) is_correct: Option<bool>,
    pub(crate) completed: bool,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
}

pub(crate) struct RecordAnswer<'a> {
    pub(crate) selected_choice: Option<i16>,
    pub(crate) input_puzzle_answer: Option<&'a str>,
    pub(crate) is_correct: Option<bool>,
    pub(crate) completed_at: PrimitiveDateTime,
}

/// Inserts one unanswered row per question; existing rows are left alone.
pub(crate) async fn seed_for_attempt(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
    question_ids: &[String],
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    if question_ids.is_empty() {
        return Ok(0);
    }

    let ids: Vec<String> = question_ids.iter().map(|_| Uuid::new_v4().to_string()).collect();
    let result = sqlx::query(
        "INSERT INTO answered_questions (id, attempt_id, question_id, completed, created_at)
         SELECT s.id, $2, s.question_id, FALSE, $4
         FROM UNNEST($1::text[], $3::text[]) AS s(id, question_id)
         ON CONFLICT (attempt_id, question_id) DO NOTHING",
    )
    .bind(ids)
    .bind(attempt_id)
    .bind(question_ids)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<AnsweredQuestion>, sqlx::Error> {
    sqlx::query_as::<_, AnsweredQuestion>(&format!(
        "SELECT {COLUMNS} FROM answered_questions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// `None` once the owning attempt is completed; a recorded answer never
/// changes after scoring.
pub(crate) async fn record(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    params: RecordAnswer<'_>,
) -> Result<Option<AnsweredQuestion>, sqlx::Error> {
    sqlx::query_as::<_, AnsweredQuestion>(&format!(
        "UPDATE answered_questions
         SET selected_choice = $1,
             input_puzzle_answer = $2,
             is_correct = $3,
             completed = TRUE,
             completed_at = $4
         WHERE id = $5
           AND EXISTS (
               SELECT 1 FROM attempts a
               WHERE a.id = answered_questions.attempt_id AND NOT a.completed
           )
         RETURNING {COLUMNS}"
    ))
    .bind(params.selected_choice)
    .bind(params.input_puzzle_answer)
    .bind(params.is_correct)
    .bind(params.completed_at)
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_graded_for_attempt(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
) -> Result<Vec<GradedRow>, sqlx::Error> {
    sqlx::query_as::<_, GradedRow>(
        "SELECT q.topic_id, aq.is_correct
         FROM answered_questions aq
         JOIN questions q ON q.id = aq.question_id
         WHERE aq.attempt_id = $1 AND aq.completed = TRUE",
    )
    .bind(attempt_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn list_details_for_attempt(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
) -> Result<Vec<AnswerDetailRow>, sqlx::Error> {
    sqlx::query_as::<_, AnswerDetailRow>(
        "SELECT aq.id,
                aq.question_id,
                q.topic_id,
                q.question_type,
                aq.selected_choice,
                aq.input_puzzle_answer,
                aq.is_correct,
                aq.completed,
                aq.completed_at
         FROM answered_questions aq
         JOIN attempts a ON a.id = aq.attempt_id
         JOIN questions q ON q.id = aq.question_id
         LEFT JOIN exam_questions eq ON eq.exam_id = a.exam_id AND eq.question_id = aq.question_id
         WHERE aq.attempt_id = $1
         ORDER BY eq.order_index NULLS LAST, aq.question_id",
    )
    .bind(attempt_id)
    .fetch_all(executor)
    .await
}
