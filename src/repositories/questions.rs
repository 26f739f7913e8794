use time::PrimitiveDateTime;

use crate::db::models::Question;
use crate::db::types::{DifficultyLevel, QuestionType};

pub(crate) const COLUMNS: &str = "\
    id, topic_id, question_type, difficulty, correct_choice, correct_puzzle_answer, \
    is_active, created_at";

pub(crate) struct CreateQuestion<'a> {
    pub(crate) id: &'a str,
    pub(crate) topic_id: &'a str,
    pub(crate) question_type: QuestionType,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) correct_choice: Option<i16>,
    pub(crate) correct_puzzle_answer: Option<&'a str>,
    pub(crate) created_at: PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateQuestion<'_>,
) -> Result<Question, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "INSERT INTO questions (
            id, topic_id, question_type, difficulty, correct_choice,
            correct_puzzle_answer, is_active, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7)
        RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.topic_id)
    .bind(params.question_type)
    .bind(params.difficulty)
    .bind(params.correct_choice)
    .bind(params.correct_puzzle_answer)
    .bind(params.created_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!("SELECT {COLUMNS} FROM questions WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn list_for_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(
        "SELECT q.id, q.topic_id, q.question_type, q.difficulty, q.correct_choice,
                q.correct_puzzle_answer, q.is_active, q.created_at
         FROM questions q
         JOIN exam_questions eq ON eq.question_id = q.id
         WHERE eq.exam_id = $1
         ORDER BY eq.order_index, q.id",
    )
    .bind(exam_id)
    .fetch_all(executor)
    .await
}

/// Ids from `ids` that exist and are active.
pub(crate) async fn list_active_ids(
    executor: impl sqlx::PgExecutor<'_>,
    ids: &[String],
) -> Result<Vec<String>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_scalar("SELECT id FROM questions WHERE id = ANY($1) AND is_active = TRUE")
        .bind(ids)
        .fetch_all(executor)
        .await
}

/// Distinct topics covered by the given questions.
pub(crate) async fn list_topic_ids(
    executor: impl sqlx::PgExecutor<'_>,
    ids: &[String],
) -> Result<Vec<String>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_scalar(
        "SELECT DISTINCT topic_id FROM questions WHERE id = ANY($1) ORDER BY topic_id",
    )
    .bind(ids)
    .fetch_all(executor)
    .await
}
