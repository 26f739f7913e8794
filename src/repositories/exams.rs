use sqlx::{Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::Exam;
use crate::db::types::ExamCategory;

pub(crate) const COLUMNS: &str = "\
    id, title, category, year, duration_minutes, max_marks, start_time, end_time, \
    closed, closed_at, finalize_job_id, created_at, updated_at";

pub(crate) struct CreateExam<'a> {
    pub(crate) id: &'a str,
    pub(crate) title: &'a str,
    pub(crate) category: ExamCategory,
    pub(crate) year: i32,
    pub(crate) duration_minutes: i32,
    pub(crate) max_marks: i32,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) end_time: PrimitiveDateTime,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Default)]
pub(crate) struct UpdateExam {
    pub(crate) title: Option<String>,
    pub(crate) duration_minutes: Option<i32>,
    pub(crate) max_marks: Option<i32>,
    pub(crate) start_time: Option<PrimitiveDateTime>,
    pub(crate) end_time: Option<PrimitiveDateTime>,
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Row-locks the exam for the rest of the transaction.
pub(crate) async fn find_for_update(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1 FOR UPDATE"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateExam<'_>,
) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "INSERT INTO exams (
            id, title, category, year, duration_minutes, max_marks, start_time, end_time,
            closed, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE, $9, $9)
        RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.title)
    .bind(params.category)
    .bind(params.year)
    .bind(params.duration_minutes)
    .bind(params.max_marks)
    .bind(params.start_time)
    .bind(params.end_time)
    .bind(params.created_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn update(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    params: UpdateExam,
    now: PrimitiveDateTime,
) -> Result<Option<Exam>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("UPDATE exams SET updated_at = ");
    builder.push_bind(now);

    if let Some(title) = params.title {
        builder.push(", title = ");
        builder.push_bind(title);
    }
    if let Some(duration_minutes) = params.duration_minutes {
        builder.push(", duration_minutes = ");
        builder.push_bind(duration_minutes);
    }
    if let Some(max_marks) = params.max_marks {
        builder.push(", max_marks = ");
        builder.push_bind(max_marks);
    }
    if let Some(start_time) = params.start_time {
        builder.push(", start_time = ");
        builder.push_bind(start_time);
    }
    if let Some(end_time) = params.end_time {
        builder.push(", end_time = ");
        builder.push_bind(end_time);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(format!(" RETURNING {COLUMNS}"));

    builder.build_query_as::<Exam>().fetch_optional(executor).await
}

pub(crate) async fn set_finalize_job(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    job_id: Option<&str>,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE exams SET finalize_job_id = $1, updated_at = $2 WHERE id = $3")
        .bind(job_id)
        .bind(now)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn mark_closed(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE exams SET closed = TRUE, closed_at = $1, updated_at = $1 WHERE id = $2",
    )
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn attach_topics(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    topic_ids: &[String],
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    if topic_ids.is_empty() {
        return Ok(());
    }

    sqlx::query(
        "INSERT INTO exam_topics (exam_id, topic_id, created_at)
         SELECT $1, topic_id, $3 FROM UNNEST($2::text[]) AS t(topic_id)
         ON CONFLICT (exam_id, topic_id) DO NOTHING",
    )
    .bind(exam_id)
    .bind(topic_ids)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

/// Question order follows the slice order.
pub(crate) async fn attach_questions(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    question_ids: &[String],
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    if question_ids.is_empty() {
        return Ok(());
    }

    sqlx::query(
        "INSERT INTO exam_questions (exam_id, question_id, order_index, created_at)
         SELECT $1, question_id, (ordinality - 1)::int, $3
         FROM UNNEST($2::text[]) WITH ORDINALITY AS q(question_id, ordinality)
         ON CONFLICT (exam_id, question_id) DO NOTHING",
    )
    .bind(exam_id)
    .bind(question_ids)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn list_topic_ids(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT topic_id FROM exam_topics WHERE exam_id = $1 ORDER BY topic_id")
        .bind(exam_id)
        .fetch_all(executor)
        .await
}
