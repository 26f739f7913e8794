use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::{Attempt, SubjectPercentiles, SubjectRanks, SubjectScores};
use crate::services::ranking::Standing;

pub(crate) const COLUMNS: &str = "\
    id, exam_id, user_id, start_time, end_time, completed, completed_at, total_score, \
    overall_rank, overall_percentile, subject_scores, subject_percentiles, subject_ranks, \
    created_at, updated_at";

pub(crate) struct CreateAttempt<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) user_id: &'a str,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) end_time: PrimitiveDateTime,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LeaderboardOrder {
    Rank,
    Percentile,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OverallRow {
    pub(crate) attempt_id: String,
    pub(crate) user_id: String,
    pub(crate) username: String,
    pub(crate) full_name: String,
    pub(crate) total_score: Option<i32>,
    pub(crate) overall_rank: Option<i32>,
    pub(crate) overall_percentile: Option<f64>,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SubjectRow {
    pub(crate) attempt_id: String,
    pub(crate) user_id: String,
    pub(crate) username: String,
    pub(crate) full_name: String,
    pub(crate) subject_score: Option<i32>,
    pub(crate) subject_rank: Option<i32>,
    pub(crate) subject_percentile: Option<f64>,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!("SELECT {COLUMNS} FROM attempts WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Holds off completion and force-completion until the caller's transaction ends.
pub(crate) async fn find_for_share(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts WHERE id = $1 FOR SHARE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_by_exam_and_user(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    user_id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts WHERE exam_id = $1 AND user_id = $2"
    ))
    .bind(exam_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await
}

/// Returns `None` when the (exam, user) pair already has an attempt.
pub(crate) async fn insert_if_absent(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateAttempt<'_>,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "INSERT INTO attempts (
            id, exam_id, user_id, start_time, end_time, completed,
            subject_scores, subject_percentiles, subject_ranks, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, FALSE, '{{}}'::jsonb, '{{}}'::jsonb, '{{}}'::jsonb, $6, $6)
        ON CONFLICT (exam_id, user_id) DO NOTHING
        RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.exam_id)
    .bind(params.user_id)
    .bind(params.start_time)
    .bind(params.end_time)
    .bind(params.created_at)
    .fetch_optional(executor)
    .await
}

/// Flips `completed` once; a second call for the same attempt returns `None`.
pub(crate) async fn mark_completed(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    completed_at: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "UPDATE attempts
         SET completed = TRUE, completed_at = $1, updated_at = $2
         WHERE id = $3 AND completed = FALSE
         RETURNING {COLUMNS}"
    ))
    .bind(completed_at)
    .bind(now)
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Completes every lingering attempt of the exam and returns them.
pub(crate) async fn force_complete_for_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    completed_at: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> Result<Vec<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "UPDATE attempts
         SET completed = TRUE, completed_at = $1, updated_at = $2
         WHERE exam_id = $3 AND completed = FALSE
         RETURNING {COLUMNS}"
    ))
    .bind(completed_at)
    .bind(now)
    .bind(exam_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn set_scores(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    subject_scores: &SubjectScores,
    total_score: i32,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE attempts SET subject_scores = $1, total_score = $2, updated_at = $3 WHERE id = $4",
    )
    .bind(Json(subject_scores))
    .bind(total_score)
    .bind(now)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn list_scored_for_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<Vec<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts
         WHERE exam_id = $1 AND total_score IS NOT NULL
         ORDER BY total_score DESC, completed_at ASC NULLS LAST, id ASC"
    ))
    .bind(exam_id)
    .fetch_all(executor)
    .await
}

/// Writes every standing in one statement.
pub(crate) async fn apply_standings(
    executor: impl sqlx::PgExecutor<'_>,
    standings: &[Standing],
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    if standings.is_empty() {
        return Ok(0);
    }

    let ids: Vec<&str> = standings.iter().map(|s| s.attempt_id.as_str()).collect();
    let ranks: Vec<i32> = standings.iter().map(|s| s.overall_rank).collect();
    let percentiles: Vec<f64> = standings.iter().map(|s| s.overall_percentile).collect();
    let subject_ranks: Vec<Json<&SubjectRanks>> =
        standings.iter().map(|s| Json(&s.subject_ranks)).collect();
    let subject_percentiles: Vec<Json<&SubjectPercentiles>> =
        standings.iter().map(|s| Json(&s.subject_percentiles)).collect();

    let result = sqlx::query(
        "UPDATE attempts AS a
         SET overall_rank = s.overall_rank,
             overall_percentile = s.overall_percentile,
             subject_ranks = s.subject_ranks,
             subject_percentiles = s.subject_percentiles,
             updated_at = $6
         FROM UNNEST($1::text[], $2::int4[], $3::float8[], $4::jsonb[], $5::jsonb[])
              AS s(id, overall_rank, overall_percentile, subject_ranks, subject_percentiles)
         WHERE a.id = s.id",
    )
    .bind(ids)
    .bind(ranks)
    .bind(percentiles)
    .bind(subject_ranks)
    .bind(subject_percentiles)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

pub(crate) async fn list_overall_leaderboard(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    order: LeaderboardOrder,
    skip: i64,
    limit: i64,
) -> Result<Vec<OverallRow>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT a.id AS attempt_id,
                a.user_id,
                u.username,
                u.full_name,
                a.total_score,
                a.overall_rank,
                a.overall_percentile,
                a.completed_at
         FROM attempts a
         JOIN users u ON u.id = a.user_id
         WHERE a.overall_rank IS NOT NULL AND a.exam_id = ",
    );
    builder.push_bind(exam_id);

    match order {
        LeaderboardOrder::Rank => builder.push(" ORDER BY a.overall_rank ASC"),
        LeaderboardOrder::Percentile => {
            builder.push(" ORDER BY a.overall_percentile DESC, a.overall_rank ASC")
        }
    };

    builder.push(" OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.max(1));

    builder.build_query_as::<OverallRow>().fetch_all(executor).await
}

pub(crate) async fn count_ranked(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM attempts WHERE exam_id = $1 AND overall_rank IS NOT NULL",
    )
    .bind(exam_id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn list_subject_leaderboard(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    topic_id: &str,
    skip: i64,
    limit: i64,
) -> Result<Vec<SubjectRow>, sqlx::Error> {
    sqlx::query_as::<_, SubjectRow>(
        "SELECT a.id AS attempt_id,
                a.user_id,
                u.username,
                u.full_name,
                (a.subject_scores ->> $2)::int AS subject_score,
                (a.subject_ranks ->> $2)::int AS subject_rank,
                (a.subject_percentiles ->> $2)::float8 AS subject_percentile,
                a.completed_at
         FROM attempts a
         JOIN users u ON u.id = a.user_id
         WHERE a.exam_id = $1 AND a.subject_ranks ->> $2 IS NOT NULL
         ORDER BY (a.subject_ranks ->> $2)::int ASC
         OFFSET $3 LIMIT $4",
    )
    .bind(exam_id)
    .bind(topic_id)
    .bind(skip.max(0))
    .bind(limit.max(1))
    .fetch_all(executor)
    .await
}

pub(crate) async fn count_subject_ranked(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    topic_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM attempts WHERE exam_id = $1 AND subject_ranks ->> $2 IS NOT NULL",
    )
    .bind(exam_id)
    .bind(topic_id)
    .fetch_one(executor)
    .await
}
