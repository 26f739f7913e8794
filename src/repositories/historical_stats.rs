use std::collections::BTreeMap;

use sqlx::types::Json;
use time::PrimitiveDateTime;

use crate::db::models::HistoricalExamStats;
use crate::db::types::ExamCategory;

pub(crate) const COLUMNS: &str =
    "category, year, score_to_percentile, percentile_to_rank, created_at";

pub(crate) async fn find(
    executor: impl sqlx::PgExecutor<'_>,
    category: ExamCategory,
    year: i32,
) -> Result<Option<HistoricalExamStats>, sqlx::Error> {
    sqlx::query_as::<_, HistoricalExamStats>(&format!(
        "SELECT {COLUMNS} FROM historical_exam_stats WHERE category = $1 AND year = $2"
    ))
    .bind(category)
    .bind(year)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn upsert(
    executor: impl sqlx::PgExecutor<'_>,
    category: ExamCategory,
    year: i32,
    score_to_percentile: &BTreeMap<String, f64>,
    percentile_to_rank: &BTreeMap<String, f64>,
    now: PrimitiveDateTime,
) -> Result<HistoricalExamStats, sqlx::Error> {
    sqlx::query_as::<_, HistoricalExamStats>(&format!(
        "INSERT INTO historical_exam_stats (
            category, year, score_to_percentile, percentile_to_rank, created_at
         )
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (category, year) DO UPDATE
         SET score_to_percentile = EXCLUDED.score_to_percentile,
             percentile_to_rank = EXCLUDED.percentile_to_rank
         RETURNING {COLUMNS}"
    ))
    .bind(category)
    .bind(year)
    .bind(Json(score_to_percentile))
    .bind(Json(percentile_to_rank))
    .bind(now)
    .fetch_one(executor)
    .await
}
