use time::PrimitiveDateTime;

use crate::db::models::{UserExamCategoryStats, UserTopicStats};
use crate::db::types::ExamCategory;
use crate::services::scoring::CategoryAggregate;

const CATEGORY_COLUMNS: &str =
    "user_id, category, tests_taken, average_score, highest_score, updated_at";
const TOPIC_COLUMNS: &str = "user_id, topic_id, questions_attempted, correct_answers, updated_at";

pub(crate) async fn ensure_category_row(
    executor: impl sqlx::PgExecutor<'_>,
    user_id: &str,
    category: ExamCategory,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO user_exam_category_stats (user_id, category, tests_taken, updated_at)
         VALUES ($1, $2, 0, $3)
         ON CONFLICT (user_id, category) DO NOTHING",
    )
    .bind(user_id)
    .bind(category)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

/// Serialises concurrent scoring of the same user and category.
pub(crate) async fn lock_category_row(
    executor: impl sqlx::PgExecutor<'_>,
    user_id: &str,
    category: ExamCategory,
) -> Result<UserExamCategoryStats, sqlx::Error> {
    sqlx::query_as::<_, UserExamCategoryStats>(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM user_exam_category_stats
         WHERE user_id = $1 AND category = $2
         FOR UPDATE"
    ))
    .bind(user_id)
    .bind(category)
    .fetch_one(executor)
    .await
}

pub(crate) async fn store_category_aggregate(
    executor: impl sqlx::PgExecutor<'_>,
    user_id: &str,
    category: ExamCategory,
    aggregate: CategoryAggregate,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE user_exam_category_stats
         SET tests_taken = $1, average_score = $2, highest_score = $3, updated_at = $4
         WHERE user_id = $5 AND category = $6",
    )
    .bind(aggregate.tests_taken)
    .bind(aggregate.average_score)
    .bind(aggregate.highest_score)
    .bind(now)
    .bind(user_id)
    .bind(category)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn find_category(
    executor: impl sqlx::PgExecutor<'_>,
    user_id: &str,
    category: ExamCategory,
) -> Result<Option<UserExamCategoryStats>, sqlx::Error> {
    sqlx::query_as::<_, UserExamCategoryStats>(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM user_exam_category_stats
         WHERE user_id = $1 AND category = $2"
    ))
    .bind(user_id)
    .bind(category)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn ensure_topic_rows(
    executor: impl sqlx::PgExecutor<'_>,
    user_id: &str,
    topic_ids: &[String],
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    if topic_ids.is_empty() {
        return Ok(());
    }

    sqlx::query(
        "INSERT INTO user_topic_stats (
            user_id, topic_id, questions_attempted, correct_answers, updated_at
         )
         SELECT $1, topic_id, 0, 0, $3 FROM UNNEST($2::text[]) AS t(topic_id)
         ON CONFLICT (user_id, topic_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(topic_ids)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn increment_topic(
    executor: impl sqlx::PgExecutor<'_>,
    user_id: &str,
    topic_id: &str,
    attempted: i32,
    correct: i32,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO user_topic_stats (
            user_id, topic_id, questions_attempted, correct_answers, updated_at
         )
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (user_id, topic_id) DO UPDATE
         SET questions_attempted =
                 user_topic_stats.questions_attempted + EXCLUDED.questions_attempted,
             correct_answers = user_topic_stats.correct_answers + EXCLUDED.correct_answers,
             updated_at = EXCLUDED.updated_at",
    )
    .bind(user_id)
    .bind(topic_id)
    .bind(attempted)
    .bind(correct)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn list_topics_for_user(
    executor: impl sqlx::PgExecutor<'_>,
    user_id: &str,
) -> Result<Vec<UserTopicStats>, sqlx::Error> {
    sqlx::query_as::<_, UserTopicStats>(&format!(
        "SELECT {TOPIC_COLUMNS} FROM user_topic_stats WHERE user_id = $1 ORDER BY topic_id"
    ))
    .bind(user_id)
    .fetch_all(executor)
    .await
}
