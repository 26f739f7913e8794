use time::PrimitiveDateTime;

use crate::db::models::Topic;

pub(crate) const COLUMNS: &str = "id, title, is_active, created_at";

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    title: &str,
    created_at: PrimitiveDateTime,
) -> Result<Topic, sqlx::Error> {
    sqlx::query_as::<_, Topic>(&format!(
        "INSERT INTO topics (id, title, is_active, created_at)
         VALUES ($1, $2, TRUE, $3)
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(title)
    .bind(created_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn find_by_title(
    executor: impl sqlx::PgExecutor<'_>,
    title: &str,
) -> Result<Option<Topic>, sqlx::Error> {
    sqlx::query_as::<_, Topic>(&format!("SELECT {COLUMNS} FROM topics WHERE title = $1"))
        .bind(title)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn list_by_ids(
    executor: impl sqlx::PgExecutor<'_>,
    ids: &[String],
) -> Result<Vec<Topic>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, Topic>(&format!(
        "SELECT {COLUMNS} FROM topics WHERE id = ANY($1) ORDER BY title"
    ))
    .bind(ids)
    .fetch_all(executor)
    .await
}
