use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{routing::get, routing::post, Json, Router};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::ExamCategory;
use crate::repositories;
use crate::schemas::attempt::TopicStatsResponse;
use crate::schemas::catalog::{CategoryStatsResponse, UserCreate, UserResponse};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_user))
        .route("/me", get(me))
        .route("/me/topic-stats", get(my_topic_stats))
        .route("/me/exam-stats/:category", get(my_category_stats))
}

async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<UserCreate>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let username = payload.username.trim();

    let existing = repositories::users::find_by_username(state.db(), username)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check user"))?;
    if existing.is_some() {
        return Err(ApiError::Conflict("User with this username already exists".to_string()));
    }

    let user = repositories::users::create(
        state.db(),
        repositories::users::CreateUser {
            id: &Uuid::new_v4().to_string(),
            username,
            full_name: payload.full_name.trim(),
            created_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create user"))?;

    Ok((StatusCode::CREATED, Json(UserResponse::from_db(user))))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::from_db(user))
}

async fn my_topic_stats(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<TopicStatsResponse>>, ApiError> {
    let stats = repositories::stats::list_topics_for_user(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch topic stats"))?;

    Ok(Json(stats.into_iter().map(TopicStatsResponse::from_db).collect()))
}

async fn my_category_stats(
    Path(category): Path<ExamCategory>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<CategoryStatsResponse>, ApiError> {
    let stats = repositories::stats::find_category(state.db(), &user.id, category)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam stats"))?;

    Ok(Json(stats.map_or_else(
        || CategoryStatsResponse::empty(category),
        CategoryStatsResponse::from_db,
    )))
}
