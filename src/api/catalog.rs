use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{routing::post, routing::put, Json, Router};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::ExamCategory;
use crate::repositories;
use crate::schemas::catalog::{
    HistoricalStatsResponse, HistoricalStatsUpsert, QuestionCreate, QuestionResponse, TopicCreate,
    TopicResponse,
};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/topics", post(create_topic))
        .route("/questions", post(create_question))
        .route("/historical-stats/:category/:year", put(upsert_historical_stats))
}

async fn create_topic(
    State(state): State<AppState>,
    Json(payload): Json<TopicCreate>,
) -> Result<(StatusCode, Json<TopicResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let title = payload.title.trim();

    let existing = repositories::topics::find_by_title(state.db(), title)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check topic"))?;
    if existing.is_some() {
        return Err(ApiError::Conflict("Topic with this title already exists".to_string()));
    }

    let topic = repositories::topics::create(
        state.db(),
        &Uuid::new_v4().to_string(),
        title,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create topic"))?;

    Ok((StatusCode::CREATED, Json(TopicResponse::from_db(topic))))
}

async fn create_question(
    State(state): State<AppState>,
    Json(payload): Json<QuestionCreate>,
) -> Result<(StatusCode, Json<QuestionResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    payload.check_answer_key().map_err(ApiError::BadRequest)?;

    let topics = repositories::topics::list_by_ids(state.db(), &[payload.topic_id.clone()])
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch topic"))?;
    if topics.is_empty() {
        return Err(ApiError::NotFound("Topic not found".to_string()));
    }

    let question = repositories::questions::create(
        state.db(),
        repositories::questions::CreateQuestion {
            id: &Uuid::new_v4().to_string(),
            topic_id: &payload.topic_id,
            question_type: payload.question_type,
            difficulty: payload.difficulty,
            correct_choice: payload.correct_choice,
            correct_puzzle_answer: payload.correct_puzzle_answer.as_deref().map(str::trim),
            created_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create question"))?;

    Ok((StatusCode::CREATED, Json(QuestionResponse::from_db(question))))
}

async fn upsert_historical_stats(
    Path((category, year)): Path<(ExamCategory, i32)>,
    State(state): State<AppState>,
    Json(payload): Json<HistoricalStatsUpsert>,
) -> Result<Json<HistoricalStatsResponse>, ApiError> {
    payload.check_curves().map_err(ApiError::BadRequest)?;

    let stats = repositories::historical_stats::upsert(
        state.db(),
        category,
        year,
        &payload.score_to_percentile,
        &payload.percentile_to_rank,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to store historical stats"))?;

    tracing::info!(category = ?category, year, "Historical stats updated");
    Ok(Json(HistoricalStatsResponse::from_db(stats)))
}
