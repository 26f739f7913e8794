use axum::extract::{Path, State};
use axum::{routing::get, routing::post, Json, Router};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::schemas::attempt::{AttemptDetailResponse, AttemptResponse};
use crate::services::attempts;
use crate::services::prediction::{self, PredictionReport};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:attempt_id", get(get_attempt))
        .route("/:attempt_id/complete", post(complete_attempt))
        .route("/:attempt_id/prediction", get(get_prediction))
}

async fn get_attempt(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptDetailResponse>, ApiError> {
    let detail = attempts::attempt_detail(state.db(), &attempt_id, &user.id).await?;
    Ok(Json(AttemptDetailResponse::from_detail(detail)))
}

async fn complete_attempt(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let attempt = attempts::complete_attempt(state.db(), &attempt_id, &user.id).await?;
    Ok(Json(AttemptResponse::from_db(attempt)))
}

async fn get_prediction(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<PredictionReport>, ApiError> {
    let report = prediction::predict_for_attempt(state.db(), &attempt_id, &user.id).await?;
    Ok(Json(report))
}
