use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{routing::get, routing::post, Json, Router};
use serde::Serialize;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::api::pagination::PaginatedResponse;
use crate::core::state::AppState;
use crate::repositories;
use crate::schemas::attempt::AttemptResponse;
use crate::schemas::exam::{ExamCreate, ExamResponse, ExamUpdate};
use crate::schemas::leaderboard::{LeaderboardEntry, LeaderboardQuery, OverallEntry, SubjectEntry};
use crate::services::leaderboard::{FinalizeOutcome, LeaderboardPage};
use crate::services::{attempts, exams, leaderboard};

#[derive(Debug, Serialize)]
struct FinalizeResponse {
    exam_id: String,
    outcome: &'static str,
    ranked: usize,
    force_completed: usize,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_exam))
        .route("/:exam_id", get(get_exam).patch(update_exam))
        .route("/:exam_id/attempts", post(start_attempt))
        .route("/:exam_id/leaderboard", get(get_leaderboard))
        .route("/:exam_id/finalize", post(finalize_exam))
}

async fn create_exam(
    State(state): State<AppState>,
    Json(payload): Json<ExamCreate>,
) -> Result<(StatusCode, Json<ExamResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let exam = exams::create_exam(&state, payload.into_new_exam()).await?;
    Ok((StatusCode::CREATED, Json(ExamResponse::from_db(exam))))
}

async fn get_exam(
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = repositories::exams::find_by_id(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;

    Ok(Json(ExamResponse::from_db(exam)))
}

async fn update_exam(
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<ExamUpdate>,
) -> Result<Json<ExamResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let exam = exams::update_exam(&state, &exam_id, payload.into_changes()).await?;
    Ok(Json(ExamResponse::from_db(exam)))
}

async fn start_attempt(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<AttemptResponse>), ApiError> {
    let handle =
        attempts::create_or_get_attempt(state.db(), state.settings().attempt(), &exam_id, &user.id)
            .await?;

    let status = if handle.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(AttemptResponse::from_db(handle.attempt))))
}

async fn get_leaderboard(
    Path(exam_id): Path<String>,
    Query(params): Query<LeaderboardQuery>,
    State(state): State<AppState>,
) -> Result<Json<PaginatedResponse<LeaderboardEntry>>, ApiError> {
    let skip = params.skip.max(0);
    let limit = state.settings().leaderboard().clamp_limit(params.limit);

    let page =
        leaderboard::get_leaderboard(state.db(), &exam_id, params.view(), skip, limit).await?;

    let (items, total_count) = match page {
        LeaderboardPage::Overall { rows, total_count } => (
            rows.into_iter()
                .map(|row| LeaderboardEntry::Overall(OverallEntry::from(row)))
                .collect(),
            total_count,
        ),
        LeaderboardPage::Subject { topic_id, rows, total_count } => (
            rows.into_iter()
                .map(|row| LeaderboardEntry::Subject(SubjectEntry::from_row(row, &topic_id)))
                .collect(),
            total_count,
        ),
    };

    Ok(Json(PaginatedResponse { items, total_count, skip, limit }))
}

async fn finalize_exam(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<FinalizeResponse>, ApiError> {
    let outcome = leaderboard::finalize_exam(&state, &exam_id).await?;

    let (ranked, force_completed) = match outcome {
        FinalizeOutcome::Closed { ranked, force_completed } => (ranked, force_completed),
        FinalizeOutcome::NotYetDue { .. } => {
            return Err(ApiError::Conflict("Exam has not ended yet.".to_string()));
        }
        FinalizeOutcome::AlreadyClosed | FinalizeOutcome::LockContention => (0, 0),
    };

    tracing::info!(
        exam_id = %exam_id,
        user_id = %user.id,
        outcome = outcome.label(),
        "Manual finalize"
    );

    Ok(Json(FinalizeResponse { exam_id, outcome: outcome.label(), ranked, force_completed }))
}
