use axum::extract::{Path, State};
use axum::{routing::put, Json, Router};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::schemas::attempt::{AnswerResponse, AnswerSubmit};
use crate::services::attempts;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/:answer_id", put(submit_answer))
}

async fn submit_answer(
    Path(answer_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<AnswerSubmit>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let answer =
        attempts::submit_answer(state.db(), &answer_id, &user.id, payload.into_selection()).await?;
    Ok(Json(AnswerResponse::from_db(answer)))
}
