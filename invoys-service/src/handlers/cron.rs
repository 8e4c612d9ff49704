use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;

use crate::handlers::{record, start_timer};
use crate::startup::AppState;

/// Scheduled overdue sweep. Runs behind the cron secret guard.
///
/// Failures answer with a bare 500; the cause is only logged.
#[tracing::instrument(skip(state))]
pub async fn run_overdue_sweep(State(state): State<AppState>) -> Response {
    let timer = start_timer("cron.overdues");
    let today = Utc::now().date_naive();
    let result = state.lifecycle.batch_update_overdues(today, "cron").await;

    match record("cron.overdues", timer, result) {
        Ok(sweep) => (StatusCode::OK, Json(sweep)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Overdue sweep failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response()
        }
    }
}
