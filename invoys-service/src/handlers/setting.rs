use axum::{extract::State, Json};
use serde::Deserialize;
use validator::Validate;

use crate::handlers::{record, start_timer};
use crate::middleware::RequestContext;
use crate::models::{Setting, UpdateSetting, DEFAULT_CURRENCY};
use crate::startup::AppState;
use service_core::error::AppError;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingRequest {
    #[validate(length(min = 1, message = "Business name cannot be empty"))]
    pub business_name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    #[validate(length(equal = 3, message = "Currency must be a 3-letter ISO code"))]
    pub currency: Option<String>,
    pub send_reminders: Option<bool>,
}

/// `setting.get`
#[tracing::instrument(skip(state, ctx), fields(user_id = %ctx.user_id))]
pub async fn get_settings(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Setting>, AppError> {
    let timer = start_timer("setting.get");
    let result = state
        .store
        .get_setting(&ctx.user_id)
        .await
        .and_then(|setting| {
            setting.ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Settings not found")))
        });
    record("setting.get", timer, result).map(Json)
}

/// `setting.update`: creates the settings on first save.
#[tracing::instrument(skip(state, ctx, request), fields(user_id = %ctx.user_id))]
pub async fn update_settings(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(request): Json<UpdateSettingRequest>,
) -> Result<Json<Setting>, AppError> {
    let timer = start_timer("setting.update");
    let result = async {
        request.validate()?;

        let input = UpdateSetting {
            user_id: ctx.user_id.clone(),
            business_name: request.business_name,
            email: request.email,
            phone: request.phone,
            address: request.address,
            currency: request
                .currency
                .map(|c| c.to_uppercase())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            send_reminders: request.send_reminders.unwrap_or(true),
        };

        state.store.upsert_setting(&input).await
    }
    .await;
    record("setting.update", timer, result).map(Json)
}
