use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;
use subtle::ConstantTimeEq;

pub const CRON_SECRET_HEADER: &str = "X-Cron-Secret";

/// Let the request through only when `X-Cron-Secret` matches the configured
/// secret. With no secret configured every call is rejected.
pub async fn cron_secret_middleware(
    State(secret): State<Option<Secret<String>>>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(CRON_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());

    let authorized = match (provided, secret.as_ref()) {
        (Some(provided), Some(expected)) => provided
            .as_bytes()
            .ct_eq(expected.expose_secret().as_bytes())
            .into(),
        _ => false,
    };

    if authorized {
        return next.run(request).await;
    }

    tracing::warn!("Rejected cron call with missing or invalid secret");
    AppError::Unauthorized(anyhow::anyhow!("Invalid or missing cron secret")).into_response()
}
