use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use service_core::middleware::tracing::{RequestId, REQUEST_ID_HEADER};

pub const USER_ID_HEADER: &str = "X-User-ID";

/// Caller identity and correlation id for one request.
///
/// `X-User-ID` is set by the trusted upstream that owns the session. Every
/// store read and write is scoped to this user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: String,
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            request_id: None,
        }
    }

    /// Request id for log correlation, `-` when the request carried none.
    pub fn correlation_id(&self) -> &str {
        self.request_id.as_deref().unwrap_or("-")
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("Missing X-User-ID header"))
            })?;

        let request_id = parts
            .extensions
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .or_else(|| {
                parts
                    .headers
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            });

        tracing::Span::current().record("user_id", user_id);

        Ok(RequestContext {
            user_id: user_id.to_string(),
            request_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<RequestContext, AppError> {
        let (mut parts, _) = request.into_parts();
        RequestContext::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_user_and_request_id() {
        let ctx = extract(
            Request::builder()
                .header(USER_ID_HEADER, "user-7")
                .header(REQUEST_ID_HEADER, "req-1")
                .body(())
                .unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(ctx.user_id, "user-7");
        assert_eq!(ctx.correlation_id(), "req-1");
        assert_eq!(RequestContext::new("user-7").correlation_id(), "-");
    }

    #[tokio::test]
    async fn missing_or_blank_user_is_unauthorized() {
        let missing = extract(Request::builder().body(()).unwrap()).await;
        let blank = extract(
            Request::builder()
                .header(USER_ID_HEADER, "  ")
                .body(())
                .unwrap(),
        )
        .await;

        assert!(matches!(missing, Err(AppError::Unauthorized(_))));
        assert!(matches!(blank, Err(AppError::Unauthorized(_))));
    }
}
