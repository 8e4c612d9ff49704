use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::handlers::{record, start_timer, SortQuery};
use crate::middleware::RequestContext;
use crate::models::{ClientSortField, ClientSummary, CreateClient, ListClientsFilter};
use crate::startup::AppState;
use crate::utils::generate_prefix;
use service_core::error::AppError;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCustomerRequest {
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Phone cannot be empty"))]
    pub phone: String,
    pub address: Option<String>,
}

/// `customer.getAll`
#[tracing::instrument(skip(state, ctx, query), fields(user_id = %ctx.user_id))]
pub async fn list_customers(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<SortQuery>,
) -> Result<Json<Vec<ClientSummary>>, AppError> {
    let timer = start_timer("customer.getAll");
    let result = async {
        let filter = ListClientsFilter {
            sort: query
                .spec()
                .map(|spec| ClientSortField::from_spec(&spec))
                .transpose()?,
        };
        state.store.list_clients(&ctx.user_id, &filter).await
    }
    .await;
    record("customer.getAll", timer, result).map(Json)
}

/// `customer.getSingle`
#[tracing::instrument(skip(state, ctx), fields(user_id = %ctx.user_id))]
pub async fn get_customer(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(client_id): Path<Uuid>,
) -> Result<Json<ClientSummary>, AppError> {
    let timer = start_timer("customer.getSingle");
    let result = state
        .store
        .get_client(&ctx.user_id, client_id)
        .await
        .and_then(|client| {
            client.ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Customer {} not found", client_id))
            })
        });
    record("customer.getSingle", timer, result).map(Json)
}

/// `customer.create`. The invoice prefix is derived from the name once and
/// never changes afterwards.
#[tracing::instrument(skip(state, ctx, request), fields(user_id = %ctx.user_id))]
pub async fn create_customer(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(request): Json<CreateCustomerRequest>,
) -> Result<(StatusCode, Json<ClientSummary>), AppError> {
    let timer = start_timer("customer.create");
    let result = async {
        request.validate()?;

        let input = CreateClient {
            user_id: ctx.user_id.clone(),
            invoice_prefix: generate_prefix(Some(request.name.as_str())),
            name: request.name.trim().to_string(),
            email: request.email.trim().to_lowercase(),
            phone: request.phone,
            address: request.address.filter(|a| !a.trim().is_empty()),
        };

        state.store.create_client(&input).await
    }
    .await;
    record("customer.create", timer, result).map(|client| (StatusCode::CREATED, Json(client)))
}
