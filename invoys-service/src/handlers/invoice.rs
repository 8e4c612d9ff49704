use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::handlers::{record, start_timer, SortQuery};
use crate::middleware::RequestContext;
use crate::models::{
    EditInvoice, InvoiceDetail, InvoiceSortField, InvoiceStatus, ListInvoicesFilter, NewOrderItem,
};
use crate::services::{OverdueSweep, SendReceipt};
use crate::startup::AppState;
use service_core::error::AppError;

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    #[validate(length(min = 1, message = "Item name cannot be empty"))]
    pub name: String,
    #[validate(custom(function = "validate_amount"))]
    pub amount: Decimal,
    #[validate(range(min = 0, max = 1_000_000, message = "Quantity must be between 0 and 1000000"))]
    pub quantity: i32,
}

/// Editable invoice fields, shared by create and edit.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_dates"))]
pub struct InvoiceRequest {
    #[validate(length(min = 1, message = "Invoice name cannot be empty"))]
    pub name: String,
    pub issued_on: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    #[serde(default)]
    pub is_draft: bool,
    #[validate(length(min = 1, message = "At least one order item is required"), nested)]
    pub orders: Vec<OrderItemRequest>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceRequest {
    #[validate(email(message = "Invalid customer email"))]
    pub client_email: String,
    #[serde(flatten)]
    #[validate(nested)]
    pub invoice: InvoiceRequest,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: InvoiceStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListInvoicesQuery {
    #[serde(flatten)]
    pub sort: SortQuery,
    pub status: Option<String>,
}

/// Largest unit amount the `NUMERIC(12,3)` column holds: 999999999.999.
const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 3);

fn validate_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ValidationError::new("negative_amount")
            .with_message("Amount cannot be negative".into()));
    }
    if *amount > MAX_AMOUNT {
        return Err(ValidationError::new("amount_too_large")
            .with_message("Amount cannot exceed 999999999.999".into()));
    }
    if amount.normalize().scale() > 3 {
        return Err(ValidationError::new("amount_precision")
            .with_message("Amount cannot have more than 3 decimal places".into()));
    }
    Ok(())
}

fn validate_dates(request: &InvoiceRequest) -> Result<(), ValidationError> {
    if request.due_date < request.issued_on {
        return Err(ValidationError::new("due_before_issue")
            .with_message("Due date cannot be before the issue date".into()));
    }
    Ok(())
}

impl From<InvoiceRequest> for EditInvoice {
    fn from(request: InvoiceRequest) -> Self {
        EditInvoice {
            name: request.name.trim().to_string(),
            issued_on: request.issued_on,
            due_date: request.due_date,
            notes: request.notes.filter(|n| !n.trim().is_empty()),
            is_draft: request.is_draft,
            orders: request
                .orders
                .into_iter()
                .map(|item| NewOrderItem {
                    name: item.name,
                    amount: item.amount,
                    quantity: item.quantity,
                })
                .collect(),
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// `invoice.getAll`
#[tracing::instrument(skip(state, ctx, query), fields(user_id = %ctx.user_id))]
pub async fn list_invoices(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<Json<Vec<InvoiceDetail>>, AppError> {
    let timer = start_timer("invoice.getAll");
    let result = async {
        let filter = ListInvoicesFilter {
            status: query.status.as_deref().map(str::parse::<InvoiceStatus>).transpose()?,
            sort: query
                .sort
                .spec()
                .map(|spec| InvoiceSortField::from_spec(&spec))
                .transpose()?,
        };
        state.lifecycle.list(&ctx, &filter).await
    }
    .await;
    record("invoice.getAll", timer, result).map(Json)
}

/// `invoice.getSingle`
#[tracing::instrument(skip(state, ctx), fields(user_id = %ctx.user_id))]
pub async fn get_invoice(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceDetail>, AppError> {
    let timer = start_timer("invoice.getSingle");
    let result = state.lifecycle.get(&ctx, invoice_id).await;
    record("invoice.getSingle", timer, result).map(Json)
}

/// `invoice.create`
#[tracing::instrument(skip(state, ctx, request), fields(user_id = %ctx.user_id))]
pub async fn create_invoice(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceDetail>), AppError> {
    let timer = start_timer("invoice.create");
    let result = async {
        request.validate()?;
        let client_email = request.client_email.trim().to_lowercase();
        state
            .lifecycle
            .create(&ctx, &client_email, request.invoice.into())
            .await
    }
    .await;
    record("invoice.create", timer, result).map(|invoice| (StatusCode::CREATED, Json(invoice)))
}

/// `invoice.edit`
#[tracing::instrument(skip(state, ctx, request), fields(user_id = %ctx.user_id))]
pub async fn edit_invoice(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(invoice_id): Path<Uuid>,
    Json(request): Json<InvoiceRequest>,
) -> Result<Json<InvoiceDetail>, AppError> {
    let timer = start_timer("invoice.edit");
    let result = async {
        request.validate()?;
        state.lifecycle.edit(&ctx, invoice_id, request.into()).await
    }
    .await;
    record("invoice.edit", timer, result).map(Json)
}

/// `invoice.delete`
#[tracing::instrument(skip(state, ctx), fields(user_id = %ctx.user_id))]
pub async fn delete_invoice(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let timer = start_timer("invoice.delete");
    let result = state.lifecycle.delete(&ctx, invoice_id).await;
    record("invoice.delete", timer, result).map(|_| StatusCode::NO_CONTENT)
}

/// `invoice.updateStatus`
#[tracing::instrument(skip(state, ctx, request), fields(user_id = %ctx.user_id))]
pub async fn update_status(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(invoice_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<InvoiceDetail>, AppError> {
    let timer = start_timer("invoice.updateStatus");
    let result = state
        .lifecycle
        .update_status(&ctx, invoice_id, request.status)
        .await;
    record("invoice.updateStatus", timer, result).map(Json)
}

/// `invoice.sendEmail`
#[tracing::instrument(skip(state, ctx), fields(user_id = %ctx.user_id))]
pub async fn send_invoice_email(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<SendReceipt>, AppError> {
    let timer = start_timer("invoice.sendEmail");
    let result = state.lifecycle.send_email(&ctx, invoice_id).await;
    record("invoice.sendEmail", timer, result).map(Json)
}

/// `invoice.batchUpdateOverdues`. Same sweep as the cron trigger, started
/// by a signed-in user.
#[tracing::instrument(skip(state, ctx), fields(user_id = %ctx.user_id))]
pub async fn batch_update_overdues(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<OverdueSweep>, AppError> {
    let timer = start_timer("invoice.batchUpdateOverdues");
    let today = Utc::now().date_naive();
    let result = state.lifecycle.batch_update_overdues(today, "rpc").await;
    record("invoice.batchUpdateOverdues", timer, result).map(Json)
}
