//! Invoice model for invoys-service.

use crate::models::OrderItem;
use crate::utils::{calculate_order_amount, Priced, SortDirection, SortSpec};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Invoice status.
///
/// Any status may be assigned from any other; there is no transition guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Overdue,
    Rejected,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "PENDING",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Overdue => "OVERDUE",
            InvoiceStatus::Rejected => "REJECTED",
        }
    }

    /// Settled invoices are never swept to overdue and get no reminders.
    pub fn is_settled(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Rejected)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(InvoiceStatus::Pending),
            "PAID" => Ok(InvoiceStatus::Paid),
            "OVERDUE" => Ok(InvoiceStatus::Overdue),
            "REJECTED" => Ok(InvoiceStatus::Rejected),
            other => Err(AppError::BadRequest(anyhow::anyhow!(
                "Unknown invoice status '{}'",
                other
            ))),
        }
    }
}

/// Invoice row.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub invoice_id: Uuid,
    #[serde(skip_serializing)]
    pub user_id: String,
    pub client_id: Uuid,
    pub invoice_number: String,
    pub name: String,
    pub issued_on: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub is_draft: bool,
    pub status: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Invoice {
    /// Typed status. Rows are constrained to the known values, so anything
    /// else is reported as corruption.
    pub fn status(&self) -> Result<InvoiceStatus, AppError> {
        self.status.parse().map_err(|_| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Invoice {} has invalid status '{}'",
                self.invoice_id,
                self.status
            ))
        })
    }
}

/// The owning client as shown on an invoice.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRef {
    pub client_id: Uuid,
    #[sqlx(rename = "customer_name")]
    pub name: String,
    #[sqlx(rename = "customer_email")]
    pub email: String,
}

/// Invoice with its customer, order items and computed total.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub customer: CustomerRef,
    pub orders: Vec<OrderItem>,
    pub total: Decimal,
}

impl InvoiceDetail {
    pub fn new(
        invoice: Invoice,
        customer: CustomerRef,
        orders: Vec<OrderItem>,
    ) -> Result<Self, AppError> {
        let total = calculate_order_amount(&orders)?;
        Ok(Self {
            invoice,
            customer,
            orders,
            total,
        })
    }
}

/// A line submitted with a create or edit.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderItem {
    pub name: String,
    pub amount: Decimal,
    pub quantity: i32,
}

impl Priced for NewOrderItem {
    fn amount(&self) -> Decimal {
        self.amount
    }

    fn quantity(&self) -> i32 {
        self.quantity
    }
}

/// Input for creating an invoice.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub user_id: String,
    pub client_email: String,
    pub name: String,
    pub issued_on: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub is_draft: bool,
    pub orders: Vec<NewOrderItem>,
}

/// Input for editing an invoice. The order set replaces the existing one.
#[derive(Debug, Clone)]
pub struct EditInvoice {
    pub name: String,
    pub issued_on: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub is_draft: bool,
    pub orders: Vec<NewOrderItem>,
}

/// Result of a status assignment.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub previous: InvoiceStatus,
    pub invoice: InvoiceDetail,
}

impl StatusChange {
    pub fn changed(&self) -> bool {
        self.invoice
            .invoice
            .status()
            .map(|current| current != self.previous)
            .unwrap_or(true)
    }
}

/// An invoice moved to OVERDUE by the sweep.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OverdueInvoice {
    pub invoice_id: Uuid,
    #[serde(skip_serializing)]
    pub user_id: String,
    pub invoice_number: String,
    pub name: String,
    pub due_date: NaiveDate,
    pub is_draft: bool,
    pub customer_name: String,
    pub customer_email: String,
}

/// Columns invoices can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceSortField {
    Name,
    InvoiceNumber,
    IssuedOn,
    DueDate,
    Status,
    CreatedAt,
    CustomerName,
    CustomerEmail,
}

impl InvoiceSortField {
    pub fn column(&self) -> &'static str {
        match self {
            InvoiceSortField::Name => "i.name",
            InvoiceSortField::InvoiceNumber => "i.invoice_number",
            InvoiceSortField::IssuedOn => "i.issued_on",
            InvoiceSortField::DueDate => "i.due_date",
            InvoiceSortField::Status => "i.status",
            InvoiceSortField::CreatedAt => "i.created_utc",
            InvoiceSortField::CustomerName => "c.name",
            InvoiceSortField::CustomerEmail => "c.email",
        }
    }

    /// Resolve a sort spec against the allowed invoice columns.
    pub fn from_spec(spec: &SortSpec) -> Result<(Self, SortDirection), AppError> {
        let path: Vec<&str> = spec.path().iter().map(String::as_str).collect();
        let field = match path.as_slice() {
            ["name"] => InvoiceSortField::Name,
            ["invoiceNumber"] => InvoiceSortField::InvoiceNumber,
            ["issuedOn"] => InvoiceSortField::IssuedOn,
            ["dueDate"] => InvoiceSortField::DueDate,
            ["status"] => InvoiceSortField::Status,
            ["createdAt"] => InvoiceSortField::CreatedAt,
            ["customer", "name"] => InvoiceSortField::CustomerName,
            ["customer", "email"] => InvoiceSortField::CustomerEmail,
            _ => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Cannot sort invoices by '{}'",
                    spec.dotted_path()
                )))
            }
        };
        Ok((field, spec.direction()?))
    }
}

/// Filter parameters for listing invoices.
#[derive(Debug, Clone, Default)]
pub struct ListInvoicesFilter {
    pub status: Option<InvoiceStatus>,
    pub sort: Option<(InvoiceSortField, SortDirection)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::parse_sort;

    #[test]
    fn status_round_trips_through_its_wire_name() {
        for status in [
            InvoiceStatus::Pending,
            InvoiceStatus::Paid,
            InvoiceStatus::Overdue,
            InvoiceStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<InvoiceStatus>().unwrap(), status);
        }
        assert!("draft".parse::<InvoiceStatus>().is_err());
    }

    #[test]
    fn customer_name_sort_resolves_to_joined_column() {
        let spec = parse_sort([("customer_name", "asc")]).unwrap();
        let (field, direction) = InvoiceSortField::from_spec(&spec).unwrap();
        assert_eq!(field.column(), "c.name");
        assert_eq!(direction, SortDirection::Asc);
    }

    #[test]
    fn unknown_sort_path_is_rejected() {
        let spec = parse_sort([("state_city_zip", "asc")]).unwrap();
        assert!(matches!(
            InvoiceSortField::from_spec(&spec),
            Err(AppError::BadRequest(_))
        ));
    }
}
