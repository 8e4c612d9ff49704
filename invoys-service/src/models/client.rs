//! Client model for invoys-service.

use crate::utils::{SortDirection, SortSpec};
use chrono::{DateTime, Utc};
use serde::Serialize;
use service_core::error::AppError;
use sqlx::FromRow;
use uuid::Uuid;

/// Client (customer) record.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub client_id: Uuid,
    #[serde(skip_serializing)]
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: Option<String>,
    pub invoice_prefix: String,
    /// Last sequence number handed out for this client's invoices.
    #[serde(skip_serializing)]
    pub invoice_sequence: i32,
    pub created_utc: DateTime<Utc>,
}

/// Client with the number of invoices it currently owns.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ClientSummary {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub client: Client,
    pub invoice_count: i64,
}

/// Input for creating a client.
#[derive(Debug, Clone)]
pub struct CreateClient {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: Option<String>,
    pub invoice_prefix: String,
}

/// Columns clients can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientSortField {
    Name,
    Email,
    CreatedAt,
}

impl ClientSortField {
    pub fn column(&self) -> &'static str {
        match self {
            ClientSortField::Name => "c.name",
            ClientSortField::Email => "c.email",
            ClientSortField::CreatedAt => "c.created_utc",
        }
    }

    /// Resolve a sort spec against the allowed client columns.
    pub fn from_spec(spec: &SortSpec) -> Result<(Self, SortDirection), AppError> {
        let field = match spec.path() {
            [field] if field == "name" => ClientSortField::Name,
            [field] if field == "email" => ClientSortField::Email,
            [field] if field == "createdAt" => ClientSortField::CreatedAt,
            _ => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Cannot sort customers by '{}'",
                    spec.dotted_path()
                )))
            }
        };
        Ok((field, spec.direction()?))
    }
}

/// Filter parameters for listing clients.
#[derive(Debug, Clone, Default)]
pub struct ListClientsFilter {
    pub sort: Option<(ClientSortField, SortDirection)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::parse_sort;

    #[test]
    fn resolves_known_fields() {
        let spec = parse_sort([("email", "desc")]).unwrap();
        assert_eq!(
            ClientSortField::from_spec(&spec).unwrap(),
            (ClientSortField::Email, SortDirection::Desc)
        );
    }

    #[test]
    fn rejects_nested_paths() {
        let spec = parse_sort([("customer_name", "asc")]).unwrap();
        assert!(ClientSortField::from_spec(&spec).is_err());
    }
}
