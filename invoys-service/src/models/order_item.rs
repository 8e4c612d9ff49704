//! Order item model for invoys-service.

use crate::utils::Priced;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A priced line on an invoice.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub order_item_id: Uuid,
    pub invoice_id: Uuid,
    pub name: String,
    pub amount: Decimal,
    pub quantity: i32,
    /// Submission order; display only.
    pub position: i32,
}

impl Priced for OrderItem {
    fn amount(&self) -> Decimal {
        self.amount
    }

    fn quantity(&self) -> i32 {
        self.quantity
    }
}
