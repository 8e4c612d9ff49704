//! Per-user business settings for invoys-service.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Default currency for new settings rows.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Business profile used on outgoing invoice emails.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    #[serde(skip_serializing)]
    pub user_id: String,
    pub business_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub currency: String,
    pub send_reminders: bool,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating or replacing settings.
#[derive(Debug, Clone)]
pub struct UpdateSetting {
    pub user_id: String,
    pub business_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub currency: String,
    pub send_reminders: bool,
}
