//! Services module for invoys-service.

pub mod database;
pub mod lifecycle;
pub mod memory;
pub mod metrics;
pub mod notifier;
pub mod store;

pub use database::Database;
pub use lifecycle::{InvoiceLifecycleService, OverdueSweep, SendReceipt};
pub use memory::MemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use notifier::{
    workflow_token, HttpNotifier, HttpNotifierConfig, InvoiceEmail, MockNotifier,
    NotificationReceipt, Notifier, NotifierCall, NotifyError, ReminderEmail,
};
pub use store::InvoiceStore;
