//! Storage collaborator for invoys-service.
//!
//! Every multi-row mutation (create with orders, edit replacing orders) is a
//! single atomic unit in each implementation. Invoice numbers are allocated
//! inside the create unit from the client's monotonic sequence, so
//! concurrent creates for one client never share a number.

use crate::models::{
    ClientSummary, CreateClient, CreateInvoice, EditInvoice, InvoiceDetail, InvoiceStatus,
    ListClientsFilter, ListInvoicesFilter, OverdueInvoice, Setting, StatusChange, UpdateSetting,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use service_core::error::AppError;
use uuid::Uuid;

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Check backend connectivity.
    async fn health_check(&self) -> Result<(), AppError>;

    // Clients

    async fn create_client(&self, input: &CreateClient) -> Result<ClientSummary, AppError>;

    async fn get_client(
        &self,
        user_id: &str,
        client_id: Uuid,
    ) -> Result<Option<ClientSummary>, AppError>;

    async fn list_clients(
        &self,
        user_id: &str,
        filter: &ListClientsFilter,
    ) -> Result<Vec<ClientSummary>, AppError>;

    // Invoices

    /// Allocate the next number for the client identified by
    /// `input.client_email` and insert the invoice with its orders.
    ///
    /// Fails with `NotFound` when the client does not exist and `Conflict`
    /// when the allocated number is already taken.
    async fn create_invoice(&self, input: &CreateInvoice) -> Result<InvoiceDetail, AppError>;

    async fn get_invoice(
        &self,
        user_id: &str,
        invoice_id: Uuid,
    ) -> Result<Option<InvoiceDetail>, AppError>;

    async fn list_invoices(
        &self,
        user_id: &str,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<InvoiceDetail>, AppError>;

    /// Replace the order set and scalar fields. Number, status and client
    /// are left untouched. `None` when the invoice does not exist.
    async fn edit_invoice(
        &self,
        user_id: &str,
        invoice_id: Uuid,
        input: &EditInvoice,
    ) -> Result<Option<InvoiceDetail>, AppError>;

    /// Delete the invoice and its orders. Returns whether a row was removed.
    async fn delete_invoice(&self, user_id: &str, invoice_id: Uuid) -> Result<bool, AppError>;

    /// Overwrite the status. `None` when the invoice does not exist.
    async fn update_status(
        &self,
        user_id: &str,
        invoice_id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Option<StatusChange>, AppError>;

    /// Move every invoice due before `today` that is neither settled nor
    /// already overdue to OVERDUE, across all users.
    async fn mark_overdue(&self, today: NaiveDate) -> Result<Vec<OverdueInvoice>, AppError>;

    // Settings

    async fn get_setting(&self, user_id: &str) -> Result<Option<Setting>, AppError>;

    async fn upsert_setting(&self, input: &UpdateSetting) -> Result<Setting, AppError>;
}
