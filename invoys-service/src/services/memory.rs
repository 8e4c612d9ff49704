//! In-process storage for invoys-service.
//!
//! Backs tests and local runs without PostgreSQL. All tables sit behind one
//! `RwLock`; each mutation holds the write guard for its whole duration,
//! which makes it atomic with respect to every other operation.

use crate::models::{
    Client, ClientSortField, ClientSummary, CreateClient, CreateInvoice, CustomerRef, EditInvoice,
    Invoice, InvoiceDetail, InvoiceSortField, InvoiceStatus, ListClientsFilter,
    ListInvoicesFilter, NewOrderItem, OrderItem, OverdueInvoice, Setting, StatusChange,
    UpdateSetting,
};
use crate::services::store::InvoiceStore;
use crate::utils::{format_invoice_number, SortDirection};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use service_core::error::AppError;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    // Insertion order is kept so ties sort the same way on every call.
    clients: Vec<Client>,
    invoices: Vec<Invoice>,
    orders: HashMap<Uuid, Vec<OrderItem>>,
    settings: HashMap<String, Setting>,
}

impl Tables {
    fn client(&self, client_id: Uuid) -> Option<&Client> {
        self.clients.iter().find(|c| c.client_id == client_id)
    }

    fn invoice_count(&self, client_id: Uuid) -> i64 {
        self.invoices
            .iter()
            .filter(|i| i.client_id == client_id)
            .count() as i64
    }

    fn summary(&self, client: &Client) -> ClientSummary {
        ClientSummary {
            client: client.clone(),
            invoice_count: self.invoice_count(client.client_id),
        }
    }

    fn detail(&self, invoice: &Invoice) -> Result<InvoiceDetail, AppError> {
        let client = self.client(invoice.client_id).ok_or_else(|| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Invoice {} references missing client {}",
                invoice.invoice_id,
                invoice.client_id
            ))
        })?;
        let orders = self
            .orders
            .get(&invoice.invoice_id)
            .cloned()
            .unwrap_or_default();
        InvoiceDetail::new(invoice.clone(), customer_ref(client), orders)
    }

    fn invoice_mut(&mut self, user_id: &str, invoice_id: Uuid) -> Option<&mut Invoice> {
        self.invoices
            .iter_mut()
            .find(|i| i.invoice_id == invoice_id && i.user_id == user_id)
    }
}

fn customer_ref(client: &Client) -> CustomerRef {
    CustomerRef {
        client_id: client.client_id,
        name: client.name.clone(),
        email: client.email.clone(),
    }
}

fn build_orders(invoice_id: Uuid, items: &[NewOrderItem]) -> Vec<OrderItem> {
    items
        .iter()
        .enumerate()
        .map(|(position, item)| OrderItem {
            order_item_id: Uuid::new_v4(),
            invoice_id,
            name: item.name.clone(),
            amount: item.amount,
            quantity: item.quantity,
            position: position as i32,
        })
        .collect()
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

fn compare_invoices(a: &InvoiceDetail, b: &InvoiceDetail, field: InvoiceSortField) -> Ordering {
    match field {
        InvoiceSortField::Name => a.invoice.name.cmp(&b.invoice.name),
        InvoiceSortField::InvoiceNumber => a.invoice.invoice_number.cmp(&b.invoice.invoice_number),
        InvoiceSortField::IssuedOn => a.invoice.issued_on.cmp(&b.invoice.issued_on),
        InvoiceSortField::DueDate => a.invoice.due_date.cmp(&b.invoice.due_date),
        InvoiceSortField::Status => a.invoice.status.cmp(&b.invoice.status),
        InvoiceSortField::CreatedAt => a.invoice.created_utc.cmp(&b.invoice.created_utc),
        InvoiceSortField::CustomerName => a.customer.name.cmp(&b.customer.name),
        InvoiceSortField::CustomerEmail => a.customer.email.cmp(&b.customer.email),
    }
}

fn compare_clients(a: &ClientSummary, b: &ClientSummary, field: ClientSortField) -> Ordering {
    match field {
        ClientSortField::Name => a.client.name.cmp(&b.client.name),
        ClientSortField::Email => a.client.email.cmp(&b.client.email),
        ClientSortField::CreatedAt => a.client.created_utc.cmp(&b.client.created_utc),
    }
}

/// `InvoiceStore` kept entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InvoiceStore for MemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    async fn create_client(&self, input: &CreateClient) -> Result<ClientSummary, AppError> {
        let mut tables = self.tables.write().await;

        if tables
            .clients
            .iter()
            .any(|c| c.user_id == input.user_id && c.email == input.email)
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "A customer with email '{}' already exists",
                input.email
            )));
        }

        let client = Client {
            client_id: Uuid::new_v4(),
            user_id: input.user_id.clone(),
            name: input.name.clone(),
            email: input.email.clone(),
            phone: input.phone.clone(),
            address: input.address.clone(),
            invoice_prefix: input.invoice_prefix.clone(),
            invoice_sequence: 0,
            created_utc: Utc::now(),
        };
        tables.clients.push(client.clone());

        info!(client_id = %client.client_id, prefix = %client.invoice_prefix, "Client created");

        Ok(ClientSummary {
            client,
            invoice_count: 0,
        })
    }

    async fn get_client(
        &self,
        user_id: &str,
        client_id: Uuid,
    ) -> Result<Option<ClientSummary>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .client(client_id)
            .filter(|c| c.user_id == user_id)
            .map(|c| tables.summary(c)))
    }

    async fn list_clients(
        &self,
        user_id: &str,
        filter: &ListClientsFilter,
    ) -> Result<Vec<ClientSummary>, AppError> {
        let tables = self.tables.read().await;
        let mut clients: Vec<ClientSummary> = tables
            .clients
            .iter()
            .rev()
            .filter(|c| c.user_id == user_id)
            .map(|c| tables.summary(c))
            .collect();

        if let Some((field, direction)) = filter.sort {
            clients.sort_by(|a, b| directed(compare_clients(a, b, field), direction));
        }

        Ok(clients)
    }

    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    async fn create_invoice(&self, input: &CreateInvoice) -> Result<InvoiceDetail, AppError> {
        let mut tables = self.tables.write().await;

        let client_idx = tables
            .clients
            .iter()
            .position(|c| c.user_id == input.user_id && c.email == input.client_email)
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "Customer with email '{}' not found",
                    input.client_email
                ))
            })?;

        let client = &tables.clients[client_idx];
        let client_id = client.client_id;
        let sequence = client.invoice_sequence + 1;
        let invoice_number = format_invoice_number(&client.invoice_prefix, sequence);

        if tables
            .invoices
            .iter()
            .any(|i| i.client_id == client_id && i.invoice_number == invoice_number)
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice number {} is already in use",
                invoice_number
            )));
        }

        let now = Utc::now();
        let invoice = Invoice {
            invoice_id: Uuid::new_v4(),
            user_id: input.user_id.clone(),
            client_id,
            invoice_number,
            name: input.name.clone(),
            issued_on: input.issued_on,
            due_date: input.due_date,
            notes: input.notes.clone(),
            is_draft: input.is_draft,
            status: InvoiceStatus::Pending.as_str().to_string(),
            created_utc: now,
            updated_utc: now,
        };

        tables.clients[client_idx].invoice_sequence = sequence;
        tables
            .orders
            .insert(invoice.invoice_id, build_orders(invoice.invoice_id, &input.orders));
        tables.invoices.push(invoice.clone());

        tables.detail(&invoice)
    }

    async fn get_invoice(
        &self,
        user_id: &str,
        invoice_id: Uuid,
    ) -> Result<Option<InvoiceDetail>, AppError> {
        let tables = self.tables.read().await;
        tables
            .invoices
            .iter()
            .find(|i| i.invoice_id == invoice_id && i.user_id == user_id)
            .map(|i| tables.detail(i))
            .transpose()
    }

    async fn list_invoices(
        &self,
        user_id: &str,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<InvoiceDetail>, AppError> {
        let tables = self.tables.read().await;
        let status = filter.status.map(|s| s.as_str());

        let mut invoices = tables
            .invoices
            .iter()
            .rev()
            .filter(|i| i.user_id == user_id)
            .filter(|i| status.map_or(true, |s| i.status == s))
            .map(|i| tables.detail(i))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some((field, direction)) = filter.sort {
            invoices.sort_by(|a, b| directed(compare_invoices(a, b, field), direction));
        }

        Ok(invoices)
    }

    #[instrument(skip(self, input), fields(invoice_id = %invoice_id))]
    async fn edit_invoice(
        &self,
        user_id: &str,
        invoice_id: Uuid,
        input: &EditInvoice,
    ) -> Result<Option<InvoiceDetail>, AppError> {
        let mut tables = self.tables.write().await;

        let Some(invoice) = tables.invoice_mut(user_id, invoice_id) else {
            return Ok(None);
        };
        invoice.name = input.name.clone();
        invoice.issued_on = input.issued_on;
        invoice.due_date = input.due_date;
        invoice.notes = input.notes.clone();
        invoice.is_draft = input.is_draft;
        invoice.updated_utc = Utc::now();
        let invoice = invoice.clone();

        tables
            .orders
            .insert(invoice_id, build_orders(invoice_id, &input.orders));

        tables.detail(&invoice).map(Some)
    }

    async fn delete_invoice(&self, user_id: &str, invoice_id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let before = tables.invoices.len();
        tables
            .invoices
            .retain(|i| !(i.invoice_id == invoice_id && i.user_id == user_id));
        let deleted = tables.invoices.len() < before;
        if deleted {
            tables.orders.remove(&invoice_id);
        }
        Ok(deleted)
    }

    async fn update_status(
        &self,
        user_id: &str,
        invoice_id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Option<StatusChange>, AppError> {
        let mut tables = self.tables.write().await;

        let Some(invoice) = tables.invoice_mut(user_id, invoice_id) else {
            return Ok(None);
        };
        let previous = invoice.status()?;
        if previous != status {
            invoice.status = status.as_str().to_string();
            invoice.updated_utc = Utc::now();
        }
        let invoice = invoice.clone();

        Ok(Some(StatusChange {
            previous,
            invoice: tables.detail(&invoice)?,
        }))
    }

    async fn mark_overdue(&self, today: NaiveDate) -> Result<Vec<OverdueInvoice>, AppError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let mut swept = Vec::new();

        for idx in 0..tables.invoices.len() {
            let status = tables.invoices[idx].status()?;
            if tables.invoices[idx].due_date >= today
                || status.is_settled()
                || status == InvoiceStatus::Overdue
            {
                continue;
            }

            let invoice = &mut tables.invoices[idx];
            invoice.status = InvoiceStatus::Overdue.as_str().to_string();
            invoice.updated_utc = now;
            let invoice = invoice.clone();

            let customer = tables.client(invoice.client_id).map(customer_ref);
            swept.push(OverdueInvoice {
                invoice_id: invoice.invoice_id,
                user_id: invoice.user_id,
                invoice_number: invoice.invoice_number,
                name: invoice.name,
                due_date: invoice.due_date,
                is_draft: invoice.is_draft,
                customer_name: customer.as_ref().map(|c| c.name.clone()).unwrap_or_default(),
                customer_email: customer.map(|c| c.email).unwrap_or_default(),
            });
        }

        Ok(swept)
    }

    async fn get_setting(&self, user_id: &str) -> Result<Option<Setting>, AppError> {
        Ok(self.tables.read().await.settings.get(user_id).cloned())
    }

    async fn upsert_setting(&self, input: &UpdateSetting) -> Result<Setting, AppError> {
        let setting = Setting {
            user_id: input.user_id.clone(),
            business_name: input.business_name.clone(),
            email: input.email.clone(),
            phone: input.phone.clone(),
            address: input.address.clone(),
            currency: input.currency.clone(),
            send_reminders: input.send_reminders,
            updated_utc: Utc::now(),
        };
        self.tables
            .write()
            .await
            .settings
            .insert(input.user_id.clone(), setting.clone());
        Ok(setting)
    }
}
