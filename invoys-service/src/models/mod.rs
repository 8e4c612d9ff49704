//! Domain models for invoys-service.

mod client;
mod invoice;
mod order_item;
mod setting;

pub use client::{Client, ClientSortField, ClientSummary, CreateClient, ListClientsFilter};
pub use invoice::{
    CreateInvoice, CustomerRef, EditInvoice, Invoice, InvoiceDetail, InvoiceSortField,
    InvoiceStatus, ListInvoicesFilter, NewOrderItem, OverdueInvoice, StatusChange,
};
pub use order_item::OrderItem;
pub use setting::{Setting, UpdateSetting, DEFAULT_CURRENCY};
