//! Invoice lifecycle: create, edit, delete, status changes and the overdue
//! sweep, with the notification side effects that follow each of them.
//!
//! Notifications run only after the store has committed. A failed
//! notification is logged and counted but never undoes the mutation, with
//! the single exception of [`InvoiceLifecycleService::send_email`], whose
//! result is the send itself.

use crate::middleware::RequestContext;
use crate::models::{
    CreateInvoice, EditInvoice, InvoiceDetail, InvoiceStatus, ListInvoicesFilter, OverdueInvoice,
};
use crate::services::metrics::{
    ERRORS_TOTAL, INVOICES_TOTAL, NOTIFICATIONS_TOTAL, OVERDUE_SWEPT_TOTAL,
};
use crate::services::notifier::{
    workflow_token, InvoiceEmail, NotificationReceipt, Notifier, NotifyError, ReminderEmail,
};
use crate::services::store::InvoiceStore;
use crate::utils::calculate_order_amount;
use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Outcome of emailing an invoice.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub invoice_id: Uuid,
    pub receipt_id: String,
    pub reminder_on: Option<NaiveDate>,
}

/// Result of one overdue sweep.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverdueSweep {
    pub updated: usize,
    pub invoices: Vec<OverdueInvoice>,
}

pub struct InvoiceLifecycleService {
    store: Arc<dyn InvoiceStore>,
    notifier: Arc<dyn Notifier>,
    app_base_url: String,
    product_name: String,
}

impl InvoiceLifecycleService {
    pub fn new(
        store: Arc<dyn InvoiceStore>,
        notifier: Arc<dyn Notifier>,
        app_base_url: impl Into<String>,
        product_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            notifier,
            app_base_url: app_base_url.into(),
            product_name: product_name.into(),
        }
    }

    fn invoice_view_url(&self, invoice_id: Uuid) -> String {
        format!(
            "{}/invoices/{}",
            self.app_base_url.trim_end_matches('/'),
            invoice_id
        )
    }

    /// Create an invoice for the caller's client identified by `client_email`.
    /// `fields` carries the same editable fields an edit takes.
    #[instrument(
        skip(self, ctx, fields),
        fields(user_id = %ctx.user_id, request_id = ctx.correlation_id())
    )]
    pub async fn create(
        &self,
        ctx: &RequestContext,
        client_email: &str,
        fields: EditInvoice,
    ) -> Result<InvoiceDetail, AppError> {
        calculate_order_amount(&fields.orders)?;

        let input = CreateInvoice {
            user_id: ctx.user_id.clone(),
            client_email: client_email.to_string(),
            name: fields.name,
            issued_on: fields.issued_on,
            due_date: fields.due_date,
            notes: fields.notes,
            is_draft: fields.is_draft,
            orders: fields.orders,
        };

        let invoice = self.store.create_invoice(&input).await?;

        INVOICES_TOTAL.with_label_values(&["created"]).inc();
        info!(
            invoice_id = %invoice.invoice.invoice_id,
            invoice_number = %invoice.invoice.invoice_number,
            total = %invoice.total,
            "Invoice created"
        );

        Ok(invoice)
    }

    pub async fn get(&self, ctx: &RequestContext, invoice_id: Uuid) -> Result<InvoiceDetail, AppError> {
        self.store
            .get_invoice(&ctx.user_id, invoice_id)
            .await?
            .ok_or_else(|| not_found(invoice_id))
    }

    pub async fn list(
        &self,
        ctx: &RequestContext,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<InvoiceDetail>, AppError> {
        self.store.list_invoices(&ctx.user_id, filter).await
    }

    /// Replace an invoice's editable fields and its whole order set.
    #[instrument(
        skip(self, ctx, fields),
        fields(user_id = %ctx.user_id, request_id = ctx.correlation_id(), invoice_id = %invoice_id)
    )]
    pub async fn edit(
        &self,
        ctx: &RequestContext,
        invoice_id: Uuid,
        fields: EditInvoice,
    ) -> Result<InvoiceDetail, AppError> {
        calculate_order_amount(&fields.orders)?;

        let invoice = self
            .store
            .edit_invoice(&ctx.user_id, invoice_id, &fields)
            .await?
            .ok_or_else(|| not_found(invoice_id))?;

        INVOICES_TOTAL.with_label_values(&["edited"]).inc();
        info!(invoice_number = %invoice.invoice.invoice_number, "Invoice edited");

        Ok(invoice)
    }

    #[instrument(
        skip(self, ctx),
        fields(user_id = %ctx.user_id, request_id = ctx.correlation_id(), invoice_id = %invoice_id)
    )]
    pub async fn delete(&self, ctx: &RequestContext, invoice_id: Uuid) -> Result<(), AppError> {
        if !self.store.delete_invoice(&ctx.user_id, invoice_id).await? {
            return Err(not_found(invoice_id));
        }

        INVOICES_TOTAL.with_label_values(&["deleted"]).inc();
        info!("Invoice deleted");

        self.cancel_workflow(invoice_id).await;
        Ok(())
    }

    /// Assign `status`. Any status may follow any other and re-assigning the
    /// current one is a no-op. Settling an invoice cancels its reminders.
    #[instrument(
        skip(self, ctx),
        fields(user_id = %ctx.user_id, request_id = ctx.correlation_id(), invoice_id = %invoice_id, status = %status)
    )]
    pub async fn update_status(
        &self,
        ctx: &RequestContext,
        invoice_id: Uuid,
        status: InvoiceStatus,
    ) -> Result<InvoiceDetail, AppError> {
        let change = self
            .store
            .update_status(&ctx.user_id, invoice_id, status)
            .await?
            .ok_or_else(|| not_found(invoice_id))?;

        if change.changed() {
            INVOICES_TOTAL
                .with_label_values(&[&format!("status_{}", status.as_str().to_lowercase())])
                .inc();
            info!(previous = %change.previous, "Invoice status changed");

            if status.is_settled() {
                self.cancel_workflow(invoice_id).await;
            }
        }

        Ok(change.invoice)
    }

    /// Mark every past-due, unsettled invoice as OVERDUE and queue an
    /// overdue notice for each non-draft one whose owner wants reminders.
    /// Only the sweep itself can fail the call.
    #[instrument(skip(self), fields(today = %today, trigger = trigger))]
    pub async fn batch_update_overdues(
        &self,
        today: NaiveDate,
        trigger: &str,
    ) -> Result<OverdueSweep, AppError> {
        let invoices = self.store.mark_overdue(today).await?;

        OVERDUE_SWEPT_TOTAL
            .with_label_values(&[trigger])
            .inc_by(invoices.len() as f64);
        info!(count = invoices.len(), "Overdue sweep finished");

        let mut reminders_wanted: HashMap<String, bool> = HashMap::new();
        for invoice in invoices.iter().filter(|i| !i.is_draft) {
            let wanted = match reminders_wanted.get(&invoice.user_id) {
                Some(wanted) => *wanted,
                None => {
                    // The sweep is already committed; an owner whose settings
                    // cannot be read gets no notice this round.
                    let wanted = match self.reminders_enabled(&invoice.user_id).await {
                        Ok(wanted) => wanted,
                        Err(e) => {
                            ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
                            NOTIFICATIONS_TOTAL
                                .with_label_values(&["overdue_notice", "skipped"])
                                .inc();
                            warn!(
                                user_id = %invoice.user_id,
                                error = %e,
                                "Failed to read reminder setting, skipping overdue notices"
                            );
                            false
                        }
                    };
                    reminders_wanted.insert(invoice.user_id.clone(), wanted);
                    wanted
                }
            };
            if !wanted {
                continue;
            }

            let notice = ReminderEmail {
                email: InvoiceEmail {
                    customer_name: invoice.customer_name.clone(),
                    invoice_number: invoice.invoice_number.clone(),
                    invoice_view_url: self.invoice_view_url(invoice.invoice_id),
                    email_to: invoice.customer_email.clone(),
                    product_name: self.product_name.clone(),
                    due_date: invoice.due_date,
                },
                send_on: today,
            };
            let result = self
                .notifier
                .schedule_overdue_notice(&workflow_token(invoice.invoice_id), &notice)
                .await;
            record_notification("overdue_notice", invoice.invoice_id, result);
        }

        Ok(OverdueSweep {
            updated: invoices.len(),
            invoices,
        })
    }

    /// Email the invoice to its customer and, when the owner has reminders
    /// on, schedule a reminder for the day before it falls due.
    #[instrument(
        skip(self, ctx),
        fields(user_id = %ctx.user_id, request_id = ctx.correlation_id(), invoice_id = %invoice_id)
    )]
    pub async fn send_email(
        &self,
        ctx: &RequestContext,
        invoice_id: Uuid,
    ) -> Result<SendReceipt, AppError> {
        let detail = self.get(ctx, invoice_id).await?;
        let invoice = &detail.invoice;

        if invoice.is_draft {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Invoice {} is a draft and cannot be sent",
                invoice.invoice_number
            )));
        }

        if !self.notifier.is_enabled() {
            NOTIFICATIONS_TOTAL
                .with_label_values(&["invoice", "disabled"])
                .inc();
            warn!("Invoice email requested while notifications are disabled");
            return Err(AppError::ServiceUnavailable);
        }

        let email = InvoiceEmail {
            customer_name: detail.customer.name.clone(),
            invoice_number: invoice.invoice_number.clone(),
            invoice_view_url: self.invoice_view_url(invoice_id),
            email_to: detail.customer.email.clone(),
            product_name: self.product_name.clone(),
            due_date: invoice.due_date,
        };

        let receipt = match self.notifier.send_invoice(&email).await {
            Ok(receipt) => receipt,
            Err(NotifyError::NotEnabled) => {
                NOTIFICATIONS_TOTAL
                    .with_label_values(&["invoice", "disabled"])
                    .inc();
                warn!("Invoice email requested while notifications are disabled");
                return Err(AppError::ServiceUnavailable);
            }
            Err(e) => {
                NOTIFICATIONS_TOTAL
                    .with_label_values(&["invoice", "failed"])
                    .inc();
                warn!(error = %e, "Invoice email failed");
                return Err(AppError::BadGateway(format!(
                    "Failed to send invoice {}",
                    invoice.invoice_number
                )));
            }
        };
        NOTIFICATIONS_TOTAL
            .with_label_values(&["invoice", "sent"])
            .inc();

        let mut reminder_on = None;
        let today = Utc::now().date_naive();
        if !invoice.status()?.is_settled() && self.reminders_enabled(&ctx.user_id).await? {
            if let Some(send_on) = invoice
                .due_date
                .checked_sub_days(Days::new(1))
                .filter(|day| *day >= today)
            {
                let reminder = ReminderEmail { email, send_on };
                let result = self
                    .notifier
                    .schedule_reminder(&workflow_token(invoice_id), &reminder)
                    .await;
                if record_notification("reminder", invoice_id, result) {
                    reminder_on = Some(send_on);
                }
            }
        }

        info!(
            invoice_number = %invoice.invoice_number,
            receipt_id = %receipt.id,
            reminder_on = ?reminder_on,
            "Invoice emailed"
        );

        Ok(SendReceipt {
            invoice_id,
            receipt_id: receipt.id,
            reminder_on,
        })
    }

    /// Owners without saved settings get reminders.
    async fn reminders_enabled(&self, user_id: &str) -> Result<bool, AppError> {
        Ok(self
            .store
            .get_setting(user_id)
            .await?
            .map_or(true, |s| s.send_reminders))
    }

    async fn cancel_workflow(&self, invoice_id: Uuid) {
        let result = self
            .notifier
            .cancel_automation_workflow(&workflow_token(invoice_id))
            .await
            .map(|_| NotificationReceipt {
                id: workflow_token(invoice_id),
            });
        record_notification("cancel", invoice_id, result);
    }
}

fn not_found(invoice_id: Uuid) -> AppError {
    AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id))
}

/// Count and log a follow-up notification. Returns whether it went through.
fn record_notification(
    kind: &str,
    invoice_id: Uuid,
    result: Result<NotificationReceipt, NotifyError>,
) -> bool {
    match result {
        Ok(_) => {
            NOTIFICATIONS_TOTAL.with_label_values(&[kind, "ok"]).inc();
            true
        }
        Err(NotifyError::NotEnabled) => {
            NOTIFICATIONS_TOTAL
                .with_label_values(&[kind, "disabled"])
                .inc();
            false
        }
        Err(e) => {
            NOTIFICATIONS_TOTAL.with_label_values(&[kind, "failed"]).inc();
            warn!(invoice_id = %invoice_id, kind = kind, error = %e, "Notification failed");
            false
        }
    }
}
