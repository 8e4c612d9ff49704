//! Notification collaborator for invoys-service.
//!
//! Outgoing invoice emails and the reminder workflows scheduled around them.
//! Each invoice owns at most one workflow, addressed by [`workflow_token`].

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notifier not enabled")]
    NotEnabled,

    #[error("Request to notification provider failed: {0}")]
    Request(String),

    #[error("Notification provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Provider acknowledgement for an accepted send or schedule call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationReceipt {
    pub id: String,
}

/// Invoice email sent to a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceEmail {
    pub customer_name: String,
    pub invoice_number: String,
    pub invoice_view_url: String,
    pub email_to: String,
    pub product_name: String,
    pub due_date: NaiveDate,
}

/// Email delivered later by a provider-side workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderEmail {
    #[serde(flatten)]
    pub email: InvoiceEmail,
    pub send_on: NaiveDate,
}

/// Cancellation token of the workflow attached to an invoice.
pub fn workflow_token(invoice_id: Uuid) -> String {
    format!("invoice-{}", invoice_id)
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_invoice(&self, email: &InvoiceEmail) -> Result<NotificationReceipt, NotifyError>;

    async fn schedule_reminder(
        &self,
        token: &str,
        email: &ReminderEmail,
    ) -> Result<NotificationReceipt, NotifyError>;

    async fn schedule_overdue_notice(
        &self,
        token: &str,
        email: &ReminderEmail,
    ) -> Result<NotificationReceipt, NotifyError>;

    /// Cancel whatever is scheduled under `token`. Cancelling an unknown
    /// token is not an error.
    async fn cancel_automation_workflow(&self, token: &str) -> Result<(), NotifyError>;

    fn is_enabled(&self) -> bool;
}

// =============================================================================
// HTTP provider
// =============================================================================

#[derive(Debug, Clone)]
pub struct HttpNotifierConfig {
    pub api_url: String,
    pub api_key: Secret<String>,
    pub from_email: String,
    /// Upper bound on a whole provider call, connect included.
    pub timeout: Duration,
}

/// Transactional email provider reached over its JSON API.
pub struct HttpNotifier {
    config: HttpNotifierConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct EmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    template: &'static str,
    data: &'a InvoiceEmail,
}

#[derive(Debug, Serialize)]
struct WorkflowRequest<'a> {
    token: &'a str,
    from: &'a str,
    to: &'a str,
    template: &'static str,
    send_on: NaiveDate,
    data: &'a InvoiceEmail,
}

#[derive(Debug, Deserialize)]
struct ProviderAck {
    id: String,
}

impl HttpNotifier {
    pub fn new(config: HttpNotifierConfig) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NotifyError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn ack(response: reqwest::Response) -> Result<NotificationReceipt, NotifyError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let ack: ProviderAck = response
            .json()
            .await
            .map_err(|e| NotifyError::Request(format!("Failed to parse provider response: {}", e)))?;

        Ok(NotificationReceipt { id: ack.id })
    }

    async fn schedule(
        &self,
        token: &str,
        template: &'static str,
        email: &ReminderEmail,
    ) -> Result<NotificationReceipt, NotifyError> {
        let request = WorkflowRequest {
            token,
            from: &self.config.from_email,
            to: &email.email.email_to,
            template,
            send_on: email.send_on,
            data: &email.email,
        };

        let response = self
            .client
            .post(self.url("workflows"))
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        let receipt = Self::ack(response).await?;

        tracing::info!(
            token = %token,
            template = template,
            send_on = %email.send_on,
            "Workflow scheduled"
        );

        Ok(receipt)
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send_invoice(&self, email: &InvoiceEmail) -> Result<NotificationReceipt, NotifyError> {
        let request = EmailRequest {
            from: &self.config.from_email,
            to: &email.email_to,
            template: "invoice",
            data: email,
        };

        let response = self
            .client
            .post(self.url("emails"))
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        let receipt = Self::ack(response).await?;

        tracing::info!(
            invoice_number = %email.invoice_number,
            receipt_id = %receipt.id,
            "Invoice email sent"
        );

        Ok(receipt)
    }

    async fn schedule_reminder(
        &self,
        token: &str,
        email: &ReminderEmail,
    ) -> Result<NotificationReceipt, NotifyError> {
        self.schedule(token, "invoice-reminder", email).await
    }

    async fn schedule_overdue_notice(
        &self,
        token: &str,
        email: &ReminderEmail,
    ) -> Result<NotificationReceipt, NotifyError> {
        self.schedule(token, "invoice-overdue", email).await
    }

    async fn cancel_automation_workflow(&self, token: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .delete(self.url(&format!("workflows/{}", token)))
            .bearer_auth(self.config.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            tracing::info!(token = %token, "Workflow cancelled");
            return Ok(());
        }

        Err(NotifyError::Rejected {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        })
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

// =============================================================================
// Mock provider
// =============================================================================

/// A call observed by [`MockNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierCall {
    SendInvoice(InvoiceEmail),
    ScheduleReminder { token: String, email: ReminderEmail },
    ScheduleOverdueNotice { token: String, email: ReminderEmail },
    Cancel { token: String },
}

/// Mock notifier for testing and local runs. Records every call.
pub struct MockNotifier {
    enabled: bool,
    fail_sends: bool,
    calls: Mutex<Vec<NotifierCall>>,
}

impl MockNotifier {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            fail_sends: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A notifier whose provider rejects every invoice send.
    pub fn failing() -> Self {
        Self {
            fail_sends: true,
            ..Self::new(true)
        }
    }

    pub fn calls(&self) -> Vec<NotifierCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn sent(&self) -> Vec<InvoiceEmail> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                NotifierCall::SendInvoice(email) => Some(email),
                _ => None,
            })
            .collect()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                NotifierCall::Cancel { token } => Some(token),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: NotifierCall) -> Result<NotificationReceipt, NotifyError> {
        if !self.enabled {
            return Err(NotifyError::NotEnabled);
        }
        let mut calls = self
            .calls
            .lock()
            .map_err(|_| NotifyError::Request("mock call log poisoned".to_string()))?;
        calls.push(call);
        Ok(NotificationReceipt {
            id: format!("mock-{}", calls.len()),
        })
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send_invoice(&self, email: &InvoiceEmail) -> Result<NotificationReceipt, NotifyError> {
        if self.fail_sends {
            return Err(NotifyError::Rejected {
                status: 503,
                message: "mock provider unavailable".to_string(),
            });
        }

        tracing::info!(
            to = %email.email_to,
            invoice_number = %email.invoice_number,
            "[MOCK] Invoice email would be sent"
        );

        self.record(NotifierCall::SendInvoice(email.clone()))
    }

    async fn schedule_reminder(
        &self,
        token: &str,
        email: &ReminderEmail,
    ) -> Result<NotificationReceipt, NotifyError> {
        self.record(NotifierCall::ScheduleReminder {
            token: token.to_string(),
            email: email.clone(),
        })
    }

    async fn schedule_overdue_notice(
        &self,
        token: &str,
        email: &ReminderEmail,
    ) -> Result<NotificationReceipt, NotifyError> {
        self.record(NotifierCall::ScheduleOverdueNotice {
            token: token.to_string(),
            email: email.clone(),
        })
    }

    async fn cancel_automation_workflow(&self, token: &str) -> Result<(), NotifyError> {
        self.record(NotifierCall::Cancel {
            token: token.to_string(),
        })
        .map(|_| ())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}
