//! PostgreSQL storage for invoys-service.

use crate::models::{
    Client, ClientSummary, CreateClient, CreateInvoice, CustomerRef, EditInvoice, Invoice,
    InvoiceDetail, InvoiceStatus, ListClientsFilter, ListInvoicesFilter, NewOrderItem, OrderItem,
    OverdueInvoice, Setting, StatusChange, UpdateSetting,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::InvoiceStore;
use crate::utils::format_invoice_number;
use async_trait::async_trait;
use chrono::NaiveDate;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const CLIENT_COLUMNS: &str = "c.client_id, c.user_id, c.name, c.email, c.phone, c.address, \
     c.invoice_prefix, c.invoice_sequence, c.created_utc";

const INVOICE_COLUMNS: &str = "i.invoice_id, i.user_id, i.client_id, i.invoice_number, i.name, \
     i.issued_on, i.due_date, i.notes, i.is_draft, i.status, i.created_utc, i.updated_utc";

/// Invoice joined with its client's name and email.
#[derive(FromRow)]
struct InvoiceRow {
    #[sqlx(flatten)]
    invoice: Invoice,
    #[sqlx(flatten)]
    customer: CustomerRef,
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "invoys-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, AppError> {
        self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })
    }

    async fn insert_orders(
        tx: &mut Transaction<'static, Postgres>,
        invoice_id: Uuid,
        items: &[NewOrderItem],
    ) -> Result<Vec<OrderItem>, AppError> {
        let mut inserted = Vec::with_capacity(items.len());

        for (position, item) in items.iter().enumerate() {
            let order = sqlx::query_as::<_, OrderItem>(
                r#"
                INSERT INTO order_items (order_item_id, invoice_id, name, amount, quantity, position)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING order_item_id, invoice_id, name, amount, quantity, position
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(invoice_id)
            .bind(&item.name)
            .bind(item.amount)
            .bind(item.quantity)
            .bind(position as i32)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to insert order item: {}", e))
            })?;
            inserted.push(order);
        }

        Ok(inserted)
    }

    async fn orders_for(&self, invoice_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>, AppError> {
        let orders = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT order_item_id, invoice_id, name, amount, quantity, position
            FROM order_items
            WHERE invoice_id = ANY($1)
            ORDER BY invoice_id, position
            "#,
        )
        .bind(invoice_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load order items: {}", e)))?;

        let mut grouped: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for order in orders {
            grouped.entry(order.invoice_id).or_default().push(order);
        }
        Ok(grouped)
    }
}

#[async_trait]
impl InvoiceStore for Database {
    /// Check database health.
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Client Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    async fn create_client(&self, input: &CreateClient) -> Result<ClientSummary, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_client"])
            .start_timer();

        let client = sqlx::query_as::<_, Client>(
            r#"
            INSERT INTO clients (client_id, user_id, name, email, phone, address, invoice_prefix)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING client_id, user_id, name, email, phone, address, invoice_prefix,
                invoice_sequence, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.user_id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(&input.invoice_prefix)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "A customer with email '{}' already exists",
                    input.email
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create client: {}", e)),
        })?;

        timer.observe_duration();

        info!(client_id = %client.client_id, prefix = %client.invoice_prefix, "Client created");

        Ok(ClientSummary {
            client,
            invoice_count: 0,
        })
    }

    #[instrument(skip(self), fields(client_id = %client_id))]
    async fn get_client(
        &self,
        user_id: &str,
        client_id: Uuid,
    ) -> Result<Option<ClientSummary>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_client"])
            .start_timer();

        let sql = format!(
            r#"
            SELECT {CLIENT_COLUMNS}, COUNT(i.invoice_id) AS invoice_count
            FROM clients c
            LEFT JOIN invoices i ON i.client_id = c.client_id
            WHERE c.user_id = $1 AND c.client_id = $2
            GROUP BY c.client_id
            "#
        );

        let client = sqlx::query_as::<_, ClientSummary>(&sql)
            .bind(user_id)
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get client: {}", e)))?;

        timer.observe_duration();

        Ok(client)
    }

    #[instrument(skip(self, filter))]
    async fn list_clients(
        &self,
        user_id: &str,
        filter: &ListClientsFilter,
    ) -> Result<Vec<ClientSummary>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_clients"])
            .start_timer();

        // Sort columns come from a fixed allowlist, never from user input.
        let order_by = match filter.sort {
            Some((field, direction)) => format!(
                "{} {}, c.created_utc DESC",
                field.column(),
                direction.as_sql()
            ),
            None => "c.created_utc DESC".to_string(),
        };

        let sql = format!(
            r#"
            SELECT {CLIENT_COLUMNS}, COUNT(i.invoice_id) AS invoice_count
            FROM clients c
            LEFT JOIN invoices i ON i.client_id = c.client_id
            WHERE c.user_id = $1
            GROUP BY c.client_id
            ORDER BY {order_by}
            "#
        );

        let clients = sqlx::query_as::<_, ClientSummary>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list clients: {}", e)))?;

        timer.observe_duration();

        Ok(clients)
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    async fn create_invoice(&self, input: &CreateInvoice) -> Result<InvoiceDetail, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let mut tx = self.begin().await?;

        // Bumping the sequence takes the client's row lock, so concurrent
        // creates for the same client queue up here until this commits.
        let client = sqlx::query_as::<_, Client>(
            r#"
            UPDATE clients
            SET invoice_sequence = invoice_sequence + 1
            WHERE user_id = $1 AND email = $2
            RETURNING client_id, user_id, name, email, phone, address, invoice_prefix,
                invoice_sequence, created_utc
            "#,
        )
        .bind(&input.user_id)
        .bind(&input.client_email)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to allocate invoice number: {}", e))
        })?;

        let Some(client) = client else {
            tx.rollback().await.ok();
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Customer with email '{}' not found",
                input.client_email
            )));
        };

        let invoice_number = format_invoice_number(&client.invoice_prefix, client.invoice_sequence);

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices (
                invoice_id, user_id, client_id, invoice_number, name,
                issued_on, due_date, notes, is_draft, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING invoice_id, user_id, client_id, invoice_number, name,
                issued_on, due_date, notes, is_draft, status, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.user_id)
        .bind(client.client_id)
        .bind(&invoice_number)
        .bind(&input.name)
        .bind(input.issued_on)
        .bind(input.due_date)
        .bind(&input.notes)
        .bind(input.is_draft)
        .bind(InvoiceStatus::Pending.as_str())
        .fetch_one(&mut *tx)
        .await;

        let invoice = match invoice {
            Ok(invoice) => invoice,
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                tx.rollback().await.ok();
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Invoice number {} is already in use",
                    invoice_number
                )));
            }
            Err(e) => {
                return Err(AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to create invoice: {}",
                    e
                )));
            }
        };

        let orders = Self::insert_orders(&mut tx, invoice.invoice_id, &input.orders).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(
            invoice_id = %invoice.invoice_id,
            invoice_number = %invoice.invoice_number,
            order_count = orders.len(),
            "Invoice created"
        );

        let customer = CustomerRef {
            client_id: client.client_id,
            name: client.name,
            email: client.email,
        };

        InvoiceDetail::new(invoice, customer, orders)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn get_invoice(
        &self,
        user_id: &str,
        invoice_id: Uuid,
    ) -> Result<Option<InvoiceDetail>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let sql = format!(
            r#"
            SELECT {INVOICE_COLUMNS}, c.name AS customer_name, c.email AS customer_email
            FROM invoices i
            JOIN clients c ON c.client_id = i.client_id
            WHERE i.user_id = $1 AND i.invoice_id = $2
            "#
        );

        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(user_id)
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        let Some(row) = row else {
            timer.observe_duration();
            return Ok(None);
        };

        let orders = self
            .orders_for(&[invoice_id])
            .await?
            .remove(&invoice_id)
            .unwrap_or_default();

        timer.observe_duration();

        InvoiceDetail::new(row.invoice, row.customer, orders).map(Some)
    }

    #[instrument(skip(self, filter))]
    async fn list_invoices(
        &self,
        user_id: &str,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<InvoiceDetail>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let status_str = filter.status.map(|s| s.as_str().to_string());
        // Sort columns come from a fixed allowlist, never from user input.
        let order_by = match filter.sort {
            Some((field, direction)) => format!(
                "{} {}, i.created_utc DESC",
                field.column(),
                direction.as_sql()
            ),
            None => "i.created_utc DESC".to_string(),
        };

        let sql = format!(
            r#"
            SELECT {INVOICE_COLUMNS}, c.name AS customer_name, c.email AS customer_email
            FROM invoices i
            JOIN clients c ON c.client_id = i.client_id
            WHERE i.user_id = $1
              AND ($2::varchar IS NULL OR i.status = $2)
            ORDER BY {order_by}
            "#
        );

        let rows = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(user_id)
            .bind(&status_str)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.invoice.invoice_id).collect();
        let mut orders = self.orders_for(&ids).await?;

        timer.observe_duration();

        rows.into_iter()
            .map(|row| {
                let items = orders.remove(&row.invoice.invoice_id).unwrap_or_default();
                InvoiceDetail::new(row.invoice, row.customer, items)
            })
            .collect()
    }

    #[instrument(skip(self, input), fields(invoice_id = %invoice_id))]
    async fn edit_invoice(
        &self,
        user_id: &str,
        invoice_id: Uuid,
        input: &EditInvoice,
    ) -> Result<Option<InvoiceDetail>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["edit_invoice"])
            .start_timer();

        let mut tx = self.begin().await?;

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET name = $3,
                issued_on = $4,
                due_date = $5,
                notes = $6,
                is_draft = $7,
                updated_utc = NOW()
            WHERE user_id = $1 AND invoice_id = $2
            RETURNING invoice_id, user_id, client_id, invoice_number, name,
                issued_on, due_date, notes, is_draft, status, created_utc, updated_utc
            "#,
        )
        .bind(user_id)
        .bind(invoice_id)
        .bind(&input.name)
        .bind(input.issued_on)
        .bind(input.due_date)
        .bind(&input.notes)
        .bind(input.is_draft)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice: {}", e)))?;

        let Some(invoice) = invoice else {
            tx.rollback().await.ok();
            timer.observe_duration();
            return Ok(None);
        };

        sqlx::query("DELETE FROM order_items WHERE invoice_id = $1")
            .bind(invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to clear order items: {}", e))
            })?;

        let orders = Self::insert_orders(&mut tx, invoice_id, &input.orders).await?;

        let customer = sqlx::query_as::<_, CustomerRef>(
            r#"
            SELECT client_id, name AS customer_name, email AS customer_email
            FROM clients
            WHERE client_id = $1
            "#,
        )
        .bind(invoice.client_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load customer: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(invoice_id = %invoice_id, order_count = orders.len(), "Invoice edited");

        InvoiceDetail::new(invoice, customer, orders).map(Some)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn delete_invoice(&self, user_id: &str, invoice_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_invoice"])
            .start_timer();

        // Order items go with it through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM invoices WHERE user_id = $1 AND invoice_id = $2")
            .bind(user_id)
            .bind(invoice_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete invoice: {}", e)))?;

        timer.observe_duration();

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(invoice_id = %invoice_id, "Invoice deleted");
        }

        Ok(deleted)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id, status = %status))]
    async fn update_status(
        &self,
        user_id: &str,
        invoice_id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Option<StatusChange>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_status"])
            .start_timer();

        // Re-applying the current status leaves updated_utc alone.
        let previous = sqlx::query_scalar::<_, String>(
            r#"
            WITH previous AS (
                SELECT invoice_id, status
                FROM invoices
                WHERE user_id = $1 AND invoice_id = $2
                FOR UPDATE
            )
            UPDATE invoices i
            SET status = $3,
                updated_utc = CASE WHEN i.status = $3 THEN i.updated_utc ELSE NOW() END
            FROM previous p
            WHERE i.invoice_id = p.invoice_id
            RETURNING p.status
            "#,
        )
        .bind(user_id)
        .bind(invoice_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update status: {}", e)))?;

        timer.observe_duration();

        let Some(previous) = previous else {
            return Ok(None);
        };
        let previous: InvoiceStatus = previous.parse()?;

        Ok(self
            .get_invoice(user_id, invoice_id)
            .await?
            .map(|invoice| StatusChange { previous, invoice }))
    }

    #[instrument(skip(self), fields(today = %today))]
    async fn mark_overdue(&self, today: NaiveDate) -> Result<Vec<OverdueInvoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_overdue"])
            .start_timer();

        let swept = sqlx::query_as::<_, OverdueInvoice>(
            r#"
            UPDATE invoices i
            SET status = 'OVERDUE',
                updated_utc = NOW()
            FROM clients c
            WHERE c.client_id = i.client_id
              AND i.due_date < $1
              AND i.status NOT IN ('PAID', 'REJECTED', 'OVERDUE')
            RETURNING i.invoice_id, i.user_id, i.invoice_number, i.name, i.due_date, i.is_draft,
                c.name AS customer_name, c.email AS customer_email
            "#,
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to mark invoices overdue: {}", e))
        })?;

        timer.observe_duration();

        info!(count = swept.len(), "Overdue sweep applied");

        Ok(swept)
    }

    // -------------------------------------------------------------------------
    // Setting Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self))]
    async fn get_setting(&self, user_id: &str) -> Result<Option<Setting>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_setting"])
            .start_timer();

        let setting = sqlx::query_as::<_, Setting>(
            r#"
            SELECT user_id, business_name, email, phone, address, currency, send_reminders, updated_utc
            FROM settings
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get settings: {}", e)))?;

        timer.observe_duration();

        Ok(setting)
    }

    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    async fn upsert_setting(&self, input: &UpdateSetting) -> Result<Setting, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_setting"])
            .start_timer();

        let setting = sqlx::query_as::<_, Setting>(
            r#"
            INSERT INTO settings (user_id, business_name, email, phone, address, currency, send_reminders)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO UPDATE
            SET business_name = EXCLUDED.business_name,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone,
                address = EXCLUDED.address,
                currency = EXCLUDED.currency,
                send_reminders = EXCLUDED.send_reminders,
                updated_utc = NOW()
            RETURNING user_id, business_name, email, phone, address, currency, send_reminders, updated_utc
            "#,
        )
        .bind(&input.user_id)
        .bind(&input.business_name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(&input.currency)
        .bind(input.send_reminders)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update settings: {}", e)))?;

        timer.observe_duration();

        info!("Settings updated");

        Ok(setting)
    }
}
