//! PostgreSQL store tests. Need a reachable database:
//! `TEST_DATABASE_URL=postgres://... cargo test -- --ignored`

mod common;

use chrono::NaiveDate;
use common::TestDatabase;
use invoys_service::models::{
    CreateClient, CreateInvoice, EditInvoice, InvoiceSortField, InvoiceStatus,
    ListInvoicesFilter, NewOrderItem,
};
use invoys_service::services::InvoiceStore;
use invoys_service::utils::SortDirection;
use rust_decimal_macros::dec;
use serial_test::serial;
use service_core::error::AppError;
use std::collections::HashSet;
use std::sync::Arc;

const USER: &str = "user-pg";
const EMAIL: &str = "ops@arctic.test";

fn client() -> CreateClient {
    CreateClient {
        user_id: USER.to_string(),
        name: "Arctic Wolf".to_string(),
        email: EMAIL.to_string(),
        phone: "555-0100".to_string(),
        address: Some("1 Ice Road".to_string()),
        invoice_prefix: "AWX".to_string(),
    }
}

fn invoice(due_date: NaiveDate) -> CreateInvoice {
    CreateInvoice {
        user_id: USER.to_string(),
        client_email: EMAIL.to_string(),
        name: "Consulting".to_string(),
        issued_on: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        due_date,
        notes: None,
        is_draft: false,
        orders: vec![
            NewOrderItem {
                name: "Hours".to_string(),
                amount: dec!(40),
                quantity: 3,
            },
            NewOrderItem {
                name: "Travel".to_string(),
                amount: dec!(120),
                quantity: 1,
            },
        ],
    }
}

fn far_future() -> NaiveDate {
    NaiveDate::from_ymd_opt(2099, 12, 31).unwrap()
}

#[tokio::test]
#[ignore]
#[serial]
async fn concurrent_creates_allocate_distinct_numbers() {
    let test_db = TestDatabase::spawn().await;
    let db = Arc::new(test_db.db.clone());
    db.create_client(&client()).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let db = db.clone();
            tokio::spawn(async move { db.create_invoice(&invoice(far_future())).await })
        })
        .collect();

    let mut numbers = HashSet::new();
    for handle in handles {
        let created = handle.await.unwrap().unwrap();
        assert_eq!(created.total, dec!(240));
        numbers.insert(created.invoice.invoice_number);
    }

    assert_eq!(numbers.len(), 8);
    assert!(numbers.contains("AWX-0008"));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore]
#[serial]
async fn edit_replaces_orders_atomically() {
    let test_db = TestDatabase::spawn().await;
    let db = &test_db.db;
    db.create_client(&client()).await.unwrap();
    let created = db.create_invoice(&invoice(far_future())).await.unwrap();

    let edited = db
        .edit_invoice(
            USER,
            created.invoice.invoice_id,
            &EditInvoice {
                name: "Consulting (revised)".to_string(),
                issued_on: created.invoice.issued_on,
                due_date: created.invoice.due_date,
                notes: Some("Revised".to_string()),
                is_draft: false,
                orders: vec![NewOrderItem {
                    name: "Flat fee".to_string(),
                    amount: dec!(60.297),
                    quantity: 1,
                }],
            },
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(edited.orders.len(), 1);
    assert_eq!(edited.total, dec!(60.297));
    assert_eq!(edited.invoice.invoice_number, created.invoice.invoice_number);
    assert_eq!(edited.customer.email, EMAIL);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore]
#[serial]
async fn failed_edit_keeps_original_orders() {
    let test_db = TestDatabase::spawn().await;
    let db = &test_db.db;
    db.create_client(&client()).await.unwrap();
    let created = db.create_invoice(&invoice(far_future())).await.unwrap();
    let id = created.invoice.invoice_id;

    let result = db
        .edit_invoice(
            USER,
            id,
            &EditInvoice {
                name: "Should not stick".to_string(),
                issued_on: created.invoice.issued_on,
                due_date: created.invoice.due_date,
                notes: None,
                is_draft: false,
                orders: vec![
                    NewOrderItem {
                        name: "Valid".to_string(),
                        amount: dec!(10),
                        quantity: 1,
                    },
                    NewOrderItem {
                        name: "Rejected by CHECK".to_string(),
                        amount: dec!(-1),
                        quantity: 1,
                    },
                ],
            },
        )
        .await;
    assert!(result.is_err());

    let stored = db.get_invoice(USER, id).await.unwrap().unwrap();
    assert_eq!(stored.invoice.name, "Consulting");
    assert_eq!(stored.orders.len(), 2);
    assert_eq!(stored.total, dec!(240));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore]
#[serial]
async fn status_update_reports_previous_and_is_idempotent() {
    let test_db = TestDatabase::spawn().await;
    let db = &test_db.db;
    db.create_client(&client()).await.unwrap();
    let id = db
        .create_invoice(&invoice(far_future()))
        .await
        .unwrap()
        .invoice
        .invoice_id;

    let first = db
        .update_status(USER, id, InvoiceStatus::Paid)
        .await
        .unwrap()
        .unwrap();
    let second = db
        .update_status(USER, id, InvoiceStatus::Paid)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(first.previous, InvoiceStatus::Pending);
    assert!(first.changed());
    assert_eq!(second.previous, InvoiceStatus::Paid);
    assert!(!second.changed());
    assert_eq!(
        first.invoice.invoice.updated_utc,
        second.invoice.invoice.updated_utc
    );
    assert!(db
        .update_status("someone-else", id, InvoiceStatus::Rejected)
        .await
        .unwrap()
        .is_none());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore]
#[serial]
async fn sweep_and_listing() {
    let test_db = TestDatabase::spawn().await;
    let db = &test_db.db;
    db.create_client(&client()).await.unwrap();
    let late = db
        .create_invoice(&invoice(NaiveDate::from_ymd_opt(2020, 2, 1).unwrap()))
        .await
        .unwrap();
    db.create_invoice(&invoice(far_future())).await.unwrap();

    let swept = db
        .mark_overdue(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap())
        .await
        .unwrap();
    assert_eq!(swept.len(), 1);
    assert_eq!(swept[0].invoice_id, late.invoice.invoice_id);
    assert_eq!(swept[0].customer_email, EMAIL);

    let overdue = db
        .list_invoices(
            USER,
            &ListInvoicesFilter {
                status: Some(InvoiceStatus::Overdue),
                sort: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(overdue.len(), 1);

    let by_due = db
        .list_invoices(
            USER,
            &ListInvoicesFilter {
                status: None,
                sort: Some((InvoiceSortField::DueDate, SortDirection::Asc)),
            },
        )
        .await
        .unwrap();
    assert_eq!(by_due[0].invoice.invoice_id, late.invoice.invoice_id);
    assert_eq!(by_due[0].orders.len(), 2);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore]
#[serial]
async fn duplicate_client_and_missing_client_errors() {
    let test_db = TestDatabase::spawn().await;
    let db = &test_db.db;
    db.create_client(&client()).await.unwrap();

    assert!(matches!(
        db.create_client(&client()).await,
        Err(AppError::Conflict(_))
    ));

    let mut orphan = invoice(far_future());
    orphan.client_email = "nobody@example.com".to_string();
    assert!(matches!(
        db.create_invoice(&orphan).await,
        Err(AppError::NotFound(_))
    ));

    test_db.cleanup().await;
}
