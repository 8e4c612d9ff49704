//! invoys-service: clients, invoices, order items, status tracking and
//! invoice emails over HTTP.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;

pub use startup::{build_router, AppState, Application};
