//! HTTP handlers for invoys-service.
//!
//! Each RPC procedure (`customer.*`, `invoice.*`, `setting.*`) maps onto one
//! route. Handlers validate input, hand off to the lifecycle service or the
//! store, and record per-procedure metrics.

pub mod cron;
pub mod customer;
pub mod health;
pub mod invoice;
pub mod setting;

use crate::services::metrics::{ERRORS_TOTAL, RPC_REQUESTS_TOTAL, RPC_REQUEST_DURATION};
use crate::utils::{parse_sort, SortSpec};
use prometheus::HistogramTimer;
use serde::Deserialize;
use service_core::error::AppError;

/// `?sort=<key>&direction=<asc|desc>` on list procedures.
#[derive(Debug, Default, Deserialize)]
pub struct SortQuery {
    pub sort: Option<String>,
    pub direction: Option<String>,
}

impl SortQuery {
    pub fn spec(&self) -> Option<SortSpec> {
        parse_sort(self.sort.as_ref().map(|key| {
            (
                key.as_str(),
                self.direction.clone().unwrap_or_else(|| "asc".to_string()),
            )
        }))
    }
}

pub(crate) fn start_timer(method: &str) -> HistogramTimer {
    RPC_REQUEST_DURATION
        .with_label_values(&[method])
        .start_timer()
}

/// Close the timer and count the outcome of one procedure call.
pub(crate) fn record<T>(
    method: &str,
    timer: HistogramTimer,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    timer.observe_duration();
    match &result {
        Ok(_) => RPC_REQUESTS_TOTAL.with_label_values(&[method, "ok"]).inc(),
        Err(e) => {
            RPC_REQUESTS_TOTAL
                .with_label_values(&[method, e.kind()])
                .inc();
            ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
        }
    }
    result
}
