//! Pure helpers: prefixes, totals and sort keys.

pub mod amount;
pub mod prefix;
pub mod sort;

pub use amount::{calculate_order_amount, AmountOverflow, Priced};
pub use prefix::{format_invoice_number, generate_prefix, generate_prefix_with};
pub use sort::{parse_sort, SortDirection, SortSpec};
