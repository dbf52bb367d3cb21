//! Output formatting for plans and declared resources.
//!
//! This module handles formatting and outputting results:
//! - [`csv`] - subnet plan as CSV
//! - [`terminal`] - field formatting and the coloured resource summary

mod csv;
mod terminal;

pub use csv::{plan_csv_header, plan_csv_rows, print_plan_csv};
pub use terminal::{count_by_kind, format_field, print_resource_summary, summary_rows};
