//! Terminal output utilities.
//!
//! Provides formatting helpers and the resource summary printed after a run.

use crate::backend::{RecordStatus, ResourceKind, ResourceRecord};
use colored::Colorize;
use itertools::Itertools;

/// Quote `value` and right-align it in a column of `width` characters.
///
/// Shared by the plan CSV and the resource summary so their columns line up.
/// A value wider than its column is emitted whole, never truncated.
pub fn format_field<T: ToString>(value: T, width: usize) -> String {
    let value = value.to_string();
    let quoted = format!("\"{value}\"");
    format!("{quoted:>width$}")
}

fn status_text(status: &RecordStatus) -> String {
    match status {
        RecordStatus::Pending => "pending".to_string(),
        RecordStatus::Created => "created".to_string(),
        RecordStatus::Failed(message) => format!("failed: {message}"),
    }
}

/// `(kind, count)` per resource kind, in kind order.
pub fn count_by_kind(records: &[ResourceRecord]) -> Vec<(ResourceKind, usize)> {
    records
        .iter()
        .map(|r| r.handle.kind)
        .sorted()
        .dedup_with_count()
        .map(|(count, kind)| (kind, count))
        .collect()
}

/// One line per record in declaration order, without colour.
pub fn summary_rows(records: &[ResourceRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| {
            let id = r
                .attributes
                .as_ref()
                .and_then(|a| a.get_str("id"))
                .unwrap_or("-");
            [
                format_field(r.handle.seq, 5),
                format_field(r.handle.kind, 24),
                format_field(&r.handle.name, 28),
                format_field(id, 22),
                format_field(status_text(&r.status), 10),
            ]
            .join(",")
        })
        .collect()
}

/// Print every recorded resource, then a count per kind.
pub fn print_resource_summary(records: &[ResourceRecord]) {
    log::info!("#Start print_resource_summary() records={}", records.len());
    for (row, record) in summary_rows(records).iter().zip(records) {
        match record.status {
            RecordStatus::Created => println!("{row}"),
            RecordStatus::Pending => println!("{}", row.yellow()),
            RecordStatus::Failed(_) => println!("{}", row.red()),
        }
    }
    let counts = count_by_kind(records)
        .into_iter()
        .map(|(kind, count)| format!("{kind}={count}"))
        .join(" ");
    println!("#{}# {counts}", "TOTAL".on_green());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Attributes, Handle};
    use chrono::Utc;
    use serde_json::json;

    fn record(kind: ResourceKind, name: &str, seq: u64, status: RecordStatus) -> ResourceRecord {
        ResourceRecord {
            handle: Handle {
                kind,
                name: name.to_string(),
                seq,
            },
            args: json!({}),
            declared_at: Utc::now(),
            attributes: match status {
                RecordStatus::Created => Some(Attributes::new().with("id", format!("id-{seq}"))),
                _ => None,
            },
            status,
        }
    }

    #[test]
    fn test_format_field_pads_to_column() {
        assert_eq!(format_field("private", 10), r#" "private""#);
        assert_eq!(format_field(256u128, 6), r#" "256""#);
    }

    #[test]
    fn test_format_field_keeps_wide_values() {
        assert_eq!(format_field("10.0.1.0/24", 6), r#""10.0.1.0/24""#);
        assert_eq!(format_field("dev-public-rt-asc-1", 21), r#""dev-public-rt-asc-1""#);
    }

    #[test]
    fn test_summary() {
        let records = vec![
            record(ResourceKind::Subnet, "dev-private-1", 2, RecordStatus::Created),
            record(ResourceKind::Vpc, "dev-vpc", 1, RecordStatus::Created),
            record(ResourceKind::Subnet, "dev-public-1", 3, RecordStatus::Failed("boom".into())),
        ];
        assert_eq!(
            count_by_kind(&records),
            vec![(ResourceKind::Vpc, 1), (ResourceKind::Subnet, 2)]
        );
        let rows = summary_rows(&records);
        assert!(rows[0].contains(r#""id-2""#));
        assert!(rows[2].contains(r#""-""#));
        assert!(rows[2].ends_with(r#""failed: boom""#));
    }
}
