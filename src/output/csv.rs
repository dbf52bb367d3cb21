//! CSV output for subnet plans.

use crate::models::{SubnetPlan, SubnetRole};
use colored::Colorize;
use itertools::Itertools;

use super::terminal::format_field;

const HEADER: [(&str, usize); 6] = [
    ("cnt", 6),
    ("zone", 18),
    ("role", 10),
    ("subnet_cidr", 20),
    ("last_addr", 18),
    ("addresses", 12),
];

/// Header line matching [`plan_csv_rows`].
pub fn plan_csv_header() -> String {
    HEADER
        .iter()
        .map(|(name, width)| format_field(name, *width))
        .join(",")
}

/// One CSV row per planned block: all private blocks, then all public ones.
///
/// `zones` labels the rows; missing labels fall back to `zone-{n}`.
pub fn plan_csv_rows(plan: &SubnetPlan, zones: &[String]) -> Vec<String> {
    let zone_label = |i: usize| {
        zones
            .get(i)
            .cloned()
            .unwrap_or_else(|| format!("zone-{}", i + 1))
    };
    let private = plan
        .private
        .iter()
        .enumerate()
        .map(|(i, b)| (zone_label(i), SubnetRole::Private, b));
    let public = plan
        .public
        .iter()
        .enumerate()
        .map(|(i, b)| (zone_label(i), SubnetRole::Public, b));

    private
        .chain(public)
        .enumerate()
        .map(|(j, (zone, role, block))| {
            [
                format_field(j + 1, HEADER[0].1),
                format_field(zone, HEADER[1].1),
                format_field(role, HEADER[2].1),
                format_field(block, HEADER[3].1),
                format_field(block.last(), HEADER[4].1),
                format_field(block.size(), HEADER[5].1),
            ]
            .join(",")
        })
        .collect()
}

/// Print the plan as CSV to stdout.
pub fn print_plan_csv(plan: &SubnetPlan, zones: &[String]) {
    log::info!(
        "#Start print_plan_csv() base={} zones={}",
        plan.base,
        plan.zone_count()
    );
    println!("{}", plan_csv_header());
    for row in plan_csv_rows(plan, zones) {
        println!("{row}");
    }
    println!(
        "#{}# sub-block 0 of {} (/{}) is reserved",
        "NOTE".on_blue(),
        plan.base,
        plan.base.prefix_len() + plan.new_prefix_bits
    );
}
