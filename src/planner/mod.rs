//! Subnet planning.
//!
//! - [`partition`] - Splits a VPC block into private/public subnets per zone

mod partition;

pub use partition::{plan, plan_zones};
