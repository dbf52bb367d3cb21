//! Domain models for edge topology planning.
//!
//! This module contains the core data structures used throughout the crate:
//! - [`AddressBlock`] - IPv4/IPv6 prefix with sub-block arithmetic
//! - [`SubnetPlan`] - Private/public blocks per availability zone
//! - [`Tags`] - Resource tag maps

mod address;
mod plan;
mod tags;

// Re-export public types
pub use address::{
    cut_addr, ip_after_block, last_addr, prefix_mask, sub_block_count, AddressBlock,
    AddressFamily, MAX_LENGTH_V4, MAX_LENGTH_V6,
};
pub use plan::{SubnetPlan, SubnetRole, ZoneAssignment};
pub use tags::{environment_tags, named_tags, Tags};
