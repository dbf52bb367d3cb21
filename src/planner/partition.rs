//! Deterministic partitioning of a base block into per-zone subnets.
//!
//! Sub-blocks are enumerated in ascending order at
//! `base.prefix_len + new_prefix_bits`. Sub-block 0 is never handed out, so
//! the base network address itself never starts a subnet. Sub-blocks
//! `1..=zones` become the private subnets and `zones+1..=2*zones` the public
//! ones, both in zone order.

use crate::config::NetworkConfig;
use crate::error::{Error, Result};
use crate::models::{sub_block_count, AddressBlock, SubnetPlan, ZoneAssignment};

/// Split `base` into `zone_count` private and `zone_count` public blocks.
///
/// # Errors
/// * [`Error::InvalidPartition`] - `zone_count` is 0, `new_prefix_bits` is 0, or
///   the new prefix would exceed the family's maximum length
/// * [`Error::InsufficientAddressSpace`] - fewer than `2 * zone_count`
///   sub-blocks remain once sub-block 0 is reserved
///
/// # Examples
/// ```
/// use edge_topology::models::AddressBlock;
/// use edge_topology::planner::plan;
///
/// let plan = plan(AddressBlock::new("10.0.0.0/16").unwrap(), 3, 8).unwrap();
/// assert_eq!(plan.private[0].to_string(), "10.0.1.0/24");
/// assert_eq!(plan.public[2].to_string(), "10.0.6.0/24");
/// ```
pub fn plan(base: AddressBlock, zone_count: usize, new_prefix_bits: u8) -> Result<SubnetPlan> {
    if zone_count == 0 {
        return Err(Error::InvalidPartition(
            "at least one zone is required".to_string(),
        ));
    }
    if new_prefix_bits == 0 {
        return Err(Error::InvalidPartition(
            "new prefix bits must be greater than 0".to_string(),
        ));
    }
    let max = base.family().max_length();
    if base.prefix_len() as u16 + new_prefix_bits as u16 > max as u16 {
        return Err(Error::InvalidPartition(format!(
            "{base} + {new_prefix_bits} bits exceeds /{max}"
        )));
    }

    let required = 2 * zone_count as u128;
    // Sub-block 0 is reserved; a count beyond u128 is effectively unlimited.
    let usable = sub_block_count(new_prefix_bits)
        .map(|count| count - 1)
        .unwrap_or(u128::MAX);
    if required > usable {
        return Err(Error::InsufficientAddressSpace {
            base: base.to_string(),
            required,
            available: usable,
        });
    }

    let blocks = (1..=required)
        .map(|index| base.subnet(new_prefix_bits, index))
        .collect::<Result<Vec<_>>>()?;
    let (private, public) = blocks.split_at(zone_count);

    log::debug!(
        "plan({base}, zones={zone_count}, +{new_prefix_bits} bits): private={} public={}",
        private.len(),
        public.len()
    );

    Ok(SubnetPlan {
        base,
        new_prefix_bits,
        private: private.to_vec(),
        public: public.to_vec(),
    })
}

/// Plan one private and one public subnet for each named zone.
pub fn plan_zones(
    base: AddressBlock,
    zones: &[String],
    cfg: &NetworkConfig,
) -> Result<Vec<ZoneAssignment>> {
    let plan = plan(base, zones.len(), cfg.new_prefix_bits)?;
    Ok(zones
        .iter()
        .zip(plan.zones())
        .map(|(zone, (private, public))| ZoneAssignment {
            zone: zone.clone(),
            private: *private,
            public: *public,
        })
        .collect())
}
