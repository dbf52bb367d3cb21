//! Subnet plan data model.

use super::AddressBlock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role a planned block plays inside the VPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubnetRole {
    Private,
    Public,
}

impl fmt::Display for SubnetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubnetRole::Private => write!(f, "private"),
            SubnetRole::Public => write!(f, "public"),
        }
    }
}

/// Private and public blocks, index-aligned with the zones they were planned for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetPlan {
    /// The normalised base block the plan was carved from.
    pub base: AddressBlock,
    /// Prefix bits added to the base for every sub-block.
    pub new_prefix_bits: u8,
    /// One private block per zone, in zone order.
    pub private: Vec<AddressBlock>,
    /// One public block per zone, in zone order.
    pub public: Vec<AddressBlock>,
}

impl SubnetPlan {
    pub fn zone_count(&self) -> usize {
        self.private.len()
    }

    /// `(private, public)` pairs in zone order.
    pub fn zones(&self) -> impl Iterator<Item = (&AddressBlock, &AddressBlock)> {
        self.private.iter().zip(self.public.iter())
    }

    /// Every block in allocation order: all private blocks, then all public ones.
    pub fn all_blocks(&self) -> impl Iterator<Item = (SubnetRole, &AddressBlock)> {
        self.private
            .iter()
            .map(|b| (SubnetRole::Private, b))
            .chain(self.public.iter().map(|b| (SubnetRole::Public, b)))
    }
}

/// One zone's share of a plan, labelled with the zone name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneAssignment {
    pub zone: String,
    pub private: AddressBlock,
    pub public: AddressBlock,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_blocks_order() {
        let plan = SubnetPlan {
            base: AddressBlock::new("10.0.0.0/16").unwrap(),
            new_prefix_bits: 8,
            private: vec![
                AddressBlock::new("10.0.1.0/24").unwrap(),
                AddressBlock::new("10.0.2.0/24").unwrap(),
            ],
            public: vec![
                AddressBlock::new("10.0.3.0/24").unwrap(),
                AddressBlock::new("10.0.4.0/24").unwrap(),
            ],
        };
        let roles: Vec<String> = plan
            .all_blocks()
            .map(|(role, block)| format!("{role}:{block}"))
            .collect();
        assert_eq!(
            roles,
            vec![
                "private:10.0.1.0/24",
                "private:10.0.2.0/24",
                "public:10.0.3.0/24",
                "public:10.0.4.0/24"
            ]
        );
        assert_eq!(plan.zone_count(), 2);
        assert_eq!(plan.zones().count(), 2);
    }
}
