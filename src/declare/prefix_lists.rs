//! Managed prefix lists holding the edge network's published address ranges.

use super::Stack;
use crate::backend::{Lookup, ResourceKind};
use crate::capability::id_of;
use crate::config::PREFIX_LIST_MAX_ENTRIES;
use crate::deferred::DeferredValue;
use crate::error::{Error, Result};
use crate::models::{environment_tags, AddressBlock, AddressFamily};
use serde_json::json;

pub struct PrefixListsOutput {
    pub ipv4_id: DeferredValue<String>,
    pub ipv6_id: DeferredValue<String>,
}

/// Parse `cidrs`, checking each belongs to `family` and that the list fits.
fn entries(family: AddressFamily, cidrs: &[String]) -> Result<Vec<serde_json::Value>> {
    if cidrs.len() > PREFIX_LIST_MAX_ENTRIES {
        return Err(Error::InvalidConfig(format!(
            "{} {family} ranges exceed the prefix list capacity of {PREFIX_LIST_MAX_ENTRIES}",
            cidrs.len()
        )));
    }
    cidrs
        .iter()
        .enumerate()
        .map(|(i, cidr)| {
            let block = AddressBlock::new(cidr)?;
            if block.family() != family {
                return Err(Error::InvalidAddress(format!(
                    "{cidr} listed as an {family} range"
                )));
            }
            Ok(json!({ "cidr": block.to_string(), "description": format!("entry {}", i + 1) }))
        })
        .collect()
}

fn declare_list(
    stack: &Stack,
    family: AddressFamily,
    cidrs: &[String],
) -> Result<DeferredValue<String>> {
    let entries = entries(family, cidrs)?;
    let resource_name = format!("edge_{}_list", family.to_string().to_lowercase());
    log::info!("{resource_name}: {} entries", entries.len());
    let attrs = stack.create(
        ResourceKind::ManagedPrefixList,
        &resource_name,
        json!({
            "address_family": family.to_string(),
            "max_entries": PREFIX_LIST_MAX_ENTRIES,
            "name": format!("Edge {family} Prefix List"),
            "entries": entries,
            "tags": environment_tags(stack.environment()),
        }),
    )?;
    Ok(id_of(&attrs))
}

/// Look up the edge network ranges and declare one prefix list per family.
pub fn declare_edge_prefix_lists(stack: &Stack) -> Result<PrefixListsOutput> {
    let ranges = stack.lookup(&Lookup::EdgeIpRanges)?;
    let ipv4: Vec<String> = ranges.require("edge_ip_ranges", "ipv4_cidr_blocks")?;
    let ipv6: Vec<String> = ranges.require("edge_ip_ranges", "ipv6_cidr_blocks")?;

    Ok(PrefixListsOutput {
        ipv4_id: declare_list(stack, AddressFamily::V4, &ipv4)?,
        ipv6_id: declare_list(stack, AddressFamily::V6, &ipv6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::config::NetworkConfig;
    use std::sync::Arc;

    #[test]
    fn test_prefix_lists_from_edge_ranges() {
        let backend = Arc::new(MemoryBackend::immediate());
        let stack = Stack::new(backend.clone(), "dev", NetworkConfig::default());
        let out = declare_edge_prefix_lists(&stack).unwrap();

        let lists = backend.records_of(ResourceKind::ManagedPrefixList);
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[0].handle.name, "edge_ipv4_list");
        assert_eq!(lists[0].args["address_family"], "IPv4");
        assert_eq!(lists[0].args["max_entries"], 20);
        assert_eq!(lists[0].args["entries"].as_array().unwrap().len(), 4);
        assert_eq!(lists[0].args["entries"][1]["description"], "entry 2");
        assert_eq!(lists[1].args["address_family"], "IPv6");
        assert_eq!(lists[1].args["tags"]["Environment"], "dev");

        assert!(out.ipv4_id.wait().unwrap().starts_with("pl-"));
        assert_ne!(out.ipv4_id.wait().unwrap(), out.ipv6_id.wait().unwrap());
    }

    #[test]
    fn test_entries_validation() {
        let wrong_family = vec!["2400:cb00::/32".to_string()];
        assert!(matches!(
            entries(AddressFamily::V4, &wrong_family),
            Err(Error::InvalidAddress(_))
        ));
        let too_many: Vec<String> = (0..21).map(|i| format!("10.{i}.0.0/16")).collect();
        assert!(matches!(
            entries(AddressFamily::V4, &too_many),
            Err(Error::InvalidConfig(_))
        ));
    }
}
