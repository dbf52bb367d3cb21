//! Security group with CIDR rules and deferred prefix-list ids.

use super::Stack;
use crate::backend::ResourceKind;
use crate::capability::{arn_of, id_of};
use crate::deferred::{join, zip, DeferredValue};
use crate::error::{Error, Result};
use crate::models::{named_tags, Tags};
use serde::Serialize;
use serde_json::json;

/// One ingress or egress rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityRule {
    pub from_port: u16,
    pub to_port: u16,
    pub protocol: String,
    pub cidr_blocks: Vec<String>,
}

impl SecurityRule {
    pub fn tcp(port: u16, cidr_blocks: Vec<String>) -> SecurityRule {
        SecurityRule {
            from_port: port,
            to_port: port,
            protocol: "tcp".to_string(),
            cidr_blocks,
        }
    }
}

pub struct SecurityGroupArgs {
    pub name: String,
    pub vpc_id: DeferredValue<String>,
    pub tags: Tags,
    pub ingress: Vec<SecurityRule>,
    /// Added to every ingress rule.
    pub ingress_prefix_list_ids: Vec<DeferredValue<String>>,
    pub egress: Vec<SecurityRule>,
    /// Added to every egress rule.
    pub egress_prefix_list_ids: Vec<DeferredValue<String>>,
}

pub struct SecurityGroupOutput {
    pub id: DeferredValue<String>,
    pub arn: DeferredValue<String>,
}

fn rules_json(rules: &[SecurityRule], prefix_list_ids: &[String]) -> Vec<serde_json::Value> {
    rules
        .iter()
        .map(|rule| {
            json!({
                "from_port": rule.from_port,
                "to_port": rule.to_port,
                "protocol": rule.protocol,
                "cidr_blocks": rule.cidr_blocks,
                "prefix_list_ids": prefix_list_ids,
            })
        })
        .collect()
}

/// Declare the group once the VPC id and every prefix-list id are known.
pub fn declare_security_group(
    stack: &Stack,
    args: SecurityGroupArgs,
) -> Result<SecurityGroupOutput> {
    if args.name.trim().is_empty() {
        return Err(Error::InvalidConfig(
            "security group name must not be empty".to_string(),
        ));
    }
    if let Some(rule) = args
        .ingress
        .iter()
        .chain(args.egress.iter())
        .find(|r| r.from_port > r.to_port)
    {
        return Err(Error::InvalidConfig(format!(
            "security group {}: port range {}-{} is reversed",
            args.name, rule.from_port, rule.to_port
        )));
    }

    let prefix_lists = zip(
        &join(format!("{} ingress prefix lists", args.name), args.ingress_prefix_list_ids),
        &join(format!("{} egress prefix lists", args.name), args.egress_prefix_list_ids),
    );
    let inputs = zip(&args.vpc_id, &prefix_lists);

    let tags = named_tags(&args.name, &args.tags);
    let (name, ingress, egress) = (args.name.clone(), args.ingress, args.egress);
    let group = stack.create_after(
        &inputs,
        ResourceKind::SecurityGroup,
        &args.name,
        move |(vpc_id, (ingress_ids, egress_ids))| {
            log::debug!(
                "security group {name}: {} ingress / {} egress rules",
                ingress.len(),
                egress.len()
            );
            Ok(json!({
                "name": name,
                "vpc_id": vpc_id,
                "ingress": rules_json(&ingress, &ingress_ids),
                "egress": rules_json(&egress, &egress_ids),
                "tags": tags,
            }))
        },
    );

    Ok(SecurityGroupOutput {
        id: id_of(&group),
        arn: arn_of(&group),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::config::NetworkConfig;
    use crate::deferred::new_deferred;
    use std::sync::Arc;

    #[test]
    fn test_group_waits_for_prefix_lists() {
        let backend = Arc::new(MemoryBackend::immediate());
        let stack = Stack::new(backend.clone(), "dev", NetworkConfig::default());
        let (pl_v4, resolve_v4) = new_deferred::<String>("pl-v4");
        let (egress_pl, resolve_egress) = new_deferred::<String>("pl-egress");
        let out = declare_security_group(
            &stack,
            SecurityGroupArgs {
                name: "dev".to_string(),
                vpc_id: DeferredValue::resolved("vpc", "vpc-1".to_string()),
                tags: Tags::new(),
                ingress: vec![SecurityRule::tcp(80, vec!["10.0.0.0/16".to_string()])],
                ingress_prefix_list_ids: vec![
                    pl_v4,
                    DeferredValue::resolved("pl-v6", "pl-v6".to_string()),
                ],
                egress: vec![SecurityRule::tcp(443, vec![])],
                egress_prefix_list_ids: vec![egress_pl],
            },
        )
        .unwrap();
        assert!(backend.records().is_empty());

        resolve_v4.resolve("pl-v4".to_string()).unwrap();
        assert!(backend.records().is_empty());
        resolve_egress.resolve("pl-out".to_string()).unwrap();

        let group = &backend.records_of(ResourceKind::SecurityGroup)[0];
        assert_eq!(group.args["ingress"][0]["from_port"], 80);
        assert_eq!(group.args["ingress"][0]["prefix_list_ids"], json!(["pl-v4", "pl-v6"]));
        // Egress rules carry the egress lists, not the ingress ones.
        assert_eq!(group.args["egress"][0]["prefix_list_ids"], json!(["pl-out"]));
        assert!(out.id.wait().unwrap().starts_with("sg-"));
        assert!(out.arn.wait().is_ok());
    }

    #[test]
    fn test_reversed_port_range_rejected() {
        let backend = Arc::new(MemoryBackend::immediate());
        let stack = Stack::new(backend, "dev", NetworkConfig::default());
        let result = declare_security_group(
            &stack,
            SecurityGroupArgs {
                name: "dev".to_string(),
                vpc_id: DeferredValue::resolved("vpc", "vpc-1".to_string()),
                tags: Tags::new(),
                ingress: vec![SecurityRule {
                    from_port: 90,
                    to_port: 80,
                    protocol: "tcp".to_string(),
                    cidr_blocks: vec![],
                }],
                ingress_prefix_list_ids: vec![],
                egress: vec![],
                egress_prefix_list_ids: vec![],
            },
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
