//! VPC with planned public/private subnets, routing and an optional NAT gateway.

use super::Stack;
use crate::backend::{Attributes, ResourceKind};
use crate::capability::id_of;
use crate::deferred::{join, zip, DeferredValue};
use crate::error::{Error, Result};
use crate::models::{named_tags, AddressBlock, SubnetPlan, Tags};
use crate::planner::plan;
use serde_json::json;

/// Route every subnet's default traffic goes through.
const DEFAULT_ROUTE: &str = "0.0.0.0/0";

#[derive(Debug, Clone)]
pub struct VpcArgs {
    pub name: String,
    pub cidr: AddressBlock,
    pub azs: Vec<String>,
    pub tags: Tags,
    pub private_subnet_tags: Tags,
    pub public_subnet_tags: Tags,
}

pub struct VpcOutput {
    pub vpc_id: DeferredValue<String>,
    pub cidr: AddressBlock,
    pub plan: SubnetPlan,
    pub internet_gateway_id: DeferredValue<String>,
    pub private_subnet_ids: Vec<DeferredValue<String>>,
    pub public_subnet_ids: Vec<DeferredValue<String>>,
    pub nat_gateway_id: Option<DeferredValue<String>>,
}

impl VpcOutput {
    /// Every subnet id, private first, in zone order.
    pub fn subnet_ids(&self) -> DeferredValue<Vec<String>> {
        let all = self
            .private_subnet_ids
            .iter()
            .chain(self.public_subnet_ids.iter())
            .cloned()
            .collect();
        join("subnet ids", all)
    }
}

fn merged_tags(name: &str, base: &Tags, extra: &Tags) -> Tags {
    let mut tags = base.clone();
    tags.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    named_tags(name, &tags)
}

/// Declare the VPC described by `args`.
///
/// The subnet plan is computed before anything is created, so an
/// unplannable block fails here without touching the backend.
pub fn declare_vpc(stack: &Stack, args: &VpcArgs) -> Result<VpcOutput> {
    let cidr = args.cidr;
    let plan = plan(cidr, args.azs.len(), stack.network().new_prefix_bits)?;
    log::info!(
        "vpc {}: {} zones, private {} public {}",
        args.name,
        plan.zone_count(),
        plan.private.len(),
        plan.public.len()
    );
    let name = &args.name;

    let vpc_name = format!("{name}-vpc");
    let vpc = stack.create(
        ResourceKind::Vpc,
        &vpc_name,
        json!({
            "cidr_block": cidr.to_string(),
            "enable_dns_hostnames": true,
            "enable_dns_support": true,
            "tags": named_tags(&vpc_name, &args.tags),
        }),
    )?;
    let vpc_id = id_of(&vpc);

    let igw_name = format!("{name}-igw");
    let igw_tags = named_tags(&igw_name, &args.tags);
    let igw = stack.create_after(&vpc_id, ResourceKind::InternetGateway, &igw_name, move |vpc_id| {
        Ok(json!({ "vpc_id": vpc_id, "tags": igw_tags }))
    });
    let igw_id = id_of(&igw);

    let mut private_subnet_ids = Vec::new();
    for (i, (block, az)) in plan.private.iter().zip(&args.azs).enumerate() {
        let subnet_name = format!("{name}-private-{}", i + 1);
        let tags = merged_tags(&subnet_name, &args.tags, &args.private_subnet_tags);
        let (block, az) = (block.to_string(), az.clone());
        let subnet = stack.create_after(&vpc_id, ResourceKind::Subnet, &subnet_name, move |vpc_id| {
            Ok(json!({
                "vpc_id": vpc_id,
                "cidr_block": block,
                "availability_zone": az,
                "tags": tags,
            }))
        });
        private_subnet_ids.push(id_of(&subnet));
    }

    let mut public_subnet_ids = Vec::new();
    let vpc_and_igw = zip(&vpc_id, &igw_id);
    for (i, (block, az)) in plan.public.iter().zip(&args.azs).enumerate() {
        let n = i + 1;
        let subnet_name = format!("{name}-public-{n}");
        let tags = merged_tags(&subnet_name, &args.tags, &args.public_subnet_tags);
        let (block, az) = (block.to_string(), az.clone());
        let subnet = stack.create_after(&vpc_id, ResourceKind::Subnet, &subnet_name, move |vpc_id| {
            Ok(json!({
                "vpc_id": vpc_id,
                "cidr_block": block,
                "availability_zone": az,
                "tags": tags,
            }))
        });
        let subnet_id = id_of(&subnet);

        let rt_name = format!("{name}-public-rt-{n}");
        let rt_tags = named_tags(&rt_name, &args.tags);
        let route_table = stack.create_after(
            &vpc_and_igw,
            ResourceKind::RouteTable,
            &rt_name,
            move |(vpc_id, igw_id)| {
                Ok(json!({
                    "vpc_id": vpc_id,
                    "routes": [{ "cidr_block": DEFAULT_ROUTE, "gateway_id": igw_id }],
                    "tags": rt_tags,
                }))
            },
        );
        associate(stack, &format!("{name}-public-rt-asc-{n}"), &route_table, &subnet_id);
        public_subnet_ids.push(subnet_id);
    }

    let nat_gateway_id = if stack.network().enable_nat_gateway {
        Some(declare_nat(stack, args, &vpc_id, &private_subnet_ids, &public_subnet_ids)?)
    } else {
        log::info!("vpc {name}: NAT gateway disabled, private subnets have no default route");
        None
    };

    Ok(VpcOutput {
        vpc_id,
        cidr,
        plan,
        internet_gateway_id: igw_id,
        private_subnet_ids,
        public_subnet_ids,
        nat_gateway_id,
    })
}

fn associate(
    stack: &Stack,
    name: &str,
    route_table: &DeferredValue<Attributes>,
    subnet_id: &DeferredValue<String>,
) {
    let inputs = zip(&id_of(route_table), subnet_id);
    stack.create_after(&inputs, ResourceKind::RouteTableAssociation, name, |(rt_id, subnet_id)| {
        Ok(json!({ "route_table_id": rt_id, "subnet_id": subnet_id }))
    });
}

/// One EIP and a single NAT gateway in the first public subnet, routed to by
/// every private subnet.
fn declare_nat(
    stack: &Stack,
    args: &VpcArgs,
    vpc_id: &DeferredValue<String>,
    private_subnet_ids: &[DeferredValue<String>],
    public_subnet_ids: &[DeferredValue<String>],
) -> Result<DeferredValue<String>> {
    let name = &args.name;
    let Some(first_public) = public_subnet_ids.first() else {
        return Err(Error::InvalidConfig(format!(
            "vpc '{name}' has no public subnet for the NAT gateway"
        )));
    };

    let eip_name = format!("{name}-eip");
    let eip = stack.create(
        ResourceKind::Eip,
        &eip_name,
        json!({ "domain": "vpc", "tags": named_tags(&eip_name, &args.tags) }),
    )?;

    let ngw_name = format!("{name}-ngw");
    let ngw_tags = named_tags(&ngw_name, &args.tags);
    let inputs = zip(&id_of(&eip), first_public);
    let ngw = stack.create_after(
        &inputs,
        ResourceKind::NatGateway,
        &ngw_name,
        move |(eip_id, subnet_id)| {
            Ok(json!({ "allocation_id": eip_id, "subnet_id": subnet_id, "tags": ngw_tags }))
        },
    );
    let ngw_id = id_of(&ngw);

    let vpc_and_ngw = zip(vpc_id, &ngw_id);
    for (i, subnet_id) in private_subnet_ids.iter().enumerate() {
        let n = i + 1;
        let rt_name = format!("{name}-private-rt-{n}");
        let rt_tags = named_tags(&rt_name, &args.tags);
        let route_table = stack.create_after(
            &vpc_and_ngw,
            ResourceKind::RouteTable,
            &rt_name,
            move |(vpc_id, ngw_id)| {
                Ok(json!({
                    "vpc_id": vpc_id,
                    "routes": [{ "cidr_block": DEFAULT_ROUTE, "nat_gateway_id": ngw_id }],
                    "tags": rt_tags,
                }))
            },
        );
        associate(stack, &format!("{name}-ngw-rt-asc-{n}"), &route_table, subnet_id);
    }
    Ok(ngw_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, RecordStatus};
    use crate::config::NetworkConfig;
    use crate::deferred::Snapshot;
    use std::sync::Arc;

    fn args(cidr: &str, azs: &[&str]) -> VpcArgs {
        VpcArgs {
            name: "dev".to_string(),
            cidr: AddressBlock::new(cidr).unwrap(),
            azs: azs.iter().map(|s| s.to_string()).collect(),
            tags: Tags::new(),
            private_subnet_tags: Tags::new(),
            public_subnet_tags: Tags::new(),
        }
    }

    #[test]
    fn test_vpc_with_nat() {
        let backend = Arc::new(MemoryBackend::queued());
        let stack = Stack::new(backend.clone(), "dev", NetworkConfig::default());
        let out = declare_vpc(&stack, &args("10.0.0.0/16", &["a", "b", "c"])).unwrap();
        // Only the VPC and the EIP have no deferred inputs.
        assert_eq!(backend.records().len(), 2);

        backend.settle();
        let kinds = |k| backend.records_of(k).len();
        assert_eq!(kinds(ResourceKind::Vpc), 1);
        assert_eq!(kinds(ResourceKind::InternetGateway), 1);
        assert_eq!(kinds(ResourceKind::Subnet), 6);
        assert_eq!(kinds(ResourceKind::RouteTable), 6);
        assert_eq!(kinds(ResourceKind::RouteTableAssociation), 6);
        assert_eq!(kinds(ResourceKind::Eip), 1);
        assert_eq!(kinds(ResourceKind::NatGateway), 1);
        assert!(backend
            .records()
            .iter()
            .all(|r| r.status == RecordStatus::Created));

        let subnets = backend.records_of(ResourceKind::Subnet);
        let private_1 = subnets
            .iter()
            .find(|r| r.handle.name == "dev-private-1")
            .unwrap();
        assert_eq!(private_1.args["cidr_block"], "10.0.1.0/24");
        assert_eq!(private_1.args["availability_zone"], "a");
        let public_3 = subnets
            .iter()
            .find(|r| r.handle.name == "dev-public-3")
            .unwrap();
        assert_eq!(public_3.args["cidr_block"], "10.0.6.0/24");

        let ngw = &backend.records_of(ResourceKind::NatGateway)[0];
        let public_1_id = out.public_subnet_ids[0].wait().unwrap();
        assert_eq!(ngw.args["subnet_id"], public_1_id.as_str());

        assert_eq!(out.subnet_ids().wait().unwrap().len(), 6);
        assert!(matches!(
            out.nat_gateway_id.map(|d| d.snapshot()),
            Some(Snapshot::Resolved(_))
        ));
        assert!(stack.finish().wait().is_ok());
    }

    #[test]
    fn test_vpc_without_nat() {
        let backend = Arc::new(MemoryBackend::immediate());
        let network = NetworkConfig {
            enable_nat_gateway: false,
            ..Default::default()
        };
        let stack = Stack::new(backend.clone(), "staging", network);
        let out = declare_vpc(&stack, &args("172.20.0.0/20", &["a", "b"])).unwrap();
        assert!(out.nat_gateway_id.is_none());
        assert_eq!(backend.records_of(ResourceKind::RouteTable).len(), 2);
        assert!(backend.records_of(ResourceKind::Eip).is_empty());
        let names: Vec<String> = backend
            .records_of(ResourceKind::RouteTable)
            .into_iter()
            .map(|r| r.handle.name)
            .collect();
        assert_eq!(names, vec!["dev-public-rt-1", "dev-public-rt-2"]);
    }

    #[test]
    fn test_unplannable_vpc_creates_nothing() {
        let backend = Arc::new(MemoryBackend::immediate());
        let network = NetworkConfig {
            new_prefix_bits: 1,
            ..Default::default()
        };
        let stack = Stack::new(backend.clone(), "dev", network);
        let err = declare_vpc(&stack, &args("10.0.0.0/16", &["a", "b"]))
            .err()
            .unwrap();
        assert!(matches!(err, Error::InsufficientAddressSpace { .. }));
        assert!(backend.records().is_empty());
    }

    #[test]
    fn test_subnet_tags_merge() {
        let backend = Arc::new(MemoryBackend::immediate());
        let stack = Stack::new(backend.clone(), "dev", NetworkConfig::default());
        let mut vpc_args = args("10.0.0.0/16", &["a"]);
        vpc_args.tags = Tags::from([("Environment".to_string(), "dev".to_string())]);
        vpc_args.private_subnet_tags = Tags::from([("Tier".to_string(), "private".to_string())]);
        declare_vpc(&stack, &vpc_args).unwrap();
        let subnet = backend
            .records_of(ResourceKind::Subnet)
            .into_iter()
            .find(|r| r.handle.name == "dev-private-1")
            .unwrap();
        assert_eq!(subnet.args["tags"]["Name"], "dev-private-1");
        assert_eq!(subnet.args["tags"]["Tier"], "private");
        assert_eq!(subnet.args["tags"]["Environment"], "dev");
    }
}
