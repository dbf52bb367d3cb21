//! Whole-topology declaration from a [`StackConfig`].
//!
//! Order of declaration: edge prefix lists, VPC, a security group allowing
//! HTTP from inside the VPC and from the edge network, then the optional
//! edge block (target group, load balancer, certificates, alias records).

use super::load_balancer::{
    declare_load_balancer, FixedResponse, ListenerSettings, LoadBalancerArgs, LoadBalancerOutput,
};
use super::prefix_lists::{declare_edge_prefix_lists, PrefixListsOutput};
use super::security_group::{
    declare_security_group, SecurityGroupArgs, SecurityGroupOutput, SecurityRule,
};
use super::target_group::{declare_target_group, TargetGroupOutput};
use super::vpc::{declare_vpc, VpcArgs, VpcOutput};
use super::Stack;
use crate::config::StackConfig;
use crate::deferred::join;
use crate::error::Result;
use crate::models::environment_tags;

/// Port the VPC security group admits.
const HTTP_PORT: u16 = 80;

pub struct EdgeOutput {
    pub target_group: Option<TargetGroupOutput>,
    pub load_balancer: LoadBalancerOutput,
}

pub struct StackOutput {
    pub prefix_lists: PrefixListsOutput,
    pub vpc: VpcOutput,
    pub security_group: SecurityGroupOutput,
    pub edge: Option<EdgeOutput>,
}

pub fn declare_stack(stack: &Stack, cfg: &StackConfig) -> Result<StackOutput> {
    log::info!(
        "declaring stack {} (vpc {} {})",
        cfg.environment,
        cfg.vpc.name,
        cfg.vpc.cidr
    );
    let env_tags = environment_tags(&cfg.environment);

    let prefix_lists = declare_edge_prefix_lists(stack)?;

    let vpc = declare_vpc(
        stack,
        &VpcArgs {
            name: cfg.vpc.name.clone(),
            cidr: cfg.vpc.cidr,
            azs: cfg.vpc.azs.clone(),
            tags: env_tags.clone(),
            private_subnet_tags: env_tags.clone(),
            public_subnet_tags: env_tags.clone(),
        },
    )?;

    let security_group = declare_security_group(
        stack,
        SecurityGroupArgs {
            name: cfg.vpc.name.clone(),
            vpc_id: vpc.vpc_id.clone(),
            tags: env_tags,
            ingress: vec![SecurityRule::tcp(HTTP_PORT, vec![vpc.cidr.to_string()])],
            ingress_prefix_list_ids: vec![
                prefix_lists.ipv4_id.clone(),
                prefix_lists.ipv6_id.clone(),
            ],
            egress: Vec::new(),
            egress_prefix_list_ids: Vec::new(),
        },
    )?;

    let edge = match &cfg.edge {
        None => {
            log::info!("stack {}: no edge block", cfg.environment);
            None
        }
        Some(edge) => {
            let target_group = edge
                .target_group
                .as_ref()
                .map(|tg| declare_target_group(stack, tg, &vpc.vpc_id))
                .transpose()?;
            let load_balancer = declare_load_balancer(
                stack,
                LoadBalancerArgs {
                    name: edge.name.clone(),
                    domain: edge.domain.clone(),
                    dns_zone: edge.dns_zone.clone(),
                    dns: edge.dns,
                    hosted_zone: edge.hosted_zone.clone(),
                    internal: false,
                    vpc_id: vpc.vpc_id.clone(),
                    subnet_ids: Some(join(
                        format!("{} public subnets", cfg.vpc.name),
                        vpc.public_subnet_ids.clone(),
                    )),
                    security_group_ids: vec![security_group.id.clone()],
                    target_group_arn: target_group.as_ref().map(|tg| tg.arn.clone()),
                    listener: ListenerSettings::default(),
                    fixed_response: FixedResponse::default(),
                    extra_domains: edge.extra_domains.clone(),
                    proxied: edge.proxied,
                },
            )?;
            Some(EdgeOutput {
                target_group,
                load_balancer,
            })
        }
    };

    log::info!(
        "stack {}: {} completions tracked",
        cfg.environment,
        stack.tracked_count()
    );
    Ok(StackOutput {
        prefix_lists,
        vpc,
        security_group,
        edge,
    })
}
