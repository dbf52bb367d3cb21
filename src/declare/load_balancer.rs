//! Application load balancer with an HTTPS listener, per-domain certificates
//! and alias records in the hosted zone.

use super::certificate::{declare_certificate, CertificateArgs, CertificateOutput};
use super::record::validate_domain;
use super::Stack;
use crate::backend::{Attributes, Lookup, ResourceKind};
use crate::capability::{arn_of, HasArn, HasDnsTarget, HasFqdn, LoadBalancer, Record};
use crate::config::{DnsFlavour, ALIAS_RECORD_TTL, PROXIED_TTL};
use crate::deferred::{join, zip, DeferredValue};
use crate::error::Result;
use serde_json::{json, Value};

const SSL_POLICY: &str = "ELBSecurityPolicy-2016-08";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerSettings {
    pub port: u16,
    pub protocol: String,
    pub alpn_policy: String,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        ListenerSettings {
            port: 443,
            protocol: "HTTPS".to_string(),
            alpn_policy: "HTTP2Preferred".to_string(),
        }
    }
}

/// Listener answer when no target group is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedResponse {
    pub content_type: String,
    pub message_body: String,
    pub status_code: String,
}

impl Default for FixedResponse {
    fn default() -> Self {
        FixedResponse {
            content_type: "text/plain".to_string(),
            message_body: "Default Action: Not Found".to_string(),
            status_code: "404".to_string(),
        }
    }
}

pub struct LoadBalancerArgs {
    pub name: String,
    pub domain: String,
    /// Zone holding the certificates' CAA and validation records.
    pub dns_zone: String,
    pub dns: DnsFlavour,
    /// Hosted zone receiving the alias records.
    pub hosted_zone: String,
    pub internal: bool,
    pub vpc_id: DeferredValue<String>,
    /// Subnets to place the load balancer in. When `None` they are looked up
    /// by VPC id once the VPC exists, which only sees subnets already created.
    pub subnet_ids: Option<DeferredValue<Vec<String>>>,
    pub security_group_ids: Vec<DeferredValue<String>>,
    pub target_group_arn: Option<DeferredValue<String>>,
    pub listener: ListenerSettings,
    pub fixed_response: FixedResponse,
    pub extra_domains: Vec<String>,
    pub proxied: bool,
}

pub struct LoadBalancerOutput {
    pub arn: DeferredValue<String>,
    pub dns_name: DeferredValue<String>,
    pub listener_arn: DeferredValue<String>,
    /// Main domain first, then one per extra domain.
    pub certificates: Vec<CertificateOutput>,
    pub alias_fqdns: DeferredValue<Vec<String>>,
}

fn default_action(
    target_group_arn: &Option<DeferredValue<String>>,
    fixed: &FixedResponse,
) -> DeferredValue<Value> {
    match target_group_arn {
        Some(arn) => arn.map(|arn| Ok(json!({ "type": "forward", "target_group_arn": arn }))),
        None => DeferredValue::resolved(
            "fixed-response",
            json!({
                "type": "fixed-response",
                "fixed_response": {
                    "content_type": fixed.content_type,
                    "message_body": fixed.message_body,
                    "status_code": fixed.status_code,
                },
            }),
        ),
    }
}

fn subnets_for(stack: &Stack, args: &LoadBalancerArgs) -> DeferredValue<Vec<String>> {
    if let Some(ids) = &args.subnet_ids {
        return ids.clone();
    }
    let stack = stack.clone();
    args.vpc_id.map(move |vpc_id| {
        let found = stack.lookup(&Lookup::SubnetsInVpc { vpc_id })?;
        found.require("subnets", "ids")
    })
}

pub fn declare_load_balancer(stack: &Stack, args: LoadBalancerArgs) -> Result<LoadBalancerOutput> {
    validate_domain(&args.domain)?;
    for domain in &args.extra_domains {
        validate_domain(domain)?;
    }
    let name = args.name.clone();
    let ttl = if args.proxied { PROXIED_TTL } else { ALIAS_RECORD_TTL };

    let main_certificate = declare_certificate(
        stack,
        &CertificateArgs {
            name: name.clone(),
            domain: args.domain.clone(),
            dns_zone: args.dns_zone.clone(),
            flavour: args.dns,
        },
    )?;

    let inputs = zip(
        &subnets_for(stack, &args),
        &join(format!("{name} security groups"), args.security_group_ids.clone()),
    );
    let lb_name = name.clone();
    let internal = args.internal;
    let load_balancer = stack.create_after(
        &inputs,
        ResourceKind::LoadBalancer,
        &name,
        move |(subnets, security_groups)| {
            log::info!("load balancer {lb_name}: {} subnets", subnets.len());
            Ok(json!({
                "name": lb_name,
                "internal": internal,
                "load_balancer_type": "application",
                "subnets": subnets,
                "security_groups": security_groups,
                "enable_deletion_protection": false,
            }))
        },
    );
    let lb_arn = load_balancer.map(|attrs| LoadBalancer(attrs).arn());

    let listener_inputs = zip(
        &zip(&lb_arn, &main_certificate.arn),
        &default_action(&args.target_group_arn, &args.fixed_response),
    );
    let settings = args.listener.clone();
    let listener = stack.create_after(
        &listener_inputs,
        ResourceKind::Listener,
        &format!("{name}-listener"),
        move |((lb_arn, certificate_arn), action)| {
            Ok(json!({
                "load_balancer_arn": lb_arn,
                "port": settings.port,
                "protocol": settings.protocol,
                "alpn_policy": settings.alpn_policy,
                "certificate_arn": certificate_arn,
                "ssl_policy": SSL_POLICY,
                "default_actions": [action],
            }))
        },
    );
    let listener_arn = arn_of(&listener);

    let mut certificates = vec![main_certificate];
    for (i, domain) in args.extra_domains.iter().enumerate() {
        let n = i + 1;
        let certificate = declare_certificate(
            stack,
            &CertificateArgs {
                name: format!("{name}-extra-{n}"),
                domain: domain.clone(),
                dns_zone: args.dns_zone.clone(),
                flavour: args.dns,
            },
        )?;
        stack.create_after(
            &zip(&listener_arn, &certificate.arn),
            ResourceKind::ListenerCertificate,
            &format!("{name}-listener-cert-{n}"),
            |(listener_arn, certificate_arn)| {
                Ok(json!({ "listener_arn": listener_arn, "certificate_arn": certificate_arn }))
            },
        );
        certificates.push(certificate);
    }

    let zone = stack.lookup(&Lookup::DnsZone {
        flavour: DnsFlavour::HostedZone,
        name: args.hosted_zone.clone(),
        private: false,
    })?;
    let zone_id = zone.require_str("dns_zone", "zone_id")?;

    let mut aliases = Vec::new();
    let domains = std::iter::once(&args.domain).chain(args.extra_domains.iter());
    for (i, domain) in domains.enumerate() {
        let (zone_id, domain) = (zone_id.clone(), domain.clone());
        let alias = stack.create_after(
            &load_balancer,
            ResourceKind::DnsRecord(DnsFlavour::HostedZone),
            &format!("{name}-alias-{}", i + 1),
            move |attrs: Attributes| {
                let target = LoadBalancer(attrs);
                let (dns_name, target_zone_id) = (target.dns_name()?, target.zone_id()?);
                Ok(json!({
                    "zone_id": zone_id,
                    "name": domain,
                    "type": "CNAME",
                    "aliases": [{ "name": dns_name, "zone_id": target_zone_id }],
                    "ttl": ttl,
                    "allow_overwrite": true,
                }))
            },
        );
        aliases.push(alias.map(|attrs| Record(attrs).fqdn()));
    }

    Ok(LoadBalancerOutput {
        arn: lb_arn,
        dns_name: load_balancer.map(|attrs| LoadBalancer(attrs).dns_name()),
        listener_arn,
        certificates,
        alias_fqdns: join(format!("{name} aliases"), aliases),
    })
}
