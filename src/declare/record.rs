//! Single record in the edge DNS provider.

use super::Stack;
use crate::backend::{Lookup, ResourceKind};
use crate::capability::{HasFqdn, Record};
use crate::config::{DnsFlavour, PROXIED_TTL};
use crate::deferred::DeferredValue;
use crate::error::{Error, Result};
use regex::Regex;
use serde_json::json;
use std::sync::OnceLock;

/// Hostname labels: letters, digits and inner hyphens, at least two labels.
static DOMAIN_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_domain_regex() -> &'static Regex {
    DOMAIN_REGEX.get_or_init(|| {
        Regex::new(r"^(?i)(\*\.)?([a-z0-9_]([a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}\.?$")
            .expect("Invalid Regex")
    })
}

/// Reject anything that is not a plausible DNS name.
pub fn validate_domain(domain: &str) -> Result<()> {
    if domain.len() > 253 || !get_domain_regex().is_match(domain) {
        return Err(Error::InvalidConfig(format!("invalid domain name '{domain}'")));
    }
    Ok(())
}

/// Zone a domain lives in: its last two labels.
pub fn zone_name(domain: &str) -> Result<String> {
    validate_domain(domain)?;
    let labels: Vec<&str> = domain.trim_end_matches('.').split('.').collect();
    Ok(labels[labels.len() - 2..].join("."))
}

pub struct RecordArgs {
    pub domain: String,
    pub record_type: String,
    pub value: DeferredValue<String>,
    pub ttl: u32,
    pub proxied: bool,
}

pub struct RecordOutput {
    pub zone_name: String,
    pub fqdn: DeferredValue<String>,
}

/// Declare `args.domain` in its zone once the value is known.
///
/// Proxied records always get the provider's automatic TTL.
pub fn declare_record(stack: &Stack, args: RecordArgs) -> Result<RecordOutput> {
    let zone_name = zone_name(&args.domain)?;
    let zone = stack.lookup(&Lookup::DnsZone {
        flavour: DnsFlavour::Edge,
        name: zone_name.clone(),
        private: false,
    })?;
    let zone_id = zone.require_str("dns_zone", "zone_id")?;
    let ttl = if args.proxied { PROXIED_TTL } else { args.ttl };

    let resource_name = format!("{}-{}", args.domain, args.record_type.to_lowercase());
    let (domain, record_type, proxied) = (args.domain, args.record_type, args.proxied);
    let record = stack.create_after(
        &args.value,
        ResourceKind::DnsRecord(DnsFlavour::Edge),
        &resource_name,
        move |value| {
            Ok(json!({
                "zone_id": zone_id,
                "name": domain,
                "type": record_type,
                "value": value,
                "ttl": ttl,
                "proxied": proxied,
                "allow_overwrite": true,
            }))
        },
    );

    Ok(RecordOutput {
        zone_name,
        fqdn: record.map(|attrs| Record(attrs).fqdn()),
    })
}
