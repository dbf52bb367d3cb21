//! Typed views over backend attribute maps.
//!
//! Each adapter wraps the [`Attributes`] of one resource kind and exposes only
//! the fields declaration code reads, through small traits such as
//! [`HasArn`] or [`HasValidationOptions`]. A missing or malformed attribute
//! becomes [`Error::MissingAttribute`] naming the adapter.

use crate::backend::Attributes;
use crate::deferred::DeferredValue;
use crate::error::Result;
use serde::{Deserialize, Serialize};

pub trait HasId {
    fn id(&self) -> Result<String>;
}

pub trait HasArn {
    fn arn(&self) -> Result<String>;
}

pub trait HasFqdn {
    fn fqdn(&self) -> Result<String>;
}

/// Target for alias records pointing at this resource.
pub trait HasDnsTarget {
    fn dns_name(&self) -> Result<String>;
    fn zone_id(&self) -> Result<String>;
}

pub trait HasValidationOptions {
    fn validation_options(&self) -> Result<Vec<ValidationOption>>;
}

/// One DNS record the certificate authority wants to see before issuing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOption {
    pub domain_name: String,
    pub resource_record_name: String,
    pub resource_record_type: String,
    pub resource_record_value: String,
}

/// Any resource; only its id and ARN are known to be present.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource(pub Attributes);

#[derive(Debug, Clone, PartialEq)]
pub struct Certificate(pub Attributes);

#[derive(Debug, Clone, PartialEq)]
pub struct Record(pub Attributes);

#[derive(Debug, Clone, PartialEq)]
pub struct LoadBalancer(pub Attributes);

impl HasId for Resource {
    fn id(&self) -> Result<String> {
        self.0.require_str("resource", "id")
    }
}

impl HasArn for Resource {
    fn arn(&self) -> Result<String> {
        self.0.require_str("resource", "arn")
    }
}

impl HasArn for Certificate {
    fn arn(&self) -> Result<String> {
        self.0.require_str("certificate", "arn")
    }
}

impl HasValidationOptions for Certificate {
    fn validation_options(&self) -> Result<Vec<ValidationOption>> {
        self.0.require("certificate", "domain_validation_options")
    }
}

impl HasId for Record {
    fn id(&self) -> Result<String> {
        self.0.require_str("record", "id")
    }
}

impl HasFqdn for Record {
    fn fqdn(&self) -> Result<String> {
        self.0.require_str("record", "fqdn")
    }
}

impl HasArn for LoadBalancer {
    fn arn(&self) -> Result<String> {
        self.0.require_str("load_balancer", "arn")
    }
}

impl HasDnsTarget for LoadBalancer {
    fn dns_name(&self) -> Result<String> {
        self.0.require_str("load_balancer", "dns_name")
    }

    fn zone_id(&self) -> Result<String> {
        self.0.require_str("load_balancer", "zone_id")
    }
}

/// Deferred id of whatever resource `attrs` describes.
pub fn id_of(attrs: &DeferredValue<Attributes>) -> DeferredValue<String> {
    attrs.map(|a| Resource(a).id())
}

/// Deferred ARN of whatever resource `attrs` describes.
pub fn arn_of(attrs: &DeferredValue<Attributes>) -> DeferredValue<String> {
    attrs.map(|a| Resource(a).arn())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::Snapshot;
    use crate::error::Error;
    use serde_json::json;

    #[test]
    fn test_certificate_view() {
        let cert = Certificate(
            Attributes::new()
                .with("arn", "arn:cert:1")
                .with(
                    "domain_validation_options",
                    json!([{
                        "domain_name": "app.example.com",
                        "resource_record_name": "_a.app.example.com.",
                        "resource_record_type": "CNAME",
                        "resource_record_value": "_b.validations.example.",
                    }]),
                ),
        );
        assert_eq!(cert.arn().unwrap(), "arn:cert:1");
        let options = cert.validation_options().unwrap();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].resource_record_type, "CNAME");
    }

    #[test]
    fn test_missing_attribute_names_adapter() {
        let lb = LoadBalancer(Attributes::new().with("dns_name", "lb.example"));
        assert_eq!(lb.dns_name().unwrap(), "lb.example");
        assert_eq!(
            lb.zone_id(),
            Err(Error::MissingAttribute {
                kind: "load_balancer".to_string(),
                attribute: "zone_id".to_string()
            })
        );
        assert!(Record(Attributes::new()).fqdn().is_err());
    }

    #[test]
    fn test_deferred_id_follows_attributes() {
        let attrs = DeferredValue::resolved("vpc", Attributes::new().with("id", "vpc-1"));
        assert_eq!(id_of(&attrs).snapshot(), Snapshot::Resolved("vpc-1".to_string()));
        assert!(matches!(
            arn_of(&attrs).snapshot(),
            Snapshot::Failed(Error::MissingAttribute { .. })
        ));
    }
}
