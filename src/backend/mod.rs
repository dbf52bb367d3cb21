//! Provisioning backend interface.
//!
//! The remote backend that actually creates cloud resources lives outside
//! this crate. Declaration code talks to it only through
//! [`ProvisioningBackend`]:
//! - [`ProvisioningBackend::create`] - asynchronous create; attributes arrive later
//! - [`ProvisioningBackend::lookup`] - synchronous data-source query
//!
//! [`memory`] provides an in-process implementation for dry runs and tests.

pub mod memory;

use crate::config::DnsFlavour;
use crate::deferred::DeferredValue;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub use memory::{Completion, MemoryBackend, RecordStatus, ResourceRecord};

/// Every resource kind declaration code may create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Vpc,
    InternetGateway,
    Subnet,
    RouteTable,
    RouteTableAssociation,
    Eip,
    NatGateway,
    SecurityGroup,
    ManagedPrefixList,
    LoadBalancer,
    Listener,
    ListenerCertificate,
    ListenerRule,
    TargetGroup,
    DnsRecord(DnsFlavour),
    Certificate,
    CertificateValidation,
}

impl ResourceKind {
    /// Short prefix used in generated identifiers.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            ResourceKind::Vpc => "vpc",
            ResourceKind::InternetGateway => "igw",
            ResourceKind::Subnet => "subnet",
            ResourceKind::RouteTable => "rtb",
            ResourceKind::RouteTableAssociation => "rtbassoc",
            ResourceKind::Eip => "eipalloc",
            ResourceKind::NatGateway => "nat",
            ResourceKind::SecurityGroup => "sg",
            ResourceKind::ManagedPrefixList => "pl",
            ResourceKind::LoadBalancer => "lb",
            ResourceKind::Listener => "listener",
            ResourceKind::ListenerCertificate => "listenercert",
            ResourceKind::ListenerRule => "rule",
            ResourceKind::TargetGroup => "tg",
            ResourceKind::DnsRecord(_) => "record",
            ResourceKind::Certificate => "cert",
            ResourceKind::CertificateValidation => "certval",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Vpc => write!(f, "vpc"),
            ResourceKind::InternetGateway => write!(f, "internet_gateway"),
            ResourceKind::Subnet => write!(f, "subnet"),
            ResourceKind::RouteTable => write!(f, "route_table"),
            ResourceKind::RouteTableAssociation => write!(f, "route_table_association"),
            ResourceKind::Eip => write!(f, "eip"),
            ResourceKind::NatGateway => write!(f, "nat_gateway"),
            ResourceKind::SecurityGroup => write!(f, "security_group"),
            ResourceKind::ManagedPrefixList => write!(f, "managed_prefix_list"),
            ResourceKind::LoadBalancer => write!(f, "load_balancer"),
            ResourceKind::Listener => write!(f, "listener"),
            ResourceKind::ListenerCertificate => write!(f, "listener_certificate"),
            ResourceKind::ListenerRule => write!(f, "listener_rule"),
            ResourceKind::TargetGroup => write!(f, "target_group"),
            ResourceKind::DnsRecord(DnsFlavour::Edge) => write!(f, "edge_dns_record"),
            ResourceKind::DnsRecord(DnsFlavour::HostedZone) => write!(f, "hosted_zone_record"),
            ResourceKind::Certificate => write!(f, "certificate"),
            ResourceKind::CertificateValidation => write!(f, "certificate_validation"),
        }
    }
}

/// Backend-issued reference to a declared resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    pub kind: ResourceKind,
    pub name: String,
    /// Declaration order within the backend, starting at 1.
    pub seq: u64,
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Attribute map reported by the backend once a resource exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, Value>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// String attribute `key`, or [`Error::MissingAttribute`] naming `kind`.
    pub fn require_str(&self, kind: &str, key: &str) -> Result<String> {
        self.get_str(key)
            .map(str::to_string)
            .ok_or_else(|| Error::MissingAttribute {
                kind: kind.to_string(),
                attribute: key.to_string(),
            })
    }

    /// Deserialize attribute `key` into `T`.
    pub fn require<T: serde::de::DeserializeOwned>(&self, kind: &str, key: &str) -> Result<T> {
        let value = self.get(key).ok_or_else(|| Error::MissingAttribute {
            kind: kind.to_string(),
            attribute: key.to_string(),
        })?;
        serde_json::from_value(value.clone()).map_err(|e| Error::MissingAttribute {
            kind: kind.to_string(),
            attribute: format!("{key} ({e})"),
        })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Synchronous data-source queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lookup {
    /// DNS zone by name; yields `zone_id`.
    DnsZone {
        flavour: DnsFlavour,
        name: String,
        private: bool,
    },
    /// Subnets belonging to a VPC; yields `ids`.
    SubnetsInVpc { vpc_id: String },
    /// Published address ranges of the edge network; yields
    /// `ipv4_cidr_blocks` and `ipv6_cidr_blocks`.
    EdgeIpRanges,
}

/// A remote backend able to create resources asynchronously.
pub trait ProvisioningBackend: Send + Sync {
    /// Issue a create. The handle is known now; the attributes (ids, ARNs,
    /// generated DNS names) resolve once the backend reports completion.
    fn create(
        &self,
        kind: ResourceKind,
        name: &str,
        args: Value,
    ) -> Result<(Handle, DeferredValue<Attributes>)>;

    /// Query an existing object without creating anything.
    fn lookup(&self, query: &Lookup) -> Result<Attributes>;
}

pub type SharedBackend = Arc<dyn ProvisioningBackend>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_accessors() {
        let attrs = Attributes::new()
            .with("id", "vpc-0001")
            .with("ids", vec!["subnet-1", "subnet-2"]);
        assert_eq!(attrs.get_str("id"), Some("vpc-0001"));
        assert_eq!(attrs.require_str("vpc", "id").unwrap(), "vpc-0001");
        assert_eq!(
            attrs.require_str("vpc", "arn"),
            Err(Error::MissingAttribute {
                kind: "vpc".to_string(),
                attribute: "arn".to_string()
            })
        );
        let ids: Vec<String> = attrs.require("vpc", "ids").unwrap();
        assert_eq!(ids, vec!["subnet-1", "subnet-2"]);
        assert!(attrs.require::<u32>("vpc", "id").is_err());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ResourceKind::NatGateway.to_string(), "nat_gateway");
        assert_eq!(
            ResourceKind::DnsRecord(DnsFlavour::HostedZone).to_string(),
            "hosted_zone_record"
        );
        let handle = Handle {
            kind: ResourceKind::Subnet,
            name: "dev-private-1".to_string(),
            seq: 3,
        };
        assert_eq!(handle.to_string(), "subnet/dev-private-1");
    }
}
