//! In-memory provisioning backend.
//!
//! Records every create, mints identifiers and fills in the attributes a real
//! cloud would report (validation options, record FQDNs, load balancer DNS
//! names). With [`Completion::Queued`] creates stay pending until
//! [`MemoryBackend::settle`] drains them, which reproduces the out-of-band
//! completion of a real backend.

use super::{Attributes, Handle, Lookup, ProvisioningBackend, ResourceKind};
use crate::config::DnsFlavour;
use crate::deferred::{new_deferred, DeferredValue, Resolver};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Published edge-network ranges returned by [`Lookup::EdgeIpRanges`].
const EDGE_IPV4_RANGES: [&str; 4] = [
    "173.245.48.0/20",
    "103.21.244.0/22",
    "103.22.200.0/22",
    "104.16.0.0/13",
];
const EDGE_IPV6_RANGES: [&str; 2] = ["2400:cb00::/32", "2606:4700::/32"];

/// When a create's attributes resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Inside `create`, before it returns.
    Immediate,
    /// When [`MemoryBackend::settle`] or [`MemoryBackend::complete_next`] runs.
    Queued,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStatus {
    Pending,
    Created,
    Failed(String),
}

/// One create as seen by the backend.
#[derive(Debug, Clone)]
pub struct ResourceRecord {
    pub handle: Handle,
    pub args: Value,
    pub declared_at: DateTime<Utc>,
    pub status: RecordStatus,
    pub attributes: Option<Attributes>,
}

struct QueuedCreate {
    record: usize,
    outcome: Result<Attributes>,
    resolver: Resolver<Attributes>,
}

#[derive(Default)]
struct Inner {
    seq: u64,
    records: Vec<ResourceRecord>,
    queue: VecDeque<QueuedCreate>,
    failures: HashMap<String, String>,
    zones: HashMap<String, String>,
}

pub struct MemoryBackend {
    completion: Completion,
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    pub fn new(completion: Completion) -> MemoryBackend {
        MemoryBackend {
            completion,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn immediate() -> MemoryBackend {
        MemoryBackend::new(Completion::Immediate)
    }

    pub fn queued() -> MemoryBackend {
        MemoryBackend::new(Completion::Queued)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the create (or zone lookup) named `name` fail with `message`.
    pub fn fail_on(&self, name: impl Into<String>, message: impl Into<String>) {
        self.lock().failures.insert(name.into(), message.into());
    }

    /// Register a known DNS zone id; unknown zones get a derived id.
    pub fn with_zone(self, name: impl Into<String>, zone_id: impl Into<String>) -> Self {
        self.lock().zones.insert(name.into(), zone_id.into());
        self
    }

    /// Snapshot of every create issued so far, in declaration order.
    pub fn records(&self) -> Vec<ResourceRecord> {
        self.lock().records.clone()
    }

    pub fn records_of(&self, kind: ResourceKind) -> Vec<ResourceRecord> {
        self.lock()
            .records
            .iter()
            .filter(|r| r.handle.kind == kind)
            .cloned()
            .collect()
    }

    /// Creates still waiting for completion.
    pub fn pending_count(&self) -> usize {
        self.lock().queue.len()
    }

    /// Complete the oldest queued create. Returns `false` when none is queued.
    pub fn complete_next(&self) -> bool {
        let next = {
            let mut inner = self.lock();
            let Some(next) = inner.queue.pop_front() else {
                return false;
            };
            mark_settled(&mut inner.records[next.record], &next.outcome);
            next
        };
        log::debug!("completing {}", next.resolver.label());
        if let Err(e) = next.resolver.complete(next.outcome) {
            log::error!("{e}");
        }
        true
    }

    /// Drain the queue, including creates issued by continuations while
    /// draining. Returns how many creates were completed.
    pub fn settle(&self) -> usize {
        let mut completed = 0;
        while self.complete_next() {
            completed += 1;
        }
        log::info!("settled {completed} pending creates");
        completed
    }
}

fn mark_settled(record: &mut ResourceRecord, outcome: &Result<Attributes>) {
    match outcome {
        Ok(attrs) => {
            record.status = RecordStatus::Created;
            record.attributes = Some(attrs.clone());
        }
        Err(e) => record.status = RecordStatus::Failed(e.to_string()),
    }
}

fn arg_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

/// Attributes a real backend would report for a freshly created resource.
fn synthesize(kind: ResourceKind, name: &str, args: &Value, seq: u64) -> Attributes {
    let id = format!("{}-{seq:08x}", kind.id_prefix());
    let mut attrs = Attributes::new()
        .with("id", id.clone())
        .with("arn", format!("arn:memory:{kind}:{seq:08x}/{name}"));

    match kind {
        ResourceKind::Vpc | ResourceKind::Subnet => {
            if let Some(cidr) = arg_str(args, "cidr_block") {
                attrs.insert("cidr_block", cidr);
            }
        }
        ResourceKind::Certificate => {
            let mut domains: Vec<String> = arg_str(args, "domain_name")
                .map(|d| vec![d.to_string()])
                .unwrap_or_default();
            if let Some(sans) = args.get("subject_alternative_names").and_then(Value::as_array) {
                domains.extend(sans.iter().filter_map(Value::as_str).map(str::to_string));
            }
            let options: Vec<Value> = domains
                .iter()
                .enumerate()
                .map(|(i, domain)| {
                    let token = format!("_{seq:08x}{i:02x}");
                    json!({
                        "domain_name": domain,
                        "resource_record_name": format!("{token}.{domain}."),
                        "resource_record_type": "CNAME",
                        "resource_record_value": format!("{token}.validations.memory.internal."),
                    })
                })
                .collect();
            attrs.insert("domain_validation_options", options);
        }
        ResourceKind::DnsRecord(_) => {
            let fqdn = arg_str(args, "name").unwrap_or(name).trim_end_matches('.');
            attrs.insert("fqdn", fqdn);
            attrs.insert("hostname", fqdn);
        }
        ResourceKind::LoadBalancer => {
            attrs.insert("dns_name", format!("{name}-{seq:08x}.lb.memory.internal"));
            attrs.insert("zone_id", "ZMEMORYLB0001");
        }
        ResourceKind::CertificateValidation => {
            if let Some(arn) = arg_str(args, "certificate_arn") {
                attrs.insert("certificate_arn", arn);
            }
        }
        _ => {}
    }
    attrs
}

impl ProvisioningBackend for MemoryBackend {
    fn create(
        &self,
        kind: ResourceKind,
        name: &str,
        args: Value,
    ) -> Result<(Handle, DeferredValue<Attributes>)> {
        let mut inner = self.lock();

        if inner
            .records
            .iter()
            .any(|r| r.handle.kind == kind && r.handle.name == name)
        {
            return Err(Error::Backend {
                kind: kind.to_string(),
                name: name.to_string(),
                message: "a resource with this name is already declared".to_string(),
            });
        }

        let (attrs, resolver) = new_deferred(format!("{kind}/{name}"));
        inner.seq += 1;
        let seq = inner.seq;
        let handle = Handle {
            kind,
            name: name.to_string(),
            seq,
        };
        let outcome = match inner.failures.get(name) {
            Some(message) => Err(Error::Backend {
                kind: kind.to_string(),
                name: name.to_string(),
                message: message.clone(),
            }),
            None => Ok(synthesize(kind, name, &args, seq)),
        };
        log::debug!("create {handle} #{seq}");

        inner.records.push(ResourceRecord {
            handle: handle.clone(),
            args,
            declared_at: Utc::now(),
            status: RecordStatus::Pending,
            attributes: None,
        });
        let record = inner.records.len() - 1;

        match self.completion {
            Completion::Immediate => {
                mark_settled(&mut inner.records[record], &outcome);
                drop(inner);
                if let Err(e) = resolver.complete(outcome) {
                    log::error!("{e}");
                }
            }
            Completion::Queued => inner.queue.push_back(QueuedCreate {
                record,
                outcome,
                resolver,
            }),
        }
        Ok((handle, attrs))
    }

    fn lookup(&self, query: &Lookup) -> Result<Attributes> {
        let inner = self.lock();
        match query {
            Lookup::DnsZone {
                flavour,
                name,
                private,
            } => {
                if let Some(message) = inner.failures.get(name) {
                    return Err(Error::Backend {
                        kind: "dns_zone".to_string(),
                        name: name.clone(),
                        message: message.clone(),
                    });
                }
                let zone_id = inner.zones.get(name).cloned().unwrap_or_else(|| {
                    let scope = match (flavour, private) {
                        (DnsFlavour::Edge, _) => "edge",
                        (DnsFlavour::HostedZone, true) => "private",
                        (DnsFlavour::HostedZone, false) => "public",
                    };
                    format!("zone-{scope}-{}", name.replace('.', "-"))
                });
                Ok(Attributes::new()
                    .with("zone_id", zone_id)
                    .with("name", name.clone()))
            }
            Lookup::SubnetsInVpc { vpc_id } => {
                let ids: Vec<String> = inner
                    .records
                    .iter()
                    .filter(|r| r.handle.kind == ResourceKind::Subnet)
                    .filter(|r| arg_str(&r.args, "vpc_id") == Some(vpc_id.as_str()))
                    .filter_map(|r| r.attributes.as_ref()?.get_str("id").map(str::to_string))
                    .collect();
                Ok(Attributes::new().with("ids", ids))
            }
            Lookup::EdgeIpRanges => Ok(Attributes::new()
                .with("ipv4_cidr_blocks", EDGE_IPV4_RANGES.to_vec())
                .with("ipv6_cidr_blocks", EDGE_IPV6_RANGES.to_vec())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::Snapshot;

    #[test]
    fn test_immediate_create_resolves_before_return() {
        let backend = MemoryBackend::immediate();
        let (handle, attrs) = backend
            .create(
                ResourceKind::Vpc,
                "dev-vpc",
                json!({"cidr_block": "10.0.0.0/16"}),
            )
            .unwrap();
        assert_eq!(handle.seq, 1);
        let attrs = match attrs.snapshot() {
            Snapshot::Resolved(a) => a,
            other => panic!("expected resolved, got {other:?}"),
        };
        assert_eq!(attrs.get_str("id"), Some("vpc-00000001"));
        assert_eq!(attrs.get_str("cidr_block"), Some("10.0.0.0/16"));
        assert_eq!(backend.records()[0].status, RecordStatus::Created);
    }

    #[test]
    fn test_queued_create_waits_for_settle() {
        let backend = MemoryBackend::queued();
        let (_, attrs) = backend
            .create(ResourceKind::Eip, "dev-eip", json!({}))
            .unwrap();
        assert!(attrs.is_pending());
        assert_eq!(backend.pending_count(), 1);
        assert_eq!(backend.settle(), 1);
        assert!(!attrs.is_pending());
        assert_eq!(backend.pending_count(), 0);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let backend = MemoryBackend::immediate();
        backend
            .create(ResourceKind::Subnet, "dev-private-1", json!({}))
            .unwrap();
        assert!(matches!(
            backend.create(ResourceKind::Subnet, "dev-private-1", json!({})),
            Err(Error::Backend { .. })
        ));
        // Same name, different kind is fine.
        assert!(backend
            .create(ResourceKind::RouteTable, "dev-private-1", json!({}))
            .is_ok());
    }

    #[test]
    fn test_duplicate_name_leaves_no_pending_work() {
        let backend = MemoryBackend::queued();
        let (_, first) = backend
            .create(ResourceKind::Vpc, "dev-vpc", json!({}))
            .unwrap();
        assert!(backend
            .create(ResourceKind::Vpc, "dev-vpc", json!({}))
            .is_err());
        assert_eq!(backend.pending_count(), 1);
        assert_eq!(backend.records().len(), 1);

        let (handle, _) = backend
            .create(ResourceKind::InternetGateway, "dev-igw", json!({}))
            .unwrap();
        assert_eq!(handle.seq, 2);
        assert_eq!(backend.settle(), 2);
        assert!(!first.is_pending());
    }

    #[test]
    fn test_failure_injection() {
        let backend = MemoryBackend::queued();
        backend.fail_on("dev-ngw", "insufficient capacity");
        let (_, attrs) = backend
            .create(ResourceKind::NatGateway, "dev-ngw", json!({}))
            .unwrap();
        backend.settle();
        assert!(matches!(attrs.snapshot(), Snapshot::Failed(Error::Backend { .. })));
        assert!(matches!(
            backend.records()[0].status,
            RecordStatus::Failed(_)
        ));
    }

    #[test]
    fn test_certificate_validation_options() {
        let backend = MemoryBackend::immediate();
        let (_, attrs) = backend
            .create(
                ResourceKind::Certificate,
                "app-cert",
                json!({
                    "domain_name": "app.example.com",
                    "subject_alternative_names": ["www.example.com"],
                }),
            )
            .unwrap();
        let attrs = attrs.wait().unwrap();
        let options = attrs
            .get("domain_validation_options")
            .and_then(Value::as_array)
            .unwrap();
        assert_eq!(options.len(), 2);
        assert!(options[1]["resource_record_name"]
            .as_str()
            .unwrap()
            .ends_with(".www.example.com."));
    }

    #[test]
    fn test_lookups() {
        let backend = MemoryBackend::immediate().with_zone("example.com", "Z123");
        let zone = backend
            .lookup(&Lookup::DnsZone {
                flavour: DnsFlavour::HostedZone,
                name: "example.com".into(),
                private: false,
            })
            .unwrap();
        assert_eq!(zone.get_str("zone_id"), Some("Z123"));

        let (_, vpc) = backend.create(ResourceKind::Vpc, "v", json!({})).unwrap();
        let vpc_id = vpc.wait().unwrap().require_str("vpc", "id").unwrap();
        backend
            .create(ResourceKind::Subnet, "s1", json!({"vpc_id": vpc_id}))
            .unwrap();
        backend
            .create(ResourceKind::Subnet, "s2", json!({"vpc_id": "other"}))
            .unwrap();
        let subnets = backend
            .lookup(&Lookup::SubnetsInVpc { vpc_id })
            .unwrap();
        let ids: Vec<String> = subnets.require("subnets", "ids").unwrap();
        assert_eq!(ids.len(), 1);

        let ranges = backend.lookup(&Lookup::EdgeIpRanges).unwrap();
        let v6: Vec<String> = ranges.require("ranges", "ipv6_cidr_blocks").unwrap();
        assert_eq!(v6.len(), 2);
    }
}
