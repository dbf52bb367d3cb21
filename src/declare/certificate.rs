//! DNS-validated certificates.
//!
//! The flow is: CAA record(s) allowing the issuers, the certificate itself,
//! one validation record per validation option the certificate reports,
//! and finally the validation resource fed with every record's FQDN.
//!
//! The validation options only exist once the certificate has been created,
//! and each record's FQDN only once that record has. With
//! [`ValidationGate::AfterRecords`] the validation resource is declared from
//! the join of all record FQDNs. [`ValidationGate::EagerSnapshot`] instead
//! collects the FQDNs through continuations and inspects the collection
//! straight away; the continuations have usually not run yet, so validation
//! is usually skipped.

use super::record::validate_domain;
use super::Stack;
use crate::backend::{Attributes, Lookup, ResourceKind};
use crate::capability::{
    Certificate, HasArn, HasFqdn, HasValidationOptions, Record, ValidationOption,
};
use crate::config::{
    DnsFlavour, ValidationGate, EDGE_CAA_TTL, HOSTED_ZONE_CAA_TTL, VALIDATION_RECORD_TTL,
};
use crate::deferred::{join, zip, DeferredValue};
use crate::error::{Error, Result};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

pub struct CertificateArgs {
    /// Prefix for every resource name this certificate declares.
    pub name: String,
    pub domain: String,
    /// Zone receiving the CAA and validation records.
    pub dns_zone: String,
    pub flavour: DnsFlavour,
}

pub struct CertificateOutput {
    pub arn: DeferredValue<String>,
    /// FQDNs of every validation record, in validation-option order.
    pub validation_fqdns: DeferredValue<Vec<String>>,
    /// Whether a validation resource was declared.
    pub validated: DeferredValue<bool>,
    pub caa_issuers: Vec<String>,
}

/// Body of the CAA record(s) for `flavour`.
fn caa_args(flavour: DnsFlavour, zone_id: &str, domain: &str, issuers: &[String]) -> Value {
    match flavour {
        DnsFlavour::Edge => json!({
            "zone_id": zone_id,
            "name": domain,
            "type": "CAA",
            "data": { "flags": "0", "tag": "issue", "value": issuers[0] },
            "ttl": EDGE_CAA_TTL,
            "proxied": true,
            "allow_overwrite": true,
        }),
        DnsFlavour::HostedZone => json!({
            "zone_id": zone_id,
            "name": domain,
            "type": "CAA",
            "ttl": HOSTED_ZONE_CAA_TTL,
            "records": issuers
                .iter()
                .map(|issuer| format!("0 issue \"{issuer}\""))
                .collect::<Vec<_>>(),
            "allow_overwrite": true,
        }),
    }
}

/// Body of the validation record answering `option`.
fn validation_record_args(flavour: DnsFlavour, zone_id: &str, option: &ValidationOption) -> Value {
    match flavour {
        DnsFlavour::Edge => json!({
            "zone_id": zone_id,
            "name": option.resource_record_name,
            "type": option.resource_record_type,
            "value": option.resource_record_value.trim_end_matches('.'),
            "ttl": VALIDATION_RECORD_TTL,
            "proxied": false,
            "allow_overwrite": true,
        }),
        DnsFlavour::HostedZone => json!({
            "zone_id": zone_id,
            "name": option.resource_record_name,
            "type": option.resource_record_type,
            "records": [option.resource_record_value],
            "ttl": VALIDATION_RECORD_TTL,
            "allow_overwrite": true,
        }),
    }
}

/// Declare one validation record per option and join their FQDNs.
///
/// Runs inside the certificate's continuation.
fn declare_validation_records(
    stack: &Stack,
    name: &str,
    flavour: DnsFlavour,
    zone_id: &str,
    options: Vec<ValidationOption>,
) -> Result<DeferredValue<Vec<String>>> {
    if options.is_empty() {
        log::warn!("certificate {name}: no validation options reported");
    }
    let mut fqdns = Vec::with_capacity(options.len());
    for (i, option) in options.iter().enumerate() {
        log::debug!(
            "certificate {name}: validation record for {} ({})",
            option.domain_name,
            option.resource_record_type
        );
        let record = stack.create(
            ResourceKind::DnsRecord(flavour),
            &format!("{name}-validation-{}", i + 1),
            validation_record_args(flavour, zone_id, option),
        )?;
        fqdns.push(record.map(|attrs| Record(attrs).fqdn()));
    }
    Ok(join(format!("{name} validation fqdns"), fqdns))
}

fn validation_args(arn: String, fqdns: Vec<String>) -> Value {
    json!({ "certificate_arn": arn, "validation_record_fqdns": fqdns })
}

/// Declare the validation resource once every record FQDN is known.
fn validate_after_records(
    stack: &Stack,
    name: &str,
    arn: &DeferredValue<String>,
    fqdns: &DeferredValue<Vec<String>>,
) -> DeferredValue<bool> {
    let stack = stack.clone();
    let name = name.to_string();
    zip(arn, fqdns).and_then(move |(arn, fqdns)| {
        if fqdns.is_empty() {
            log::warn!("certificate {name}: nothing to validate, validation not declared");
            return Ok(DeferredValue::resolved(name, false));
        }
        log::info!("certificate {name}: validating with {} records", fqdns.len());
        let validation = stack.create(
            ResourceKind::CertificateValidation,
            &format!("{name}-validation"),
            validation_args(arn, fqdns),
        )?;
        Ok(validation.map(|_| Ok(true)))
    })
}

/// Collect FQDNs through continuations and decide from whatever is visible now.
fn validate_eager_snapshot(
    stack: &Stack,
    name: &str,
    arn: &DeferredValue<String>,
    fqdns: &DeferredValue<Vec<String>>,
) -> DeferredValue<bool> {
    let collected: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&collected);
    stack.track(fqdns.on_resolve(move |fqdns| {
        sink.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend(fqdns);
        Ok(())
    }));

    let visible = collected
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone();
    if visible.is_empty() {
        log::warn!(
            "certificate {name}: no validation record FQDNs visible at declaration time, validation skipped"
        );
        return DeferredValue::resolved(name.to_string(), false);
    }

    log::warn!(
        "certificate {name}: validating from a declaration-time snapshot of {} records",
        visible.len()
    );
    let validation = stack.create_after(
        arn,
        ResourceKind::CertificateValidation,
        &format!("{name}-validation"),
        move |arn| Ok(validation_args(arn, visible)),
    );
    validation.map(|_| Ok(true))
}

/// Declare a DNS-validated certificate for `args.domain`.
pub fn declare_certificate(stack: &Stack, args: &CertificateArgs) -> Result<CertificateOutput> {
    validate_domain(&args.domain)?;
    let issuers = stack.network().caa_issuers.clone();
    if issuers.is_empty() {
        return Err(Error::InvalidConfig(format!(
            "certificate {}: no CAA issuers configured",
            args.name
        )));
    }

    let zone = stack.lookup(&Lookup::DnsZone {
        flavour: args.flavour,
        name: args.dns_zone.clone(),
        private: args.flavour == DnsFlavour::HostedZone,
    })?;
    let zone_id = zone.require_str("dns_zone", "zone_id")?;
    let name = &args.name;

    let caa = stack.create(
        ResourceKind::DnsRecord(args.flavour),
        &format!("{name}-caa"),
        caa_args(args.flavour, &zone_id, &args.domain, &issuers),
    )?;

    let cert_name = format!("{name}-cert");
    let cert_args = json!({
        "domain_name": args.domain,
        "validation_method": "DNS",
        "tags": stack.tags(&cert_name),
    });
    let certificate: DeferredValue<Attributes> = match args.flavour {
        // The edge provider must publish CAA before the request is made.
        DnsFlavour::Edge => {
            stack.create_after(&caa, ResourceKind::Certificate, &cert_name, move |_| Ok(cert_args))
        }
        DnsFlavour::HostedZone => stack.create(ResourceKind::Certificate, &cert_name, cert_args)?,
    };
    let arn = certificate.map(|attrs| Certificate(attrs).arn());

    let fqdns = {
        let stack = stack.clone();
        let (name, flavour) = (name.clone(), args.flavour);
        certificate.and_then(move |attrs| {
            let options = Certificate(attrs).validation_options()?;
            declare_validation_records(&stack, &name, flavour, &zone_id, options)
        })
    };
    stack.track(fqdns.done());

    let validated = match stack.network().validation_gate {
        ValidationGate::AfterRecords => validate_after_records(stack, name, &arn, &fqdns),
        ValidationGate::EagerSnapshot => validate_eager_snapshot(stack, name, &arn, &fqdns),
    };
    stack.track(validated.done());

    Ok(CertificateOutput {
        arn,
        validation_fqdns: fqdns,
        validated,
        caa_issuers: issuers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::config::NetworkConfig;
    use crate::deferred::Snapshot;

    fn stack(backend: &Arc<MemoryBackend>, gate: ValidationGate) -> Stack {
        let network = NetworkConfig {
            validation_gate: gate,
            ..Default::default()
        };
        Stack::new(backend.clone(), "dev", network)
    }

    fn args(flavour: DnsFlavour) -> CertificateArgs {
        CertificateArgs {
            name: "app".to_string(),
            domain: "app.example.com".to_string(),
            dns_zone: "example.com".to_string(),
            flavour,
        }
    }

    #[test]
    fn test_edge_flavour_records() {
        let backend = Arc::new(MemoryBackend::queued());
        let stack = stack(&backend, ValidationGate::AfterRecords);
        let out = declare_certificate(&stack, &args(DnsFlavour::Edge)).unwrap();
        // Only the CAA record; the certificate waits for it.
        assert_eq!(backend.records().len(), 1);
        backend.settle();

        let caa = &backend.records()[0];
        assert_eq!(caa.handle.name, "app-caa");
        assert_eq!(caa.args["data"]["value"], "amazon.com");
        assert_eq!(caa.args["proxied"], true);
        assert_eq!(caa.args["ttl"], 3600);

        let validation_record = backend
            .records()
            .into_iter()
            .find(|r| r.handle.name == "app-validation-1")
            .unwrap();
        let value = validation_record.args["value"].as_str().unwrap();
        assert!(!value.ends_with('.'));
        assert_eq!(validation_record.args["ttl"], 60);
        assert_eq!(validation_record.args["proxied"], false);

        assert_eq!(out.validated.snapshot(), Snapshot::Resolved(true));
        assert_eq!(out.caa_issuers.len(), 4);
        assert!(stack.finish().wait().is_ok());
    }

    #[test]
    fn test_hosted_zone_caa_lists_every_issuer() {
        let backend = Arc::new(MemoryBackend::immediate());
        let stack = stack(&backend, ValidationGate::AfterRecords);
        declare_certificate(&stack, &args(DnsFlavour::HostedZone)).unwrap();

        let caa = &backend.records()[0];
        assert_eq!(caa.args["ttl"], 86400);
        assert_eq!(
            caa.args["records"],
            json!([
                "0 issue \"amazon.com\"",
                "0 issue \"amazontrust.com\"",
                "0 issue \"awstrust.com\"",
                "0 issue \"amazonaws.com\""
            ])
        );
        let validation_record = backend
            .records()
            .into_iter()
            .find(|r| r.handle.name == "app-validation-1")
            .unwrap();
        assert!(validation_record.args["records"][0]
            .as_str()
            .unwrap()
            .ends_with('.'));
    }

    #[test]
    fn test_validation_waits_for_every_record() {
        let backend = Arc::new(MemoryBackend::queued());
        let stack = stack(&backend, ValidationGate::AfterRecords);
        let out = declare_certificate(&stack, &args(DnsFlavour::HostedZone)).unwrap();

        // CAA, certificate.
        assert_eq!(backend.records().len(), 2);
        assert!(backend.complete_next());
        assert!(backend.complete_next());
        // The certificate's continuation declared its validation record.
        assert_eq!(backend.records_of(ResourceKind::DnsRecord(DnsFlavour::HostedZone)).len(), 2);
        assert!(out.validation_fqdns.is_pending());
        assert!(backend.records_of(ResourceKind::CertificateValidation).is_empty());

        backend.settle();
        let validation = &backend.records_of(ResourceKind::CertificateValidation)[0];
        assert_eq!(
            validation.args["validation_record_fqdns"],
            json!(out.validation_fqdns.wait().unwrap())
        );
        assert_eq!(out.validated.wait(), Ok(true));
    }

    #[test]
    fn test_eager_snapshot_skips_validation_when_queued() {
        let backend = Arc::new(MemoryBackend::queued());
        let stack = stack(&backend, ValidationGate::EagerSnapshot);
        let out = declare_certificate(&stack, &args(DnsFlavour::HostedZone)).unwrap();
        backend.settle();

        assert_eq!(out.validated.snapshot(), Snapshot::Resolved(false));
        assert!(backend.records_of(ResourceKind::CertificateValidation).is_empty());
        // The records themselves were still created.
        assert_eq!(out.validation_fqdns.wait().unwrap().len(), 1);
    }

    #[test]
    fn test_eager_snapshot_validates_when_everything_is_immediate() {
        let backend = Arc::new(MemoryBackend::immediate());
        let stack = stack(&backend, ValidationGate::EagerSnapshot);
        let out = declare_certificate(&stack, &args(DnsFlavour::Edge)).unwrap();
        assert_eq!(out.validated.snapshot(), Snapshot::Resolved(true));
        assert_eq!(backend.records_of(ResourceKind::CertificateValidation).len(), 1);
    }

    #[test]
    fn test_failed_validation_record_fails_validation() {
        let backend = Arc::new(MemoryBackend::queued());
        backend.fail_on("app-validation-1", "zone is locked");
        let stack = stack(&backend, ValidationGate::AfterRecords);
        let out = declare_certificate(&stack, &args(DnsFlavour::HostedZone)).unwrap();
        backend.settle();

        assert!(matches!(out.validated.snapshot(), Snapshot::Failed(_)));
        assert!(backend.records_of(ResourceKind::CertificateValidation).is_empty());
        let err = stack.finish().wait().unwrap_err();
        assert!(matches!(
            err.root_cause(),
            Error::Backend { name, .. } if name == "app-validation-1"
        ));
    }

    #[test]
    fn test_invalid_domain_rejected() {
        let backend = Arc::new(MemoryBackend::immediate());
        let stack = stack(&backend, ValidationGate::AfterRecords);
        let mut bad = args(DnsFlavour::Edge);
        bad.domain = "not a domain".to_string();
        assert!(matches!(
            declare_certificate(&stack, &bad),
            Err(Error::InvalidConfig(_))
        ));
        assert!(backend.records().is_empty());
    }
}
