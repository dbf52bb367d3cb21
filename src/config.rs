//! Stack configuration and crate-wide defaults.
//!
//! The stack file is JSON; `EDGE_STACK_CONFIG` selects it and
//! `EDGE_ENVIRONMENT` overrides its `environment` field. Call
//! `dotenv::dotenv()` first if a `.env` file should be honoured.

use crate::error::{Error, Result};
use crate::models::AddressBlock;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix bits added to the VPC block for each subnet (/16 -> /24).
pub const DEFAULT_NEW_PREFIX_BITS: u8 = 8;
/// Issuers allowed to sign certificates for our domains, in CAA order.
pub const DEFAULT_CAA_ISSUERS: [&str; 4] = [
    "amazon.com",
    "amazontrust.com",
    "awstrust.com",
    "amazonaws.com",
];
/// Capacity of each managed prefix list.
pub const PREFIX_LIST_MAX_ENTRIES: usize = 20;
pub const VALIDATION_RECORD_TTL: u32 = 60;
pub const EDGE_CAA_TTL: u32 = 3600;
pub const HOSTED_ZONE_CAA_TTL: u32 = 86400;
pub const ALIAS_RECORD_TTL: u32 = 60;
/// TTL the edge DNS provider requires for proxied records ("automatic").
pub const PROXIED_TTL: u32 = 1;

/// How long the binary waits for every declared resource to settle.
pub const SETTLE_TIMEOUT_SECS: u64 = 30;

pub const STACK_CONFIG_ENV: &str = "EDGE_STACK_CONFIG";
pub const ENVIRONMENT_ENV: &str = "EDGE_ENVIRONMENT";
pub const DEFAULT_STACK_CONFIG: &str = "stack.json";

/// When the certificate validation resource is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationGate {
    /// Join every validation record's FQDN first, then declare validation.
    #[default]
    AfterRecords,
    /// Inspect the collected FQDNs at declaration time and skip validation
    /// when none are visible yet. Usually skips; kept to reproduce the
    /// behaviour of older stacks.
    EagerSnapshot,
}

/// Network-wide options for declaration code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub new_prefix_bits: u8,
    /// Declare one NAT gateway for all private subnets.
    pub enable_nat_gateway: bool,
    pub caa_issuers: Vec<String>,
    pub validation_gate: ValidationGate,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            new_prefix_bits: DEFAULT_NEW_PREFIX_BITS,
            enable_nat_gateway: true,
            caa_issuers: DEFAULT_CAA_ISSUERS.iter().map(|s| s.to_string()).collect(),
            validation_gate: ValidationGate::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcConfig {
    pub name: String,
    pub cidr: AddressBlock,
    pub azs: Vec<String>,
}

/// Which DNS service publishes CAA and validation records.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DnsFlavour {
    /// Proxying edge DNS: one CAA record, validation values without trailing dot.
    #[default]
    Edge,
    /// Cloud hosted zone: CAA record listing every issuer.
    HostedZone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroupConfig {
    pub name: String,
    pub port: u16,
    #[serde(default = "default_http")]
    pub protocol: String,
    #[serde(default = "default_target_type")]
    pub target_type: String,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    #[serde(default = "default_health_path")]
    pub health_check_path: String,
    #[serde(default = "default_http")]
    pub health_check_protocol: String,
}

fn default_http() -> String {
    "HTTP".to_string()
}

fn default_target_type() -> String {
    "ip".to_string()
}

fn default_protocol_version() -> String {
    "HTTP1".to_string()
}

fn default_health_path() -> String {
    "/".to_string()
}

/// Load balancer, certificates and DNS for the public edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub name: String,
    pub domain: String,
    /// Zone in the edge DNS provider holding CAA/validation records.
    pub dns_zone: String,
    /// Hosted zone receiving the alias records for the load balancer.
    pub hosted_zone: String,
    #[serde(default)]
    pub dns: DnsFlavour,
    #[serde(default)]
    pub extra_domains: Vec<String>,
    #[serde(default)]
    pub proxied: bool,
    #[serde(default)]
    pub target_group: Option<TargetGroupConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    pub environment: String,
    pub vpc: VpcConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub edge: Option<EdgeConfig>,
}

impl StackConfig {
    /// Parse a stack config from JSON, reporting the failing path on error.
    pub fn from_json(json: &str) -> Result<StackConfig> {
        let mut de = serde_json::Deserializer::from_str(json);
        let cfg: StackConfig = serde_path_to_error::deserialize(&mut de)
            .map_err(|e| Error::InvalidConfig(format!("path={} error={}", e.path(), e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and parse the stack config at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<StackConfig> {
        let path = path.as_ref();
        log::info!("Reading stack config: {}", path.display());
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        StackConfig::from_json(&json)
    }

    /// Load from `$EDGE_STACK_CONFIG` (default `stack.json`) and apply
    /// the `$EDGE_ENVIRONMENT` override.
    pub fn from_env() -> Result<StackConfig> {
        let path =
            std::env::var(STACK_CONFIG_ENV).unwrap_or_else(|_| DEFAULT_STACK_CONFIG.to_string());
        let mut cfg = StackConfig::load(&path)?;
        if let Ok(environment) = std::env::var(ENVIRONMENT_ENV) {
            log::info!("Environment overridden by {ENVIRONMENT_ENV}: {environment}");
            cfg.environment = environment;
        }
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.vpc.azs.is_empty() {
            return Err(Error::InvalidConfig("vpc.azs must list at least one zone".into()));
        }
        if self.vpc.name.trim().is_empty() {
            return Err(Error::InvalidConfig("vpc.name must not be empty".into()));
        }
        if self.network.caa_issuers.is_empty() {
            return Err(Error::InvalidConfig(
                "network.caa_issuers must list at least one issuer".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_stack_config() {
        let cfg = StackConfig::load("src/tests/test_data/stack_dev.json")
            .expect("Error reading stack config");
        assert_eq!(cfg.environment, "dev");
        assert_eq!(cfg.vpc.cidr.to_string(), "10.0.0.0/16");
        assert_eq!(cfg.vpc.azs.len(), 3);
        assert_eq!(cfg.network, NetworkConfig::default());
        let edge = cfg.edge.expect("edge block expected");
        assert_eq!(edge.dns, DnsFlavour::Edge);
        assert_eq!(edge.extra_domains, vec!["api.example.com"]);
    }

    #[test]
    fn test_network_defaults_are_partial() {
        let json = r#"{
            "environment": "dev",
            "vpc": {"name": "dev", "cidr": "10.1.0.0/16", "azs": ["a"]},
            "network": {"enable_nat_gateway": false, "validation_gate": "eager_snapshot"}
        }"#;
        let cfg = StackConfig::from_json(json).unwrap();
        assert!(!cfg.network.enable_nat_gateway);
        assert_eq!(cfg.network.new_prefix_bits, DEFAULT_NEW_PREFIX_BITS);
        assert_eq!(cfg.network.caa_issuers.len(), 4);
        assert_eq!(cfg.network.validation_gate, ValidationGate::EagerSnapshot);
        assert!(cfg.edge.is_none());
    }

    #[test]
    fn test_bad_cidr_reports_path() {
        let json = r#"{
            "environment": "dev",
            "vpc": {"name": "dev", "cidr": "10.1.0.0/33", "azs": ["a"]}
        }"#;
        let err = StackConfig::from_json(json).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(ref m) if m.contains("vpc.cidr")));
    }

    #[test]
    fn test_empty_azs_rejected() {
        let json = r#"{
            "environment": "dev",
            "vpc": {"name": "dev", "cidr": "10.1.0.0/16", "azs": []}
        }"#;
        assert!(StackConfig::from_json(json).is_err());
        assert!(StackConfig::load("src/tests/test_data/missing.json").is_err());
    }
}
