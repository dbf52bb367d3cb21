//! Load balancer target group.

use super::Stack;
use crate::backend::ResourceKind;
use crate::capability::{arn_of, id_of};
use crate::config::TargetGroupConfig;
use crate::deferred::DeferredValue;
use crate::error::{Error, Result};
use serde_json::json;

pub struct TargetGroupOutput {
    pub arn: DeferredValue<String>,
    pub id: DeferredValue<String>,
}

pub fn declare_target_group(
    stack: &Stack,
    cfg: &TargetGroupConfig,
    vpc_id: &DeferredValue<String>,
) -> Result<TargetGroupOutput> {
    if cfg.port == 0 {
        return Err(Error::InvalidConfig(format!(
            "target group {}: port must be non-zero",
            cfg.name
        )));
    }
    let cfg = cfg.clone();
    let name = cfg.name.clone();
    let group = stack.create_after(vpc_id, ResourceKind::TargetGroup, &name, move |vpc_id| {
        Ok(json!({
            "name": cfg.name,
            "port": cfg.port,
            "protocol": cfg.protocol,
            "target_type": cfg.target_type,
            "vpc_id": vpc_id,
            "protocol_version": cfg.protocol_version,
            "health_check": {
                "path": cfg.health_check_path,
                "protocol": cfg.health_check_protocol,
            },
            "proxy_protocol_v2": false,
        }))
    });
    Ok(TargetGroupOutput {
        arn: arn_of(&group),
        id: id_of(&group),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::config::{NetworkConfig, StackConfig};
    use std::sync::Arc;

    #[test]
    fn test_target_group_defaults_from_config() {
        let cfg = StackConfig::load("src/tests/test_data/stack_dev.json").unwrap();
        let tg = cfg.edge.unwrap().target_group.unwrap();
        let backend = Arc::new(MemoryBackend::immediate());
        let stack = Stack::new(backend.clone(), "dev", NetworkConfig::default());
        let out = declare_target_group(
            &stack,
            &tg,
            &DeferredValue::resolved("vpc", "vpc-1".to_string()),
        )
        .unwrap();

        let record = &backend.records()[0];
        assert_eq!(record.handle.name, "dev-web");
        assert_eq!(record.args["port"], 8080);
        assert_eq!(record.args["protocol"], "HTTP");
        assert_eq!(record.args["target_type"], "ip");
        assert_eq!(record.args["health_check"]["path"], "/healthz");
        assert!(out.arn.wait().unwrap().contains("target_group"));
    }
}
