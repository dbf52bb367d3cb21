//! Forwarding rule on an existing listener.

use super::Stack;
use crate::backend::{Attributes, ResourceKind};
use crate::deferred::{zip, DeferredValue};
use serde_json::{json, Value};

pub struct ListenerRuleArgs {
    pub name: String,
    pub host_headers: Vec<String>,
    /// Defaults to `/` when empty.
    pub path_patterns: Vec<String>,
    pub listener_arn: DeferredValue<String>,
    pub target_group_arn: DeferredValue<String>,
}

fn conditions(host_headers: &[String], path_patterns: &[String]) -> Vec<Value> {
    let mut conditions = Vec::new();
    if !host_headers.is_empty() {
        conditions.push(json!({ "host_header": { "values": host_headers } }));
    }
    conditions.push(json!({ "path_pattern": { "values": path_patterns } }));
    conditions
}

pub fn declare_listener_rule(stack: &Stack, args: ListenerRuleArgs) -> DeferredValue<Attributes> {
    let path_patterns = if args.path_patterns.is_empty() {
        vec!["/".to_string()]
    } else {
        args.path_patterns
    };
    let conditions = conditions(&args.host_headers, &path_patterns);
    let inputs = zip(&args.listener_arn, &args.target_group_arn);
    stack.create_after(
        &inputs,
        ResourceKind::ListenerRule,
        &args.name,
        move |(listener_arn, target_group_arn)| {
            Ok(json!({
                "listener_arn": listener_arn,
                "actions": [{ "type": "forward", "target_group_arn": target_group_arn }],
                "conditions": conditions,
            }))
        },
    )
}
