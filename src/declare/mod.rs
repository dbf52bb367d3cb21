//! Resource declaration against a provisioning backend.
//!
//! Every resource's inputs arrive as deferred values, so creation order
//! follows data dependencies instead of call order:
//! - [`vpc`] - VPC, gateways, planned subnets and routing
//! - [`security_group`] - security group with deferred prefix-list ids
//! - [`prefix_lists`] - managed prefix lists for the edge network ranges
//! - [`certificate`] - CAA records, DNS-validated certificate and validation
//! - [`load_balancer`] - load balancer, HTTPS listener and alias records
//! - [`target_group`], [`listener_rule`], [`record`]
//! - [`stack`] - the whole topology from a [`StackConfig`](crate::config::StackConfig)

pub mod certificate;
pub mod listener_rule;
pub mod load_balancer;
pub mod prefix_lists;
pub mod record;
pub mod security_group;
pub mod stack;
pub mod target_group;
pub mod vpc;

use crate::backend::{Attributes, Lookup, ResourceKind, SharedBackend};
use crate::config::NetworkConfig;
use crate::deferred::{join, DeferredValue};
use crate::error::Result;
use crate::models::{environment_tags, named_tags, Tags};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};

/// Declaration context shared by every declaring function and the
/// continuations they register.
///
/// Cloning is cheap; clones share the backend and the list of tracked
/// completions.
#[derive(Clone)]
pub struct Stack {
    backend: SharedBackend,
    environment: Arc<str>,
    network: Arc<NetworkConfig>,
    completions: Arc<Mutex<Vec<DeferredValue<()>>>>,
}

impl Stack {
    pub fn new(backend: SharedBackend, environment: &str, network: NetworkConfig) -> Stack {
        Stack {
            backend,
            environment: Arc::from(environment),
            network: Arc::new(network),
            completions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// `Name` plus `Environment` tags for a resource called `name`.
    pub fn tags(&self, name: &str) -> Tags {
        named_tags(name, &environment_tags(&self.environment))
    }

    fn completions(&self) -> MutexGuard<'_, Vec<DeferredValue<()>>> {
        self.completions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Include `completion` in what [`finish`](Self::finish) waits for.
    pub fn track(&self, completion: DeferredValue<()>) {
        self.completions().push(completion);
    }

    pub fn tracked_count(&self) -> usize {
        self.completions().len()
    }

    /// Issue a create now and track its completion.
    pub fn create(
        &self,
        kind: ResourceKind,
        name: &str,
        args: Value,
    ) -> Result<DeferredValue<Attributes>> {
        let (handle, attrs) = self.backend.create(kind, name, args)?;
        log::info!("declared {handle}");
        self.track(attrs.done());
        Ok(attrs)
    }

    /// Issue a create once `input` resolves, with arguments built from its value.
    ///
    /// A failed input, a failing `build` or a rejected create all fail the
    /// returned value, which is tracked like any other completion.
    pub fn create_after<T, F>(
        &self,
        input: &DeferredValue<T>,
        kind: ResourceKind,
        name: &str,
        build: F,
    ) -> DeferredValue<Attributes>
    where
        T: Clone + Send + 'static,
        F: FnOnce(T) -> Result<Value> + Send + 'static,
    {
        log::debug!("{kind}/{name} waits for '{}'", input.label());
        let stack = self.clone();
        let name = name.to_string();
        let attrs = input.and_then(move |value| {
            let args = build(value)?;
            stack.create(kind, &name, args)
        });
        self.track(attrs.done());
        attrs
    }

    pub fn lookup(&self, query: &Lookup) -> Result<Attributes> {
        log::debug!("lookup {query:?}");
        self.backend.lookup(query)
    }

    /// Resolves once every tracked completion has, with the number tracked.
    ///
    /// Completions tracked by continuations while waiting are picked up too.
    /// Fails with the first tracked failure.
    pub fn finish(&self) -> DeferredValue<usize> {
        let pending: Vec<DeferredValue<()>> = self.completions().clone();
        let seen = pending.len();
        let stack = self.clone();
        join(format!("stack({seen})"), pending).and_then(move |_| {
            if stack.tracked_count() > seen {
                Ok(stack.finish())
            } else {
                log::info!("stack settled: {seen} completions");
                Ok(DeferredValue::resolved("stack", seen))
            }
        })
    }
}
