//! Edge topology declaration.
//!
//! Plans VPC subnets deterministically and declares the network and edge
//! resources (VPC, NAT, security groups, load balancer, certificates, DNS)
//! against a provisioning backend whose creates complete asynchronously.
//!
//! # Modules
//! - [`planner`] - split a base block into per-zone private/public subnets
//! - [`deferred`] - resolve-once values and the combinators composing them
//! - [`backend`] - provisioning backend interface and an in-memory backend
//! - [`capability`] - typed views over backend attributes
//! - [`declare`] - resource declaration, one module per resource family
//! - [`models`] - address blocks, subnet plans and tags
//! - [`output`] - CSV and terminal output
//! - [`config`] - stack configuration and defaults
//! - [`error`] - crate error type

pub mod backend;
pub mod capability;
pub mod config;
pub mod declare;
pub mod deferred;
pub mod error;
pub mod models;
pub mod output;
pub mod planner;

pub use backend::{MemoryBackend, ProvisioningBackend, SharedBackend};
pub use config::StackConfig;
pub use declare::stack::{declare_stack, StackOutput};
pub use declare::Stack;
pub use deferred::{join, new_deferred, zip, DeferredValue, Resolver};
pub use error::{Error, Result};
pub use models::{AddressBlock, SubnetPlan};
pub use planner::plan;
