//! Deferred values and their composition.
//!
//! Remote create operations hand back values that are only known later
//! (identifiers, ARNs, DNS validation tokens). This module wraps them:
//! - [`cell`] - [`DeferredValue`] / [`Resolver`] pair and awaiting
//! - [`combinators`] - `map`, `and_then`, `on_resolve`, [`join`], [`zip`]
//!
//! Nothing here spawns threads or retries. Continuations run on whichever
//! thread settles the parent, which in practice is the provisioning
//! backend's completion path.

mod cell;
mod combinators;

pub use cell::{in_continuation, new_deferred, DeferredValue, Resolution, Resolver, Snapshot};
pub use combinators::{join, zip};
