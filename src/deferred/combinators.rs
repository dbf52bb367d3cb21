//! Combinators deriving new deferred values from existing ones.
//!
//! Derived cells are driven only by their parents' terminal transitions. A
//! failed parent fails the derived cell with [`Error::DependencyFailed`];
//! pending parents are never cancelled, because the remote operations behind
//! them cannot be aborted from here.

use super::cell::{new_deferred, DeferredValue, Resolver};
use crate::error::{Error, Result};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<S>(state: &Mutex<S>) -> MutexGuard<'_, S> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Settle a resolver created by a combinator. Such a resolver is reachable
/// from exactly one place, so a second settle cannot happen.
fn settle<T: Clone + Send + 'static>(resolver: &Resolver<T>, outcome: Result<T>) {
    if let Err(e) = resolver.complete(outcome) {
        log::error!("{e}");
    }
}

impl<T: Clone + Send + 'static> DeferredValue<T> {
    /// Transform the resolved value with `f`, which runs at most once.
    ///
    /// Fails when `self` fails (wrapped as a dependency failure) or when `f`
    /// returns an error (passed through unchanged).
    pub fn map<U, F>(&self, f: F) -> DeferredValue<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        let (derived, resolver) = new_deferred(format!("map({})", self.label()));
        self.subscribe(move |outcome| {
            let result = match outcome {
                Ok(value) => f(value),
                Err(e) => Err(e.dependency_of(resolver.label())),
            };
            settle(&resolver, result);
        });
        derived
    }

    /// Like [`map`](Self::map), but `f` itself returns a deferred value,
    /// typically the attributes of a resource it just asked the backend to
    /// create. The result settles when that inner value settles.
    pub fn and_then<U, F>(&self, f: F) -> DeferredValue<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<DeferredValue<U>> + Send + 'static,
    {
        let (derived, resolver) = new_deferred(format!("and_then({})", self.label()));
        self.subscribe(move |outcome| match outcome.and_then(|value| Ok(f(value))) {
            Ok(Ok(inner)) => inner.subscribe(move |inner_outcome| {
                let result = inner_outcome.map_err(|e| e.dependency_of(resolver.label()));
                settle(&resolver, result);
            }),
            Ok(Err(e)) => settle(&resolver, Err(e)),
            Err(e) => {
                let e = e.dependency_of(resolver.label());
                settle(&resolver, Err(e));
            }
        });
        derived
    }

    /// Run `cont` once `self` resolves.
    ///
    /// The returned unit value is how the outcome is observed: it fails if
    /// `self` fails (without calling `cont`) or if `cont` returns an error.
    pub fn on_resolve<F>(&self, cont: F) -> DeferredValue<()>
    where
        F: FnOnce(T) -> Result<()> + Send + 'static,
    {
        self.map(cont)
    }

    /// Discard the value, keeping only completion.
    pub fn done(&self) -> DeferredValue<()> {
        self.map(|_| Ok(()))
    }
}

struct JoinState<T> {
    slots: Vec<Option<T>>,
    remaining: usize,
    resolver: Option<Resolver<Vec<T>>>,
}

/// Resolve to every input's value, in input order, once all inputs resolve.
///
/// Fails as soon as the first input fails; inputs still pending at that
/// point are left alone. An empty input resolves immediately to `[]`.
pub fn join<T>(label: impl Into<String>, inputs: Vec<DeferredValue<T>>) -> DeferredValue<Vec<T>>
where
    T: Clone + Send + 'static,
{
    let (joined, resolver) = new_deferred(label);
    if inputs.is_empty() {
        settle(&resolver, Ok(Vec::new()));
        return joined;
    }

    let state = Arc::new(Mutex::new(JoinState {
        slots: vec![None; inputs.len()],
        remaining: inputs.len(),
        resolver: Some(resolver),
    }));

    for (index, input) in inputs.iter().enumerate() {
        let state = Arc::clone(&state);
        input.subscribe(move |outcome| {
            let finished = {
                let mut st = lock(&state);
                if st.resolver.is_none() {
                    return;
                }
                match outcome {
                    Ok(value) => {
                        st.slots[index] = Some(value);
                        st.remaining -= 1;
                        if st.remaining == 0 {
                            let values: Vec<T> =
                                st.slots.iter_mut().filter_map(Option::take).collect();
                            st.resolver.take().map(|r| (r, Ok(values)))
                        } else {
                            None
                        }
                    }
                    Err(e) => st.resolver.take().map(|r| {
                        let e = e.dependency_of(r.label());
                        (r, Err(e))
                    }),
                }
            };
            if let Some((resolver, outcome)) = finished {
                settle(&resolver, outcome);
            }
        });
    }
    joined
}

struct ZipState<A, B> {
    a: Option<A>,
    b: Option<B>,
    resolver: Option<Resolver<(A, B)>>,
}

impl<A, B> ZipState<A, B> {
    /// Take the resolver and both values once both halves are in.
    fn take_ready(&mut self) -> Option<(Resolver<(A, B)>, Result<(A, B)>)> {
        if self.a.is_some() && self.b.is_some() {
            let pair = self.a.take().zip(self.b.take())?;
            self.resolver.take().map(|r| (r, Ok(pair)))
        } else {
            None
        }
    }

    fn take_failed(&mut self, e: Error) -> Option<(Resolver<(A, B)>, Result<(A, B)>)>
    where
        A: Clone + Send + 'static,
        B: Clone + Send + 'static,
    {
        self.resolver.take().map(|r| {
            let e = e.dependency_of(r.label());
            (r, Err(e))
        })
    }
}

/// Pair two deferred values of different types; fail-fast like [`join`].
pub fn zip<A, B>(a: &DeferredValue<A>, b: &DeferredValue<B>) -> DeferredValue<(A, B)>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
{
    let (zipped, resolver) = new_deferred(format!("zip({}, {})", a.label(), b.label()));
    let state = Arc::new(Mutex::new(ZipState {
        a: None,
        b: None,
        resolver: Some(resolver),
    }));

    let left = Arc::clone(&state);
    a.subscribe(move |outcome| {
        let finished = {
            let mut st = lock(&left);
            if st.resolver.is_none() {
                return;
            }
            match outcome {
                Ok(value) => {
                    st.a = Some(value);
                    st.take_ready()
                }
                Err(e) => st.take_failed(e),
            }
        };
        if let Some((resolver, outcome)) = finished {
            settle(&resolver, outcome);
        }
    });

    let right = state;
    b.subscribe(move |outcome| {
        let finished = {
            let mut st = lock(&right);
            if st.resolver.is_none() {
                return;
            }
            match outcome {
                Ok(value) => {
                    st.b = Some(value);
                    st.take_ready()
                }
                Err(e) => st.take_failed(e),
            }
        };
        if let Some((resolver, outcome)) = finished {
            settle(&resolver, outcome);
        }
    });

    zipped
}
