//! Resolve-once cells holding values produced by remote operations.
//!
//! A [`DeferredValue`] moves from pending to exactly one terminal outcome.
//! Continuations registered while it is pending run on whichever thread
//! settles the [`Resolver`]; continuations registered afterwards run
//! immediately on the registering thread. No continuation ever runs while the
//! cell's lock is held, so continuations may freely register further
//! continuations or settle other cells.

use crate::error::{Error, Result};
use std::cell::Cell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

type Callback<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

enum State<T> {
    Pending {
        callbacks: Vec<Callback<T>>,
        /// One slot per live [`Resolution`]; freed slots are `None`.
        wakers: Vec<Option<Waker>>,
    },
    Done(Result<T>),
}

struct Shared<T> {
    label: String,
    state: Mutex<State<T>>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // A panicking continuation never runs under this lock, so the state is consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

thread_local! {
    static CONTINUATION_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as running a continuation until dropped.
struct ContinuationScope;

impl ContinuationScope {
    fn enter() -> ContinuationScope {
        CONTINUATION_DEPTH.with(|depth| depth.set(depth.get() + 1));
        ContinuationScope
    }
}

impl Drop for ContinuationScope {
    fn drop(&mut self) {
        CONTINUATION_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// True while the current thread is executing a continuation.
pub fn in_continuation() -> bool {
    CONTINUATION_DEPTH.with(|depth| depth.get() > 0)
}

fn run_callback<T>(label: &str, callback: Callback<T>, outcome: Result<T>) {
    log::trace!("running continuation on '{label}'");
    let _scope = ContinuationScope::enter();
    callback(outcome);
}

/// Non-blocking view of a cell's state.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot<T> {
    Pending,
    Resolved(T),
    Failed(Error),
}

/// A value that becomes known once a remote operation completes.
///
/// Cloning is cheap and every clone observes the same cell.
pub struct DeferredValue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for DeferredValue<T> {
    fn clone(&self) -> Self {
        DeferredValue {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// The single capability allowed to settle a [`DeferredValue`].
pub struct Resolver<T> {
    shared: Arc<Shared<T>>,
}

/// Create a pending cell labelled `label` and the resolver that settles it.
pub fn new_deferred<T>(label: impl Into<String>) -> (DeferredValue<T>, Resolver<T>) {
    let shared = Arc::new(Shared {
        label: label.into(),
        state: Mutex::new(State::Pending {
            callbacks: Vec::new(),
            wakers: Vec::new(),
        }),
    });
    (
        DeferredValue {
            shared: Arc::clone(&shared),
        },
        Resolver { shared },
    )
}

impl<T: Clone + Send + 'static> DeferredValue<T> {
    /// A cell that is already resolved to `value`.
    pub fn resolved(label: impl Into<String>, value: T) -> DeferredValue<T> {
        let (cell, resolver) = new_deferred(label);
        let _ = resolver.resolve(value);
        cell
    }

    /// A cell that has already failed with `error`.
    pub fn failed(label: impl Into<String>, error: Error) -> DeferredValue<T> {
        let (cell, resolver) = new_deferred(label);
        let _ = resolver.fail(error);
        cell
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Current state without blocking.
    ///
    /// A snapshot taken right after attaching a continuation reflects the
    /// moment of the call only; code that needs the resolved value must read
    /// it inside a continuation or through [`join`](super::join).
    pub fn snapshot(&self) -> Snapshot<T> {
        match &*self.shared.lock() {
            State::Pending { .. } => Snapshot::Pending,
            State::Done(Ok(value)) => Snapshot::Resolved(value.clone()),
            State::Done(Err(e)) => Snapshot::Failed(e.clone()),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(&*self.shared.lock(), State::Pending { .. })
    }

    #[cfg(test)]
    fn waiting_tasks(&self) -> usize {
        match &*self.shared.lock() {
            State::Pending { wakers, .. } => wakers.iter().flatten().count(),
            State::Done(_) => 0,
        }
    }

    /// Register `callback` for the terminal outcome.
    ///
    /// Runs immediately on this thread when the cell is already settled.
    pub(crate) fn subscribe<F>(&self, callback: F)
    where
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let outcome = {
            let mut state = self.shared.lock();
            match &mut *state {
                State::Pending { callbacks, .. } => {
                    callbacks.push(Box::new(callback));
                    return;
                }
                State::Done(outcome) => outcome.clone(),
            }
        };
        run_callback(&self.shared.label, Box::new(callback), outcome);
    }

    /// Future completing with the cell's outcome.
    pub fn value(&self) -> Resolution<T> {
        Resolution {
            shared: Arc::clone(&self.shared),
            slot: None,
        }
    }

    /// Block the current thread until the cell settles.
    ///
    /// Only for the outermost orchestration boundary: inside a continuation
    /// this returns [`Error::AwaitInsideContinuation`] instead of blocking
    /// the thread that would have to settle the cell.
    pub fn wait(&self) -> Result<T> {
        if in_continuation() {
            log::error!("wait() on '{}' from inside a continuation", self.label());
            return Err(Error::AwaitInsideContinuation {
                label: self.label().to_string(),
            });
        }
        futures::executor::block_on(self.value())
    }

    /// Await the outcome for at most `after`.
    ///
    /// Expiry yields [`Error::Timeout`]; the cell itself stays pending.
    pub async fn value_within(&self, after: Duration) -> Result<T> {
        match tokio::time::timeout(after, self.value()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                log::warn!("gave up on '{}' after {after:?}", self.label());
                Err(Error::Timeout {
                    label: self.label().to_string(),
                    after,
                })
            }
        }
    }
}

impl<T> fmt::Debug for DeferredValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.shared.lock() {
            State::Pending { callbacks, .. } => {
                format!("pending({} continuations)", callbacks.len())
            }
            State::Done(Ok(_)) => "resolved".to_string(),
            State::Done(Err(e)) => format!("failed({e})"),
        };
        write!(f, "DeferredValue({}: {state})", self.shared.label)
    }
}

impl<T: Clone + Send + 'static> Resolver<T> {
    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn resolve(&self, value: T) -> Result<()> {
        self.complete(Ok(value))
    }

    pub fn fail(&self, error: Error) -> Result<()> {
        self.complete(Err(error))
    }

    /// Settle the cell with `outcome` and run every registered continuation.
    ///
    /// A second call leaves the first outcome in place and returns
    /// [`Error::DoubleResolve`]; it always indicates a caller bug.
    pub fn complete(&self, outcome: Result<T>) -> Result<()> {
        let previous = {
            let mut state = self.shared.lock();
            if matches!(&*state, State::Done(_)) {
                drop(state);
                log::error!("resolver for '{}' invoked twice", self.label());
                return Err(Error::DoubleResolve {
                    label: self.label().to_string(),
                });
            }
            std::mem::replace(&mut *state, State::Done(outcome.clone()))
        };

        match &outcome {
            Ok(_) => log::debug!("'{}' resolved", self.label()),
            Err(e) => log::debug!("'{}' failed: {e}", self.label()),
        }

        if let State::Pending { callbacks, wakers } = previous {
            for waker in wakers.into_iter().flatten() {
                waker.wake();
            }
            for callback in callbacks {
                run_callback(&self.shared.label, callback, outcome.clone());
            }
        }
        Ok(())
    }

    pub fn is_settled(&self) -> bool {
        matches!(&*self.shared.lock(), State::Done(_))
    }
}

impl<T> Drop for Resolver<T> {
    fn drop(&mut self) {
        if matches!(&*self.shared.lock(), State::Pending { .. }) {
            log::warn!(
                "resolver for '{}' dropped unresolved; observers stay pending",
                self.shared.label
            );
        }
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resolver({})", self.shared.label)
    }
}

/// Future returned by [`DeferredValue::value`].
///
/// Holds at most one waker slot in the cell, released on drop so abandoned
/// waits (for example after a timeout) do not pin their task.
pub struct Resolution<T> {
    shared: Arc<Shared<T>>,
    slot: Option<usize>,
}

impl<T: Clone> Future for Resolution<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.shared.lock();
        match &mut *state {
            State::Done(outcome) => Poll::Ready(outcome.clone()),
            State::Pending { wakers, .. } => {
                match this.slot {
                    Some(i) => match &mut wakers[i] {
                        Some(w) if w.will_wake(cx.waker()) => {}
                        entry => *entry = Some(cx.waker().clone()),
                    },
                    None => {
                        let waker = Some(cx.waker().clone());
                        let i = match wakers.iter().position(Option::is_none) {
                            Some(free) => {
                                wakers[free] = waker;
                                free
                            }
                            None => {
                                wakers.push(waker);
                                wakers.len() - 1
                            }
                        };
                        this.slot = Some(i);
                    }
                }
                Poll::Pending
            }
        }
    }
}

impl<T> Drop for Resolution<T> {
    fn drop(&mut self) {
        let Some(i) = self.slot.take() else {
            return;
        };
        if let State::Pending { wakers, .. } = &mut *self.shared.lock() {
            if let Some(entry) = wakers.get_mut(i) {
                *entry = None;
            }
            while matches!(wakers.last(), Some(None)) {
                wakers.pop();
            }
        }
    }
}
