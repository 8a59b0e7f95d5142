//! Observer registries with per-callback fault isolation.
//!
//! Registration hands back a [`Subscription`] that can remove the observer
//! again. Notification takes a snapshot of the registered observers and calls
//! each one inside `catch_unwind`: a panicking observer is logged and counted,
//! and the remaining observers still run. Observers are stored unordered, so
//! delivery order between observers of the same registry is unspecified.

use dashmap::DashMap;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;
type ObserverMap<T> = DashMap<u64, Observer<T>>;

/// Identifies one registration within its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken {
    pub registry: &'static str,
    pub id: u64,
}

impl fmt::Display for ObserverToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.registry, self.id)
    }
}

/// Handle returned by `register`. Dropping it leaves the observer in place;
/// call [`Subscription::unregister`] to remove it.
pub struct Subscription {
    token: ObserverToken,
    detach: Box<dyn FnOnce() -> bool + Send + Sync>,
}

impl Subscription {
    pub fn token(&self) -> ObserverToken {
        self.token
    }

    /// Remove the observer. Returns `false` if it was already gone or the
    /// registry no longer exists.
    pub fn unregister(self) -> bool {
        (self.detach)()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("token", &self.token).finish()
    }
}

/// Outcome of one notification round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub delivered: usize,
    pub faulted: usize,
}

pub struct ObserverRegistry<T> {
    name: &'static str,
    next_id: AtomicU64,
    observers: Arc<ObserverMap<T>>,
}

impl<T: 'static> ObserverRegistry<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            observers: Arc::new(DashMap::new()),
        }
    }

    pub fn register<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.insert(id, Arc::new(observer));

        let weak: Weak<ObserverMap<T>> = Arc::downgrade(&self.observers);
        Subscription {
            token: ObserverToken {
                registry: self.name,
                id,
            },
            detach: Box::new(move || {
                weak.upgrade()
                    .map(|observers| observers.remove(&id).is_some())
                    .unwrap_or(false)
            }),
        }
    }

    pub fn unregister(&self, token: ObserverToken) -> bool {
        token.registry == self.name && self.observers.remove(&token.id).is_some()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Call every observer with `value`, isolating panics.
    pub fn notify(&self, value: &T) -> NotifyReport {
        // Snapshot first so observers may (un)register without deadlocking
        // on the map shard we would otherwise be holding.
        let snapshot: Vec<(u64, Observer<T>)> = self
            .observers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        let mut report = NotifyReport::default();
        for (id, observer) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| observer(value))) {
                Ok(()) => report.delivered += 1,
                Err(panic) => {
                    report.faulted += 1;
                    tracing::error!(
                        observer = %ObserverToken { registry: self.name, id },
                        panic = %panic_message(&panic),
                        "observer panicked; continuing with remaining observers"
                    );
                }
            }
        }
        report
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
