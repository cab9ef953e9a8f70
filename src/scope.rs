//! The ambient request scope.
//!
//! A [`ScopedStore`] is the attribute container of one logical request. While a
//! store is *entered* it is the ambient scope: the free functions in this
//! module ([`set`], [`get`], [`get_all`]) read and write it without it being
//! passed around explicitly.
//!
//! Entering happens in two ways:
//!
//! - synchronously, through [`ScopedStore::enter`] / [`ScopedStore::run`] /
//!   [`enter_new_scope`];
//! - asynchronously, by wrapping a future with
//!   [`FutureExt::in_scope`](crate::FutureExt::in_scope) or
//!   [`run_in_new_scope`]. The store is re-entered on every poll, so everything
//!   awaited inside the future observes it, whatever else the executor ran in
//!   between.
//!
//! Work that leaves the future (spawned tasks, callbacks handed to other
//! threads) carries the scope along through [`spawn`](crate::spawn),
//! [`FutureExt::in_current_scope`](crate::FutureExt::in_current_scope) or
//! [`bind`].
//!
//! Every function here is safe to call with no active scope: writes are
//! dropped and reads come back empty.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{
    Attributes, ContextValue, FutureExt, StaticCowStr, future::ScopedFuture, guard::ScopeGuard,
    stack,
};

/// The attribute store of a single request scope.
///
/// Cloning a store yields another handle to the *same* attributes; this is
/// how continuations spawned from a scope share it. The attributes are freed
/// once the last handle is dropped.
#[derive(Clone, Default)]
pub struct ScopedStore(Arc<Mutex<Attributes>>);

impl ScopedStore {
    /// Creates a fresh, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the ambient store, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        stack::current()
    }

    /// Adds an attribute while building the store.
    #[must_use]
    pub fn record(self, key: impl Into<StaticCowStr>, value: impl Into<ContextValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Inserts or overwrites an attribute.
    pub fn set(&self, key: impl Into<StaticCowStr>, value: impl Into<ContextValue>) {
        self.lock().insert(key, value);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<ContextValue> {
        self.lock().get(key).cloned()
    }

    /// Takes a point-in-time copy of every attribute in the store.
    #[must_use]
    pub fn snapshot(&self) -> Attributes {
        self.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns `true` if both handles refer to the same store.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Makes this store the ambient scope until the returned guard is dropped.
    ///
    /// Do not hold the guard across an `.await`. The enclosing scoped future
    /// resets the scope when it suspends, so the store is gone after the
    /// await point; use [`FutureExt::in_scope`](crate::FutureExt::in_scope)
    /// for async code instead.
    #[must_use]
    pub fn enter<'a>(self) -> ScopeGuard<'a> {
        ScopeGuard::enter(self)
    }

    /// Runs `body` with this store as the ambient scope.
    ///
    /// The previous scope is restored afterwards, including when `body`
    /// panics.
    pub fn run<T>(self, body: impl FnOnce() -> T) -> T {
        let _guard = self.enter();
        body()
    }

    fn lock(&self) -> MutexGuard<'_, Attributes> {
        // A panic while holding the lock cannot leave the map half-written.
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ScopedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ScopedStore").field(&*self.lock()).finish()
    }
}

/// Runs `future` inside a fresh, empty scope.
///
/// The new store is ambient for every poll of `future` and for every
/// continuation spawned from it through the scope-aware helpers. Output,
/// errors and panics of `future` pass through unchanged.
pub fn run_in_new_scope<F>(future: F) -> ScopedFuture<F>
where
    F: Future,
{
    future.in_new_scope()
}

/// Synchronous counterpart of [`run_in_new_scope`].
pub fn enter_new_scope<T>(body: impl FnOnce() -> T) -> T {
    ScopedStore::new().run(body)
}

/// Sets an attribute in the ambient scope.
///
/// Does nothing outside a scope.
pub fn set(key: impl Into<StaticCowStr>, value: impl Into<ContextValue>) {
    if let Some(store) = stack::current() {
        store.set(key, value);
    }
}

/// Reads an attribute from the ambient scope.
#[must_use]
pub fn get(key: &str) -> Option<ContextValue> {
    stack::current().and_then(|store| store.get(key))
}

/// Returns a snapshot of the ambient scope, or empty attributes outside one.
#[must_use]
pub fn get_all() -> Attributes {
    stack::current()
        .map(|store| store.snapshot())
        .unwrap_or_default()
}

/// Returns a handle to the ambient store, if any.
#[must_use]
pub fn current() -> Option<ScopedStore> {
    stack::current()
}

/// Captures the ambient scope and returns a closure that runs `f` inside it.
///
/// Useful for callbacks handed to threads or blocking pools, which do not
/// inherit the scope on their own. Outside a scope `f` simply runs as is.
///
/// ```
/// use request_scope::{ScopedStore, scope};
///
/// let _guard = ScopedStore::new().record("requestId", "r-1").enter();
/// let callback = scope::bind(|| scope::get("requestId").map(|v| v.to_string()));
///
/// let seen = std::thread::spawn(callback).join().unwrap();
/// assert_eq!(seen.as_deref(), Some("r-1"));
/// ```
pub fn bind<F, T>(f: F) -> impl FnOnce() -> T + Send
where
    F: FnOnce() -> T + Send,
{
    let store = stack::current();
    move || match store {
        Some(store) => store.run(f),
        None => f(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_no_scope_is_safe() {
        set("ignored", 1);
        assert!(get("ignored").is_none());
        assert!(get_all().is_empty());
        assert!(current().is_none());
    }

    #[test]
    fn test_set_get_in_scope() {
        let attributes = enter_new_scope(|| {
            set("requestId", "abc");
            set("requestId", "abc-123");
            set("attempt", 2);
            assert_eq!(get("requestId").unwrap().to_string(), "abc-123");
            get_all()
        });

        assert_eq!(attributes.to_json(), json!({ "attempt": 2, "requestId": "abc-123" }));
        assert!(current().is_none());
    }

    #[test]
    fn test_nested_scope_is_fresh() {
        enter_new_scope(|| {
            set("layer", "outer");
            enter_new_scope(|| {
                assert!(get("layer").is_none());
                set("layer", "inner");
            });
            assert_eq!(get("layer").unwrap().to_string(), "outer");
        });
    }

    #[test]
    fn test_snapshot_is_detached() {
        let store = ScopedStore::new().record("k", "v1");
        let snapshot = store.snapshot();
        store.set("k", "v2");

        assert_eq!(snapshot.get("k").unwrap().to_string(), "v1");
        assert_eq!(store.get("k").unwrap().to_string(), "v2");
    }

    #[test]
    fn test_clone_shares_store() {
        let store = ScopedStore::new();
        let handle = store.clone();
        handle.clone().run(|| set("written", "through handle"));

        assert!(store.ptr_eq(&handle));
        assert_eq!(store.get("written").unwrap().to_string(), "through handle");
        assert!(!store.ptr_eq(&ScopedStore::new()));
    }

    #[test]
    fn test_bind_without_scope() {
        let callback = bind(|| get_all().len());
        assert_eq!(callback(), 0);
    }
}
