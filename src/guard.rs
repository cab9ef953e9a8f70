//! A current scope guard.

use std::marker::PhantomData;

use crate::{ScopedStore, stack::SCOPE_STACK};

/// A guard representing an active store on the scope stack.
///
/// When the guard is dropped, exactly the store it entered is removed from
/// the stack, so guards may be dropped in any order. This happens on
/// unwinding too, so a panicking body never leaks its scope.
/// This is returned by the [`ScopedStore::enter`] method.
///
/// # Examples
///
/// ```
/// use request_scope::{ScopedStore, scope};
///
/// let store = ScopedStore::new().record("user_id", 123);
///
/// // Enter the store (pushes to stack)
/// let guard = store.enter();
/// assert_eq!(scope::get("user_id").unwrap().to_string(), "123");
///
/// // When `guard` goes out of scope, the store is no longer current
/// drop(guard);
/// assert!(scope::get("user_id").is_none());
/// ```
#[non_exhaustive]
#[derive(Debug)]
pub struct ScopeGuard<'a> {
    store: Option<ScopedStore>,
    // Make this guard unsendable.
    _marker: PhantomData<&'a *mut ()>,
}

impl ScopeGuard<'_> {
    pub(crate) fn enter(store: ScopedStore) -> Self {
        let entered = SCOPE_STACK
            .try_with(|stack| stack.push(store.clone()))
            .is_ok();
        Self {
            store: entered.then_some(store),
            _marker: PhantomData,
        }
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if let Some(store) = self.store.take() {
            let _removed = SCOPE_STACK.try_with(|stack| stack.remove(&store));
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::stack::ScopeStack;

    fn top_value(key: &str) -> String {
        SCOPE_STACK.with(|stack| stack.top().unwrap().get(key).unwrap().to_string())
    }

    #[test]
    fn test_scope_guard_enter() {
        let store = ScopedStore::new().record("simple", 42);
        // Make sure the scope stack is empty before entering the store.
        assert_eq!(SCOPE_STACK.with(ScopeStack::is_empty), true);

        let guard = store.enter();
        // Check that the record was added to the top store.
        assert_eq!(SCOPE_STACK.with(|stack| stack.top().unwrap().len()), 1);

        // Check that the scope stack is empty after dropping the guard.
        drop(guard);
        assert_eq!(SCOPE_STACK.with(ScopeStack::len), 0);
    }

    #[test]
    fn test_scope_nested_guards() {
        let outer = ScopedStore::new().record("simple_record", "outer_value");
        assert_eq!(SCOPE_STACK.with(ScopeStack::len), 0);

        let outer_guard = outer.enter();
        assert_eq!(top_value("simple_record"), "outer_value");

        let inner = ScopedStore::new().record("simple_record", "inner_value");
        {
            let inner_guard = inner.enter();
            // Test the scope stack after the inner guard is entered.
            assert_eq!(SCOPE_STACK.with(ScopeStack::len), 2);
            assert_eq!(top_value("simple_record"), "inner_value");

            drop(inner_guard);
        }
        // Test the scope stack after the inner guard is dropped.
        assert_eq!(SCOPE_STACK.with(ScopeStack::len), 1);
        assert_eq!(top_value("simple_record"), "outer_value");

        drop(outer_guard);
        assert_eq!(SCOPE_STACK.with(ScopeStack::is_empty), true);
    }

    #[test]
    fn test_scope_guards_dropped_out_of_order() {
        let first = ScopedStore::new().record("who", "first").enter();
        let second = ScopedStore::new().record("who", "second").enter();

        drop(first);
        // The live guard keeps its own store current.
        assert_eq!(SCOPE_STACK.with(ScopeStack::len), 1);
        assert_eq!(top_value("who"), "second");

        drop(second);
        assert_eq!(SCOPE_STACK.with(ScopeStack::is_empty), true);
    }

    #[test]
    fn test_scope_guard_pops_on_panic() {
        let result = std::panic::catch_unwind(|| {
            let _guard = ScopedStore::new().record("doomed", true).enter();
            panic!("handler failed");
        });

        assert!(result.is_err());
        assert_eq!(SCOPE_STACK.with(ScopeStack::is_empty), true);
    }

    #[test]
    fn test_scope_multithread() {
        let local_guard = ScopedStore::new()
            .record("simple_record", "main")
            .enter();

        let first_thread_handle = std::thread::spawn(|| {
            let inner_guard = ScopedStore::new()
                .record("simple_record", "first_thread")
                .enter();

            assert_eq!(SCOPE_STACK.with(ScopeStack::len), 1);
            assert_eq!(top_value("simple_record"), "first_thread");

            drop(inner_guard);
        });
        let second_thread_handle = std::thread::spawn(|| {
            // Scopes are not inherited by plain threads.
            assert_eq!(SCOPE_STACK.with(ScopeStack::len), 0);

            let inner_guard = ScopedStore::new()
                .record("simple_record", "second_thread")
                .enter();
            assert_eq!(top_value("simple_record"), "second_thread");

            drop(inner_guard);
        });

        first_thread_handle.join().unwrap();
        second_thread_handle.join().unwrap();

        assert_eq!(top_value("simple_record"), "main");
        drop(local_guard);
    }
}
