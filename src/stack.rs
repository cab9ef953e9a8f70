use std::cell::RefCell;

use crate::ScopedStore;

thread_local! {
    pub static SCOPE_STACK: ScopeStack = const { ScopeStack::new() };
}

/// Stores that are active on the current thread, innermost last.
///
/// Entries only live here for the duration of a synchronous body or a single
/// poll, so the stack is empty whenever the executor is between tasks.
#[derive(Debug)]
pub struct ScopeStack {
    inner: RefCell<Vec<ScopedStore>>,
}

impl ScopeStack {
    pub const fn new() -> Self {
        Self {
            inner: RefCell::new(Vec::new()),
        }
    }

    pub fn push(&self, store: ScopedStore) {
        self.inner.borrow_mut().push(store);
    }

    /// Removes the innermost entry of exactly `store`, wherever it sits.
    pub fn remove(&self, store: &ScopedStore) -> Option<ScopedStore> {
        let mut inner = self.inner.borrow_mut();
        let position = inner.iter().rposition(|entry| entry.ptr_eq(store))?;
        Some(inner.remove(position))
    }

    pub fn depth(&self) -> usize {
        self.inner.borrow().len()
    }

    /// Drops every entry above `depth`.
    pub fn truncate(&self, depth: usize) -> Vec<ScopedStore> {
        let mut inner = self.inner.borrow_mut();
        let depth = depth.min(inner.len());
        inner.split_off(depth)
    }

    pub fn top(&self) -> Option<ScopedStore> {
        self.inner.borrow().last().cloned()
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the innermost active store on this thread.
///
/// Yields `None` rather than panicking when the thread-local has already been
/// torn down.
pub fn current() -> Option<ScopedStore> {
    SCOPE_STACK.try_with(ScopeStack::top).ok().flatten()
}

/// Restores the stack to the depth it had when this was created.
///
/// Whatever was entered in between, including guards that are still alive,
/// is removed on drop.
#[derive(Debug)]
pub struct DepthRestore {
    depth: Option<usize>,
}

impl DepthRestore {
    pub fn capture() -> Self {
        Self {
            depth: SCOPE_STACK.try_with(ScopeStack::depth).ok(),
        }
    }
}

impl Drop for DepthRestore {
    fn drop(&mut self) {
        if let Some(depth) = self.depth {
            // Released stores are dropped after the stack borrow ends.
            let _released = SCOPE_STACK.try_with(|stack| stack.truncate(depth));
        }
    }
}

#[cfg(test)]
impl ScopeStack {
    pub fn len(&self) -> usize {
        self.depth()
    }

    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }
}
