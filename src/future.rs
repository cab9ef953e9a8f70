//! Scope propagation for futures.

use std::{pin::Pin, task::Poll};

use pin_project::pin_project;

use crate::{ScopedStore, stack};

pub trait FutureExt: Future + Sized {
    /// Runs this future with `store` as the ambient scope.
    fn in_scope(self, store: ScopedStore) -> ScopedFuture<Self>;

    /// Runs this future inside a fresh, empty scope.
    fn in_new_scope(self) -> ScopedFuture<Self> {
        self.in_scope(ScopedStore::new())
    }

    /// Captures the scope that is ambient *now* and runs this future in it.
    ///
    /// This is what makes a future safe to hand to an executor or another
    /// task: it no longer depends on who polls it. With no ambient scope the
    /// future is left unscoped.
    fn in_current_scope(self) -> ScopedFuture<Self>;
}

impl<F> FutureExt for F
where
    F: Future,
{
    fn in_scope(self, store: ScopedStore) -> ScopedFuture<Self> {
        ScopedFuture {
            inner: self,
            store: Some(store),
        }
    }

    fn in_current_scope(self) -> ScopedFuture<Self> {
        ScopedFuture {
            inner: self,
            store: stack::current(),
        }
    }
}

/// A future that re-enters its store on every poll.
#[pin_project]
#[derive(Debug)]
pub struct ScopedFuture<F> {
    #[pin]
    inner: F,
    store: Option<ScopedStore>,
}

impl<F> ScopedFuture<F> {
    /// Returns the store this future runs in.
    pub const fn store(&self) -> Option<&ScopedStore> {
        self.store.as_ref()
    }
}

impl<F> Future for ScopedFuture<F>
where
    F: Future,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        // Nothing entered during this poll may outlive it.
        let _restore = stack::DepthRestore::capture();
        let _guard = this.store.clone().map(ScopedStore::enter);
        this.inner.poll(cx)
    }
}

/// Spawns `future` on the current Tokio runtime, carrying the ambient scope
/// into the new task.
///
/// # Panics
///
/// Panics if called outside of a Tokio runtime, like [`tokio::spawn`].
pub fn spawn<F>(future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(future.in_current_scope())
}
