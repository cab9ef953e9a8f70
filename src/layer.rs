//! [`tower`] binding for [`RequestScope`].
//!
//! ```
//! use std::convert::Infallible;
//!
//! use request_scope::{RequestScope, RequestScopeLayer, scope};
//! use tower::{Layer, Service};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let layer = RequestScopeLayer::new(RequestScope::new());
//! let mut service = layer.layer(tower::service_fn(|_req: http::Request<()>| async {
//!     let request_id = scope::get("requestId").unwrap().to_string();
//!     Ok::<_, Infallible>(http::Response::new(request_id))
//! }));
//!
//! let response = service
//!     .call(http::Request::get("/").body(()).unwrap())
//!     .await
//!     .unwrap();
//! assert_eq!(response.headers()["x-request-id"], response.body().as_str());
//! # });
//! ```

use std::{
    borrow::Cow,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, ready},
};

use pin_project::pin_project;

use crate::{FutureExt, RequestScope, ResponseHeaders, future::ScopedFuture};

/// Applies [`RequestScopeService`] to the wrapped service.
pub struct RequestScopeLayer<B> {
    scope: Arc<RequestScope<http::Request<B>>>,
}

impl<B> RequestScopeLayer<B> {
    #[must_use]
    pub fn new(scope: RequestScope<http::Request<B>>) -> Self {
        Self {
            scope: Arc::new(scope),
        }
    }
}

impl<B> Clone for RequestScopeLayer<B> {
    fn clone(&self) -> Self {
        Self {
            scope: Arc::clone(&self.scope),
        }
    }
}

impl<B> std::fmt::Debug for RequestScopeLayer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScopeLayer")
            .field("scope", &self.scope)
            .finish()
    }
}

impl<S, B> tower::Layer<S> for RequestScopeLayer<B> {
    type Service = RequestScopeService<S, B>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestScopeService {
            inner,
            scope: Arc::clone(&self.scope),
        }
    }
}

/// Runs every request of the inner service in its own scope.
pub struct RequestScopeService<S, B> {
    inner: S,
    scope: Arc<RequestScope<http::Request<B>>>,
}

impl<S: Clone, B> Clone for RequestScopeService<S, B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            scope: Arc::clone(&self.scope),
        }
    }
}

impl<S: std::fmt::Debug, B> std::fmt::Debug for RequestScopeService<S, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScopeService")
            .field("inner", &self.inner)
            .field("scope", &self.scope)
            .finish()
    }
}

impl<S, B, ResBody> tower::Service<http::Request<B>> for RequestScopeService<S, B>
where
    S: tower::Service<http::Request<B>, Response = http::Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: http::Request<B>) -> Self::Future {
        let (request_id, store) = self.scope.open(&request);
        let inner = store.clone().run(|| self.inner.call(request));

        ResponseFuture {
            inner: inner.in_scope(store),
            header: Cow::Owned(self.scope.request_id_header().to_owned()),
            request_id,
        }
    }
}

/// Response future of [`RequestScopeService`].
#[pin_project]
#[derive(Debug)]
pub struct ResponseFuture<F> {
    #[pin]
    inner: ScopedFuture<F>,
    header: Cow<'static, str>,
    request_id: String,
}

impl<F, ResBody, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<http::Response<ResBody>, E>>,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let mut response = ready!(this.inner.poll(cx))?;
        response.set_header(this.header, this.request_id);
        Poll::Ready(Ok(response))
    }
}
