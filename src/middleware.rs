//! Opening a request scope at the transport boundary.
//!
//! [`RequestScope`] is written once against two small traits,
//! [`RequestParts`] and [`ResponseHeaders`]; a transport binding only has to
//! implement those (this crate ships them for the [`http`] types, and a
//! [`tower`] layer on top in [`crate::layer`]).

use std::{borrow::Cow, fmt, sync::Arc};

use crate::{Attributes, ContextValue, FutureExt, IntoAttributes, ScopedStore};

/// Default header carrying the request id in both directions.
pub const DEFAULT_REQUEST_ID_HEADER: &str = "x-request-id";

/// Attribute keys written by [`RequestScope`].
pub mod keys {
    pub const REQUEST_ID: &str = "requestId";
    pub const PATH: &str = "path";
    pub const METHOD: &str = "method";
    pub const USER_ID: &str = "userId";
}

/// Read access to an inbound request.
pub trait RequestParts {
    /// Returns the value of the header `name`, if present and textual.
    fn header(&self, name: &str) -> Option<&str>;

    fn method(&self) -> &str;

    /// Returns the request path, without the query string.
    fn path(&self) -> &str;
}

/// Write access to the headers of an outbound response.
pub trait ResponseHeaders {
    fn set_header(&mut self, name: &str, value: &str);
}

type Extractor<R> = Arc<dyn Fn(&R) -> Attributes + Send + Sync>;

/// Opens a fresh scope per request and seeds it with the request attributes.
///
/// Every scope gets `requestId` (taken from the request id header or
/// generated), then `path` and `method` unless disabled with
/// [`without_request_line`](Self::without_request_line), then whatever the
/// configured extractors return, in registration order.
///
/// # Example
///
/// ```
/// use request_scope::{RequestScope, scope};
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let request_scope = RequestScope::new().with_user_id(|req: &http::Request<()>| {
///     req.headers()
///         .get("x-user")
///         .and_then(|v| v.to_str().ok())
///         .map(str::to_owned)
/// });
///
/// let request = http::Request::get("/orders/7")
///     .header("x-request-id", "abc-123")
///     .header("x-user", "u1")
///     .body(())
///     .unwrap();
///
/// let response = request_scope
///     .run(request, |_req| async {
///         assert_eq!(scope::get("requestId").unwrap().to_string(), "abc-123");
///         assert_eq!(scope::get("userId").unwrap().to_string(), "u1");
///         Ok::<_, std::convert::Infallible>(http::Response::new(()))
///     })
///     .await
///     .unwrap();
///
/// assert_eq!(response.headers()["x-request-id"], "abc-123");
/// # });
/// ```
pub struct RequestScope<R> {
    request_id_header: Cow<'static, str>,
    request_line: bool,
    extractors: Vec<Extractor<R>>,
}

impl<R> RequestScope<R> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id_header: Cow::Borrowed(DEFAULT_REQUEST_ID_HEADER),
            request_line: true,
            extractors: Vec::new(),
        }
    }

    /// Changes the header the request id is read from and written to.
    #[must_use]
    pub fn with_request_id_header(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.request_id_header = name.into();
        self
    }

    /// Stops recording `path` and `method` automatically.
    #[must_use]
    pub const fn without_request_line(mut self) -> Self {
        self.request_line = false;
        self
    }

    /// Adds an extractor whose attributes are merged into every new scope.
    ///
    /// This is the general hook; [`with_user_id`](Self::with_user_id) and
    /// [`with_extra`](Self::with_extra) are shorthands over it.
    #[must_use]
    pub fn with_context<F, A>(mut self, extractor: F) -> Self
    where
        F: Fn(&R) -> A + Send + Sync + 'static,
        A: IntoAttributes + 'static,
        R: 'static,
    {
        self.extractors
            .push(Arc::new(move |request: &R| extractor(request).into_attributes()));
        self
    }

    /// Records `userId` whenever `user_id` returns a value.
    ///
    /// Empty and null ids are skipped.
    #[must_use]
    pub fn with_user_id<F, V>(self, user_id: F) -> Self
    where
        F: Fn(&R) -> Option<V> + Send + Sync + 'static,
        V: Into<ContextValue> + 'static,
        R: 'static,
    {
        self.with_context(move |request: &R| {
            user_id(request)
                .map(Into::<ContextValue>::into)
                .filter(|id| !id.is_null() && id.as_str() != Some(""))
                .map(|id| [(keys::USER_ID, id)])
        })
    }

    /// Records free-form attributes derived from the request.
    #[must_use]
    pub fn with_extra<F, A>(self, extra: F) -> Self
    where
        F: Fn(&R) -> A + Send + Sync + 'static,
        A: IntoAttributes + 'static,
        R: 'static,
    {
        self.with_context(extra)
    }

    #[must_use]
    pub fn request_id_header(&self) -> &str {
        &self.request_id_header
    }
}

impl<R> RequestScope<R>
where
    R: RequestParts,
{
    /// Returns the inbound request id, or a freshly generated one.
    ///
    /// A present header is trusted verbatim; an empty one counts as absent.
    pub fn resolve_request_id(&self, request: &R) -> String {
        request
            .header(&self.request_id_header)
            .filter(|id| !id.is_empty())
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_owned)
    }

    /// Creates the store for `request` and seeds it.
    ///
    /// Returns the resolved request id alongside the store, for bindings that
    /// write the response header themselves.
    pub fn open(&self, request: &R) -> (String, ScopedStore) {
        let request_id = self.resolve_request_id(request);
        let store = ScopedStore::new().record(keys::REQUEST_ID, request_id.as_str());

        if self.request_line {
            store.set(keys::PATH, request.path());
            store.set(keys::METHOD, request.method());
        }
        for extractor in &self.extractors {
            for (key, value) in extractor(request) {
                store.set(key, value);
            }
        }

        log::trace!(request_id = request_id.as_str(); "Opened request scope");
        (request_id, store)
    }

    /// Runs the rest of the pipeline for `request` inside a new scope.
    ///
    /// `next` is called and its future polled with the new store ambient. On
    /// success the request id is written to the response header; errors are
    /// returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns whatever error `next` fails with.
    pub async fn run<Res, E, F, Fut>(&self, request: R, next: F) -> Result<Res, E>
    where
        F: FnOnce(R) -> Fut,
        Fut: Future<Output = Result<Res, E>>,
        Res: ResponseHeaders,
    {
        let (request_id, store) = self.open(&request);

        let pending = store.clone().run(|| next(request));
        let mut response = pending.in_scope(store).await?;
        response.set_header(&self.request_id_header, &request_id);
        Ok(response)
    }
}

impl<R> Default for RequestScope<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for RequestScope<R> {
    fn clone(&self) -> Self {
        Self {
            request_id_header: self.request_id_header.clone(),
            request_line: self.request_line,
            extractors: self.extractors.clone(),
        }
    }
}

impl<R> fmt::Debug for RequestScope<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("request_id_header", &self.request_id_header)
            .field("request_line", &self.request_line)
            .field("extractors", &self.extractors.len())
            .finish()
    }
}

impl<B> RequestParts for http::Request<B> {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name)?.to_str().ok()
    }

    fn method(&self) -> &str {
        self.method().as_str()
    }

    fn path(&self) -> &str {
        self.uri().path()
    }
}

impl<B> ResponseHeaders for http::Response<B> {
    fn set_header(&mut self, name: &str, value: &str) {
        let name = match http::HeaderName::from_bytes(name.as_bytes()) {
            Ok(name) => name,
            Err(err) => {
                log::warn!(header = name; "Skipping invalid response header name: {err}");
                return;
            }
        };
        match http::HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers_mut().insert(name, value);
            }
            Err(err) => {
                log::warn!(header = name.as_str(); "Skipping invalid response header value: {err}");
            }
        }
    }
}
