//! # Overview
//!
#![doc = include_utils::include_md!("README.md:description")]
//!
//! Request handling code usually wants every log line to carry the request id,
//! the user and the route, without passing a context object through every
//! function. This library provides:
//!
//! - An isolated attribute store per request ([`ScopedStore`]) that is ambient
//!   for the whole call graph of the request, across `.await` points and
//!   spawned tasks.
//! - A transport-agnostic middleware ([`RequestScope`]) that opens the store,
//!   resolves or generates the request id and echoes it in the response, with
//!   a ready-made [`tower`] layer for [`http`] services.
//! - A context-aware logging adapter ([`ContextAwareLogger`]) that merges the
//!   ambient attributes into every call and shapes the call for its backend.
//! - A [`log`] facade wrapper ([`ContextLogger`]) that adds the same attributes
//!   to every `log` record, so existing `log::info!` calls are enriched too.
//!
//! ## Basic example
//!
#![doc = include_utils::include_md!("README.md:basic_example")]
//!
//! ## Async Context Propagation
//!
#![doc = include_utils::include_md!("README.md:async_example")]

use std::borrow::Cow;

pub use self::{
    attributes::{Attributes, IntoAttributes},
    backend::{ConsoleBackend, JsonBackend, LogFacadeBackend},
    error::Error,
    future::{FutureExt, ScopedFuture, spawn},
    guard::ScopeGuard,
    layer::{RequestScopeLayer, RequestScopeService},
    logger::{BackendShape, ContextAwareLogger, Level, LogBackend, LogCall, LogRecord},
    middleware::{DEFAULT_REQUEST_ID_HEADER, RequestParts, RequestScope, ResponseHeaders, keys},
    scope::ScopedStore,
    value::ContextValue,
};

mod attributes;
mod backend;
mod error;
pub mod future;
pub mod guard;
pub mod layer;
pub mod logger;
pub mod middleware;
pub mod scope;
mod stack;
mod value;

type StaticCowStr = Cow<'static, str>;

/// A logger wrapper that enhances log records with the ambient scope.
///
/// `ContextLogger` wraps an existing logging implementation and adds the
/// attributes of the current [`ScopedStore`] to every record. On key
/// collisions the record's own key-values win over the scope, and the scope
/// wins over default records; a shadowed key is emitted only once.
///
/// # Example
///
/// ```
/// use log::{info, LevelFilter};
/// use request_scope::{ContextLogger, ScopedStore};
///
/// // Create a logger.
/// let env_logger = env_logger::builder().build();
/// let max_level = env_logger.filter();
/// // Wrap it with ContextLogger to enable context propagation.
/// let context_logger = ContextLogger::new(env_logger);
/// // Initialize the resulting logger.
/// context_logger.init(max_level);
///
/// // Enter a scope with some attributes
/// let _guard = ScopedStore::new()
///     .record("requestId", "req-123")
///     .record("userId", 42)
///     .enter();
///
/// info!("Processing request"); // Will include requestId and userId
/// ```
pub struct ContextLogger {
    default_records: Attributes,
    inner: Box<dyn log::Log>,
}

impl ContextLogger {
    /// Creates a new [`ContextLogger`] that wraps the given logging implementation.
    ///
    /// The inner logger will receive log records enhanced with the attributes
    /// of the ambient scope.
    pub fn new<L>(inner: L) -> Self
    where
        L: log::Log + 'static,
    {
        Self {
            default_records: Attributes::new(),
            inner: Box::new(inner),
        }
    }

    /// Initializes the global logger with the context logger.
    ///
    /// This should be called early in the execution of a Rust program. Any log events that occur before initialization will be ignored.
    ///
    /// # Panics
    ///
    /// Panics if a logger has already been set.
    pub fn init(self, max_level: log::LevelFilter) {
        self.try_init(max_level)
            .expect("ContextLogger::init should not be called after logger initialization");
    }

    /// Initializes the global logger with the context logger.
    ///
    /// This should be called early in the execution of a Rust program. Any log events that occur before initialization will be ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if a logger has already been set.
    pub fn try_init(self, max_level: log::LevelFilter) -> Result<(), Error> {
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(max_level);
        Ok(())
    }

    /// Adds a default record that will be included in all log entries.
    ///
    /// Default records are added to every entry, inside or outside a scope.
    /// A scope attribute or a record key-value with the same key replaces the
    /// default for that entry.
    ///
    /// # Example
    ///
    /// ```
    /// use log::{info, LevelFilter};
    /// use request_scope::{ContextLogger, ScopedStore};
    ///
    /// // Create a logger with default records
    /// let logger = ContextLogger::new(env_logger::builder().build())
    ///     .default_record("service", "api")
    ///     .default_record("version", "1.0.0");
    /// // Initialize it
    /// logger.init(LevelFilter::Info);
    /// // Scope attributes are added after default records
    /// let _guard = ScopedStore::new()
    ///     .record("requestId", "123")
    ///     .enter();
    ///
    /// info!("Processing request"); // Will include service="api", version="1.0.0", requestId="123"
    /// ```
    #[must_use]
    pub fn default_record(
        mut self,
        key: impl Into<StaticCowStr>,
        value: impl Into<ContextValue>,
    ) -> Self {
        self.default_records.insert(key, value);
        self
    }
}

impl std::fmt::Debug for ContextLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextLogger").finish_non_exhaustive()
    }
}

impl log::Log for ContextLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        let context_records = scope::get_all();
        let extra_records = ExtraRecords {
            source: record.key_values(),
            default_records: &self.default_records,
            context_records: &context_records,
        };
        self.inner
            .log(&record.to_builder().key_values(&extra_records).build());
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

struct ExtraRecords<'a> {
    source: &'a dyn log::kv::Source,
    default_records: &'a Attributes,
    context_records: &'a Attributes,
}

impl ExtraRecords<'_> {
    fn in_source(&self, key: &str) -> bool {
        self.source.get(log::kv::Key::from_str(key)).is_some()
    }
}

impl log::kv::Source for ExtraRecords<'_> {
    fn visit<'kvs>(
        &'kvs self,
        visitor: &mut dyn log::kv::VisitSource<'kvs>,
    ) -> Result<(), log::kv::Error> {
        let defaults = self
            .default_records
            .iter()
            .filter(|(key, _)| !self.context_records.contains_key(key));
        let all_records = defaults.chain(self.context_records);
        for (key, value) in all_records {
            if !self.in_source(key) {
                visitor.visit_pair(log::kv::Key::from_str(key), value.as_log_value())?;
            }
        }
        self.source.visit(visitor)
    }
}
