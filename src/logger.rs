//! A context-aware logging adapter over pluggable backends.
//!
//! [`ContextAwareLogger`] merges the ambient scope into every call and hands
//! the result to a [`LogBackend`] in the argument layout that backend expects,
//! described by its [`BackendShape`].

use std::{fmt, sync::Arc, sync::OnceLock};

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::{Attributes, IntoAttributes, backend::ConsoleBackend, error::Error, scope};

/// Log severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }

    /// Maps onto the `log` crate levels; `Fatal` becomes `Error`.
    #[must_use]
    pub const fn to_log_level(self) -> log::Level {
        match self {
            Self::Trace => log::Level::Trace,
            Self::Debug => log::Level::Debug,
            Self::Info => log::Level::Info,
            Self::Warn => log::Level::Warn,
            Self::Error | Self::Fatal => log::Level::Error,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Level {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// The argument layout a backend expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendShape {
    /// `(message, attributes)`; a missing level falls back to the backend's
    /// default level.
    Positional,
    /// A single record carrying `message`, `level` and the attributes; a
    /// missing level falls back to the generic `log` entry point.
    ObjectRecord,
    /// `(attributes, message)`; a missing level falls back to
    /// `log(level, attributes, message)`.
    #[default]
    Generic,
}

/// A single log record in the object-record layout.
///
/// Serializes as one flat map: `level`, `message`, then the attributes. An
/// attribute named `level` or `message` is left out in favour of the record's
/// own fields.
#[derive(Debug, Clone, Copy)]
pub struct LogRecord<'a> {
    pub level: Level,
    pub message: &'a str,
    pub attributes: &'a Attributes,
}

impl Serialize for LogRecord<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("level", &self.level)?;
        map.serialize_entry("message", self.message)?;
        for (key, value) in self.attributes {
            if key != "level" && key != "message" {
                map.serialize_entry(&**key, value)?;
            }
        }
        map.end()
    }
}

/// The arguments of one backend call, laid out per [`BackendShape`].
#[derive(Debug, Clone, Copy)]
pub enum LogCall<'a> {
    Positional {
        message: &'a str,
        attributes: &'a Attributes,
    },
    Record(LogRecord<'a>),
    Generic {
        attributes: &'a Attributes,
        message: &'a str,
    },
}

impl<'a> LogCall<'a> {
    #[must_use]
    pub const fn message(&self) -> &'a str {
        match *self {
            Self::Positional { message, .. } | Self::Generic { message, .. } => message,
            Self::Record(record) => record.message,
        }
    }

    #[must_use]
    pub const fn attributes(&self) -> &'a Attributes {
        match *self {
            Self::Positional { attributes, .. } | Self::Generic { attributes, .. } => attributes,
            Self::Record(record) => record.attributes,
        }
    }
}

/// A structured-logging backend.
///
/// Backends receive calls through [`level`](Self::level), the equivalent of a
/// level-named method. A backend without a dedicated entry for some level
/// reports so through [`has_level`](Self::has_level) and then receives the
/// call through its shape's fallback instead.
pub trait LogBackend: Send + Sync {
    /// The argument layout this backend expects.
    fn shape(&self) -> BackendShape {
        BackendShape::Generic
    }

    fn has_level(&self, _level: Level) -> bool {
        true
    }

    /// Level used by positional backends when the requested one is missing.
    fn default_level(&self) -> Level {
        Level::Info
    }

    /// The level-named entry point.
    fn level(&self, level: Level, call: LogCall<'_>);

    /// The generic entry point.
    fn log(&self, level: Level, call: LogCall<'_>) {
        self.level(level, call);
    }
}

/// Logs through a backend, enriching every call with the ambient scope.
///
/// # Example
///
/// ```
/// use request_scope::{ContextAwareLogger, JsonBackend, scope};
///
/// let logger = ContextAwareLogger::new(JsonBackend::new(std::io::stdout()));
/// scope::enter_new_scope(|| {
///     scope::set("requestId", "r1");
///     scope::set("userId", "u1");
///     // {"level":"error","message":"boom","requestId":"r1","userId":"u2"}
///     logger.error("boom", [("userId", "u2")]);
/// });
/// ```
#[derive(Clone)]
pub struct ContextAwareLogger {
    backend: Arc<dyn LogBackend>,
    shape: BackendShape,
}

impl ContextAwareLogger {
    /// Attaches `backend` using the shape it declares.
    pub fn new<B>(backend: B) -> Self
    where
        B: LogBackend + 'static,
    {
        let shape = backend.shape();
        Self::with_shape(backend, shape)
    }

    /// Attaches `backend` with an explicitly chosen shape.
    pub fn with_shape<B>(backend: B, shape: BackendShape) -> Self
    where
        B: LogBackend + 'static,
    {
        Self {
            backend: Arc::new(backend),
            shape,
        }
    }

    #[must_use]
    pub const fn shape(&self) -> BackendShape {
        self.shape
    }

    /// Emits `message` at `level` with the ambient scope and `extra` merged;
    /// on key collisions `extra` wins.
    pub fn log(&self, level: Level, message: &str, extra: impl IntoAttributes) {
        let mut attributes = scope::get_all();
        attributes.merge(extra);
        self.dispatch(level, message, &attributes);
    }

    pub fn trace(&self, message: &str, extra: impl IntoAttributes) {
        self.log(Level::Trace, message, extra);
    }

    pub fn debug(&self, message: &str, extra: impl IntoAttributes) {
        self.log(Level::Debug, message, extra);
    }

    pub fn info(&self, message: &str, extra: impl IntoAttributes) {
        self.log(Level::Info, message, extra);
    }

    pub fn warn(&self, message: &str, extra: impl IntoAttributes) {
        self.log(Level::Warn, message, extra);
    }

    pub fn error(&self, message: &str, extra: impl IntoAttributes) {
        self.log(Level::Error, message, extra);
    }

    pub fn fatal(&self, message: &str, extra: impl IntoAttributes) {
        self.log(Level::Fatal, message, extra);
    }

    fn dispatch(&self, level: Level, message: &str, attributes: &Attributes) {
        let backend = &*self.backend;
        let supported = backend.has_level(level);

        match self.shape {
            BackendShape::Positional => {
                let call = LogCall::Positional {
                    message,
                    attributes,
                };
                let level = if supported {
                    level
                } else {
                    backend.default_level()
                };
                backend.level(level, call);
            }
            BackendShape::ObjectRecord => {
                let call = LogCall::Record(LogRecord {
                    level,
                    message,
                    attributes,
                });
                if supported {
                    backend.level(level, call);
                } else {
                    backend.log(level, call);
                }
            }
            BackendShape::Generic => {
                let call = LogCall::Generic {
                    attributes,
                    message,
                };
                if supported {
                    backend.level(level, call);
                } else {
                    backend.log(level, call);
                }
            }
        }
    }
}

impl Default for ContextAwareLogger {
    fn default() -> Self {
        Self::new(ConsoleBackend::new())
    }
}

impl fmt::Debug for ContextAwareLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextAwareLogger")
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

static CONFIGURED: OnceLock<ContextAwareLogger> = OnceLock::new();
static FALLBACK: OnceLock<ContextAwareLogger> = OnceLock::new();

/// Sets the process-wide logger.
///
/// # Errors
///
/// Returns [`Error::AlreadyConfigured`] if a logger has already been set.
pub fn configure<B>(backend: B) -> Result<(), Error>
where
    B: LogBackend + 'static,
{
    set_global(ContextAwareLogger::new(backend))
}

/// Sets the process-wide logger with an explicit backend shape.
///
/// # Errors
///
/// Returns [`Error::AlreadyConfigured`] if a logger has already been set.
pub fn configure_with_shape<B>(backend: B, shape: BackendShape) -> Result<(), Error>
where
    B: LogBackend + 'static,
{
    set_global(ContextAwareLogger::with_shape(backend, shape))
}

fn set_global(logger: ContextAwareLogger) -> Result<(), Error> {
    CONFIGURED
        .set(logger)
        .map_err(|_| Error::AlreadyConfigured)
}

/// Returns the process-wide logger, or a console logger if none was set.
pub fn global() -> &'static ContextAwareLogger {
    CONFIGURED
        .get()
        .unwrap_or_else(|| FALLBACK.get_or_init(ContextAwareLogger::default))
}

pub fn trace(message: &str, extra: impl IntoAttributes) {
    global().trace(message, extra);
}

pub fn debug(message: &str, extra: impl IntoAttributes) {
    global().debug(message, extra);
}

pub fn info(message: &str, extra: impl IntoAttributes) {
    global().info(message, extra);
}

pub fn warn(message: &str, extra: impl IntoAttributes) {
    global().warn(message, extra);
}

pub fn error(message: &str, extra: impl IntoAttributes) {
    global().error(message, extra);
}

pub fn fatal(message: &str, extra: impl IntoAttributes) {
    global().fatal(message, extra);
}
