//! Bundled [`LogBackend`] implementations.

use std::{
    borrow::Cow,
    fmt,
    io::{self, Write},
    sync::{Mutex, PoisonError},
};

use crate::logger::{BackendShape, Level, LogBackend, LogCall, LogRecord};

/// Writes `attributes message` lines to the standard streams.
///
/// `warn` and above go to stderr, everything else to stdout. This is the
/// backend used when nothing else is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleBackend;

impl ConsoleBackend {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ConsoleBackend {
    fn write_line(level: Level, call: LogCall<'_>, out: &mut impl Write) -> io::Result<()> {
        let attributes = serde_json::to_string(call.attributes())
            .unwrap_or_else(|_| String::from("{}"));
        writeln!(out, "{level} {attributes} {}", call.message())
    }
}

impl LogBackend for ConsoleBackend {
    fn level(&self, level: Level, call: LogCall<'_>) {
        let result = if level >= Level::Warn {
            Self::write_line(level, call, &mut io::stderr().lock())
        } else {
            Self::write_line(level, call, &mut io::stdout().lock())
        };
        if let Err(err) = result {
            eprintln!("Error writing log line: {err}");
        }
    }
}

/// Writes one JSON object per call: `level`, `message` and the attributes.
pub struct JsonBackend<W> {
    writer: Mutex<W>,
}

impl<W> JsonBackend<W>
where
    W: Write + Send,
{
    pub const fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    fn write_record(&self, record: &LogRecord<'_>) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

impl<W> fmt::Debug for JsonBackend<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonBackend").finish_non_exhaustive()
    }
}

impl<W> LogBackend for JsonBackend<W>
where
    W: Write + Send,
{
    fn shape(&self) -> BackendShape {
        BackendShape::ObjectRecord
    }

    fn level(&self, level: Level, call: LogCall<'_>) {
        let record = match call {
            LogCall::Record(record) => record,
            other => LogRecord {
                level,
                message: other.message(),
                attributes: other.attributes(),
            },
        };

        if let Err(err) = self.write_record(&record) {
            eprintln!("Error writing log record: {err}");
        }
    }
}

/// Forwards calls into the [`log`] facade, attributes as key-values.
///
/// The message goes in the first position, so this backend has the
/// positional shape.
#[derive(Debug, Clone)]
pub struct LogFacadeBackend {
    target: Cow<'static, str>,
}

impl LogFacadeBackend {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            target: Cow::Borrowed(env!("CARGO_CRATE_NAME")),
        }
    }

    /// Sets the target of emitted records.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<Cow<'static, str>>) -> Self {
        self.target = target.into();
        self
    }
}

impl Default for LogFacadeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBackend for LogFacadeBackend {
    fn shape(&self) -> BackendShape {
        BackendShape::Positional
    }

    fn level(&self, level: Level, call: LogCall<'_>) {
        let level = level.to_log_level();
        if level > log::max_level() {
            return;
        }

        let message = call.message();
        log::logger().log(
            &log::Record::builder()
                .args(format_args!("{message}"))
                .level(level)
                .target(&self.target)
                .key_values(call.attributes())
                .build(),
        );
    }
}
