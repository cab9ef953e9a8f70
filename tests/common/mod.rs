#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use log::{LevelFilter, Record, kv::Key};
use request_scope::{Attributes, ContextLogger, Level, LogBackend, LogCall};

pub trait RecordExt {
    fn get_record(&self, key: &str) -> Option<serde_json::Value>;
}

impl RecordExt for Record<'_> {
    fn get_record(&self, key: &str) -> Option<serde_json::Value> {
        let key = Key::from_str(key);
        let val = self.key_values().get(key)?;
        serde_json::to_value(val).ok()
    }
}

pub fn check_logger_once<F>(check: F)
where
    F: Fn(&Record) -> std::io::Result<()> + Send + Sync + 'static,
{
    let level_filter = LevelFilter::Trace;
    let logger = ContextLogger::new(
        env_logger::Builder::new()
            .filter_level(level_filter)
            .format(move |_fmt, record| check(record))
            .build(),
    );
    logger.init(level_filter);
}

/// The entry point a backend call arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Level,
    Log,
}

/// One call observed by [`RecordingBackend`], with the arguments flattened to
/// JSON for easy comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Captured {
    pub entry: Entry,
    pub level: Level,
    pub args: serde_json::Value,
}

/// A backend that records every call instead of writing it anywhere.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    pub shape: request_scope::BackendShape,
    pub missing: Vec<Level>,
    pub calls: Arc<Mutex<Vec<Captured>>>,
}

impl RecordingBackend {
    pub fn new(shape: request_scope::BackendShape) -> Self {
        Self {
            shape,
            ..Self::default()
        }
    }

    pub fn without(mut self, level: Level) -> Self {
        self.missing.push(level);
        self
    }

    pub fn calls(&self) -> Vec<Captured> {
        self.calls.lock().unwrap().clone()
    }

    fn capture(&self, entry: Entry, level: Level, call: LogCall<'_>) {
        let args = match call {
            LogCall::Positional {
                message,
                attributes,
            } => serde_json::json!([message, attributes]),
            LogCall::Record(record) => serde_json::json!([record]),
            LogCall::Generic {
                attributes,
                message,
            } => serde_json::json!([attributes, message]),
        };
        self.calls.lock().unwrap().push(Captured { entry, level, args });
    }
}

impl LogBackend for RecordingBackend {
    fn shape(&self) -> request_scope::BackendShape {
        self.shape
    }

    fn has_level(&self, level: Level) -> bool {
        !self.missing.contains(&level)
    }

    fn level(&self, level: Level, call: LogCall<'_>) {
        self.capture(Entry::Level, level, call);
    }

    fn log(&self, level: Level, call: LogCall<'_>) {
        self.capture(Entry::Log, level, call);
    }
}

/// A backend that declares nothing about itself.
#[derive(Debug, Clone, Default)]
pub struct UnknownBackend {
    pub seen: Arc<Mutex<Vec<String>>>,
}

impl LogBackend for UnknownBackend {
    fn level(&self, _level: Level, call: LogCall<'_>) {
        self.seen.lock().unwrap().push(call.message().to_owned());
    }
}

pub fn attributes(value: serde_json::Value) -> Attributes {
    match value {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => panic!("expected a JSON object"),
    }
}
