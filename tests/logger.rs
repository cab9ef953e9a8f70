use std::{
    io::{self, Write},
    sync::{Arc, Mutex},
};

use pretty_assertions::assert_eq;
use request_scope::{
    BackendShape, ContextAwareLogger, FutureExt, JsonBackend, Level, ScopedStore, scope,
};
use serde_json::json;

use crate::common::{Captured, Entry, RecordingBackend, UnknownBackend, attributes};

pub mod common;

fn scoped_request() -> ScopedStore {
    ScopedStore::new()
        .record("requestId", "r1")
        .record("userId", "u1")
}

#[test]
fn test_call_site_attributes_win() {
    let backend = RecordingBackend::new(BackendShape::Generic);
    let logger = ContextAwareLogger::new(backend.clone());

    scoped_request().run(|| logger.error("boom", [("userId", "u2")]));

    assert_eq!(
        backend.calls(),
        vec![Captured {
            entry: Entry::Level,
            level: Level::Error,
            args: json!([{ "requestId": "r1", "userId": "u2" }, "boom"]),
        }]
    );
}

#[test]
fn test_positional_backend_dispatch() {
    let backend = RecordingBackend::new(BackendShape::Positional);
    let logger = ContextAwareLogger::new(backend.clone());
    assert_eq!(logger.shape(), BackendShape::Positional);

    scoped_request().run(|| logger.info("hi", [("a", 1)]));

    assert_eq!(
        backend.calls(),
        vec![Captured {
            entry: Entry::Level,
            level: Level::Info,
            args: json!(["hi", { "a": 1, "requestId": "r1", "userId": "u1" }]),
        }]
    );
}

#[test]
fn test_object_record_backend_dispatch() {
    let backend = RecordingBackend::new(BackendShape::ObjectRecord);
    let logger = ContextAwareLogger::new(backend.clone());

    scoped_request().run(|| logger.info("hi", [("a", 1)]));

    assert_eq!(
        backend.calls(),
        vec![Captured {
            entry: Entry::Level,
            level: Level::Info,
            args: json!([{
                "message": "hi",
                "level": "info",
                "a": 1,
                "requestId": "r1",
                "userId": "u1",
            }]),
        }]
    );
}

#[test]
fn test_missing_level_fallbacks() {
    let positional = RecordingBackend::new(BackendShape::Positional).without(Level::Fatal);
    let record = RecordingBackend::new(BackendShape::ObjectRecord).without(Level::Trace);
    let generic = RecordingBackend::new(BackendShape::Generic).without(Level::Warn);

    ContextAwareLogger::new(positional.clone()).fatal("down", ());
    ContextAwareLogger::new(record.clone()).trace("tick", ());
    ContextAwareLogger::new(generic.clone()).warn("slow", [("ms", 1200)]);

    // Positional backends fall back to their default level method.
    assert_eq!(
        positional.calls(),
        vec![Captured {
            entry: Entry::Level,
            level: Level::Info,
            args: json!(["down", {}]),
        }]
    );
    // Object-record backends fall back to `log` with the same record.
    assert_eq!(
        record.calls(),
        vec![Captured {
            entry: Entry::Log,
            level: Level::Trace,
            args: json!([{ "message": "tick", "level": "trace" }]),
        }]
    );
    // Generic backends fall back to `log(level, attributes, message)`.
    assert_eq!(
        generic.calls(),
        vec![Captured {
            entry: Entry::Log,
            level: Level::Warn,
            args: json!([{ "ms": 1200 }, "slow"]),
        }]
    );
}

#[test]
fn test_explicit_shape_overrides_declared_one() {
    let backend = RecordingBackend::new(BackendShape::ObjectRecord);
    let logger = ContextAwareLogger::with_shape(backend.clone(), BackendShape::Positional);

    logger.debug("details", attributes(json!({ "k": "v" })));

    assert_eq!(backend.calls()[0].args, json!(["details", { "k": "v" }]));
}

#[test]
fn test_unknown_backend_degrades_to_generic() {
    let backend = UnknownBackend::default();
    let logger = ContextAwareLogger::new(backend.clone());

    assert_eq!(logger.shape(), BackendShape::Generic);
    logger.info("still logged", ());
    assert_eq!(*backend.seen.lock().unwrap(), vec!["still logged".to_owned()]);
}

#[test]
fn test_logging_outside_a_scope() {
    let backend = RecordingBackend::new(BackendShape::Generic);
    let logger = ContextAwareLogger::new(backend.clone());

    logger.info("startup", ());
    ContextAwareLogger::default().info("console fallback", [("ok", true)]);

    assert_eq!(backend.calls()[0].args, json!([{}, "startup"]));
}

#[tokio::test]
async fn test_log_lines_never_mix_scopes() {
    let backend = RecordingBackend::new(BackendShape::Positional);
    let logger = ContextAwareLogger::new(backend.clone());

    let request = |id: &'static str| {
        let logger = logger.clone();
        async move {
            scope::set("requestId", id);
            logger.info("start", ());
            tokio::task::yield_now().await;
            logger.info("end", ());
        }
        .in_new_scope()
    };
    tokio::join!(request("a"), request("b"));

    let mut lines: Vec<_> = backend
        .calls()
        .into_iter()
        .map(|call| call.args.to_string())
        .collect();
    // Interleaving between requests is unspecified, each line is not.
    lines.sort();
    assert_eq!(
        lines,
        vec![
            json!(["end", { "requestId": "a" }]).to_string(),
            json!(["end", { "requestId": "b" }]).to_string(),
            json!(["start", { "requestId": "a" }]).to_string(),
            json!(["start", { "requestId": "b" }]).to_string(),
        ]
    );
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_json_backend_writes_records() {
    let buffer = SharedBuffer::default();
    let logger = ContextAwareLogger::new(JsonBackend::new(buffer.clone()));
    assert_eq!(logger.shape(), BackendShape::ObjectRecord);

    scoped_request().run(|| logger.warn("retrying", [("attempt", 2)]));
    logger.info("idle", ());

    let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
    let lines: Vec<serde_json::Value> = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(
        lines,
        vec![
            json!({
                "level": "warn",
                "message": "retrying",
                "attempt": 2,
                "requestId": "r1",
                "userId": "u1",
            }),
            json!({ "level": "info", "message": "idle" }),
        ]
    );
}
