use std::{convert::Infallible, time::Duration};

use futures_util::future::join_all;
use request_scope::{
    ContextAwareLogger, ContextLogger, ContextValue, LogFacadeBackend, RequestScope,
    RequestScopeLayer, scope,
};
use serde::Serialize;
use tower::{Layer, ServiceExt};

#[derive(Debug, Serialize)]
struct Operation {
    action: String,
    items: usize,
}

fn try_init_logger() -> Result<(), Box<dyn std::error::Error>> {
    let level = log::LevelFilter::Info;

    let logger = structured_logger::Builder::with_level(level.as_str())
        .with_target_writer("*", structured_logger::json::new_writer(std::io::stdout()))
        .build();
    ContextLogger::new(logger)
        .default_record("instance", "request_scope_async")
        .try_init(level)?;

    Ok(())
}

async fn handle(
    logger: ContextAwareLogger,
    request: http::Request<()>,
) -> Result<http::Response<String>, Infallible> {
    log::info!("Handling request");

    scope::set("route", format!("{} {}", request.method(), request.uri().path()));
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Audit work outlives the response but keeps the request attributes.
    request_scope::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        scope::set(
            "operation",
            ContextValue::serde(Operation {
                action: "checkout".to_owned(),
                items: 3,
            }),
        );
        log::info!("Audit record written");
    });

    logger.info("Request completed", [("status", 200)]);
    Ok(http::Response::new("ok".to_owned()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    try_init_logger()?;
    log::info!("Initialized context logger");

    let logger = ContextAwareLogger::new(LogFacadeBackend::default());
    let service = RequestScopeLayer::new(RequestScope::new().with_user_id(
        |req: &http::Request<()>| {
            req.headers()
                .get("x-user")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        },
    ))
    .layer(tower::service_fn(move |request| handle(logger.clone(), request)));

    let requests = [
        http::Request::get("/cart").header("x-user", "alice").body(())?,
        http::Request::post("/checkout")
            .header("x-request-id", "req-bob")
            .header("x-user", "bob")
            .body(())?,
        http::Request::get("/health").body(())?,
    ];
    let responses = join_all(
        requests
            .into_iter()
            .map(|request| service.clone().oneshot(request)),
    )
    .await;

    for response in responses {
        let response = response?;
        log::info!(
            request_id = response.headers()["x-request-id"].to_str()?;
            "Response sent"
        );
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}
