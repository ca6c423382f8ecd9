use crate::{history::HistoryEngine, vault::kv::VaultKvStore};
use anyhow::Result;
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, MatchedPath},
    http::{HeaderName, HeaderValue, Request},
    routing::get,
    Extension, Router,
};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;

pub mod handlers;
mod openapi;

pub use openapi::openapi;

/// The engine the HTTP handlers run against.
pub type Engine = HistoryEngine<VaultKvStore>;

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Full application router: documented routes, the banner and the middleware stack.
#[must_use]
pub fn app(engine: Arc<Engine>) -> Router {
    let (router, _openapi) = router().split_for_parts();

    router.route("/", get(handlers::root::root)).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(DefaultBodyLimit::max(handlers::identity::MAX_BODY_BYTES))
            .layer(Extension(engine)),
    )
}

/// Start the server, it stops on Ctrl-C or when a message arrives on `rx`.
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, engine: Engine, mut rx: mpsc::UnboundedReceiver<()>) -> Result<()> {
    let app = app(Arc::new(engine));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            tokio::select! {
                Some(()) = rx.recv() => info!("Vault token can't be renewed, shutting down"),
                _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down"),
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
