use crate::{api::Engine, GIT_COMMIT_HASH};
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    vault: String,
}

#[utoipa::path(
    get,
    path= "/health",
    responses (
        (status = 200, description = "Vault is reachable and unsealed", body = Health),
        (status = 503, description = "Vault is sealed or unreachable", body = Health)
    ),
    tag= "health"
)]
// axum handler for health, HEAD gets the same status without a body
pub async fn health(method: Method, engine: Extension<Arc<Engine>>) -> impl IntoResponse {
    let vault = engine.store().health().await;

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        vault: vault.as_str().to_string(),
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = health.commit.get(0..7).unwrap_or("");

    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app_header_value| {
            debug!("X-App header: {:?}", x_app_header_value);

            let mut headers = HeaderMap::new();

            headers.insert("X-App", x_app_header_value);

            headers
        })
        .map_err(|err| {
            error!("Failed to parse X-App header: {}", err);
        })
        .unwrap_or_else(|()| HeaderMap::new());

    if vault.is_healthy() {
        debug!("Vault is healthy");
        (StatusCode::OK, headers, body)
    } else {
        debug!("Vault is {}", vault.as_str());
        (StatusCode::SERVICE_UNAVAILABLE, headers, body)
    }
}
